//! A sheet: a chain of expression lines plus line-level edits.

use super::expression::{ExpressionBlock, ExpressionState};
use crate::block::{Action, Block, Update};
use crate::chain::{Chain, ChainState, EntryId, Visibility};
use crate::compiler::Compiler;
use crate::env::Env;
use crate::value::Value;
use futures::executor::LocalSpawner;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::rc::Rc;

pub type SheetState = ChainState<ExpressionState>;

/// A line-level edit, dispatchable as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SheetEdit {
    InsertLineBefore { id: EntryId },
    InsertLineAfter { id: EntryId },
    InsertLineEnd,
    DeleteLines { ids: Vec<EntryId> },
    SetName { id: EntryId, name: String },
    DuplicateLine { id: EntryId },
    SetSource { id: EntryId, source: String },
    SetVisibility { id: EntryId, visibility: Visibility },
}

#[derive(Clone)]
pub struct Sheet {
    chain: Chain<ExpressionBlock>,
}

impl Sheet {
    pub fn new(compiler: Rc<Compiler>, spawner: LocalSpawner) -> Self {
        Self {
            chain: Chain::new(ExpressionBlock::new(compiler, spawner)),
        }
    }

    pub fn with_early_stop(mut self, early_stop: bool) -> Self {
        self.chain = self.chain.with_early_stop(early_stop);
        self
    }

    pub fn chain(&self) -> &Chain<ExpressionBlock> {
        &self.chain
    }

    pub fn action(&self, edit: SheetEdit) -> Action<SheetState> {
        let sheet = self.clone();
        Box::new(move |state, env, update| sheet.apply(&state, update, env, edit))
    }

    pub fn apply(
        &self,
        state: &SheetState,
        update: &Update<SheetState>,
        env: &Env,
        edit: SheetEdit,
    ) -> SheetState {
        log::debug!("Applying {edit:?}");
        match edit {
            SheetEdit::InsertLineBefore { id } => self.insert_line_before(state, update, env, id),
            SheetEdit::InsertLineAfter { id } => self.insert_line_after(state, update, env, id),
            SheetEdit::InsertLineEnd => self.insert_line_end(state, update, env),
            SheetEdit::DeleteLines { ids } => self.delete_lines(state, update, env, &ids),
            SheetEdit::SetName { id, name } => self.set_name(state, update, env, id, &name),
            SheetEdit::DuplicateLine { id } => self.duplicate_line(state, update, env, id),
            SheetEdit::SetSource { id, source } => self.set_source(state, update, env, id, &source),
            SheetEdit::SetVisibility { id, visibility } => self.set_visibility(state, id, visibility),
        }
    }

    pub fn insert_line_before(
        &self,
        state: &SheetState,
        update: &Update<SheetState>,
        env: &Env,
        id: EntryId,
    ) -> SheetState {
        self.chain.insert_before(state, update, env, id)
    }

    pub fn insert_line_after(
        &self,
        state: &SheetState,
        update: &Update<SheetState>,
        env: &Env,
        id: EntryId,
    ) -> SheetState {
        self.chain.insert_after(state, update, env, id)
    }

    pub fn insert_line_end(&self, state: &SheetState, update: &Update<SheetState>, env: &Env) -> SheetState {
        self.chain.insert_end(state, update, env)
    }

    pub fn delete_lines(
        &self,
        state: &SheetState,
        update: &Update<SheetState>,
        env: &Env,
        ids: &[EntryId],
    ) -> SheetState {
        self.chain.delete_entries(state, update, env, ids)
    }

    pub fn set_name(
        &self,
        state: &SheetState,
        update: &Update<SheetState>,
        env: &Env,
        id: EntryId,
        name: &str,
    ) -> SheetState {
        self.chain.set_name(state, update, env, id, name)
    }

    pub fn duplicate_line(
        &self,
        state: &SheetState,
        update: &Update<SheetState>,
        env: &Env,
        id: EntryId,
    ) -> SheetState {
        self.chain.duplicate_entry(state, update, env, id)
    }

    pub fn set_source(
        &self,
        state: &SheetState,
        update: &Update<SheetState>,
        env: &Env,
        id: EntryId,
        source: &str,
    ) -> SheetState {
        let block = self.chain.inner().clone();
        let source = source.to_owned();
        self.chain.update_entry(
            state,
            update,
            env,
            id,
            Box::new(move |line, env, update| block.set_source(&line, update, env, &source)),
        )
    }

    pub fn set_visibility(&self, state: &SheetState, id: EntryId, visibility: Visibility) -> SheetState {
        self.chain.set_visibility(state, id, visibility)
    }

    pub fn next_free_id(&self, state: &SheetState) -> EntryId {
        state.next_free_id()
    }

    pub fn last_result(&self, state: &SheetState) -> Value {
        state.last_result()
    }

    pub fn line_result(&self, state: &SheetState, id: EntryId) -> Option<Value> {
        state.result(id).cloned()
    }
}

impl Block for Sheet {
    type State = SheetState;

    fn init(&self) -> SheetState {
        self.chain.init()
    }

    fn recompute(&self, state: &SheetState, update: &Update<SheetState>, env: &Env) -> SheetState {
        self.chain.recompute(state, update, env)
    }

    fn result(&self, state: &SheetState, env: &Env) -> Value {
        self.chain.result(state, env)
    }

    fn from_json(&self, json: &Json, update: &Update<SheetState>, env: &Env) -> SheetState {
        self.chain.from_json(json, update, env)
    }

    fn to_json(&self, state: &SheetState) -> Json {
        self.chain.to_json(state)
    }

    fn dependencies(&self, state: &SheetState) -> Option<Rc<BTreeSet<String>>> {
        self.chain.dependencies(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EventLoop;
    use serde_json::json;

    #[test]
    fn line_and_sheet_results() {
        let event_loop = EventLoop::new();
        let sheet = Sheet::new(Rc::new(Compiler::default()), event_loop.spawner());
        let update = Update::detached();
        let env = Env::new();
        let lines = json!([
            { "id": 0, "name": "a", "state": "2" },
            { "id": 1, "name": "", "state": "a * 21" },
        ]);
        let state = sheet.from_json(&lines, &update, &env);
        assert_eq!(sheet.line_result(&state, EntryId(0)), Some(Value::Number(2.0)));
        assert_eq!(sheet.line_result(&state, EntryId(7)), None);
        assert_eq!(Block::result(&sheet, &state, &env), Value::Number(42.0));
    }

    #[test]
    fn edits_deserialize_from_json() {
        let edit: SheetEdit =
            serde_json::from_value(json!({ "op": "set_source", "id": 3, "source": "a + 1" })).unwrap();
        assert_eq!(
            edit,
            SheetEdit::SetSource {
                id: EntryId(3),
                source: "a + 1".to_owned(),
            }
        );
        let edit: SheetEdit = serde_json::from_value(json!({ "op": "insert_line_end" })).unwrap();
        assert_eq!(edit, SheetEdit::InsertLineEnd);
    }
}
