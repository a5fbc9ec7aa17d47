//! Document cells: a note, a single expression or a nested sheet.

use super::expression::{ExpressionBlock, ExpressionState};
use super::note::{NoteBlock, NoteState};
use super::sheet::{Sheet, SheetEdit, SheetState};
use crate::block::{Action, Block, Update};
use crate::chain::Chain;
use crate::compiler::Compiler;
use crate::env::Env;
use crate::value::Value;
use futures::executor::LocalSpawner;
use serde_json::{Value as Json, json};
use std::collections::BTreeSet;
use std::rc::Rc;

/// A document is a chain of cells, some of which are chains themselves.
pub type Document = Chain<CellBlock>;

pub struct CellBlock {
    note: NoteBlock,
    expression: ExpressionBlock,
    sheet: Sheet,
}

#[derive(Clone)]
pub enum CellState {
    Note(NoteState),
    Expression(ExpressionState),
    Sheet(SheetState),
}

impl CellBlock {
    pub fn new(compiler: Rc<Compiler>, spawner: LocalSpawner) -> Self {
        Self {
            note: NoteBlock::new(compiler.clone()),
            expression: ExpressionBlock::new(compiler.clone(), spawner.clone()),
            sheet: Sheet::new(compiler, spawner),
        }
    }

    pub fn note(&self) -> &NoteBlock {
        &self.note
    }

    pub fn expression(&self) -> &ExpressionBlock {
        &self.expression
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    /// An action applying `edit` to a sheet cell. Other cells ignore it.
    pub fn sheet_action(&self, edit: SheetEdit) -> Action<CellState> {
        let sheet = self.sheet.clone();
        Box::new(move |state, env, update| match state {
            CellState::Sheet(lines) => {
                CellState::Sheet(sheet.apply(&lines, &sheet_update(update), env, edit))
            }
            other => {
                log::debug!("Ignoring {edit:?} on a cell that is not a sheet");
                other
            }
        })
    }
}

/// Narrows a cell handle to the state of one kind of cell. Actions arriving
/// after the cell changed kind are dropped.
fn focus_variant<T: 'static>(
    update: &Update<CellState>,
    wrap: fn(T) -> CellState,
    unwrap: fn(CellState) -> Result<T, CellState>,
) -> Update<T> {
    update.focus(move |action: Action<T>| -> Action<CellState> {
        Box::new(move |state, env, update| match unwrap(state) {
            Ok(inner) => wrap(action(inner, env, &focus_variant(update, wrap, unwrap))),
            Err(other) => other,
        })
    })
}

pub fn note_update(update: &Update<CellState>) -> Update<NoteState> {
    focus_variant(update, CellState::Note, |state| match state {
        CellState::Note(note) => Ok(note),
        other => Err(other),
    })
}

pub fn expression_update(update: &Update<CellState>) -> Update<ExpressionState> {
    focus_variant(update, CellState::Expression, |state| match state {
        CellState::Expression(expression) => Ok(expression),
        other => Err(other),
    })
}

pub fn sheet_update(update: &Update<CellState>) -> Update<SheetState> {
    focus_variant(update, CellState::Sheet, |state| match state {
        CellState::Sheet(sheet) => Ok(sheet),
        other => Err(other),
    })
}

impl Block for CellBlock {
    type State = CellState;

    fn init(&self) -> CellState {
        CellState::Expression(self.expression.init())
    }

    fn recompute(&self, state: &CellState, update: &Update<CellState>, env: &Env) -> CellState {
        match state {
            CellState::Note(note) => CellState::Note(self.note.recompute(note, &note_update(update), env)),
            CellState::Expression(expression) => CellState::Expression(self.expression.recompute(
                expression,
                &expression_update(update),
                env,
            )),
            CellState::Sheet(sheet) => {
                CellState::Sheet(self.sheet.recompute(sheet, &sheet_update(update), env))
            }
        }
    }

    fn result(&self, state: &CellState, env: &Env) -> Value {
        match state {
            CellState::Note(note) => self.note.result(note, env),
            CellState::Expression(expression) => self.expression.result(expression, env),
            CellState::Sheet(sheet) => self.sheet.result(sheet, env),
        }
    }

    fn from_json(&self, json: &Json, update: &Update<CellState>, env: &Env) -> CellState {
        match json.get("type").and_then(Json::as_str) {
            Some("note") => {
                let text = json.get("text").unwrap_or(&Json::Null);
                CellState::Note(self.note.from_json(text, &note_update(update), env))
            }
            Some("expression") => {
                let source = json.get("source").unwrap_or(&Json::Null);
                CellState::Expression(self.expression.from_json(source, &expression_update(update), env))
            }
            Some("sheet") => {
                let lines = json.get("lines").unwrap_or(&Json::Null);
                CellState::Sheet(self.sheet.from_json(lines, &sheet_update(update), env))
            }
            _ => {
                log::warn!("Unknown cell {json}, starting from an empty expression");
                self.init()
            }
        }
    }

    fn to_json(&self, state: &CellState) -> Json {
        match state {
            CellState::Note(note) => json!({ "type": "note", "text": self.note.to_json(note) }),
            CellState::Expression(expression) => {
                json!({ "type": "expression", "source": self.expression.to_json(expression) })
            }
            CellState::Sheet(sheet) => json!({ "type": "sheet", "lines": self.sheet.to_json(sheet) }),
        }
    }

    fn dependencies(&self, state: &CellState) -> Option<Rc<BTreeSet<String>>> {
        match state {
            CellState::Note(note) => self.note.dependencies(note),
            CellState::Expression(expression) => self.expression.dependencies(expression),
            CellState::Sheet(sheet) => self.sheet.dependencies(sheet),
        }
    }
}
