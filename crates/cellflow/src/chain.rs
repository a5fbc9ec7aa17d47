//! Entry chain
//!
//! An ordered list of named entries, each wrapping the state of an inner
//! block. Every entry sees the ambient environment, the results of the
//! entries before it under their keys, and `$before`, a record of those
//! results. An edit recomputes the entries from the point of change onward;
//! everything before it is shared with the previous state.

use crate::block::{Action, Block, Update};
use crate::env::Env;
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// Name of the record of preceding results visible to every entry.
pub const BEFORE: &str = "$before";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u32);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Presentation hint, never affects computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Result,
    Hidden,
}

impl Visibility {
    pub fn is_visible(&self) -> bool {
        *self == Self::Visible
    }
}

#[derive(Clone)]
pub struct Entry<S> {
    pub id: EntryId,
    pub name: Rc<str>,
    pub visibility: Visibility,
    pub state: S,
    pub result: Value,
}

impl<S> Entry<S> {
    /// The name the entry's result is bound to: its name, or `$<id>` when unnamed.
    pub fn key(&self) -> Rc<str> {
        if self.name.is_empty() {
            format!("${}", self.id).into()
        } else {
            self.name.clone()
        }
    }
}

pub struct ChainState<S> {
    entries: Vec<Rc<Entry<S>>>,
    /// One past the highest id this chain has ever held.
    id_watermark: u32,
}

impl<S> Clone for ChainState<S> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            id_watermark: self.id_watermark,
        }
    }
}

impl<S> Default for ChainState<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            id_watermark: 0,
        }
    }
}

impl<S> ChainState<S> {
    pub fn entries(&self) -> &[Rc<Entry<S>>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }

    pub fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    pub fn entry(&self, id: EntryId) -> Option<&Rc<Entry<S>>> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn result(&self, id: EntryId) -> Option<&Value> {
        self.entry(id).map(|entry| &entry.result)
    }

    /// Result of the last entry, `undefined` for an empty chain.
    pub fn last_result(&self) -> Value {
        self.entries
            .last()
            .map(|entry| entry.result.clone())
            .unwrap_or_default()
    }

    /// The id the next inserted entry gets. Ids are never reused, not even
    /// after the entry holding the highest one was deleted.
    pub fn next_free_id(&self) -> EntryId {
        let after_max = self
            .entries
            .iter()
            .map(|entry| entry.id.0.saturating_add(1))
            .max()
            .unwrap_or(0);
        EntryId(after_max.max(self.id_watermark))
    }
}

type State<B> = ChainState<<B as Block>::State>;

/// What happens to the first entry of a recomputed suffix.
enum Step<S> {
    Apply(Action<S>),
    Recompute,
    Load(Json),
}

/// Keys whose value may differ from the previous walk.
enum Changed {
    All,
    Names(BTreeSet<Rc<str>>),
}

impl Changed {
    fn insert(&mut self, key: Rc<str>) {
        if let Self::Names(names) = self {
            names.insert(key);
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Names(names) if names.is_empty())
    }

    fn affects(&self, dependencies: &BTreeSet<String>) -> bool {
        match self {
            Self::All => true,
            Self::Names(names) => {
                !names.is_empty()
                    && dependencies
                        .iter()
                        .any(|name| name == BEFORE || names.contains(name.as_str()))
            }
        }
    }
}

pub struct Chain<B: Block> {
    inner: Rc<B>,
    early_stop: bool,
}

impl<B: Block> Clone for Chain<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            early_stop: self.early_stop,
        }
    }
}

impl<B: Block> Chain<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner: Rc::new(inner),
            early_stop: false,
        }
    }

    /// Skips entries whose dependencies did not change and stops the walk
    /// once nothing changes anymore. Results are the same as without it.
    pub fn with_early_stop(mut self, early_stop: bool) -> Self {
        self.early_stop = early_stop;
        self
    }

    pub fn inner(&self) -> &Rc<B> {
        &self.inner
    }

    /// The dispatch handle of one entry. Its actions end up in `update_entry`.
    pub fn entry_update(&self, update: &Update<State<B>>, id: EntryId) -> Update<B::State> {
        let chain = self.clone();
        update.focus(move |action: Action<B::State>| -> Action<State<B>> {
            let chain = chain.clone();
            Box::new(move |state, env, update| chain.update_entry(&state, update, env, id, action))
        })
    }

    /// The environment the entry `id` is computed in.
    pub fn entry_env(&self, state: &State<B>, outer: &Env, id: EntryId) -> Option<Env> {
        let index = state.position(id)?;
        let siblings: Record = state.entries[..index]
            .iter()
            .map(|entry| (entry.key(), entry.result.clone()))
            .collect();
        Some(local_env(outer, &siblings))
    }

    /// Applies `action` to the entry's state and recomputes from there.
    pub fn update_entry(
        &self,
        state: &State<B>,
        update: &Update<State<B>>,
        env: &Env,
        id: EntryId,
        action: Action<B::State>,
    ) -> State<B> {
        let Some(index) = state.position(id) else {
            log::debug!("Ignoring an action for missing entry {id}");
            return state.clone();
        };
        self.recompute_suffix(
            state.entries.clone(),
            state.id_watermark,
            update,
            env,
            index,
            Some(Step::Apply(action)),
            Changed::Names(BTreeSet::new()),
        )
    }

    pub fn insert_before(
        &self,
        state: &State<B>,
        update: &Update<State<B>>,
        env: &Env,
        id: EntryId,
    ) -> State<B> {
        let Some(index) = state.position(id) else {
            log::debug!("Cannot insert before missing entry {id}");
            return state.clone();
        };
        self.insert_at(state, update, env, index, "".into(), Visibility::Visible, Step::Recompute)
    }

    pub fn insert_after(
        &self,
        state: &State<B>,
        update: &Update<State<B>>,
        env: &Env,
        id: EntryId,
    ) -> State<B> {
        let Some(index) = state.position(id) else {
            log::debug!("Cannot insert after missing entry {id}");
            return state.clone();
        };
        self.insert_at(state, update, env, index + 1, "".into(), Visibility::Visible, Step::Recompute)
    }

    pub fn insert_end(&self, state: &State<B>, update: &Update<State<B>>, env: &Env) -> State<B> {
        self.insert_at(
            state,
            update,
            env,
            state.len(),
            "".into(),
            Visibility::Visible,
            Step::Recompute,
        )
    }

    /// Copies the entry right after itself, with the same name and visibility.
    /// The copy's state goes through a JSON round trip.
    pub fn duplicate_entry(
        &self,
        state: &State<B>,
        update: &Update<State<B>>,
        env: &Env,
        id: EntryId,
    ) -> State<B> {
        let Some(index) = state.position(id) else {
            log::debug!("Cannot duplicate missing entry {id}");
            return state.clone();
        };
        let original = &state.entries[index];
        let json = self.inner.to_json(&original.state);
        self.insert_at(
            state,
            update,
            env,
            index + 1,
            original.name.clone(),
            original.visibility,
            Step::Load(json),
        )
    }

    pub fn delete_entries(
        &self,
        state: &State<B>,
        update: &Update<State<B>>,
        env: &Env,
        ids: &[EntryId],
    ) -> State<B> {
        let mut start = None;
        let mut removed = BTreeSet::new();
        let mut entries = Vec::with_capacity(state.len());
        for (index, entry) in state.entries.iter().enumerate() {
            if ids.contains(&entry.id) {
                start.get_or_insert(index);
                removed.insert(entry.key());
            } else {
                entries.push(entry.clone());
            }
        }
        let Some(start) = start else {
            log::debug!("Nothing to delete for entries {ids:?}");
            return state.clone();
        };
        self.recompute_suffix(
            entries,
            state.id_watermark,
            update,
            env,
            start,
            None,
            Changed::Names(removed),
        )
    }

    /// Renames an entry. The entries after it see the old key disappear and
    /// the new one appear.
    pub fn set_name(
        &self,
        state: &State<B>,
        update: &Update<State<B>>,
        env: &Env,
        id: EntryId,
        name: &str,
    ) -> State<B> {
        let Some(index) = state.position(id) else {
            log::debug!("Cannot rename missing entry {id}");
            return state.clone();
        };
        let entry = &state.entries[index];
        if &*entry.name == name {
            return state.clone();
        }
        let renamed = Entry {
            name: name.into(),
            ..(**entry).clone()
        };
        let changed = BTreeSet::from([entry.key(), renamed.key()]);
        let mut entries = state.entries.clone();
        entries[index] = Rc::new(renamed);
        self.recompute_suffix(
            entries,
            state.id_watermark,
            update,
            env,
            index + 1,
            None,
            Changed::Names(changed),
        )
    }

    pub fn set_visibility(&self, state: &State<B>, id: EntryId, visibility: Visibility) -> State<B> {
        let Some(index) = state.position(id) else {
            log::debug!("Cannot change visibility of missing entry {id}");
            return state.clone();
        };
        let mut entries = state.entries.clone();
        entries[index] = Rc::new(Entry {
            visibility,
            ..(*state.entries[index]).clone()
        });
        ChainState {
            entries,
            id_watermark: state.id_watermark,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_at(
        &self,
        state: &State<B>,
        update: &Update<State<B>>,
        env: &Env,
        index: usize,
        name: Rc<str>,
        visibility: Visibility,
        step: Step<B::State>,
    ) -> State<B> {
        let id = state.next_free_id();
        let entry = Entry {
            id,
            name,
            visibility,
            state: self.inner.init(),
            result: Value::Undefined,
        };
        let changed = BTreeSet::from([entry.key()]);
        let mut entries = state.entries.clone();
        entries.insert(index, Rc::new(entry));
        self.recompute_suffix(
            entries,
            id.0.saturating_add(1),
            update,
            env,
            index,
            Some(step),
            Changed::Names(changed),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn recompute_suffix(
        &self,
        mut entries: Vec<Rc<Entry<B::State>>>,
        id_watermark: u32,
        update: &Update<State<B>>,
        outer: &Env,
        start: usize,
        mut trigger: Option<Step<B::State>>,
        mut changed: Changed,
    ) -> State<B> {
        let suffix = entries.split_off(start.min(entries.len()));
        let mut siblings: Record = entries
            .iter()
            .map(|entry| (entry.key(), entry.result.clone()))
            .collect();
        let mut suffix = suffix.into_iter();

        while let Some(entry) = suffix.next() {
            let step = trigger.take();
            if step.is_none() && self.early_stop {
                if changed.is_empty() {
                    entries.push(entry);
                    entries.extend(suffix);
                    break;
                }
                let affected = self
                    .inner
                    .dependencies(&entry.state)
                    .is_none_or(|dependencies| changed.affects(&dependencies));
                if !affected {
                    siblings.insert(entry.key(), entry.result.clone());
                    entries.push(entry);
                    continue;
                }
            }

            let key = entry.key();
            let recomputed = self.compute(&entry, step.unwrap_or(Step::Recompute), &siblings, outer, update);
            log::trace!("Recomputed entry {} ({key})", entry.id);
            if !recomputed.result.same(&entry.result) {
                changed.insert(key.clone());
            }
            siblings.insert(key, recomputed.result.clone());
            entries.push(Rc::new(recomputed));
        }

        ChainState {
            entries,
            id_watermark,
        }
    }

    fn compute(
        &self,
        entry: &Entry<B::State>,
        step: Step<B::State>,
        siblings: &Record,
        outer: &Env,
        update: &Update<State<B>>,
    ) -> Entry<B::State> {
        let env = local_env(outer, siblings);
        let entry_update = self.entry_update(update, entry.id);
        let state = match step {
            Step::Apply(action) => action(entry.state.clone(), &env, &entry_update),
            Step::Recompute => self.inner.recompute(&entry.state, &entry_update, &env),
            Step::Load(json) => self.inner.from_json(&json, &entry_update, &env),
        };
        let result = self.inner.result(&state, &env);
        Entry {
            id: entry.id,
            name: entry.name.clone(),
            visibility: entry.visibility,
            state,
            result,
        }
    }
}

fn local_env(outer: &Env, siblings: &Record) -> Env {
    let before = Value::Record(Rc::new(siblings.clone()));
    outer.extend(
        siblings
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .chain([(Rc::from(BEFORE), before)]),
    )
}

/// One element of the serialized entry array, read leniently.
#[derive(Deserialize)]
struct SerializedEntry {
    #[serde(default)]
    id: Json,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Json,
    #[serde(default)]
    visibility: Json,
}

impl<B: Block> Block for Chain<B> {
    type State = ChainState<B::State>;

    fn init(&self) -> Self::State {
        ChainState::default()
    }

    fn recompute(&self, state: &Self::State, update: &Update<Self::State>, env: &Env) -> Self::State {
        self.recompute_suffix(
            state.entries.clone(),
            state.id_watermark,
            update,
            env,
            0,
            None,
            Changed::All,
        )
    }

    fn result(&self, state: &Self::State, _env: &Env) -> Value {
        state.last_result()
    }

    fn from_json(&self, json: &Json, update: &Update<Self::State>, env: &Env) -> Self::State {
        let Some(items) = json.as_array() else {
            if !json.is_null() {
                log::warn!("Expected an array of entries, loading an empty chain");
            }
            return self.init();
        };

        let serialized: Vec<SerializedEntry> = items
            .iter()
            .filter_map(|item| match SerializedEntry::deserialize(item) {
                Ok(entry) => Some(entry),
                Err(error) => {
                    log::warn!("Skipping malformed entry {item}: {error}");
                    None
                }
            })
            .collect();

        let requested_ids: Vec<Option<u32>> = serialized
            .iter()
            .map(|entry| entry.id.as_u64().and_then(|id| u32::try_from(id).ok()))
            .collect();
        let mut next_id = requested_ids
            .iter()
            .flatten()
            .map(|id| id.saturating_add(1))
            .max()
            .unwrap_or(0);

        let mut seen = BTreeSet::new();
        let mut siblings = Record::new();
        let mut entries = Vec::with_capacity(serialized.len());
        for (serialized, requested_id) in serialized.into_iter().zip(requested_ids) {
            let id = match requested_id {
                Some(id) if seen.insert(id) => EntryId(id),
                _ => {
                    let id = EntryId(next_id);
                    log::debug!("Assigning fresh id {id} to a loaded entry");
                    next_id = next_id.saturating_add(1);
                    seen.insert(id.0);
                    id
                }
            };
            let visibility = match serialized.visibility {
                Json::Null => Visibility::Visible,
                visibility => Visibility::deserialize(&visibility).unwrap_or_else(|error| {
                    log::warn!("Ignoring visibility of entry {id}: {error}");
                    Visibility::Visible
                }),
            };
            let placeholder = Entry {
                id,
                name: serialized.name.unwrap_or_default().into(),
                visibility,
                state: self.inner.init(),
                result: Value::Undefined,
            };
            let entry = self.compute(&placeholder, Step::Load(serialized.state), &siblings, env, update);
            siblings.insert(entry.key(), entry.result.clone());
            entries.push(Rc::new(entry));
        }

        ChainState {
            entries,
            id_watermark: next_id,
        }
    }

    fn to_json(&self, state: &Self::State) -> Json {
        Json::Array(
            state
                .entries
                .iter()
                .map(|entry| {
                    let mut json = json!({
                        "id": entry.id,
                        "name": &*entry.name,
                        "state": self.inner.to_json(&entry.state),
                    });
                    if !entry.visibility.is_visible() {
                        json["visibility"] = json!(entry.visibility);
                    }
                    json
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Adds a constant to the value of one name in the environment.
    struct Offset {
        recomputes: Rc<Cell<usize>>,
    }

    #[derive(Clone)]
    struct OffsetState {
        name: Option<&'static str>,
        offset: f64,
        value: Value,
    }

    impl Offset {
        fn new() -> (Self, Rc<Cell<usize>>) {
            let recomputes = Rc::new(Cell::new(0));
            (
                Self {
                    recomputes: recomputes.clone(),
                },
                recomputes,
            )
        }

        fn evaluate(&self, name: Option<&'static str>, offset: f64, env: &Env) -> OffsetState {
            self.recomputes.set(self.recomputes.get() + 1);
            let base = match name {
                Some(name) => env.get(name).and_then(Value::as_number).unwrap_or(f64::NAN),
                None => 0.0,
            };
            OffsetState {
                name,
                offset,
                value: Value::Number(base + offset),
            }
        }
    }

    impl Block for Offset {
        type State = OffsetState;

        fn init(&self) -> OffsetState {
            OffsetState {
                name: None,
                offset: 0.0,
                value: Value::Number(0.0),
            }
        }

        fn recompute(&self, state: &OffsetState, _: &Update<OffsetState>, env: &Env) -> OffsetState {
            self.evaluate(state.name, state.offset, env)
        }

        fn result(&self, state: &OffsetState, _: &Env) -> Value {
            state.value.clone()
        }

        fn from_json(&self, json: &Json, _: &Update<OffsetState>, env: &Env) -> OffsetState {
            self.evaluate(None, json.as_f64().unwrap_or_default(), env)
        }

        fn to_json(&self, state: &OffsetState) -> Json {
            json!(state.offset)
        }

        fn dependencies(&self, state: &OffsetState) -> Option<Rc<BTreeSet<String>>> {
            Some(Rc::new(state.name.map(str::to_owned).into_iter().collect()))
        }
    }

    fn set(name: Option<&'static str>, offset: f64) -> Action<OffsetState> {
        Box::new(move |_, env, _| {
            let base = match name {
                Some(name) => env.get(name).and_then(Value::as_number).unwrap_or(f64::NAN),
                None => 0.0,
            };
            OffsetState {
                name,
                offset,
                value: Value::Number(base + offset),
            }
        })
    }

    fn numbers(state: &ChainState<OffsetState>) -> Vec<f64> {
        state
            .entries()
            .iter()
            .map(|entry| entry.result.as_number().unwrap_or(f64::NAN))
            .collect()
    }

    /// a = 1, b = a + 1, c = 10
    fn three_entries(chain: &Chain<Offset>) -> ChainState<OffsetState> {
        let update = Update::detached();
        let env = Env::new();
        let mut state = chain.init();
        for _ in 0..3 {
            state = chain.insert_end(&state, &update, &env);
        }
        state = chain.set_name(&state, &update, &env, EntryId(0), "a");
        state = chain.update_entry(&state, &update, &env, EntryId(0), set(None, 1.0));
        state = chain.update_entry(&state, &update, &env, EntryId(1), set(Some("a"), 1.0));
        chain.update_entry(&state, &update, &env, EntryId(2), set(None, 10.0))
    }

    #[test]
    fn test_suffix_recompute_shares_prefix() {
        let (block, _) = Offset::new();
        let chain = Chain::new(block);
        let state = three_entries(&chain);
        assert_eq!(numbers(&state), [1.0, 2.0, 10.0]);

        let next = chain.update_entry(&state, &Update::detached(), &Env::new(), EntryId(1), set(Some("a"), 5.0));
        assert_eq!(numbers(&next), [1.0, 6.0, 10.0]);
        assert!(Rc::ptr_eq(&state.entries()[0], &next.entries()[0]));
        assert!(!Rc::ptr_eq(&state.entries()[2], &next.entries()[2]));
    }

    #[test]
    fn test_unnamed_entries_use_dollar_id() {
        let (block, _) = Offset::new();
        let chain = Chain::new(block);
        let update = Update::detached();
        let state = chain.insert_end(&chain.init(), &update, &Env::new());
        assert_eq!(&*state.entries()[0].key(), "$0");

        let env = chain.entry_env(&state, &Env::new(), EntryId(0)).unwrap();
        assert!(env.get(BEFORE).is_some());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let (block, _) = Offset::new();
        let chain = Chain::new(block);
        let update = Update::detached();
        let env = Env::new();
        let state = three_entries(&chain);
        assert_eq!(state.next_free_id(), EntryId(3));

        let state = chain.delete_entries(&state, &update, &env, &[EntryId(2)]);
        assert_eq!(state.next_free_id(), EntryId(3));
        let state = chain.insert_end(&state, &update, &env);
        assert_eq!(state.ids().collect::<Vec<_>>(), [EntryId(0), EntryId(1), EntryId(3)]);
    }

    #[test]
    fn test_rename_recomputes_dependents() {
        let (block, _) = Offset::new();
        let chain = Chain::new(block);
        let state = three_entries(&chain);
        let state = chain.set_name(&state, &Update::detached(), &Env::new(), EntryId(0), "x");
        assert!(numbers(&state)[1].is_nan());
    }

    #[test]
    fn test_early_stop_skips_independent_entries() {
        let (block, recomputes) = Offset::new();
        let chain = Chain::new(block).with_early_stop(true);
        let state = three_entries(&chain);

        recomputes.set(0);
        let next = chain.update_entry(&state, &Update::detached(), &Env::new(), EntryId(0), set(None, 4.0));
        assert_eq!(numbers(&next), [4.0, 5.0, 10.0]);
        // `c` does not read `a`
        assert_eq!(recomputes.get(), 1);
        assert!(Rc::ptr_eq(&state.entries()[2], &next.entries()[2]));
    }

    #[test]
    fn test_missing_id_is_noop() {
        let (block, _) = Offset::new();
        let chain = Chain::new(block);
        let state = three_entries(&chain);
        let next = chain.set_name(&state, &Update::detached(), &Env::new(), EntryId(42), "z");
        assert!(state.entries().iter().zip(next.entries()).all(|(a, b)| Rc::ptr_eq(a, b)));
    }

    #[test]
    fn test_json_reassigns_duplicate_ids() {
        let (block, _) = Offset::new();
        let chain = Chain::new(block);
        let json = json!([
            { "id": 4, "name": "a", "state": 1.0 },
            { "id": 4, "name": "", "state": 2.0, "visibility": "hidden" },
            { "name": "c", "state": 3.0 },
            "garbage",
        ]);
        let state = chain.from_json(&json, &Update::detached(), &Env::new());
        assert_eq!(state.ids().collect::<Vec<_>>(), [EntryId(4), EntryId(5), EntryId(6)]);
        assert_eq!(state.entries()[1].visibility, Visibility::Hidden);
        assert_eq!(state.next_free_id(), EntryId(7));

        let saved = chain.to_json(&state);
        assert_eq!(saved[1]["visibility"], json!("hidden"));
        assert!(saved[0].get("visibility").is_none());
    }

    #[test]
    fn test_non_array_loads_empty() {
        let (block, _) = Offset::new();
        let chain = Chain::new(block);
        let state = chain.from_json(&json!({ "entries": [] }), &Update::detached(), &Env::new());
        assert!(state.is_empty());
        assert_eq!(chain.result(&state, &Env::new()), Value::Undefined);
    }
}
