use cellflow::{
    Compiler, EntryId, Env, EventLoop, Library, Sheet, SheetEdit, SheetState, Store, Value,
    Visibility,
};
use pretty_assertions::assert_eq;
use std::rc::Rc;

fn sheet_store(early_stop: bool) -> (EventLoop, Store<Sheet>) {
    let event_loop = EventLoop::new();
    let library = Library::standard().with_timers(event_loop.timers());
    let sheet = Sheet::new(Rc::new(Compiler::new(library)), event_loop.spawner())
        .with_early_stop(early_stop);
    let store = Store::new(sheet, Env::new());
    (event_loop, store)
}

fn edit(store: &Store<Sheet>, edit: SheetEdit) {
    store.dispatch(store.block().action(edit));
}

fn add_line(store: &Store<Sheet>, name: &str, source: &str) -> EntryId {
    let id = store.with_state(SheetState::next_free_id);
    edit(store, SheetEdit::InsertLineEnd);
    if !name.is_empty() {
        edit(store, SheetEdit::SetName { id, name: name.to_owned() });
    }
    edit(store, SheetEdit::SetSource { id, source: source.to_owned() });
    id
}

fn results(store: &Store<Sheet>) -> Vec<String> {
    store.with_state(|state| {
        state
            .entries()
            .iter()
            .map(|entry| entry.result.to_string())
            .collect()
    })
}

#[test]
fn renaming_breaks_stale_references() {
    let (_event_loop, store) = sheet_store(false);
    let a = add_line(&store, "a", "2");
    add_line(&store, "b", "a * 3");
    assert_eq!(results(&store), ["2", "6"]);

    edit(&store, SheetEdit::SetName { id: a, name: "x".to_owned() });
    assert_eq!(results(&store), ["2", "ReferenceError: a is not defined"]);
}

#[test]
fn editing_shares_the_prefix() {
    let (_event_loop, store) = sheet_store(false);
    add_line(&store, "a", "1");
    let b = add_line(&store, "b", "a + 1");
    add_line(&store, "c", "b * 10");
    let before = store.state();

    edit(&store, SheetEdit::SetSource { id: b, source: "a + 2".to_owned() });
    let after = store.state();
    assert_eq!(results(&store), ["1", "3", "30"]);
    assert!(Rc::ptr_eq(&before.entries()[0], &after.entries()[0]));
    assert!(!Rc::ptr_eq(&before.entries()[1], &after.entries()[1]));
}

#[test]
fn unnamed_lines_and_before() {
    let (_event_loop, store) = sheet_store(false);
    add_line(&store, "", "1");
    add_line(&store, "", "2");
    add_line(&store, "", "$0 + $1");
    add_line(&store, "", "keys($before)");
    assert_eq!(results(&store), ["1", "2", "3", r#"["$0", "$1", "$2"]"#]);
}

#[test]
fn inserting_a_definition_before_its_reader() {
    let (_event_loop, store) = sheet_store(false);
    let b = add_line(&store, "b", "a + 1");
    assert_eq!(results(&store), ["ReferenceError: a is not defined"]);

    let a = store.with_state(SheetState::next_free_id);
    edit(&store, SheetEdit::InsertLineBefore { id: b });
    edit(&store, SheetEdit::SetName { id: a, name: "a".to_owned() });
    edit(&store, SheetEdit::SetSource { id: a, source: "5".to_owned() });
    assert_eq!(results(&store), ["5", "6"]);
}

#[test]
fn deleting_recomputes_readers() {
    let (_event_loop, store) = sheet_store(false);
    let first = add_line(&store, "a", "1");
    let second = add_line(&store, "a", "2");
    add_line(&store, "", "a * 100");
    assert_eq!(results(&store), ["1", "2", "200"]);

    edit(&store, SheetEdit::DeleteLines { ids: vec![second] });
    assert_eq!(results(&store), ["1", "100"]);
    edit(&store, SheetEdit::DeleteLines { ids: vec![first] });
    assert_eq!(results(&store), ["ReferenceError: a is not defined"]);
}

#[test]
fn ids_grow_monotonically() {
    let (_event_loop, store) = sheet_store(false);
    add_line(&store, "", "1");
    let last = add_line(&store, "", "2");
    edit(&store, SheetEdit::DeleteLines { ids: vec![last] });
    let next = add_line(&store, "", "3");
    assert_eq!(next, EntryId(2));
    assert_eq!(store.with_state(SheetState::next_free_id), EntryId(3));
}

#[test]
fn duplicate_copies_after_original() {
    let (_event_loop, store) = sheet_store(false);
    let a = add_line(&store, "a", "21");
    add_line(&store, "b", "a * 2");
    edit(&store, SheetEdit::SetVisibility { id: a, visibility: Visibility::Hidden });
    edit(&store, SheetEdit::DuplicateLine { id: a });

    store.with_state(|state| {
        let copy = &state.entries()[1];
        assert_eq!(copy.id, EntryId(2));
        assert_eq!(&*copy.name, "a");
        assert_eq!(copy.visibility, Visibility::Hidden);
        assert_eq!(copy.state.source(), "21");
    });
    assert_eq!(results(&store), ["21", "21", "42"]);
}

#[test]
fn unknown_ids_are_ignored() {
    let (_event_loop, store) = sheet_store(false);
    add_line(&store, "a", "1");
    let before = store.state();
    edit(&store, SheetEdit::SetSource { id: EntryId(99), source: "2".to_owned() });
    edit(&store, SheetEdit::DeleteLines { ids: vec![EntryId(99)] });
    let after = store.state();
    assert!(Rc::ptr_eq(&before.entries()[0], &after.entries()[0]));
}

#[test]
fn early_stop_matches_full_recompute() {
    let (_full_loop, full) = sheet_store(false);
    let (_stop_loop, stopping) = sheet_store(true);
    let edits = |store: &Store<Sheet>| {
        let a = add_line(store, "a", "1");
        add_line(store, "b", "a + 1");
        add_line(store, "c", "10");
        add_line(store, "", "$before.b + c");
        add_line(store, "d", "upper('x')");
        edit(store, SheetEdit::SetSource { id: a, source: "5".to_owned() });
        edit(store, SheetEdit::SetName { id: a, name: "z".to_owned() });
        edit(store, SheetEdit::SetName { id: a, name: "a".to_owned() });
    };
    edits(&full);
    edits(&stopping);
    assert_eq!(results(&full), results(&stopping));
    assert_eq!(results(&full), ["5", "6", "10", "16", "X"]);
}

#[test]
fn ambient_environment_feeds_every_line() {
    let (_event_loop, store) = sheet_store(false);
    add_line(&store, "", "rate * 2");
    assert_eq!(results(&store), ["ReferenceError: rate is not defined"]);

    store.set_env([("rate", Value::Number(4.0))].into_iter().collect());
    assert_eq!(results(&store), ["8"]);
}

#[test]
fn json_round_trip() {
    let (_event_loop, store) = sheet_store(false);
    let a = add_line(&store, "a", "'he' + 'llo'");
    add_line(&store, "", "upper(a)");
    edit(&store, SheetEdit::SetVisibility { id: a, visibility: Visibility::Result });
    let json = store.to_json();
    assert_eq!(
        json,
        serde_json::json!([
            { "id": 0, "name": "a", "state": "'he' + 'llo'", "visibility": "result" },
            { "id": 1, "name": "", "state": "upper(a)" },
        ])
    );

    let (_event_loop, restored) = sheet_store(false);
    let restored = Store::load(restored.block().clone(), &json, Env::new());
    assert_eq!(results(&restored), ["hello", "HELLO"]);
    assert_eq!(restored.to_json(), json);
    assert_eq!(restored.with_state(SheetState::next_free_id), EntryId(2));
}
