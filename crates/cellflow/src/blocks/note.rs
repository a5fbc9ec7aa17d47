use crate::block::{Block, Update};
use crate::compiler::Compiler;
use crate::env::Env;
use crate::value::Value;
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Prose with `{expression}` holes, rendered against the environment.
pub struct NoteBlock {
    compiler: Rc<Compiler>,
}

#[derive(Clone, Debug, Default)]
pub struct NoteState {
    text: Rc<str>,
    dependencies: Rc<BTreeSet<String>>,
    rendered: Value,
}

impl NoteState {
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Hole(&'a str),
}

/// Splits `text` at balanced `{…}` holes. An unclosed `{` is plain text.
fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut hole_start = None;
    let mut depth = 0usize;
    for (index, character) in text.char_indices() {
        match character {
            '{' => {
                if depth == 0 {
                    hole_start = Some(index);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                let start = match hole_start {
                    Some(start) if depth == 0 => start,
                    _ => continue,
                };
                hole_start = None;
                if text_start < start {
                    segments.push(Segment::Text(&text[text_start..start]));
                }
                segments.push(Segment::Hole(&text[start + 1..index]));
                text_start = index + 1;
            }
            _ => {}
        }
    }
    if text_start < text.len() {
        segments.push(Segment::Text(&text[text_start..]));
    }
    segments
}

impl NoteBlock {
    pub fn new(compiler: Rc<Compiler>) -> Self {
        Self { compiler }
    }

    pub fn set_text(&self, text: &str, env: &Env) -> NoteState {
        let mut dependencies = BTreeSet::new();
        let mut rendered = String::new();
        let mut pending = false;
        for segment in segments(text) {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Hole(source) => {
                    let unit = self.compiler.compile(source, env);
                    dependencies.extend(unit.free_variables().iter().cloned());
                    match unit.run(env) {
                        Value::Pending => pending = true,
                        value => rendered.push_str(&value.to_string()),
                    }
                }
            }
        }
        NoteState {
            text: text.into(),
            dependencies: Rc::new(dependencies),
            rendered: if pending {
                Value::Pending
            } else {
                Value::text(rendered)
            },
        }
    }
}

impl Block for NoteBlock {
    type State = NoteState;

    fn init(&self) -> NoteState {
        NoteState {
            rendered: Value::text(""),
            ..NoteState::default()
        }
    }

    fn recompute(&self, state: &NoteState, _update: &Update<NoteState>, env: &Env) -> NoteState {
        self.set_text(&state.text, env)
    }

    fn result(&self, state: &NoteState, _env: &Env) -> Value {
        state.rendered.clone()
    }

    fn from_json(&self, json: &Json, _update: &Update<NoteState>, env: &Env) -> NoteState {
        match json.as_str() {
            Some(text) => self.set_text(text, env),
            None => {
                log::warn!("Expected the text of a note, got {json}");
                self.init()
            }
        }
    }

    fn to_json(&self, state: &NoteState) -> Json {
        Json::String(state.text.to_string())
    }

    fn dependencies(&self, state: &NoteState) -> Option<Rc<BTreeSet<String>>> {
        Some(state.dependencies.clone())
    }
}
