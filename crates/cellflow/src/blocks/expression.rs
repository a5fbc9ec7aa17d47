use crate::block::{Block, Update};
use crate::compiler::{CompiledUnit, Compiler};
use crate::env::Env;
use crate::result::CellResult;
use crate::value::Value;
use futures::executor::LocalSpawner;
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::rc::Rc;

/// A single line of source code evaluated against its environment.
pub struct ExpressionBlock {
    compiler: Rc<Compiler>,
    spawner: LocalSpawner,
}

#[derive(Clone, Debug, Default)]
pub struct ExpressionState {
    source: Rc<str>,
    unit: Option<Rc<CompiledUnit>>,
    /// Values of the used names the current result was computed from.
    inputs: Rc<[Value]>,
    result: CellResult,
}

impl ExpressionState {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn unit(&self) -> Option<&Rc<CompiledUnit>> {
        self.unit.as_ref()
    }

    pub fn result(&self) -> &CellResult {
        &self.result
    }
}

impl ExpressionBlock {
    pub fn new(compiler: Rc<Compiler>, spawner: LocalSpawner) -> Self {
        Self { compiler, spawner }
    }

    pub fn compiler(&self) -> &Rc<Compiler> {
        &self.compiler
    }

    pub fn set_source(
        &self,
        state: &ExpressionState,
        update: &Update<ExpressionState>,
        env: &Env,
        source: &str,
    ) -> ExpressionState {
        if *state.source == *source {
            return self.evaluate(state, update, env);
        }
        state.result.cancel();
        let state = ExpressionState {
            source: source.into(),
            ..ExpressionState::default()
        };
        self.evaluate(&state, update, env)
    }

    fn evaluate(
        &self,
        state: &ExpressionState,
        update: &Update<ExpressionState>,
        env: &Env,
    ) -> ExpressionState {
        let unit = self.compiler.compile(&state.source, env);
        let inputs: Rc<[Value]> = unit
            .used_names()
            .iter()
            .map(|name| env.get(name).cloned().unwrap_or_default())
            .collect();

        // Same program over the same inputs keeps its result, pending ones included
        let unchanged = state
            .unit
            .as_ref()
            .is_some_and(|previous| Rc::ptr_eq(previous, &unit))
            && state.inputs.len() == inputs.len()
            && state.inputs.iter().zip(inputs.iter()).all(|(a, b)| a.same(b));
        if unchanged {
            return state.clone();
        }

        state.result.cancel();
        let settle = update.clone();
        let result = CellResult::from_value(unit.run(env), &self.spawner, move |settled| {
            settle.dispatch(Box::new(move |state: ExpressionState, _, _| ExpressionState {
                result: settled,
                ..state
            }));
        });
        ExpressionState {
            source: state.source.clone(),
            unit: Some(unit),
            inputs,
            result,
        }
    }
}

impl Block for ExpressionBlock {
    type State = ExpressionState;

    fn init(&self) -> ExpressionState {
        ExpressionState::default()
    }

    fn recompute(&self, state: &ExpressionState, update: &Update<ExpressionState>, env: &Env) -> ExpressionState {
        self.evaluate(state, update, env)
    }

    fn result(&self, state: &ExpressionState, _env: &Env) -> Value {
        state.result.value()
    }

    fn from_json(&self, json: &Json, update: &Update<ExpressionState>, env: &Env) -> ExpressionState {
        match json {
            Json::String(source) => self.set_source(&self.init(), update, env, source),
            Json::Null => self.init(),
            other => {
                log::warn!("Expected the source of a line, got {other}");
                self.init()
            }
        }
    }

    fn to_json(&self, state: &ExpressionState) -> Json {
        Json::String(state.source.to_string())
    }

    fn dependencies(&self, state: &ExpressionState) -> Option<Rc<BTreeSet<String>>> {
        Some(
            state
                .unit
                .as_ref()
                .map(|unit| unit.free_variables().clone())
                .unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EventLoop;

    #[test]
    fn same_inputs_keep_the_result() {
        let event_loop = EventLoop::new();
        let block = ExpressionBlock::new(Rc::new(Compiler::default()), event_loop.spawner());
        let update = Update::detached();
        let env: Env = [("a", Value::Number(2.0))].into_iter().collect();

        let state = block.set_source(&block.init(), &update, &env, "a * 3");
        assert_eq!(block.result(&state, &env), Value::Number(6.0));

        let same = block.recompute(&state, &update, &env.with("b", Value::Null));
        assert!(Rc::ptr_eq(&state.inputs, &same.inputs));

        let changed = block.recompute(&state, &update, &env.with("a", Value::Number(3.0)));
        assert_eq!(block.result(&changed, &env), Value::Number(9.0));
    }

    #[test]
    fn malformed_json_falls_back_to_init() {
        let event_loop = EventLoop::new();
        let block = ExpressionBlock::new(Rc::new(Compiler::default()), event_loop.spawner());
        let state = block.from_json(&serde_json::json!(42), &Update::detached(), &Env::new());
        assert_eq!(state.source(), "");
        assert_eq!(block.result(&state, &Env::new()), Value::Undefined);
    }
}
