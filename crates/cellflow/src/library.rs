//! Symbol table of built-in names handed to the compiler.
//!
//! Names in the library resolve at compile time and are not dependencies of a
//! cell. A name present in the environment always wins over the library.

use crate::error::{EvalError, EvalResult};
use crate::evaluator::call_function;
use crate::promise::Promise;
use crate::runtime::Timers;
use crate::value::{Arguments, Value};
use indexmap::IndexMap;
use smallvec::smallvec;
use std::rc::Rc;

#[derive(Clone, Default)]
pub struct Library {
    symbols: IndexMap<Rc<str>, Value>,
}

impl Library {
    /// An empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut library = Self::new();
        library.define("PI", Value::Number(std::f64::consts::PI));

        library.define_function("abs", |arguments| number_function("abs", &arguments, f64::abs));
        library.define_function("floor", |arguments| {
            number_function("floor", &arguments, f64::floor)
        });
        library.define_function("ceil", |arguments| number_function("ceil", &arguments, f64::ceil));
        library.define_function("round", |arguments| {
            number_function("round", &arguments, f64::round)
        });
        library.define_function("sqrt", |arguments| number_function("sqrt", &arguments, f64::sqrt));

        library.define_function("min", |arguments| {
            Ok(Value::Number(
                numbers("min", &arguments)?.into_iter().fold(f64::INFINITY, f64::min),
            ))
        });
        library.define_function("max", |arguments| {
            Ok(Value::Number(
                numbers("max", &arguments)?.into_iter().fold(f64::NEG_INFINITY, f64::max),
            ))
        });
        library.define_function("sum", |arguments| {
            Ok(Value::Number(numbers("sum", &arguments)?.into_iter().sum()))
        });

        library.define_function("len", |arguments| match argument(&arguments, 0)? {
            Value::List(items) => Ok(Value::Number(items.len() as f64)),
            Value::Text(text) => Ok(Value::Number(text.chars().count() as f64)),
            Value::Record(fields) => Ok(Value::Number(fields.len() as f64)),
            other => Err(expected("len", "a list, text or record", &other)),
        });

        library.define_function("range", |arguments| {
            let (start, end) = match arguments.len() {
                0 | 1 => (0.0, number_argument("range", &arguments, 0)?),
                _ => (
                    number_argument("range", &arguments, 0)?,
                    number_argument("range", &arguments, 1)?,
                ),
            };
            let mut items = Vec::new();
            let mut current = start;
            while current < end {
                items.push(Value::Number(current));
                current += 1.0;
            }
            Ok(Value::list(items))
        });

        library.define_function("map", |arguments| {
            let items = list_argument("map", &arguments, 0)?;
            let function = argument(&arguments, 1)?;
            let mapped = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    call_function(&function, smallvec![item.clone(), Value::Number(index as f64)])
                })
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::list(mapped))
        });

        library.define_function("filter", |arguments| {
            let items = list_argument("filter", &arguments, 0)?;
            let function = argument(&arguments, 1)?;
            let mut kept = Vec::new();
            for (index, item) in items.iter().enumerate() {
                let keep = call_function(
                    &function,
                    smallvec![item.clone(), Value::Number(index as f64)],
                )?;
                if keep.is_truthy() {
                    kept.push(item.clone());
                }
            }
            Ok(Value::list(kept))
        });

        library.define_function("reduce", |arguments| {
            let items = list_argument("reduce", &arguments, 0)?;
            let function = argument(&arguments, 1)?;
            let mut accumulator = argument(&arguments, 2)?;
            for item in items.iter() {
                accumulator = call_function(&function, smallvec![accumulator, item.clone()])?;
            }
            Ok(accumulator)
        });

        library.define_function("keys", |arguments| match argument(&arguments, 0)? {
            Value::Record(fields) => Ok(Value::list(
                fields.keys().map(|key| Value::Text(key.clone())),
            )),
            other => Err(expected("keys", "a record", &other)),
        });
        library.define_function("values", |arguments| match argument(&arguments, 0)? {
            Value::Record(fields) => Ok(Value::list(fields.values().cloned())),
            other => Err(expected("values", "a record", &other)),
        });

        library.define_function("str", |arguments| {
            Ok(Value::text(argument(&arguments, 0)?.to_string()))
        });
        library.define_function("num", |arguments| {
            Ok(Value::Number(match argument(&arguments, 0)? {
                Value::Number(number) => number,
                Value::Bool(value) => f64::from(u8::from(value)),
                Value::Text(text) if text.trim().is_empty() => 0.0,
                Value::Text(text) => text.trim().parse().unwrap_or(f64::NAN),
                Value::Null => 0.0,
                _ => f64::NAN,
            }))
        });
        library.define_function("upper", |arguments| {
            Ok(Value::text(text_argument("upper", &arguments, 0)?.to_uppercase()))
        });
        library.define_function("lower", |arguments| {
            Ok(Value::text(text_argument("lower", &arguments, 0)?.to_lowercase()))
        });
        library.define_function("join", |arguments| {
            let items = list_argument("join", &arguments, 0)?;
            let separator = match arguments.get(1) {
                Some(Value::Text(separator)) => separator.clone(),
                _ => Rc::from(","),
            };
            let parts: Vec<String> = items.iter().map(Value::to_string).collect();
            Ok(Value::text(parts.join(&separator)))
        });
        library.define_function("split", |arguments| {
            let text = text_argument("split", &arguments, 0)?;
            let separator = text_argument("split", &arguments, 1)?;
            Ok(Value::list(
                text.split(&*separator).map(Value::text),
            ))
        });

        library.define_function("error", |arguments| {
            Err(EvalError::Raised(argument(&arguments, 0)?.to_string()))
        });
        library.define_function("resolve", |arguments| {
            Ok(Value::Promise(Promise::resolved(argument(&arguments, 0)?)))
        });
        library.define_function("reject", |arguments| {
            let message = argument(&arguments, 0)?.to_string();
            Ok(Value::Promise(Promise::rejected(EvalError::Raised(message))))
        });
        library
    }

    /// Adds `delay(ms, value)`, a promise that settles with `value` once the
    /// virtual clock has advanced by `ms`.
    pub fn with_timers(mut self, timers: Timers) -> Self {
        self.define_function("delay", move |arguments| {
            let delay_ms = number_argument("delay", &arguments, 0)?;
            let value = arguments.get(1).cloned().unwrap_or_default();
            let sleep = timers.sleep(delay_ms.max(0.0) as u64);
            Ok(Value::Promise(Promise::new(async move {
                sleep.await;
                Ok(value)
            })))
        });
        self
    }

    pub fn define(&mut self, name: impl Into<Rc<str>>, value: Value) {
        self.symbols.insert(name.into(), value);
    }

    pub fn define_function(
        &mut self,
        name: &str,
        function: impl Fn(Arguments) -> EvalResult<Value> + 'static,
    ) {
        self.define(name, Value::native(name, function));
    }

    pub fn with(mut self, name: impl Into<Rc<str>>, value: Value) -> Self {
        self.define(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.symbols.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(|name| &**name)
    }
}

fn argument(arguments: &Arguments, index: usize) -> EvalResult<Value> {
    match arguments.get(index) {
        Some(Value::Error(error)) => Err((**error).clone()),
        Some(value) => Ok(value.clone()),
        None => Ok(Value::Undefined),
    }
}

fn expected(function: &str, what: &str, found: &Value) -> EvalError {
    EvalError::type_error(format!(
        "{function}() expects {what}, got {}",
        found.type_name()
    ))
}

fn number_argument(function: &str, arguments: &Arguments, index: usize) -> EvalResult<f64> {
    match argument(arguments, index)? {
        Value::Number(number) => Ok(number),
        other => Err(expected(function, "a number", &other)),
    }
}

fn text_argument(function: &str, arguments: &Arguments, index: usize) -> EvalResult<Rc<str>> {
    match argument(arguments, index)? {
        Value::Text(text) => Ok(text),
        other => Err(expected(function, "text", &other)),
    }
}

fn list_argument(function: &str, arguments: &Arguments, index: usize) -> EvalResult<Rc<Vec<Value>>> {
    match argument(arguments, index)? {
        Value::List(items) => Ok(items),
        other => Err(expected(function, "a list", &other)),
    }
}

fn number_function(function: &str, arguments: &Arguments, apply: fn(f64) -> f64) -> EvalResult<Value> {
    Ok(Value::Number(apply(number_argument(function, arguments, 0)?)))
}

/// Numbers given either as separate arguments or as a single list.
fn numbers(function: &str, arguments: &Arguments) -> EvalResult<Vec<f64>> {
    let values: Vec<Value> = match arguments.as_slice() {
        [Value::List(items)] => items.as_ref().clone(),
        values => values.to_vec(),
    };
    values
        .iter()
        .map(|value| match value {
            Value::Number(number) => Ok(*number),
            Value::Error(error) => Err((**error).clone()),
            other => Err(expected(function, "numbers", other)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(library: &Library, name: &str, arguments: Vec<Value>) -> EvalResult<Value> {
        call_function(library.get(name).unwrap(), arguments.into_iter().collect())
    }

    #[test]
    fn aggregates_accept_list_or_arguments() {
        let library = Library::standard();
        let list = Value::list([Value::Number(1.0), Value::Number(5.0), Value::Number(3.0)]);
        assert_eq!(call(&library, "sum", vec![list.clone()]).unwrap(), Value::Number(9.0));
        assert_eq!(
            call(&library, "max", vec![Value::Number(2.0), Value::Number(7.0)]).unwrap(),
            Value::Number(7.0)
        );
        assert_eq!(call(&library, "min", vec![list]).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn map_calls_back_with_index() {
        let library = Library::standard();
        let add_index = Value::native("add_index", |arguments| {
            let item = arguments[0].as_number().unwrap_or_default();
            let index = arguments[1].as_number().unwrap_or_default();
            Ok(Value::Number(item + index))
        });
        let list = Value::list([Value::Number(10.0), Value::Number(10.0)]);
        assert_eq!(
            call(&library, "map", vec![list, add_index]).unwrap(),
            Value::list([Value::Number(10.0), Value::Number(11.0)])
        );
    }

    #[test]
    fn error_raises() {
        let library = Library::standard();
        let error = call(&library, "error", vec![Value::from("nope")]).unwrap_err();
        assert_eq!(error.to_string(), "Error: nope");
    }

    #[test]
    fn num_parses_text() {
        let library = Library::standard();
        assert_eq!(call(&library, "num", vec![Value::from(" 42 ")]).unwrap(), Value::Number(42.0));
        assert!(
            call(&library, "num", vec![Value::from("x")])
                .unwrap()
                .as_number()
                .is_some_and(f64::is_nan)
        );
    }

    #[test]
    fn delay_requires_timers() {
        assert!(Library::standard().get("delay").is_none());
        assert!(Library::standard().with_timers(Timers::new()).get("delay").is_some());
    }
}
