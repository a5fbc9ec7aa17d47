use crate::error::{EvalError, EvalResult};
use crate::evaluator::Closure;
use crate::promise::Promise;
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

pub type Record = IndexMap<Rc<str>, Value>;

/// Call arguments. Most calls pass a handful of values.
pub type Arguments = SmallVec<[Value; 4]>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    List(Rc<Vec<Value>>),
    Record(Rc<Record>),
    Function(Function),
    Promise(Promise),
    Error(Rc<EvalError>),
    /// Stands in for a result that has not settled yet.
    Pending,
}

#[derive(Clone)]
pub enum Function {
    Closure(Rc<Closure>),
    Native(NativeFunction),
}

impl Function {
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(&a.function, &b.function),
            _ => false,
        }
    }
}

type NativeBody = dyn Fn(Arguments) -> EvalResult<Value>;

#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<str>,
    function: Rc<NativeBody>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<Rc<str>>,
        function: impl Fn(Arguments) -> EvalResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            function: Rc::new(function),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, arguments: Arguments) -> EvalResult<Value> {
        (self.function)(arguments)
    }
}

impl Value {
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Self::Text(text.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Rc::new(items.into_iter().collect()))
    }

    pub fn record<K: Into<Rc<str>>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Record(Rc::new(
            fields.into_iter().map(|(key, value)| (key.into(), value)).collect(),
        ))
    }

    pub fn error(error: EvalError) -> Self {
        Self::Error(Rc::new(error))
    }

    pub fn native(
        name: impl Into<Rc<str>>,
        function: impl Fn(Arguments) -> EvalResult<Value> + 'static,
    ) -> Self {
        Self::Function(Function::Native(NativeFunction::new(name, function)))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Function(_) => "function",
            Self::Promise(_) => "promise",
            Self::Error(_) => "error",
            Self::Pending => "pending",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null | Self::Pending => false,
            Self::Bool(value) => *value,
            Self::Number(number) => *number != 0.0 && !number.is_nan(),
            Self::Text(text) => !text.is_empty(),
            _ => true,
        }
    }

    /// Structural equality used by `==`. `NaN` is never equal to itself.
    pub fn equals(&self, other: &Value) -> bool {
        self.compare(other, false)
    }

    /// Identity used to decide whether a recomputed result changed.
    /// Unlike `equals`, `NaN` is the same as `NaN`.
    pub fn same(&self, other: &Value) -> bool {
        self.compare(other, true)
    }

    fn compare(&self, other: &Value, nan_is_same: bool) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined)
            | (Self::Null, Self::Null)
            | (Self::Pending, Self::Pending) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (nan_is_same && a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter().zip(b.iter()).all(|(a, b)| a.compare(b, nan_is_same)))
            }
            (Self::Record(a), Self::Record(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter().zip(b.iter()).all(|((key_a, a), (key_b, b))| {
                            key_a == key_b && a.compare(b, nan_is_same)
                        }))
            }
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Promise(a), Self::Promise(b)) => a.ptr_eq(b),
            (Self::Error(a), Self::Error(b)) => a == b,
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Undefined | Self::Null => Json::Null,
            Self::Bool(value) => Json::Bool(*value),
            Self::Number(number) => number_to_json(*number),
            Self::Text(text) => Json::String(text.to_string()),
            Self::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Self::Record(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_json()))
                    .collect(),
            ),
            Self::Function(_) | Self::Promise(_) | Self::Pending => Json::String(self.to_string()),
            Self::Error(error) => serde_json::json!({ "error": error.to_string() }),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(value) => Self::Bool(*value),
            Json::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            Json::String(text) => Self::text(text.as_str()),
            Json::Array(items) => Self::list(items.iter().map(Value::from_json)),
            Json::Object(fields) => Self::record(
                fields
                    .iter()
                    .map(|(key, value)| (key.as_str(), Value::from_json(value))),
            ),
        }
    }

    fn write(&self, f: &mut fmt::Formatter, nested: bool) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(number) => f.write_str(&format_number(*number)),
            Self::Text(text) if nested => write!(f, "{:?}", &**text),
            Self::Text(text) => f.write_str(text),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    item.write(f, true)?;
                }
                f.write_str("]")
            }
            Self::Record(fields) => {
                if fields.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (index, (key, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: ")?;
                    value.write(f, true)?;
                }
                f.write_str(" }")
            }
            Self::Function(Function::Native(native)) => write!(f, "[function {}]", native.name()),
            Self::Function(Function::Closure(_)) => f.write_str("[function]"),
            Self::Promise(_) => f.write_str("[promise]"),
            Self::Error(error) => write!(f, "{error}"),
            Self::Pending => f.write_str("[pending]"),
        }
    }
}

pub fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_owned()
    } else if number.is_infinite() {
        if number > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if number == 0.0 {
        "0".to_owned()
    } else {
        number.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write(f, false)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "Text({:?})", &**text),
            Self::Error(error) => write!(f, "Error({error})"),
            other => {
                write!(f, "{}(", other.type_name())?;
                other.write(f, true)?;
                f.write_str(")")
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<EvalError> for Value {
    fn from(error: EvalError) -> Self {
        Self::error(error)
    }
}

/// Integral numbers in the exactly representable range serialize as JSON
/// integers, everything else as floats. NaN and infinities become `null`.
fn number_to_json(number: f64) -> serde_json::Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if number.fract() == 0.0 && number.abs() <= MAX_EXACT {
        return serde_json::Value::from(number as i64);
    }
    serde_json::Number::from_f64(number)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
