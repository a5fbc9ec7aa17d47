use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Immutable, insertion-ordered mapping of names to values.
///
/// Extending an environment never mutates it; later bindings shadow earlier ones.
#[derive(Clone, Default)]
pub struct Env(Rc<IndexMap<Rc<str>, Value>>);

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|name| &**name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (&**name, value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend(&self, bindings: impl IntoIterator<Item = (Rc<str>, Value)>) -> Self {
        let mut bindings = bindings.into_iter().peekable();
        if bindings.peek().is_none() {
            return self.clone();
        }
        let mut map = (*self.0).clone();
        map.extend(bindings);
        Self(Rc::new(map))
    }

    pub fn with(&self, name: impl Into<Rc<str>>, value: Value) -> Self {
        self.extend([(name.into(), value)])
    }

    /// Builds an environment from a JSON object. Anything else yields `None`.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        let fields = json.as_object()?;
        Some(
            fields
                .iter()
                .map(|(name, value)| (name.as_str(), Value::from_json(value)))
                .collect(),
        )
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<K: Into<Rc<str>>> FromIterator<(K, Value)> for Env {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(bindings: T) -> Self {
        Self(Rc::new(
            bindings
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        ))
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
