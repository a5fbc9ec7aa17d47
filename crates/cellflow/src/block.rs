//! The contract every cell kind implements, and the handles actions are
//! dispatched through.

use crate::env::Env;
use crate::value::Value;
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::rc::Rc;

/// A state transition. It receives the current state, the environment the
/// state lives in and the dispatch handle narrowed to that state.
pub type Action<S> = Box<dyn FnOnce(S, &Env, &Update<S>) -> S>;

/// Cloneable dispatch handle for actions on a state of type `S`.
pub struct Update<S>(Rc<dyn Fn(Action<S>)>);

impl<S> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: 'static> Update<S> {
    pub fn new(dispatch: impl Fn(Action<S>) + 'static) -> Self {
        Self(Rc::new(dispatch))
    }

    /// A handle that drops every action. Useful for states nobody owns.
    pub fn detached() -> Self {
        Self::new(|_| log::trace!("Dropped an action dispatched to a detached handle"))
    }

    pub fn dispatch(&self, action: Action<S>) {
        (self.0)(action)
    }

    /// Narrows this handle to a part of the state. `wrap` turns an action on
    /// the part into an action on the whole.
    pub fn focus<T: 'static>(
        &self,
        wrap: impl Fn(Action<T>) -> Action<S> + 'static,
    ) -> Update<T> {
        let parent = self.clone();
        Update::new(move |action| parent.dispatch(wrap(action)))
    }
}

pub trait Block: 'static {
    type State: Clone + 'static;

    fn init(&self) -> Self::State;

    /// Recomputes `state` against a new environment.
    fn recompute(&self, state: &Self::State, update: &Update<Self::State>, env: &Env)
    -> Self::State;

    fn result(&self, state: &Self::State, env: &Env) -> Value;

    /// Restores a state. Malformed input falls back to `init`.
    fn from_json(&self, json: &Json, update: &Update<Self::State>, env: &Env) -> Self::State;

    fn to_json(&self, state: &Self::State) -> Json;

    /// Names the result depends on, `None` when unknown.
    fn dependencies(&self, _state: &Self::State) -> Option<Rc<BTreeSet<String>>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn focus_wraps_actions() {
        let applied = Rc::new(RefCell::new(Vec::new()));
        let log = applied.clone();
        let root: Update<(i32, i32)> = Update::new(move |action: Action<(i32, i32)>| {
            let state = action((1, 2), &Env::new(), &Update::detached());
            log.borrow_mut().push(state);
        });
        let second = root.focus(|action: Action<i32>| -> Action<(i32, i32)> {
            Box::new(move |(first, second), env, _| (first, action(second, env, &Update::detached())))
        });
        second.dispatch(Box::new(|value, _, _| value * 10));
        assert_eq!(*applied.borrow(), vec![(1, 20)]);
    }
}
