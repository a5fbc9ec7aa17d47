//! Root owner of a block state.
//!
//! Actions dispatched while another action is being applied are queued and
//! applied afterwards in order, never nested.

use crate::block::{Action, Block, Update};
use crate::env::Env;
use crate::value::Value;
use serde_json::Value as Json;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

pub struct Store<B: Block> {
    inner: Rc<StoreInner<B>>,
}

struct StoreInner<B: Block> {
    block: Rc<B>,
    state: RefCell<B::State>,
    env: RefCell<Env>,
    queue: RefCell<VecDeque<Action<B::State>>>,
    draining: Cell<bool>,
}

impl<B: Block> Store<B> {
    pub fn new(block: B, env: Env) -> Self {
        let state = block.init();
        Self {
            inner: Rc::new(StoreInner {
                block: Rc::new(block),
                state: RefCell::new(state),
                env: RefCell::new(env),
                queue: RefCell::default(),
                draining: Cell::new(false),
            }),
        }
    }

    /// Creates a store whose state is restored from `json`.
    pub fn load(block: B, json: &Json, env: Env) -> Self {
        let store = Self::new(block, env);
        let block = store.inner.block.clone();
        let json = json.clone();
        store.dispatch(Box::new(move |_, env, update| {
            block.from_json(&json, update, env)
        }));
        store
    }

    pub fn block(&self) -> &B {
        &self.inner.block
    }

    pub fn update(&self) -> Update<B::State> {
        update_handle(Rc::downgrade(&self.inner))
    }

    pub fn dispatch(&self, action: Action<B::State>) {
        self.inner.enqueue(action, &self.update());
    }

    pub fn state(&self) -> B::State {
        self.inner.state.borrow().clone()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&B::State) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    pub fn env(&self) -> Env {
        self.inner.env.borrow().clone()
    }

    pub fn result(&self) -> Value {
        let env = self.env();
        self.with_state(|state| self.inner.block.result(state, &env))
    }

    /// Replaces the ambient environment and recomputes the whole state.
    pub fn set_env(&self, env: Env) {
        *self.inner.env.borrow_mut() = env;
        let block = self.inner.block.clone();
        self.dispatch(Box::new(move |state, env, update| {
            block.recompute(&state, update, env)
        }));
    }

    pub fn to_json(&self) -> Json {
        self.with_state(|state| self.inner.block.to_json(state))
    }
}

impl<B: Block> StoreInner<B> {
    fn enqueue(&self, action: Action<B::State>, update: &Update<B::State>) {
        self.queue.borrow_mut().push_back(action);
        if self.draining.replace(true) {
            return;
        }
        loop {
            let Some(action) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            let state = self.state.borrow().clone();
            let env = self.env.borrow().clone();
            let state = action(state, &env, update);
            *self.state.borrow_mut() = state;
        }
        self.draining.set(false);
    }
}

fn update_handle<B: Block>(handle: Weak<StoreInner<B>>) -> Update<B::State> {
    Update::new(move |action| match handle.upgrade() {
        Some(store) => store.enqueue(action, &update_handle(handle.clone())),
        None => log::debug!("Dropped an action dispatched after its store was dropped"),
    })
}
