//! Promise values: a shared, single-settlement future of a `Value`.

use crate::error::{EvalError, EvalResult};
use crate::value::Value;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use futures_channel::oneshot;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Settled {
    Fulfilled(Value),
    Rejected(Rc<EvalError>),
}

impl Settled {
    pub fn into_value(self) -> Value {
        match self {
            Self::Fulfilled(value) => value,
            Self::Rejected(error) => Value::Error(error),
        }
    }
}

#[derive(Clone)]
pub struct Promise(Shared<LocalBoxFuture<'static, Settled>>);

impl Promise {
    /// A promise settled by `future`. A promise produced by the future is
    /// flattened into this one.
    pub fn new(future: impl Future<Output = EvalResult<Value>> + 'static) -> Self {
        let settled = async move {
            match future.await {
                Ok(Value::Promise(inner)) => inner.settled().await,
                Ok(value) => Settled::Fulfilled(value),
                Err(error) => Settled::Rejected(Rc::new(error)),
            }
        };
        Self(settled.boxed_local().shared())
    }

    pub fn resolved(value: Value) -> Self {
        Self::new(future::ready(Ok(value)))
    }

    pub fn rejected(error: EvalError) -> Self {
        Self::new(future::ready(Err(error)))
    }

    /// A promise settled from the outside through the returned `Resolver`.
    /// Dropping the resolver rejects the promise.
    pub fn deferred() -> (Resolver, Self) {
        let (sender, receiver) = oneshot::channel();
        let promise = Self::new(async move {
            receiver.await.unwrap_or_else(|_| {
                Err(EvalError::Raised(
                    "promise was abandoned before it settled".to_owned(),
                ))
            })
        });
        (Resolver(sender), promise)
    }

    pub fn settled(&self) -> Shared<LocalBoxFuture<'static, Settled>> {
        self.0.clone()
    }

    pub fn peek(&self) -> Option<&Settled> {
        self.0.peek()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.peek() {
            Some(settled) => write!(f, "Promise({settled:?})"),
            None => f.write_str("Promise(<pending>)"),
        }
    }
}

pub struct Resolver(oneshot::Sender<EvalResult<Value>>);

impl Resolver {
    pub fn resolve(self, value: Value) {
        if self.0.send(Ok(value)).is_err() {
            log::trace!("Resolved a promise nobody is waiting for");
        }
    }

    pub fn reject(self, error: EvalError) {
        if self.0.send(Err(error)).is_err() {
            log::trace!("Rejected a promise nobody is waiting for");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn nested_promises_flatten() {
        let inner = Promise::resolved(Value::Number(3.0));
        let outer = Promise::new(async move { Ok(Value::Promise(inner)) });
        let settled = block_on(outer.settled());
        assert!(matches!(settled, Settled::Fulfilled(Value::Number(n)) if n == 3.0));
    }

    #[test]
    fn deferred_settles_from_resolver() {
        let (resolver, promise) = Promise::deferred();
        assert!(promise.peek().is_none());
        resolver.resolve(Value::from("done"));
        let settled = block_on(promise.settled());
        assert_eq!(settled.into_value(), Value::from("done"));
    }

    #[test]
    fn dropped_resolver_rejects() {
        let (resolver, promise) = Promise::deferred();
        drop(resolver);
        let settled = block_on(promise.settled());
        assert!(matches!(settled, Settled::Rejected(_)));
    }
}
