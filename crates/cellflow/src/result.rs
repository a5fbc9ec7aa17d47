//! Result model of a cell: a value that is either there already or settles
//! later on the event loop.

use crate::error::EvalError;
use crate::promise::Settled;
use crate::value::Value;
use futures::executor::LocalSpawner;
use futures::future::{AbortHandle, abortable};
use futures::task::LocalSpawnExt;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum CellResult {
    Immediate(Value),
    Async(AsyncResult),
}

#[derive(Debug, Clone)]
pub enum AsyncStatus {
    Pending,
    Failed(Rc<EvalError>),
    Finished(Value),
}

#[derive(Clone)]
pub struct AsyncResult {
    status: AsyncStatus,
    abort_handle: Option<AbortHandle>,
}

impl AsyncResult {
    pub fn status(&self) -> &AsyncStatus {
        &self.status
    }
}

impl CellResult {
    /// Wraps `value`. A promise becomes `Async(Pending)` and a task awaiting it
    /// is spawned; unless the result is cancelled first, `on_update` receives
    /// the settled result exactly once.
    pub fn from_value(
        value: Value,
        spawner: &LocalSpawner,
        on_update: impl FnOnce(CellResult) + 'static,
    ) -> Self {
        let Value::Promise(promise) = value else {
            return Self::Immediate(value);
        };
        let (settled, abort_handle) = abortable(promise.settled());
        let task = async move {
            // Aborted tasks never report back
            let Ok(settled) = settled.await else {
                return;
            };
            let status = match settled {
                Settled::Fulfilled(value) => AsyncStatus::Finished(value),
                Settled::Rejected(error) => AsyncStatus::Failed(error),
            };
            on_update(CellResult::Async(AsyncResult {
                status,
                abort_handle: None,
            }));
        };
        if let Err(error) = spawner.spawn_local(task) {
            log::warn!("Failed to spawn an async result: {error}");
            return Self::Async(AsyncResult {
                status: AsyncStatus::Failed(Rc::new(EvalError::Raised(error.to_string()))),
                abort_handle: None,
            });
        }
        Self::Async(AsyncResult {
            status: AsyncStatus::Pending,
            abort_handle: Some(abort_handle),
        })
    }

    /// Stops a pending result from ever reporting back. Calling it again,
    /// or on a settled result, does nothing.
    pub fn cancel(&self) {
        if let Self::Async(AsyncResult {
            abort_handle: Some(abort_handle),
            ..
        }) = self
        {
            abort_handle.abort();
        }
    }

    pub fn value(&self) -> Value {
        match self {
            Self::Immediate(value) => value.clone(),
            Self::Async(result) => match &result.status {
                AsyncStatus::Pending => Value::Pending,
                AsyncStatus::Failed(error) => Value::Error(error.clone()),
                AsyncStatus::Finished(value) => value.clone(),
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Async(AsyncResult {
                status: AsyncStatus::Pending,
                ..
            })
        )
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl Default for CellResult {
    fn default() -> Self {
        Self::Immediate(Value::Undefined)
    }
}

impl fmt::Debug for CellResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Immediate(value) => write!(f, "Immediate({value:?})"),
            Self::Async(result) => write!(f, "Async({:?})", result.status),
        }
    }
}
