//! Evaluation errors
//!
//! Errors are values: a failing cell yields `Value::Error`, only
//! `CompiledUnit::run_unsafe` hands them out as `Err`.

use std::ops::Range;
use thiserror::Error;

pub type EvalResult<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Lexing, parsing or scoping failure. `frame` is a rendered code frame.
    #[error("SyntaxError: {message}")]
    Syntax {
        message: String,
        span: Range<usize>,
        frame: String,
    },

    #[error("ReferenceError: {name} is not defined")]
    Reference { name: String },

    #[error("ReferenceError: cannot access '{name}' before initialization")]
    Uninitialized { name: String },

    #[error("TypeError: {0}")]
    Type(String),

    /// Raised by `error(message)` or by a rejected promise.
    #[error("Error: {0}")]
    Raised(String),

    #[error("TypeError: a callback cannot suspend")]
    Suspended,

    #[error("RangeError: maximum call depth of {0} exceeded")]
    CallDepth(usize),
}

impl EvalError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    pub fn code_frame(&self) -> Option<&str> {
        match self {
            Self::Syntax { frame, .. } => Some(frame),
            _ => None,
        }
    }

    pub fn span(&self) -> Option<Range<usize>> {
        match self {
            Self::Syntax { span, .. } => Some(span.clone()),
            _ => None,
        }
    }
}
