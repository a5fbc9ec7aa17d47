//! Incremental evaluation of documents made of named cells.
//!
//! A cell is compiled into a unit that knows which names it reads. Cells are
//! ordered in chains; each sees the results of the cells before it, and an
//! edit recomputes only the cells at or after the point of change. Results
//! may be promises that settle later on a single-threaded event loop.

pub mod block;
pub mod blocks;
pub mod chain;
pub mod compiler;
pub mod env;
pub mod error;
mod evaluator;
pub mod library;
pub mod parser;
pub mod promise;
pub mod result;
pub mod runtime;
pub mod store;
pub mod value;

pub use block::{Action, Block, Update};
pub use blocks::{CellBlock, Document, ExpressionBlock, NoteBlock, Sheet, SheetEdit, SheetState};
pub use chain::{BEFORE, Chain, ChainState, Entry, EntryId, Visibility};
pub use compiler::{CompiledUnit, Compiler};
pub use env::Env;
pub use error::{EvalError, EvalResult};
pub use evaluator::{Closure, call_function};
pub use library::Library;
pub use promise::{Promise, Resolver, Settled};
pub use result::{AsyncStatus, CellResult};
pub use runtime::{EventLoop, Timers};
pub use store::Store;
pub use value::Value;
