//! Concrete blocks.

pub mod cell;
pub mod expression;
pub mod note;
pub mod sheet;

pub use cell::{CellBlock, CellState, Document};
pub use expression::{ExpressionBlock, ExpressionState};
pub use note::{NoteBlock, NoteState};
pub use sheet::{Sheet, SheetEdit, SheetState};
