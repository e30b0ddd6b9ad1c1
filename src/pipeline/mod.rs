//! Pipeline module - input reading and batch orchestration.

mod batch;
mod reader;

pub use batch::*;
pub use reader::*;
