//! Core data models for batchwork: configuration, errors and run statistics.

mod config;
mod error;
mod stats;

pub use config::*;
pub use error::*;
pub use stats::*;
