//! Pool module - the worker pool that runs the job's task.

mod worker;

pub use worker::*;
