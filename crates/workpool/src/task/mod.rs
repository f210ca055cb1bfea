//! Task records and submission options
//!
//! - [`Task`] - unit of work: identity, handler key, payload, timeout, target queue
//! - [`TaskOptions`] - the mutable subset of a task
//! - [`TaskOption`] - a single option applied in order by [`TaskOptions::apply`]

mod definition;
mod options;

pub use definition::Task;
pub use options::{TaskOption, TaskOptions, DEFAULT_QUEUE, DEFAULT_TASK_TIMEOUT};
