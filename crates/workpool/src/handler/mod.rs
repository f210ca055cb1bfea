//! Handler registration and lookup
//!
//! A [`HandlerRegistry`] maps a task key to the logic that executes it. Each
//! pool owns its registry, so several independent pools can live in one
//! process.

mod registry;

pub use registry::{HandlerRegistry, HandlerResult, TaskHandler};
