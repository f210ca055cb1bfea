//! Task definition

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::options::{TaskOption, TaskOptions};

/// A unit of work routed to a handler by its key
///
/// The identifier is assigned at creation and never changes. Once a task has
/// been submitted it is treated as read-only; the pool submits a copy with the
/// submission options applied.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use workpool::{Task, TaskOption};
///
/// let task = Task::new("resize_image", [TaskOption::queue("high")])
///     .with_payload(b"{\"width\":128}".to_vec())
///     .with_timeout(Duration::from_secs(30));
///
/// assert_eq!(task.key(), "resize_image");
/// assert_eq!(task.queue(), "high");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: String,
    key: String,
    #[serde(flatten)]
    options: TaskOptions,
    created_at: DateTime<Utc>,
}

impl Task {
    /// Create a task for the handler registered under `key`
    pub fn new<I>(key: impl Into<String>, opts: I) -> Self
    where
        I: IntoIterator<Item = TaskOption>,
    {
        let mut options = TaskOptions::default();
        options.apply(opts);

        Self {
            id: Uuid::now_v7().to_string(),
            key: key.into(),
            options,
            created_at: Utc::now(),
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.options.payload = payload.into();
        self
    }

    /// Set the handler timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Set the target queue
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.options.queue = queue.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.options.payload
    }

    pub fn timeout(&self) -> Duration {
        self.options.timeout
    }

    pub fn queue(&self) -> &str {
        &self.options.queue
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    /// Copy of this task with `opts` applied; `self` is left untouched
    pub(crate) fn with_options<I>(&self, opts: I) -> Self
    where
        I: IntoIterator<Item = TaskOption>,
    {
        let mut copy = self.clone();
        copy.options.apply(opts);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new("echo", []);

        assert!(!task.id().is_empty());
        assert_eq!(task.key(), "echo");
        assert_eq!(task.queue(), "default");
        assert_eq!(task.timeout(), Duration::from_secs(3600));
        assert!(task.payload().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Task::new("echo", []);
        let b = Task::new("echo", []);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_with_options_leaves_original_untouched() {
        let original = Task::new("echo", [TaskOption::payload("A")]);
        let copy = original.with_options([TaskOption::queue("low"), TaskOption::payload("B")]);

        assert_eq!(original.queue(), "default");
        assert_eq!(original.payload(), b"A");
        assert_eq!(copy.queue(), "low");
        assert_eq!(copy.payload(), b"B");
        assert_eq!(copy.id(), original.id());
    }

    #[test]
    fn test_json_record_is_flat() {
        let task = Task::new("echo", [TaskOption::queue("high")]).with_payload("hi");
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["key"], "echo");
        assert_eq!(json["queue"], "high");
        assert_eq!(json["payload"], "aGk=");
        assert!(json["created_at"].is_string());

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }
}
