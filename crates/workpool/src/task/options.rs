//! Task options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::serde_util::{base64_bytes, duration_millis};

/// Queue a task targets when no queue option is given
pub const DEFAULT_QUEUE: &str = "default";

/// Handler timeout when no timeout option is given
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Mutable configuration of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Opaque payload handed to the handler
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,

    /// Bound on handler execution, enforced through the handler's context
    #[serde(with = "duration_millis")]
    pub timeout: Duration,

    /// Name of the queue the task is submitted to
    pub queue: String,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            payload: Vec::new(),
            timeout: DEFAULT_TASK_TIMEOUT,
            queue: DEFAULT_QUEUE.to_string(),
        }
    }
}

impl TaskOptions {
    /// Apply options in order; later options win
    pub fn apply<I>(&mut self, opts: I)
    where
        I: IntoIterator<Item = TaskOption>,
    {
        for opt in opts {
            match opt {
                TaskOption::Payload(payload) => self.payload = payload,
                TaskOption::Timeout(timeout) => self.timeout = timeout,
                TaskOption::Queue(queue) => self.queue = queue,
            }
        }
    }
}

/// A single task option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOption {
    /// Replace the payload
    Payload(Vec<u8>),
    /// Replace the handler timeout
    Timeout(Duration),
    /// Route the task to another queue
    Queue(String),
}

impl TaskOption {
    pub fn payload(payload: impl Into<Vec<u8>>) -> Self {
        Self::Payload(payload.into())
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout(timeout)
    }

    pub fn queue(queue: impl Into<String>) -> Self {
        Self::Queue(queue.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = TaskOptions::default();
        assert!(opts.payload.is_empty());
        assert_eq!(opts.timeout, Duration::from_secs(3600));
        assert_eq!(opts.queue, "default");
    }

    #[test]
    fn test_apply_in_order() {
        let mut opts = TaskOptions::default();
        opts.apply([
            TaskOption::queue("high"),
            TaskOption::payload("first"),
            TaskOption::timeout(Duration::from_secs(5)),
            TaskOption::payload("second"),
        ]);

        assert_eq!(opts.queue, "high");
        assert_eq!(opts.payload, b"second".to_vec());
        assert_eq!(opts.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_serialized_form() {
        let mut opts = TaskOptions::default();
        opts.apply([
            TaskOption::payload(vec![0u8, 255, 7]),
            TaskOption::timeout(Duration::from_millis(1500)),
        ]);

        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["payload"], "AP8H");
        assert_eq!(json["timeout"], 1500);
        assert_eq!(json["queue"], "default");

        let back: TaskOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, opts);
    }

    #[test]
    fn test_rejects_invalid_payload_encoding() {
        let json = serde_json::json!({"payload": "not base64!", "timeout": 10, "queue": "q"});
        assert!(serde_json::from_value::<TaskOptions>(json).is_err());
    }
}
