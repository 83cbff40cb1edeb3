//! The task dispatch queue port.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PortsError;

/// A work queue feeding step-dispatch tasks to whichever node picks them up.
///
/// At-least-once delivery: a dequeued task stays invisible to other
/// consumers until `ack`ed or its visibility timeout lapses, at which
/// point it becomes available again. Consumers must be idempotent against
/// redelivery (the execution engine achieves this via each step attempt's
/// idempotency key).
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task payload, returning its queue-assigned id.
    async fn enqueue(&self, payload: serde_json::Value) -> Result<String, PortsError>;

    /// Pull the next available task, waiting up to `timeout` for one to
    /// appear. `None` on timeout with nothing available.
    async fn dequeue(
        &self,
        timeout: Duration,
    ) -> Result<Option<(String, serde_json::Value)>, PortsError>;

    /// Confirm successful processing; removes the task permanently.
    async fn ack(&self, task_id: &str) -> Result<(), PortsError>;

    /// Signal processing failed; makes the task immediately available to
    /// other consumers again (rather than waiting out its visibility
    /// timeout).
    async fn nack(&self, task_id: &str) -> Result<(), PortsError>;

    /// Number of tasks currently queued (not counting in-flight/unacked).
    async fn len(&self) -> Result<usize, PortsError>;

    /// `true` if [`TaskQueue::len`] is zero.
    async fn is_empty(&self) -> Result<bool, PortsError> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_object_safe(_: &dyn TaskQueue) {}

    struct Noop;

    #[async_trait]
    impl TaskQueue for Noop {
        async fn enqueue(&self, _payload: serde_json::Value) -> Result<String, PortsError> {
            Ok("task-1".to_string())
        }
        async fn dequeue(
            &self,
            _timeout: Duration,
        ) -> Result<Option<(String, serde_json::Value)>, PortsError> {
            Ok(None)
        }
        async fn ack(&self, _task_id: &str) -> Result<(), PortsError> {
            Ok(())
        }
        async fn nack(&self, _task_id: &str) -> Result<(), PortsError> {
            Ok(())
        }
        async fn len(&self) -> Result<usize, PortsError> {
            Ok(0)
        }
    }

    #[test]
    fn is_object_safe() {
        assert_object_safe(&Noop);
    }

    #[tokio::test]
    async fn default_is_empty_delegates_to_len() {
        let queue = Noop;
        assert!(queue.is_empty().await.unwrap());
    }
}
