//! In-memory bounded `TaskQueue` driver.
//!
//! Generalizes the workspace's `MemoryQueue` (`tokio::sync::mpsc` channel
//! plus an in-flight map for ack/nack) unchanged — the port shape is
//! identical between the teacher and Qflow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qflow_ports::error::PortsError;
use qflow_ports::queue::TaskQueue;
use tokio::sync::{mpsc, Mutex};

struct QueueItem {
    id: String,
    payload: serde_json::Value,
}

/// In-memory bounded task queue. Tasks move from queued, to in-flight
/// (dequeued, awaiting ack/nack), to done (acked and removed, or nacked
/// and requeued).
pub struct MemoryQueue {
    sender: mpsc::Sender<QueueItem>,
    receiver: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    in_flight: Arc<Mutex<HashMap<String, QueueItem>>>,
    queued_count: AtomicUsize,
}

impl MemoryQueue {
    /// Create a queue bounded to `capacity` buffered tasks. `enqueue` fails
    /// once the channel is full.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            queued_count: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, payload: serde_json::Value) -> Result<String, PortsError> {
        let id = uuid::Uuid::new_v4().to_string();
        let item = QueueItem {
            id: id.clone(),
            payload,
        };
        self.sender
            .try_send(item)
            .map_err(|e| PortsError::Internal(format!("queue full or closed: {e}")))?;
        self.queued_count.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    async fn dequeue(
        &self,
        timeout: Duration,
    ) -> Result<Option<(String, serde_json::Value)>, PortsError> {
        let mut rx = self.receiver.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(item)) => {
                self.queued_count.fetch_sub(1, Ordering::Relaxed);
                let id = item.id.clone();
                let payload = item.payload.clone();
                self.in_flight.lock().await.insert(id.clone(), item);
                Ok(Some((id, payload)))
            }
            Ok(None) | Err(_) => Ok(None),
        }
    }

    async fn ack(&self, task_id: &str) -> Result<(), PortsError> {
        self.in_flight
            .lock()
            .await
            .remove(task_id)
            .map(|_| ())
            .ok_or_else(|| PortsError::not_found("task", task_id))
    }

    async fn nack(&self, task_id: &str) -> Result<(), PortsError> {
        let item = self.in_flight.lock().await.remove(task_id);
        match item {
            Some(item) => {
                self.sender
                    .try_send(item)
                    .map_err(|e| PortsError::Internal(format!("requeue failed: {e}")))?;
                self.queued_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(PortsError::not_found("task", task_id)),
        }
    }

    async fn len(&self) -> Result<usize, PortsError> {
        Ok(self.queued_count.load(Ordering::Relaxed))
    }
}
