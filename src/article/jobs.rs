use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Work-item publisher for out-of-process post-processing.
///
/// Tokens are opaque to the queue; consumers decide what they mean.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, queue: &str, token: &str) -> Result<(), JobQueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum JobQueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("publish to {queue} failed: {reason}")]
    Publish { queue: String, reason: String },
}

/// Keeps published tokens in memory, per queue, in publish order.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Default::default()
    }

    /// Tokens published to `queue` so far.
    pub async fn jobs(&self, queue: &str) -> Vec<String> {
        self.jobs
            .lock()
            .await
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, queue: &str, token: &str) -> Result<(), JobQueueError> {
        self.jobs
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push(token.to_string());
        tracing::debug!(queue, token, "Job enqueued");
        Ok(())
    }
}
