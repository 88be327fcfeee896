use super::Publisher;
use crate::workers::resizer::ResizeWorker;
use anyhow::anyhow;
use async_channel::{Receiver, Sender, TrySendError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// In-process publisher: a bounded channel drained by a fixed set of tasks.
///
/// Publishing never waits; when every slot is taken the job is rejected.
#[derive(Clone)]
pub struct WorkerPool {
    sender: Sender<Vec<u8>>,
}

impl WorkerPool {
    pub fn start(
        size: usize,
        capacity: usize,
        worker: Arc<ResizeWorker>,
        token: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));

        let handles = (0..size.max(1))
            .map(|id| tokio::spawn(drain(id, receiver.clone(), worker.clone(), token.clone())))
            .collect();

        info!(size, capacity, "Resize worker pool started");
        (Self { sender }, handles)
    }
}

async fn drain(id: usize, receiver: Receiver<Vec<u8>>, worker: Arc<ResizeWorker>, token: CancellationToken) {
    loop {
        let payload = tokio::select! {
            _ = token.cancelled() => break,
            next = receiver.recv() => match next {
                Ok(payload) => payload,
                Err(_) => break,
            },
        };

        match worker.run_payload(&payload).await {
            Ok(key) => debug!(worker = id, key = %key, "Pooled job completed"),
            Err(e) => error!(worker = id, "Pooled job failed: {}: {}", e, e.root_cause().unwrap_or_default()),
        }
    }
    debug!(worker = id, "Resize worker stopped");
}

#[async_trait]
impl Publisher for WorkerPool {
    async fn publish(&self, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
        match self.sender.try_send(payload.to_vec()) {
            Ok(()) => {
                debug!(topic, "Job handed to worker pool");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(anyhow!("worker pool for '{}' is saturated", topic)),
            Err(TrySendError::Closed(_)) => Err(anyhow!("worker pool for '{}' has stopped", topic)),
        }
    }
}
