use super::request::{parse_width, sanitize_local_path, QueryParams, ServingMode, TransformRequest};
use super::staleness::{self, Staleness};
use crate::common::error::{DeliveryError, Stage};
use crate::config::settings::DeliveryConfig;
use crate::infrastructure::queue::Publisher;
use crate::infrastructure::storage::{Storage, StorageError};
use crate::modules::video::model::VideoJob;
use crate::modules::video::queue::VideoQueue;
use crate::workers::resizer::ResizeWorker;
use std::io::ErrorKind;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// How a request that needs a new artifact gets one.
pub enum DispatchStrategy {
    /// Transform inside the request.
    Inline,
    /// Hand the job to a publisher and send the caller to the source.
    Queued(Arc<dyn Publisher>),
}

/// Outcome of a delivery request, before it becomes an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Cached(String),
    Transformed(String),
    Pending(String),
    Cleared,
    VideoReady(String),
    VideoQueued,
}

pub struct Dispatcher {
    config: DeliveryConfig,
    storage: Arc<dyn Storage>,
    worker: Arc<ResizeWorker>,
    strategy: DispatchStrategy,
    videos: Arc<VideoQueue>,
}

impl Dispatcher {
    pub fn new(
        config: DeliveryConfig,
        storage: Arc<dyn Storage>,
        worker: Arc<ResizeWorker>,
        strategy: DispatchStrategy,
        videos: Arc<VideoQueue>,
    ) -> Self {
        Self {
            config,
            storage,
            worker,
            strategy,
            videos,
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub async fn dispatch(&self, params: &QueryParams, mode: &ServingMode) -> Result<Resolution, DeliveryError> {
        let request = TransformRequest::resolve(params, mode, &self.config.key_prefix)?;
        let key = request.storage_key();

        if let Some(code) = params.first("clear").filter(|c| !c.is_empty()) {
            return self.clear(code, &key).await;
        }

        if let Some(host) = request.source_host() {
            if !self.config.allow_list.permits(host) {
                return Err(DeliveryError::HostNotPermitted(host.to_string()));
            }
        }

        let artifact = self
            .storage
            .info(&key)
            .await
            .map_err(|e| DeliveryError::system(Stage::Lookup, &key, e))?;

        if staleness::evaluate(request.force, artifact.as_ref(), OffsetDateTime::now_utc()) == Staleness::Fresh {
            debug!(key = %key, "Serving cached artifact");
            return Ok(Resolution::Cached(self.storage.object_url(&key)));
        }

        match &self.strategy {
            // Local sources have no public URL to send the caller to meanwhile.
            DispatchStrategy::Queued(publisher) if request.is_remote() => {
                self.publish(publisher.as_ref(), &request, &key).await;
                Ok(Resolution::Pending(request.source_location.clone()))
            }
            _ => {
                let key = self.worker.run(&request).await?;
                Ok(Resolution::Transformed(self.storage.object_url(&key)))
            }
        }
    }

    /// Best effort: a failed publish is logged and the caller still gets the
    /// source.
    async fn publish(&self, publisher: &dyn Publisher, request: &TransformRequest, key: &str) {
        let payload = match serde_json::to_vec(&request.to_job()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, "Failed to serialize transform job: {}", e);
                return;
            }
        };

        match publisher.publish(&self.config.resize_topic, &payload).await {
            Ok(()) => info!(key, location = %request.source_location, "Transform job published"),
            Err(e) => warn!(key, "{} failed: {:#}", Stage::Publish, e),
        }
    }

    async fn clear(&self, code: &str, key: &str) -> Result<Resolution, DeliveryError> {
        let authorized = self
            .config
            .clear_code
            .as_deref()
            .is_some_and(|expected| constant_time_eq(code, expected));
        if !authorized {
            return Err(DeliveryError::Unauthorized);
        }

        match self.storage.delete(key).await {
            Ok(()) => info!(key, "Artifact cleared"),
            Err(StorageError::NotFound(_)) => debug!(key, "Nothing to clear"),
            Err(e) => return Err(DeliveryError::system(Stage::Delete, key, e)),
        }
        Ok(Resolution::Cleared)
    }

    /// Serves a re-encoded video if one exists, otherwise queues the encode.
    pub async fn dispatch_video(&self, path: &str, params: &QueryParams) -> Result<Resolution, DeliveryError> {
        let width = parse_width(params.first("width"))?;
        let relative = sanitize_local_path(path.trim().trim_start_matches('/'))
            .ok_or_else(|| DeliveryError::invalid("url", "Invalid (or missing) path."))?;
        let asset_dir = self
            .config
            .asset_dir
            .as_ref()
            .ok_or_else(|| DeliveryError::NotFound(path.to_string()))?;

        let job = VideoJob::new(asset_dir.join(relative), width);
        let key = job.storage_key();

        let artifact = self
            .storage
            .info(&key)
            .await
            .map_err(|e| DeliveryError::system(Stage::Lookup, &key, e))?;
        if artifact.is_some() {
            return Ok(Resolution::VideoReady(self.storage.object_url(&key)));
        }

        match tokio::fs::metadata(&job.source_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(DeliveryError::NotFound(path.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(DeliveryError::NotFound(path.to_string())),
            Err(e) => return Err(DeliveryError::system(Stage::Lookup, &key, e)),
        }

        if self.videos.enqueue(job) {
            info!(key = %key, "Video queued for encoding");
        }
        Ok(Resolution::VideoQueued)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("s3cret", "s3cret"));
        assert!(!constant_time_eq("s3cret", "s3creT"));
        assert!(!constant_time_eq("s3cret", "s3cret!"));
        assert!(constant_time_eq("", ""));
    }
}
