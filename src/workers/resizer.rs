use crate::common::error::{DeliveryError, Stage};
use crate::infrastructure::source::client::{FetchError, SourceFetcher};
use crate::infrastructure::storage::{Storage, WriteInfo};
use crate::modules::delivery::allowlist::HostAllowList;
use crate::modules::delivery::events::IngressPayload;
use crate::modules::delivery::request::TransformRequest;
use crate::workers::image;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

/// Fetches a source, transforms it and writes the artifact to storage.
pub struct ResizeWorker {
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn SourceFetcher>,
    default_cache_control: String,
    allow_list: HostAllowList,
}

impl ResizeWorker {
    pub fn new(
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn SourceFetcher>,
        default_cache_control: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            fetcher,
            default_cache_control: default_cache_control.into(),
            allow_list: HostAllowList::default(),
        }
    }

    /// Hosts a job may fetch from. Jobs reach the worker from the queue and
    /// the HTTP ingress as well as the dispatcher, so the check lives here.
    pub fn with_allow_list(mut self, allow_list: HostAllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Runs the whole pipeline and returns the key that was written.
    pub async fn run(&self, request: &TransformRequest) -> Result<String, DeliveryError> {
        let key = request.storage_key();
        debug!(key = %key, location = %request.source_location, width = request.target_width, "Transforming");

        if let Some(host) = request.source_host() {
            if !self.allow_list.permits(host) {
                return Err(DeliveryError::HostNotPermitted(host.to_string()));
            }
        }

        let source = self
            .fetcher
            .fetch(&request.source_location)
            .await
            .map_err(|e| match e {
                FetchError::NotFound(location) => DeliveryError::NotFound(location),
                FetchError::Other(e) => DeliveryError::system(Stage::Fetch, &key, e),
            })?;

        let hint = request.source_extension();
        let extension = request.encoding_extension();
        let width = request.target_width;
        let data = source.bytes;

        let encoded = tokio::task::spawn_blocking(move || image::transform(&data, &hint, width, &extension))
            .await
            .map_err(|e| DeliveryError::system(Stage::Resize, &key, e))?
            .map_err(|e| DeliveryError::system(e.stage(), &key, e))?;

        let info = WriteInfo {
            cache_control: source
                .cache_control
                .unwrap_or_else(|| self.default_cache_control.clone()),
            content_type: mime_guess::from_path(&key)
                .first()
                .map(|m| m.essence_str().to_string())
                .unwrap_or_else(|| encoded.format.to_mime_type().to_string()),
        };

        self.storage
            .write(&key, Bytes::from(encoded.data), &info)
            .await
            .map_err(|e| DeliveryError::system(Stage::Write, &key, e))?;

        info!(key = %key, width = encoded.width, height = encoded.height, "Artifact written");
        Ok(key)
    }

    /// Decodes a queued job, bare or inside a push envelope, and runs it.
    pub async fn run_payload(&self, payload: &[u8]) -> Result<String, DeliveryError> {
        let job = serde_json::from_slice::<IngressPayload>(payload)
            .map_err(|e| DeliveryError::invalid_with_cause("body", "Expected a transform job.", e))?
            .into_job();
        let request = TransformRequest::from_job(&job)?;
        self.run(&request).await
    }
}
