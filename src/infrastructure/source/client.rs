use crate::modules::delivery::allowlist::HostAllowList;
use crate::modules::delivery::request::sanitize_local_path;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::CACHE_CONTROL;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Bytes of a source asset plus the cache policy it was served with.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub bytes: Bytes,
    pub cache_control: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source '{0}' does not exist")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<FetchedSource, FetchError>;
}

pub const MAX_REDIRECTS: usize = 5;
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Fetches http(s) sources over the network and everything else from the
/// asset directory.
pub struct SourceClient {
    http: reqwest::Client,
    asset_dir: Option<PathBuf>,
    body_limit: usize,
}

impl SourceClient {
    /// Redirects are only followed to hosts `allow_list` permits.
    pub fn new(timeout: Duration, asset_dir: Option<PathBuf>, allow_list: HostAllowList) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect_policy(allow_list))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            asset_dir,
            body_limit: DEFAULT_BODY_LIMIT,
        })
    }

    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    async fn fetch_remote(&self, location: &str) -> Result<FetchedSource, FetchError> {
        debug!(location, "Fetching remote source");
        let mut response = self
            .http
            .get(location)
            .send()
            .await
            .with_context(|| format!("Request to '{}' failed", location))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound(location.to_string()));
        }
        if !status.is_success() {
            return Err(anyhow!("Source '{}' responded with {}", location, status).into());
        }

        let cache_control = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if response.content_length().is_some_and(|len| len > self.body_limit as u64) {
            return Err(anyhow!("Source '{}' exceeds {} bytes", location, self.body_limit).into());
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Reading body of '{}' failed", location))?
        {
            if body.len() + chunk.len() > self.body_limit {
                return Err(anyhow!("Source '{}' exceeds {} bytes", location, self.body_limit).into());
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedSource {
            bytes: body.freeze(),
            cache_control,
        })
    }

    async fn fetch_local(&self, location: &str) -> Result<FetchedSource, FetchError> {
        let asset_dir = self
            .asset_dir
            .as_ref()
            .ok_or_else(|| FetchError::NotFound(location.to_string()))?;
        let relative = sanitize_local_path(location)
            .ok_or_else(|| FetchError::NotFound(location.to_string()))?;

        match tokio::fs::read(asset_dir.join(relative)).await {
            Ok(data) => Ok(FetchedSource {
                bytes: Bytes::from(data),
                cache_control: None,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FetchError::NotFound(location.to_string())),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Reading asset '{}' failed", location))
                .into()),
        }
    }
}

fn redirect_policy(allow_list: HostAllowList) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {} redirects", MAX_REDIRECTS));
        }
        let host = attempt.url().host_str().map(str::to_string);
        match host {
            Some(host) if allow_list.permits(&host) => attempt.follow(),
            Some(host) => attempt.error(format!("redirect to host '{}' is not permitted", host)),
            None => attempt.error("redirect without a host"),
        }
    })
}

#[async_trait]
impl SourceFetcher for SourceClient {
    async fn fetch(&self, location: &str) -> Result<FetchedSource, FetchError> {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            self.fetch_remote(location).await
        } else {
            self.fetch_local(location).await
        }
    }
}
