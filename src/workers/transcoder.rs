use crate::infrastructure::storage::{Storage, WriteInfo};
use crate::modules::video::model::VideoJob;
use crate::modules::video::queue::VideoQueue;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const VIDEO_CONTENT_TYPE: &str = "video/webm";

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Re-encodes `source` to WebM at `width` (height follows the aspect
    /// ratio) and writes it to `destination`.
    async fn encode(&self, source: &Path, width: u32, destination: &Path) -> anyhow::Result<()>;
}

pub struct FfmpegEncoder {
    binary: String,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, source: &Path, width: u32, destination: &Path) -> anyhow::Result<()> {
        let status = Command::new(&self.binary)
            .arg("-i")
            .arg(source)
            // CRF 17 is visually lossless for most inputs.
            .args(["-crf", "17", "-y", "-vf"])
            .arg(format!("scale={}:-1", width))
            .arg(destination)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to run '{}'", self.binary))?;

        if !status.success() {
            return Err(anyhow!("{} exited with {}", self.binary, status));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum VideoOutcome {
    AlreadyPresent(String),
    Uploaded(String),
}

/// Removes the wrapped file when dropped, including on cancellation.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.0.display(), "Failed to remove temp file: {}", e);
            }
        }
    }
}

pub async fn process_video(
    job: &VideoJob,
    storage: &dyn Storage,
    encoder: &dyn VideoEncoder,
    cache_control: &str,
) -> anyhow::Result<VideoOutcome> {
    let key = job.storage_key();

    if storage
        .info(&key)
        .await
        .with_context(|| format!("Failed to look up '{}'", key))?
        .is_some()
    {
        return Ok(VideoOutcome::AlreadyPresent(key));
    }

    tokio::fs::metadata(&job.source_path)
        .await
        .with_context(|| format!("Source '{}' is not readable", job.source_path.display()))?;

    let stem = job
        .source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    let output = TempFile(std::env::temp_dir().join(format!("{}_{}.webm", uuid::Uuid::new_v4().simple(), stem)));

    info!(path = %job.source_path.display(), width = job.target_width, "Encoding video");
    encoder.encode(&job.source_path, job.target_width, &output.0).await?;

    let data = tokio::fs::read(&output.0)
        .await
        .with_context(|| format!("Failed to read encoded '{}'", output.0.display()))?;

    info!(key = %key, bytes = data.len(), "Uploading video");
    let info = WriteInfo {
        cache_control: cache_control.to_string(),
        content_type: VIDEO_CONTENT_TYPE.to_string(),
    };
    storage
        .write(&key, Bytes::from(data), &info)
        .await
        .with_context(|| format!("Failed to upload '{}'", key))?;

    Ok(VideoOutcome::Uploaded(key))
}

/// Drains `queue` one job per tick until `token` is cancelled.
pub async fn run_video_consumer(
    queue: Arc<VideoQueue>,
    storage: Arc<dyn Storage>,
    encoder: Arc<dyn VideoEncoder>,
    poll_interval: Duration,
    cache_control: String,
    token: CancellationToken,
) {
    info!("Starting video consumer...");

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(job) = queue.dequeue() else {
            continue;
        };

        tokio::select! {
            _ = token.cancelled() => {
                warn!(path = %job.source_path.display(), "Shutting down, abandoning video job");
                break;
            }
            result = process_video(&job, storage.as_ref(), encoder.as_ref(), &cache_control) => match result {
                Ok(VideoOutcome::AlreadyPresent(key)) => debug!(key = %key, "Video already processed"),
                Ok(VideoOutcome::Uploaded(key)) => info!(key = %key, "Video completed"),
                Err(e) => error!(path = %job.source_path.display(), "Unable to process video: {:#}", e),
            },
        }
    }

    if !queue.is_empty() {
        warn!(pending = queue.len(), "Video consumer stopped with jobs still queued");
    }
    info!("Video consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::memory::MemoryStorage;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    /// Writes fixed bytes instead of running ffmpeg.
    #[derive(Default)]
    struct FakeEncoder {
        fail: bool,
        outputs: Mutex<Vec<(PathBuf, u32)>>,
    }

    impl FakeEncoder {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn outputs(&self) -> Vec<(PathBuf, u32)> {
            self.outputs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VideoEncoder for FakeEncoder {
        async fn encode(&self, _source: &Path, width: u32, destination: &Path) -> anyhow::Result<()> {
            self.outputs.lock().unwrap().push((destination.to_path_buf(), width));
            tokio::fs::write(destination, b"webm-bytes").await?;
            if self.fail {
                return Err(anyhow!("encoder crashed"));
            }
            Ok(())
        }
    }

    fn source_clip() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intro.mp4");
        std::fs::write(&path, b"mp4-bytes").unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_process_uploads_webm_and_cleans_up() {
        let (_dir, path) = source_clip();
        let storage = MemoryStorage::new();
        let encoder = FakeEncoder::default();

        let outcome = process_video(&VideoJob::new(&path, 320), &storage, &encoder, "max-age=60")
            .await
            .unwrap();

        assert_eq!(outcome, VideoOutcome::Uploaded("320/intro.webm".to_string()));
        let stored = storage.get("320/intro.webm").unwrap();
        assert_eq!(&stored.data[..], b"webm-bytes");
        assert_eq!(stored.info.content_type, "video/webm");
        assert_eq!(stored.info.cache_control, "max-age=60");

        let outputs = encoder.outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].1, 320);
        assert!(outputs[0].0.to_string_lossy().ends_with("_intro.webm"));
        assert!(!outputs[0].0.exists());
    }

    #[tokio::test]
    async fn test_existing_artifact_is_skipped() {
        let (_dir, path) = source_clip();
        let storage = MemoryStorage::new();
        storage.insert("320/intro.webm", b"old", "", OffsetDateTime::now_utc());
        let encoder = FakeEncoder::default();

        let outcome = process_video(&VideoJob::new(&path, 320), &storage, &encoder, "").await.unwrap();

        assert_eq!(outcome, VideoOutcome::AlreadyPresent("320/intro.webm".to_string()));
        assert!(encoder.outputs().is_empty());
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_encoding() {
        let storage = MemoryStorage::new();
        let encoder = FakeEncoder::default();

        let result = process_video(&VideoJob::new("/nonexistent/clip.mp4", 320), &storage, &encoder, "").await;

        assert!(result.is_err());
        assert!(encoder.outputs().is_empty());
    }

    #[tokio::test]
    async fn test_encoder_failure_stores_nothing_and_cleans_up() {
        let (_dir, path) = source_clip();
        let storage = MemoryStorage::new();
        let encoder = FakeEncoder::failing();

        let result = process_video(&VideoJob::new(&path, 320), &storage, &encoder, "").await;

        assert!(result.is_err());
        assert_eq!(storage.len(), 0);
        assert!(!encoder.outputs()[0].0.exists());
    }

    #[tokio::test]
    async fn test_consumer_drains_queue_until_cancelled() {
        let (_dir, path) = source_clip();
        let storage = Arc::new(MemoryStorage::new());
        let queue = Arc::new(VideoQueue::new(8));
        queue.enqueue(VideoJob::new(&path, 100));
        queue.enqueue(VideoJob::new(&path, 200));

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_video_consumer(
            queue.clone(),
            storage.clone(),
            Arc::new(FakeEncoder::default()),
            Duration::from_millis(5),
            String::new(),
            token.clone(),
        ));

        for _ in 0..200 {
            if storage.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(storage.get("100/intro.webm").is_some());
        assert!(storage.get("200/intro.webm").is_some());
        assert!(queue.is_empty());

        token.cancel();
        handle.await.unwrap();
    }
}
