use crate::config::env::{self, EnvKey};
use crate::infrastructure::source::client::DEFAULT_BODY_LIMIT;
use crate::modules::delivery::allowlist::HostAllowList;
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RESIZE_QUEUE: &str = "asset-delivery-resize";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// Transform inside the request and redirect to the result.
    Sync,
    /// Publish a job and redirect to the source until the artifact exists.
    Async,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublisherKind {
    Local,
    RabbitMq,
}

#[derive(Clone, Debug)]
pub enum StorageSettings {
    Local {
        root: PathBuf,
        public_host: String,
    },
    S3 {
        endpoint: Option<String>,
        bucket: String,
        region: String,
        access_key: String,
        secret_key: String,
        public_host: Option<String>,
        /// Upload objects with the `public-read` canned ACL. Leave off for
        /// buckets whose policy already grants public reads.
        public_read: bool,
    },
}

/// Everything the dispatcher needs to decide how a request is served.
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    pub key_prefix: String,
    pub allow_list: HostAllowList,
    pub default_cache_control: String,
    pub clear_code: Option<String>,
    pub dispatch_mode: DispatchMode,
    pub asset_dir: Option<PathBuf>,
    pub resize_topic: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            key_prefix: "resized".to_string(),
            allow_list: HostAllowList::default(),
            default_cache_control: String::new(),
            clear_code: None,
            dispatch_mode: DispatchMode::Sync,
            asset_dir: None,
            resize_topic: DEFAULT_RESIZE_QUEUE.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueSettings {
    pub publisher: PublisherKind,
    pub rabbitmq_url: Option<String>,
    pub run_resize_consumer: bool,
    pub worker_pool_size: usize,
    pub worker_pool_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct VideoSettings {
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    pub ffmpeg_bin: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub fetch_timeout: Duration,
    pub max_source_bytes: usize,
    pub storage: StorageSettings,
    pub queue: QueueSettings,
    pub delivery: DeliveryConfig,
    pub video: VideoSettings,
}

impl AppConfig {
    pub fn new() -> Result<Self> {
        let server_port = env::get_parsed(EnvKey::ServerPort, 3000);

        let storage = match env::get_or(EnvKey::StorageBackend, "local").to_lowercase().as_str() {
            "local" => StorageSettings::Local {
                root: PathBuf::from(env::get_or(EnvKey::LocalStorageDir, "./cache")),
                public_host: env::get_opt(EnvKey::PublicHost)
                    .unwrap_or_else(|| format!("http://localhost:{}/cache", server_port)),
            },
            "s3" => StorageSettings::S3 {
                endpoint: env::get_opt(EnvKey::S3Endpoint),
                bucket: env::get(EnvKey::S3Bucket).map_err(|_| anyhow!("S3_BUCKET is required"))?,
                region: env::get_or(EnvKey::S3Region, "us-east-1"),
                access_key: env::get(EnvKey::S3AccessKey)
                    .map_err(|_| anyhow!("AWS_ACCESS_KEY_ID is required"))?,
                secret_key: env::get(EnvKey::S3SecretKey)
                    .map_err(|_| anyhow!("AWS_SECRET_ACCESS_KEY is required"))?,
                public_host: env::get_opt(EnvKey::PublicHost),
                public_read: env::get_parsed(EnvKey::S3PublicRead, false),
            },
            other => return Err(anyhow!("Unknown STORAGE_BACKEND '{}'", other)),
        };

        let dispatch_mode = match env::get_or(EnvKey::DispatchMode, "sync").to_lowercase().as_str() {
            "sync" => DispatchMode::Sync,
            "async" => DispatchMode::Async,
            other => return Err(anyhow!("Unknown DISPATCH_MODE '{}'", other)),
        };

        let publisher = match env::get_or(EnvKey::Publisher, "local").to_lowercase().as_str() {
            "local" => PublisherKind::Local,
            "rabbitmq" => PublisherKind::RabbitMq,
            other => return Err(anyhow!("Unknown PUBLISHER '{}'", other)),
        };
        let rabbitmq_url = env::get_opt(EnvKey::RabbitMqUrl);
        let run_resize_consumer = env::get_parsed(EnvKey::RunResizeConsumer, false);
        if (publisher == PublisherKind::RabbitMq || run_resize_consumer) && rabbitmq_url.is_none() {
            return Err(anyhow!("RABBITMQ_URL is required for the rabbitmq publisher or consumer"));
        }

        let allowed_hosts = env::get_or(EnvKey::AllowedHosts, "");

        Ok(Self {
            server_port,
            fetch_timeout: Duration::from_secs(env::get_parsed(EnvKey::FetchTimeoutSecs, 5)),
            max_source_bytes: env::get_parsed(EnvKey::MaxSourceBytes, DEFAULT_BODY_LIMIT).max(1),
            storage,
            queue: QueueSettings {
                publisher,
                rabbitmq_url,
                run_resize_consumer,
                worker_pool_size: env::get_parsed(EnvKey::WorkerPoolSize, 2usize).max(1),
                worker_pool_capacity: env::get_parsed(EnvKey::WorkerPoolCapacity, 64usize).max(1),
            },
            delivery: DeliveryConfig {
                key_prefix: env::get_or(EnvKey::KeyPrefix, "resized"),
                allow_list: HostAllowList::new(allowed_hosts.split(',')),
                default_cache_control: env::get_or(EnvKey::DefaultCacheControl, ""),
                clear_code: env::get_opt(EnvKey::ClearCode),
                dispatch_mode,
                asset_dir: env::get_opt(EnvKey::AssetDir).map(PathBuf::from),
                resize_topic: env::get_or(EnvKey::ResizeQueue, DEFAULT_RESIZE_QUEUE),
            },
            video: VideoSettings {
                queue_capacity: env::get_parsed(EnvKey::VideoQueueCapacity, 256usize).max(1),
                poll_interval: Duration::from_millis(env::get_parsed(EnvKey::VideoPollIntervalMs, 1000u64).max(1)),
                ffmpeg_bin: env::get_or(EnvKey::FfmpegBin, "ffmpeg"),
            },
        })
    }
}
