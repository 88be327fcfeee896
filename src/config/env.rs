use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    StorageBackend,
    LocalStorageDir,
    PublicHost,
    S3Endpoint,
    S3Bucket,
    S3Region,
    S3AccessKey,
    S3SecretKey,
    DispatchMode,
    Publisher,
    RabbitMqUrl,
    ResizeQueue,
    RunResizeConsumer,
    WorkerPoolSize,
    WorkerPoolCapacity,
    AllowedHosts,
    DefaultCacheControl,
    ClearCode,
    KeyPrefix,
    AssetDir,
    FetchTimeoutSecs,
    MaxSourceBytes,
    S3PublicRead,
    VideoQueueCapacity,
    VideoPollIntervalMs,
    FfmpegBin,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::StorageBackend => "STORAGE_BACKEND",
            EnvKey::LocalStorageDir => "LOCAL_STORAGE_DIR",
            EnvKey::PublicHost => "PUBLIC_HOST",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::S3Bucket => "S3_BUCKET",
            EnvKey::S3Region => "S3_REGION",
            EnvKey::S3AccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::S3SecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::DispatchMode => "DISPATCH_MODE",
            EnvKey::Publisher => "PUBLISHER",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::ResizeQueue => "RESIZE_QUEUE",
            EnvKey::RunResizeConsumer => "RUN_RESIZE_CONSUMER",
            EnvKey::WorkerPoolSize => "WORKER_POOL_SIZE",
            EnvKey::WorkerPoolCapacity => "WORKER_POOL_CAPACITY",
            EnvKey::AllowedHosts => "ALLOWED_HOSTS",
            EnvKey::DefaultCacheControl => "DEFAULT_CACHE_CONTROL",
            EnvKey::ClearCode => "CLEAR_CODE",
            EnvKey::KeyPrefix => "KEY_PREFIX",
            EnvKey::AssetDir => "ASSET_DIR",
            EnvKey::FetchTimeoutSecs => "FETCH_TIMEOUT_SECS",
            EnvKey::MaxSourceBytes => "MAX_SOURCE_BYTES",
            EnvKey::S3PublicRead => "S3_PUBLIC_READ",
            EnvKey::VideoQueueCapacity => "VIDEO_QUEUE_CAPACITY",
            EnvKey::VideoPollIntervalMs => "VIDEO_POLL_INTERVAL_MS",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

/// Like `get`, but a blank value counts as unset.
pub fn get_opt(key: EnvKey) -> Option<String> {
    get(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
