use crate::config::settings::{AppConfig, DispatchMode, PublisherKind, StorageSettings};
use crate::infrastructure::queue::pool::WorkerPool;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::queue::Publisher;
use crate::infrastructure::source::client::SourceClient;
use crate::infrastructure::storage::local::LocalStorage;
use crate::infrastructure::storage::s3::S3Storage;
use crate::infrastructure::storage::Storage;
use crate::modules::delivery::service::{DispatchStrategy, Dispatcher};
use crate::modules::video::queue::VideoQueue;
use crate::state::AppState;
use crate::workers::resizer::ResizeWorker;
use crate::workers::transcoder::{run_video_consumer, FfmpegEncoder};
use axum::Router;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub fn create_app(state: AppState) -> Router {
    crate::routes::configure_routes(&state)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the backends selected by `config` and starts the background
/// tasks. Every returned handle finishes once `token` is cancelled.
pub async fn build_state(
    config: AppConfig,
    token: &CancellationToken,
) -> anyhow::Result<(AppState, Vec<JoinHandle<()>>)> {
    let storage: Arc<dyn Storage> = match &config.storage {
        StorageSettings::Local { root, public_host } => Arc::new(LocalStorage::new(root.clone(), public_host)),
        StorageSettings::S3 {
            endpoint,
            bucket,
            region,
            access_key,
            secret_key,
            public_host,
            public_read,
        } => Arc::new(S3Storage::new(
            endpoint.as_deref(),
            bucket,
            region,
            access_key,
            secret_key,
            public_host.as_deref(),
            *public_read,
        )),
    };

    let fetcher = Arc::new(
        SourceClient::new(
            config.fetch_timeout,
            config.delivery.asset_dir.clone(),
            config.delivery.allow_list.clone(),
        )?
        .with_body_limit(config.max_source_bytes),
    );
    let worker = Arc::new(
        ResizeWorker::new(storage.clone(), fetcher, config.delivery.default_cache_control.clone())
            .with_allow_list(config.delivery.allow_list.clone()),
    );

    if config.delivery.allow_list.is_empty() {
        warn!("ALLOWED_HOSTS is empty, every source host is permitted");
    }

    let mut handles = Vec::new();

    let rabbitmq = match &config.queue.rabbitmq_url {
        Some(url) if config.queue.publisher == PublisherKind::RabbitMq || config.queue.run_resize_consumer => {
            Some(RabbitMqService::new(url).await?)
        }
        _ => None,
    };

    let strategy = match config.delivery.dispatch_mode {
        DispatchMode::Sync => DispatchStrategy::Inline,
        DispatchMode::Async => {
            let publisher: Arc<dyn Publisher> = match (&config.queue.publisher, &rabbitmq) {
                (PublisherKind::RabbitMq, Some(queue)) => Arc::new(queue.clone()),
                _ => {
                    let (pool, pool_handles) = WorkerPool::start(
                        config.queue.worker_pool_size,
                        config.queue.worker_pool_capacity,
                        worker.clone(),
                        token.clone(),
                    );
                    handles.extend(pool_handles);
                    Arc::new(pool)
                }
            };
            DispatchStrategy::Queued(publisher)
        }
    };

    if let (true, Some(queue)) = (config.queue.run_resize_consumer, &rabbitmq) {
        let consumer = crate::workers::consumer::start_resize_consumer(
            queue.clone(),
            config.delivery.resize_topic.clone(),
            worker.clone(),
            token.clone(),
        );
        handles.push(tokio::spawn(async move {
            if let Err(e) = consumer.await {
                error!("Resize consumer failed: {:#}", e);
            }
        }));
    }

    let videos = Arc::new(VideoQueue::new(config.video.queue_capacity));
    handles.push(tokio::spawn(run_video_consumer(
        videos.clone(),
        storage.clone(),
        Arc::new(FfmpegEncoder::new(config.video.ffmpeg_bin.clone())),
        config.video.poll_interval,
        config.delivery.default_cache_control.clone(),
        token.clone(),
    )));

    let dispatcher = Arc::new(Dispatcher::new(
        config.delivery.clone(),
        storage.clone(),
        worker.clone(),
        strategy,
        videos,
    ));

    info!(
        mode = ?config.delivery.dispatch_mode,
        background_tasks = handles.len(),
        "Application state ready"
    );

    Ok((AppState::new(config, storage, dispatcher, worker), handles))
}
