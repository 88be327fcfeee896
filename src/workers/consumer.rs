use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::workers::resizer::ResizeWorker;
use anyhow::anyhow;
use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions};
use lapin::types::FieldTable;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Consumes resize jobs from RabbitMQ until the stream ends or `token` is
/// cancelled. Jobs run one at a time and every delivery is acked, failed
/// ones included.
pub async fn start_resize_consumer(
    queue: RabbitMqService,
    queue_name: String,
    worker: Arc<ResizeWorker>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    info!("Starting resize consumer...");

    let channel = queue.get_channel().await;
    let channel_guard = channel.lock().await;

    RabbitMqService::declare_queue(&channel_guard, &queue_name).await?;

    let mut consumer = channel_guard
        .basic_consume(
            &queue_name,
            "resize_worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| anyhow!("Failed to create consumer on '{}': {}", queue_name, e))?;

    // The consumer stream is independent of the channel lock.
    drop(channel_guard);

    info!("Resize consumer listening on '{}'", queue_name);

    loop {
        let delivery = tokio::select! {
            _ = token.cancelled() => break,
            next = consumer.next() => match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    warn!("Consumer delivery error: {}", e);
                    continue;
                }
                None => break,
            },
        };

        match worker.run_payload(&delivery.data).await {
            Ok(key) => info!(key = %key, "Resize job completed"),
            Err(e) => error!("Resize job failed: {}: {}", e, e.root_cause().unwrap_or_default()),
        }

        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            error!("Failed to ack message: {}", e);
        }
    }

    info!("Resize consumer stopped");
    Ok(())
}
