use async_trait::async_trait;

pub mod pool;
pub mod rabbitmq;

/// Delivers serialized jobs to a topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> anyhow::Result<()>;
}
