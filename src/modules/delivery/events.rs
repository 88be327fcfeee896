use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de, Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Payload published to the resize queue.
///
/// Derived values (hash, key) are not sent; the receiving worker
/// recomputes them from these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransformJob {
    pub location: String,
    pub width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub prefix: String,
}

/// Push envelope used by message buses that deliver over HTTP.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// The bus carries `data` as base64 encoded JSON.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PushMessage {
    #[serde(deserialize_with = "decode_job")]
    #[schema(value_type = String, format = Byte)]
    pub data: TransformJob,
    #[serde(default, rename = "messageId", alias = "message_id")]
    pub id: Option<String>,
}

fn decode_job<'de, D>(deserializer: D) -> Result<TransformJob, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    let raw = STANDARD.decode(encoded.trim()).map_err(de::Error::custom)?;
    serde_json::from_slice(&raw).map_err(de::Error::custom)
}

/// Body accepted by the worker ingress.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IngressPayload {
    Envelope(PushEnvelope),
    Job(TransformJob),
}

impl IngressPayload {
    pub fn into_job(self) -> TransformJob {
        match self {
            IngressPayload::Envelope(envelope) => envelope.message.data,
            IngressPayload::Job(job) => job,
        }
    }
}
