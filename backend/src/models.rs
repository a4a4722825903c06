use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wellness_aggregation::{BudgetSnapshot, EncryptedMetric, MetricSchema, ReleasedStatistic};
use wellness_zk::circuit::SignalSpec;
use wellness_zk::{CircuitId, WireProof};

#[derive(Debug, Serialize)]
pub struct CircuitInfo {
    pub circuit_id: CircuitId,
    pub schema_version: u32,
    pub public_signal_count: usize,
    pub private_signals: &'static [SignalSpec],
    pub public_inputs: &'static [SignalSpec],
    pub outputs: &'static [&'static str],
    pub constraints: &'static [&'static str],
    pub curve: &'static str,
    pub proof_system: &'static str,
    pub vk_b64: String,
}

#[derive(Debug, Serialize)]
pub struct CircuitsResponse {
    pub circuits: Vec<CircuitInfo>,
}

/// A generated proof as returned to callers: the external wire format plus its timestamp.
///
/// The cache fingerprint is derived from private inputs and stays server-side.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProofResponse {
    #[serde(flatten)]
    pub proof: WireProof,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct BatchItemRequest {
    pub correlation_id: String,
    /// A proof request; parsed per item so one malformed entry fails alone.
    pub request: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<BatchItemRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Ok,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchItemResponse {
    pub correlation_id: String,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub scheme: &'static str,
    pub public_key_hex: String,
    pub key_id: String,
    /// Largest plaintext accepted per field.
    pub max_value: u32,
    pub schema: MetricSchema,
}

#[derive(Debug, Deserialize)]
pub struct SubmitMetricRequest {
    /// Reporting period label, e.g. `2026-10`.
    pub period: String,
    pub metric: EncryptedMetric,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitMetricResponse {
    pub metric_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub period: String,
    pub consumer: String,
    pub epsilon: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub release_id: Uuid,
    pub period: String,
    pub consumer: String,
    pub epoch: u64,
    pub statistics: Vec<ReleasedStatistic>,
    pub budget: BudgetSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BudgetResetResponse {
    pub epoch: u64,
}
