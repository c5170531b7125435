//! Wire request/response shapes for every `client_*`/`miner_*`/`operator_*`
//! method. Binary fields (job payloads, results, signatures) travel as
//! base64url-no-pad text, matching [`coordinator_signer::canon`]'s
//! convention for the same bytes once they reach a receipt.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use coordinator_primitives::{Capability, CapabilityRequirement, Job, JobState, Receipt};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ErrorCode};

pub fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| ApiError::new(ErrorCode::InvalidRequest, format!("{field} is not valid base64url: {e}")))
}

pub fn encode_b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Read-only projection of a [`Job`] returned to callers; omits nothing a
/// tenant-scoped caller is not already entitled to see on their own job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobView {
    pub job_id: String,
    pub state: JobState,
    pub attempt_count: u32,
    pub assigned_miner_id: Option<String>,
    pub created_ms: u64,
    pub deadline_ms: u64,
    pub receipt_id: Option<String>,
    pub error_kind: Option<coordinator_primitives::ErrorKind>,
    pub cancel_requested: bool,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            state: job.state,
            attempt_count: job.attempt_count,
            assigned_miner_id: job.assigned_miner_id.map(|m| m.to_string()),
            created_ms: job.created_ms.0,
            deadline_ms: job.deadline_ms.0,
            receipt_id: job.receipt_id.map(|r| r.to_string()),
            error_kind: job.error_kind,
            cancel_requested: job.cancel_requested,
        }
    }
}

/// A job handed to a polling miner, including what it needs to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AssignedJobView {
    pub job_id: String,
    pub attempt: u32,
    pub payload_b64: String,
    pub model: String,
    pub attempt_deadline_ms: Option<u64>,
}

impl From<Job> for AssignedJobView {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            attempt: job.attempt_count,
            payload_b64: encode_b64(&job.payload),
            model: job.capability_requirement.model.clone(),
            attempt_deadline_ms: job.attempt_deadline_ms.map(|t| t.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubmitJobParams {
    pub api_key: String,
    pub model: String,
    pub min_mem_bytes: u64,
    pub region: Option<String>,
    pub required_features: Vec<String>,
    pub payload_b64: String,
    pub max_price: u64,
    pub ttl_ms: Option<u64>,
}

impl SubmitJobParams {
    pub fn requirement(&self) -> CapabilityRequirement {
        CapabilityRequirement {
            model: self.model.clone(),
            min_mem_bytes: self.min_mem_bytes,
            region: self.region.clone(),
            required_features: self.required_features.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SubmitJobResult {
    pub job_id: String,
    pub payment_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobIdParams {
    pub api_key: String,
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListReceiptsParams {
    pub api_key: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MinerRegisterParams {
    pub api_key: String,
    pub public_key_hex: String,
    pub capabilities: Vec<Capability>,
    pub price_per_unit: u64,
    pub max_concurrency: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MinerRegisterResult {
    pub miner_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MinerHeartbeatParams {
    pub api_key: String,
    pub miner_id: String,
    pub nonce_hex: String,
    pub signature_hex: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MinerHeartbeatResult {
    pub acked_ms: u64,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MinerPollParams {
    pub api_key: String,
    pub miner_id: String,
    pub model: Option<String>,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: u32,
    #[serde(default)]
    pub wait_ms: u64,
}

fn default_max_jobs() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MinerJobParams {
    pub api_key: String,
    pub miner_id: String,
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MinerSubmitResultParams {
    pub api_key: String,
    pub miner_id: String,
    pub job_id: String,
    pub attempt: u32,
    pub units_consumed: u64,
    pub result_payload_b64: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MinerSubmitErrorParams {
    pub api_key: String,
    pub miner_id: String,
    pub job_id: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OperatorMinerParams {
    pub api_key: String,
    pub miner_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OperatorStatsParams {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct OperatorStatsResult {
    pub jobs_by_state: Vec<(JobState, usize)>,
    pub miners_by_status: Vec<(coordinator_primitives::MinerStatus, usize)>,
    pub pending_payment_events: usize,
}

pub use Receipt as ReceiptView;
