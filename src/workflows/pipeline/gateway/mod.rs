//! Boundary to the external AI scoring service.
//!
//! The service accepts an evaluation request, answers with an opaque run id and
//! later exposes the run's status and result. Nothing here retries or schedules
//! work; callers decide when to ask again.

mod http;

pub use http::HttpEvaluationGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{ApplicationId, RequirementId, RunId, RunStatus, StageId};

/// Payload for `POST /evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub stage_id: StageId,
    pub application_id: ApplicationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<String>,
    pub stage: StageContext,
    pub requirements: Vec<RequirementContext>,
}

/// Stage description handed to the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageContext {
    pub id: StageId,
    pub name: String,
    pub threshold: f64,
    pub weight: f64,
    pub description: Option<String>,
    pub job_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementContext {
    pub id: RequirementId,
    pub label: String,
    pub weight: f64,
}

/// Response of an accepted dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAccepted {
    pub id: RunId,
}

/// Current state of a run as the collaborator reports it.
///
/// `result` stays untyped here; the orchestrator validates it during reconcile so a
/// malformed payload fails that step instead of the poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde(default)]
    pub id: Option<RunId>,
    pub status: RunStatus,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

impl RunSnapshot {
    pub const fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Port implemented by HTTP adapters and test doubles.
#[async_trait]
pub trait EvaluationGateway: Send + Sync {
    async fn submit(&self, request: &EvaluationRequest) -> Result<RunAccepted, GatewayError>;
    async fn fetch_run(&self, run_id: &RunId) -> Result<RunSnapshot, GatewayError>;
}

/// Transport-level failures talking to the collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("AI service unreachable: {0}")]
    Unreachable(String),
    #[error("AI service responded with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("run '{0}' not found on AI service")]
    RunNotFound(RunId),
    #[error("could not decode AI service response: {0}")]
    Decode(String),
}
