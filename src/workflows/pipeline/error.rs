use super::domain::RunId;
use super::gateway::GatewayError;
use super::repository::RepositoryError;

/// Error raised by the pipeline engine. Every variant maps to a stable wire code.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("run '{received}' is not the latest run (latest is '{latest}')")]
    RunMismatch { latest: RunId, received: RunId },
    #[error("AI service unavailable: {0}")]
    AiUnavailable(String),
    #[error("run '{run_id}' has not finished successfully (status: {status})")]
    AiNotReady { run_id: RunId, status: &'static str },
    #[error("AI result is malformed: {0}")]
    MalformedResult(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PipelineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::NotFound { .. } => "not_found",
            PipelineError::RunMismatch { .. } => "run_mismatch",
            PipelineError::AiUnavailable(_) => "ai_unavailable",
            PipelineError::AiNotReady { .. } => "ai_not_ready",
            PipelineError::MalformedResult(_) => "malformed_result",
            PipelineError::Repository(RepositoryError::NotFound) => "not_found",
            PipelineError::Repository(_) => "storage_error",
        }
    }
}

impl From<GatewayError> for PipelineError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::RunNotFound(run_id) => Self::not_found("run", run_id),
            other => Self::AiUnavailable(other.to_string()),
        }
    }
}
