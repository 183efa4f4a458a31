//! Candidate pipeline state and scoring engine.
//!
//! Applications occupy ordered job stages through ledger rows, stage evaluations
//! are delegated to an external AI service and reconciled back as requirement
//! scores, and those scores roll up into stage aggregates and job rankings.

pub mod domain;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod orchestrator;
pub mod registry;
pub mod repository;
pub mod scoring;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    AiRun, Application, ApplicationId, ApplicationStage, ApplicationStageId, Candidate,
    CandidateId, EvaluationResult, EvidenceRefs, Job, JobId, Occupancy, Requirement,
    RequirementId, RequirementScore, RunId, RunStatus, ScoreSource, Stage, StageId, StageStatus,
};
pub use error::PipelineError;
pub use gateway::{
    EvaluationGateway, EvaluationRequest, GatewayError, HttpEvaluationGateway, RunAccepted,
    RunSnapshot,
};
pub use ledger::{ApplicationStageLedger, MoveSummary, OpenOutcome};
pub use orchestrator::{EvaluationRunOrchestrator, ReconcileResult, RetryPolicy, RunHandle};
pub use registry::StageRegistry;
pub use repository::{PipelineRepository, RepositoryError};
pub use scoring::{RankingEntry, ScoreAggregator};
pub use service::HiringPipeline;
pub use store::{MemoryPipelineStore, PipelineSnapshot};
