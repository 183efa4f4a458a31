use chrono::{DateTime, Utc};

use super::domain::{
    AiRun, Application, ApplicationId, ApplicationStage, ApplicationStageId, Candidate,
    CandidateId, EvaluationResult, Job, JobId, RequirementScore, RunId, RunKind, RunStatus,
    ScoreDraft, ScoreSource, Stage, StageId, StageStatus,
};

/// Read-only view of the CRUD-owned records the engine consumes.
pub trait CatalogRepository: Send + Sync {
    fn job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;
    fn stage(&self, id: &StageId) -> Result<Option<Stage>, RepositoryError>;
    fn stages_for_job(&self, job_id: &JobId) -> Result<Vec<Stage>, RepositoryError>;
    fn application(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn applications_for_job(&self, job_id: &JobId) -> Result<Vec<Application>, RepositoryError>;
    fn candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, RepositoryError>;
}

/// Storage for `application_stages` rows.
///
/// Implementations must refuse to create or reopen a row while another row for the
/// same `(application_id, stage_id)` pair is open.
pub trait LedgerRepository: Send + Sync {
    fn insert_stage_row(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
        status: StageStatus,
    ) -> Result<ApplicationStage, RepositoryError>;
    fn stage_row(&self, id: ApplicationStageId)
        -> Result<Option<ApplicationStage>, RepositoryError>;
    fn update_stage_row(&self, row: &ApplicationStage) -> Result<(), RepositoryError>;
    fn rows_for_pair(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
    ) -> Result<Vec<ApplicationStage>, RepositoryError>;
    fn rows_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ApplicationStage>, RepositoryError>;
}

/// Storage for `stage_ai_runs` rows.
pub trait RunRepository: Send + Sync {
    fn insert_run(&self, run: NewRun) -> Result<AiRun, RepositoryError>;
    /// The single authoritative run for a ledger row: greatest `(created_at, sequence)`.
    fn latest_run(&self, id: ApplicationStageId) -> Result<Option<AiRun>, RepositoryError>;
    /// Latest run that finished successfully with a stored result.
    fn latest_succeeded_run(&self, id: ApplicationStageId)
        -> Result<Option<AiRun>, RepositoryError>;
    fn complete_run(&self, sequence: u64, completion: RunCompletion)
        -> Result<AiRun, RepositoryError>;
}

/// Storage for `stage_scores` rows.
pub trait ScoreRepository: Send + Sync {
    fn insert_score(
        &self,
        id: ApplicationStageId,
        draft: ScoreDraft,
    ) -> Result<RequirementScore, RepositoryError>;
    /// Drops every score of `source` for the row, then inserts `drafts`.
    fn replace_scores(
        &self,
        id: ApplicationStageId,
        source: ScoreSource,
        drafts: Vec<ScoreDraft>,
    ) -> Result<Vec<RequirementScore>, RepositoryError>;
    fn scores_for(&self, id: ApplicationStageId) -> Result<Vec<RequirementScore>, RepositoryError>;
}

/// Everything the engine needs from persistence.
pub trait PipelineRepository:
    CatalogRepository + LedgerRepository + RunRepository + ScoreRepository
{
}

impl<T> PipelineRepository for T where
    T: CatalogRepository + LedgerRepository + RunRepository + ScoreRepository
{
}

/// Run row as recorded right after the collaborator accepted a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub run_id: RunId,
    pub application_stage_id: ApplicationStageId,
    pub stage_id: StageId,
    pub kind: RunKind,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
}

/// Terminal outcome written back onto a stored run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub result: Option<EvaluationResult>,
    pub error: Option<String>,
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
