use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::domain::{
    AiRun, Application, ApplicationId, ApplicationStage, ApplicationStageId, Candidate,
    CandidateId, Job, JobId, Occupancy, RequirementScore, RunStatus, ScoreDraft, ScoreId,
    ScoreSource, Stage, StageId, StageStatus,
};
use super::repository::{
    CatalogRepository, LedgerRepository, NewRun, RepositoryError, RunCompletion, RunRepository,
    ScoreRepository,
};

/// Serializable image of every table the store holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub application_stages: Vec<ApplicationStage>,
    #[serde(default)]
    pub stage_ai_runs: Vec<AiRun>,
    #[serde(default)]
    pub stage_scores: Vec<RequirementScore>,
}

#[derive(Debug, Default)]
struct StoreState {
    jobs: BTreeMap<JobId, Job>,
    stages: BTreeMap<StageId, Stage>,
    candidates: BTreeMap<CandidateId, Candidate>,
    applications: BTreeMap<ApplicationId, Application>,
    rows: BTreeMap<ApplicationStageId, ApplicationStage>,
    runs: Vec<AiRun>,
    scores: Vec<RequirementScore>,
    next_row: u64,
    next_run: u64,
    next_score: u64,
}

impl StoreState {
    fn has_open_row(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
        except: Option<ApplicationStageId>,
    ) -> bool {
        self.rows.values().any(|row| {
            row.is_open()
                && Some(row.id) != except
                && &row.application_id == application_id
                && &row.stage_id == stage_id
        })
    }

    fn push_score(&mut self, id: ApplicationStageId, draft: ScoreDraft) -> RequirementScore {
        self.next_score += 1;
        let score = RequirementScore {
            id: ScoreId(self.next_score),
            application_stage_id: id,
            requirement_id: draft.requirement_id,
            source: draft.source,
            value: draft.value,
            created_at: Utc::now(),
        };
        self.scores.push(score.clone());
        score
    }
}

/// Mutex-guarded in-memory implementation of every repository port.
#[derive(Debug, Default)]
pub struct MemoryPipelineStore {
    state: Mutex<StoreState>,
}

impl MemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a snapshot, rejecting images with two open rows for one pair.
    pub fn from_snapshot(snapshot: PipelineSnapshot) -> Result<Self, RepositoryError> {
        let mut state = StoreState::default();

        for job in snapshot.jobs {
            state.jobs.insert(job.id.clone(), job);
        }
        for stage in snapshot.stages {
            state.stages.insert(stage.id.clone(), stage);
        }
        for candidate in snapshot.candidates {
            state.candidates.insert(candidate.id.clone(), candidate);
        }
        for application in snapshot.applications {
            state
                .applications
                .insert(application.id.clone(), application);
        }
        for row in snapshot.application_stages {
            if row.is_open() && state.has_open_row(&row.application_id, &row.stage_id, None) {
                return Err(RepositoryError::Conflict);
            }
            state.next_row = state.next_row.max(row.id.0);
            state.rows.insert(row.id, row);
        }

        state.next_run = snapshot
            .stage_ai_runs
            .iter()
            .map(|run| run.sequence)
            .max()
            .unwrap_or(0);
        state.runs = snapshot.stage_ai_runs;
        state.next_score = snapshot
            .stage_scores
            .iter()
            .map(|score| score.id.0)
            .max()
            .unwrap_or(0);
        state.scores = snapshot.stage_scores;

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    pub fn snapshot(&self) -> Result<PipelineSnapshot, RepositoryError> {
        let state = self.lock()?;
        Ok(PipelineSnapshot {
            jobs: state.jobs.values().cloned().collect(),
            stages: state.stages.values().cloned().collect(),
            candidates: state.candidates.values().cloned().collect(),
            applications: state.applications.values().cloned().collect(),
            application_stages: state.rows.values().cloned().collect(),
            stage_ai_runs: state.runs.clone(),
            stage_scores: state.scores.clone(),
        })
    }

    pub fn insert_job(&self, job: Job) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.jobs.contains_key(&job.id) {
            return Err(RepositoryError::Conflict);
        }
        state.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    pub fn insert_stage(&self, stage: Stage) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.stages.contains_key(&stage.id) {
            return Err(RepositoryError::Conflict);
        }
        state.stages.insert(stage.id.clone(), stage);
        Ok(())
    }

    pub fn insert_candidate(&self, candidate: Candidate) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.candidates.contains_key(&candidate.id) {
            return Err(RepositoryError::Conflict);
        }
        state.candidates.insert(candidate.id.clone(), candidate);
        Ok(())
    }

    pub fn insert_application(&self, application: Application) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .applications
            .insert(application.id.clone(), application);
        Ok(())
    }

    /// Every run stored for a ledger row, oldest first.
    pub fn runs_for(&self, id: ApplicationStageId) -> Result<Vec<AiRun>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .runs
            .iter()
            .filter(|run| run.application_stage_id == id)
            .cloned()
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl CatalogRepository for MemoryPipelineStore {
    fn job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    fn stage(&self, id: &StageId) -> Result<Option<Stage>, RepositoryError> {
        Ok(self.lock()?.stages.get(id).cloned())
    }

    fn stages_for_job(&self, job_id: &JobId) -> Result<Vec<Stage>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .stages
            .values()
            .filter(|stage| &stage.job_id == job_id)
            .cloned()
            .collect())
    }

    fn application(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.lock()?.applications.get(id).cloned())
    }

    fn applications_for_job(&self, job_id: &JobId) -> Result<Vec<Application>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .applications
            .values()
            .filter(|application| &application.job_id == job_id)
            .cloned()
            .collect())
    }

    fn candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, RepositoryError> {
        Ok(self.lock()?.candidates.get(id).cloned())
    }
}

impl LedgerRepository for MemoryPipelineStore {
    fn insert_stage_row(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
        status: StageStatus,
    ) -> Result<ApplicationStage, RepositoryError> {
        let mut state = self.lock()?;
        if state.has_open_row(application_id, stage_id, None) {
            return Err(RepositoryError::Conflict);
        }
        state.next_row += 1;
        let row = ApplicationStage {
            id: ApplicationStageId(state.next_row),
            application_id: application_id.clone(),
            stage_id: stage_id.clone(),
            status,
            occupancy: Occupancy::Open,
        };
        state.rows.insert(row.id, row.clone());
        Ok(row)
    }

    fn stage_row(
        &self,
        id: ApplicationStageId,
    ) -> Result<Option<ApplicationStage>, RepositoryError> {
        Ok(self.lock()?.rows.get(&id).cloned())
    }

    fn update_stage_row(&self, row: &ApplicationStage) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if !state.rows.contains_key(&row.id) {
            return Err(RepositoryError::NotFound);
        }
        if row.is_open() && state.has_open_row(&row.application_id, &row.stage_id, Some(row.id)) {
            return Err(RepositoryError::Conflict);
        }
        state.rows.insert(row.id, row.clone());
        Ok(())
    }

    fn rows_for_pair(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
    ) -> Result<Vec<ApplicationStage>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .rows
            .values()
            .filter(|row| &row.application_id == application_id && &row.stage_id == stage_id)
            .cloned()
            .collect())
    }

    fn rows_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ApplicationStage>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .rows
            .values()
            .filter(|row| &row.application_id == application_id)
            .cloned()
            .collect())
    }
}

impl RunRepository for MemoryPipelineStore {
    fn insert_run(&self, run: NewRun) -> Result<AiRun, RepositoryError> {
        let mut state = self.lock()?;
        if !state.rows.contains_key(&run.application_stage_id) {
            return Err(RepositoryError::NotFound);
        }
        state.next_run += 1;
        let stored = AiRun {
            sequence: state.next_run,
            run_id: run.run_id,
            application_stage_id: run.application_stage_id,
            stage_id: run.stage_id,
            kind: run.kind,
            status: run.status,
            result: None,
            error: None,
            created_at: run.created_at,
        };
        state.runs.push(stored.clone());
        Ok(stored)
    }

    fn latest_run(&self, id: ApplicationStageId) -> Result<Option<AiRun>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .runs
            .iter()
            .filter(|run| run.application_stage_id == id)
            .max_by_key(|run| (run.created_at, run.sequence))
            .cloned())
    }

    fn latest_succeeded_run(
        &self,
        id: ApplicationStageId,
    ) -> Result<Option<AiRun>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .runs
            .iter()
            .filter(|run| {
                run.application_stage_id == id
                    && run.status == RunStatus::Succeeded
                    && run.result.is_some()
            })
            .max_by_key(|run| (run.created_at, run.sequence))
            .cloned())
    }

    fn complete_run(
        &self,
        sequence: u64,
        completion: RunCompletion,
    ) -> Result<AiRun, RepositoryError> {
        let mut state = self.lock()?;
        let run = state
            .runs
            .iter_mut()
            .find(|run| run.sequence == sequence)
            .ok_or(RepositoryError::NotFound)?;
        run.status = completion.status;
        run.result = completion.result;
        run.error = completion.error;
        Ok(run.clone())
    }
}

impl ScoreRepository for MemoryPipelineStore {
    fn insert_score(
        &self,
        id: ApplicationStageId,
        draft: ScoreDraft,
    ) -> Result<RequirementScore, RepositoryError> {
        let mut state = self.lock()?;
        if !state.rows.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        Ok(state.push_score(id, draft))
    }

    fn replace_scores(
        &self,
        id: ApplicationStageId,
        source: ScoreSource,
        drafts: Vec<ScoreDraft>,
    ) -> Result<Vec<RequirementScore>, RepositoryError> {
        let mut state = self.lock()?;
        if !state.rows.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        state
            .scores
            .retain(|score| !(score.application_stage_id == id && score.source == source));
        Ok(drafts
            .into_iter()
            .map(|draft| state.push_score(id, draft))
            .collect())
    }

    fn scores_for(&self, id: ApplicationStageId) -> Result<Vec<RequirementScore>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .scores
            .iter()
            .filter(|score| score.application_stage_id == id)
            .cloned()
            .collect())
    }
}
