use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{
    AiRun, ApplicationId, ApplicationStageId, Candidate, EvaluationResult, EvidenceRefs, RunId,
    RunKind, RunStatus, ScoreSource, Stage, StageId, StageStatus,
};
use super::error::PipelineError;
use super::gateway::{
    EvaluationGateway, EvaluationRequest, RequirementContext, RunSnapshot, StageContext,
};
use super::ledger::ApplicationStageLedger;
use super::registry::StageRegistry;
use super::repository::{NewRun, PipelineRepository, RunCompletion};
use super::scoring::ScoreAggregator;
use crate::config::PollingConfig;

/// Returned once the collaborator has accepted a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunHandle {
    pub application_stage_id: ApplicationStageId,
    pub run_id: RunId,
    pub status: StageStatus,
}

/// Outcome of applying a run's terminal state to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileResult {
    Succeeded {
        ai_score: f64,
        inserted: usize,
        analysis: String,
    },
    Failed {
        error: Option<String>,
    },
    /// The run was already applied; nothing changed.
    AlreadyReconciled { status: RunStatus },
}

/// Client-side pacing for repeated polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 90,
        }
    }
}

impl From<&PollingConfig> for RetryPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval,
            max_attempts: config.max_attempts,
        }
    }
}

/// Dispatches AI evaluations and folds their results back into the ledger.
///
/// Holds no timers and does no work between calls; pacing belongs to the caller.
pub struct EvaluationRunOrchestrator<R, G> {
    repository: Arc<R>,
    registry: StageRegistry<R>,
    ledger: Arc<ApplicationStageLedger<R>>,
    aggregator: Arc<ScoreAggregator<R>>,
    gateway: Arc<G>,
}

impl<R, G> EvaluationRunOrchestrator<R, G>
where
    R: PipelineRepository + 'static,
    G: EvaluationGateway + 'static,
{
    pub fn new(
        repository: Arc<R>,
        ledger: Arc<ApplicationStageLedger<R>>,
        aggregator: Arc<ScoreAggregator<R>>,
        gateway: Arc<G>,
    ) -> Self {
        let registry = StageRegistry::new(repository.clone());
        Self {
            repository,
            registry,
            ledger,
            aggregator,
            gateway,
        }
    }

    /// Opens the stage, marks it running and hands the evaluation to the collaborator.
    ///
    /// If the collaborator does not accept the request the stage returns to the
    /// status it had before and no run is recorded.
    pub async fn dispatch(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
        evidence: EvidenceRefs,
    ) -> Result<RunHandle, PipelineError> {
        let application = self
            .repository
            .application(application_id)?
            .ok_or_else(|| PipelineError::not_found("application", application_id))?;
        let stage = self.registry.stage(stage_id)?;
        if stage.job_id != application.job_id {
            return Err(PipelineError::Validation(format!(
                "stage '{}' does not belong to job '{}'",
                stage.id, application.job_id
            )));
        }
        let job = self.registry.job(&stage.job_id)?;
        let candidate = self
            .repository
            .candidate(&application.candidate_id)?
            .ok_or_else(|| PipelineError::not_found("candidate", &application.candidate_id))?;

        let evidence = resolve_evidence(evidence, &candidate, &stage);
        if evidence.is_empty() {
            return Err(PipelineError::Validation(format!(
                "no resume, audio, transcript or document available for application '{application_id}'"
            )));
        }
        let request = build_request(application_id, &stage, job.description, evidence);

        let application_stage_id = self.ledger.ensure_open(application_id, stage_id)?;
        let previous = self.ledger.mark_running(application_stage_id)?;

        let accepted = match self.gateway.submit(&request).await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(
                    application_stage_id = %application_stage_id,
                    error = %err,
                    "evaluation dispatch failed, restoring stage status"
                );
                self.ledger.set_status(application_stage_id, previous)?;
                return Err(PipelineError::AiUnavailable(err.to_string()));
            }
        };

        self.repository.insert_run(NewRun {
            run_id: accepted.id.clone(),
            application_stage_id,
            stage_id: stage_id.clone(),
            kind: RunKind::Evaluate,
            status: RunStatus::Running,
            created_at: Utc::now(),
        })?;

        info!(
            application_stage_id = %application_stage_id,
            run_id = %accepted.id,
            "evaluation dispatched"
        );
        Ok(RunHandle {
            application_stage_id,
            run_id: accepted.id,
            status: StageStatus::Running,
        })
    }

    /// Asks the collaborator for the run's current state. Never writes.
    pub async fn poll(&self, run_id: &RunId) -> Result<RunSnapshot, PipelineError> {
        let snapshot = self.gateway.fetch_run(run_id).await?;
        debug!(run_id = %run_id, status = snapshot.status.label(), "polled run");
        Ok(snapshot)
    }

    /// Polls until the run settles or the policy runs out of attempts.
    pub async fn poll_until_settled(
        &self,
        run_id: &RunId,
        policy: RetryPolicy,
    ) -> Result<RunSnapshot, PipelineError> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            let snapshot = self.poll(run_id).await?;
            if snapshot.is_settled() {
                return Ok(snapshot);
            }
            if attempt < attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        warn!(run_id = %run_id, attempts, "run still running after polling budget");
        Err(PipelineError::AiNotReady {
            run_id: run_id.clone(),
            status: RunStatus::Running.label(),
        })
    }

    /// The authoritative run for a ledger row.
    pub fn latest_run(
        &self,
        application_stage_id: ApplicationStageId,
    ) -> Result<Option<AiRun>, PipelineError> {
        self.ledger.get(application_stage_id)?;
        Ok(self.repository.latest_run(application_stage_id)?)
    }

    /// Applies a settled run to the ledger. Only the latest run may be applied,
    /// and applying it twice changes nothing.
    pub async fn reconcile(
        &self,
        application_stage_id: ApplicationStageId,
        run_id: &RunId,
    ) -> Result<ReconcileResult, PipelineError> {
        let row = self.ledger.get(application_stage_id)?;
        let latest = self
            .repository
            .latest_run(application_stage_id)?
            .ok_or_else(|| PipelineError::not_found("run", run_id))?;

        if &latest.run_id != run_id {
            warn!(
                application_stage_id = %application_stage_id,
                run_id = %run_id,
                latest_run_id = %latest.run_id,
                "rejected stale reconcile"
            );
            return Err(PipelineError::RunMismatch {
                latest: latest.run_id,
                received: run_id.clone(),
            });
        }

        if latest.status.is_terminal() {
            debug!(run_id = %run_id, "run already reconciled");
            return Ok(ReconcileResult::AlreadyReconciled {
                status: latest.status,
            });
        }

        let snapshot = self.gateway.fetch_run(run_id).await?;
        match snapshot.status {
            RunStatus::Running => Err(PipelineError::AiNotReady {
                run_id: run_id.clone(),
                status: snapshot.status.label(),
            }),
            RunStatus::Failed => {
                self.ensure_still_latest(application_stage_id, &latest)?;
                let error = snapshot.error;
                self.repository.complete_run(
                    latest.sequence,
                    RunCompletion {
                        status: RunStatus::Failed,
                        result: None,
                        error: error.clone(),
                    },
                )?;
                self.ledger
                    .set_status(application_stage_id, StageStatus::Failed)?;
                warn!(
                    application_stage_id = %application_stage_id,
                    run_id = %run_id,
                    error = error.as_deref().unwrap_or("unknown"),
                    "evaluation run failed"
                );
                Ok(ReconcileResult::Failed { error })
            }
            RunStatus::Succeeded => {
                let result = parse_result(snapshot.result)?;
                self.ensure_still_latest(application_stage_id, &latest)?;
                let drafts = self
                    .aggregator
                    .derive_requirement_scores(&row.stage_id, &result)?;
                let inserted =
                    self.repository
                        .replace_scores(application_stage_id, ScoreSource::Ai, drafts)?;
                let ai_score = result.score;
                let analysis = result.analysis.clone();

                self.repository.complete_run(
                    latest.sequence,
                    RunCompletion {
                        status: RunStatus::Succeeded,
                        result: Some(result),
                        error: None,
                    },
                )?;
                self.ledger
                    .close(application_stage_id, StageStatus::Succeeded)?;

                info!(
                    application_stage_id = %application_stage_id,
                    run_id = %run_id,
                    ai_score,
                    requirement_scores = inserted.len(),
                    "evaluation reconciled"
                );
                Ok(ReconcileResult::Succeeded {
                    ai_score,
                    inserted: inserted.len(),
                    analysis,
                })
            }
        }
    }

    // A dispatch may have landed while the collaborator was being asked.
    fn ensure_still_latest(
        &self,
        application_stage_id: ApplicationStageId,
        expected: &AiRun,
    ) -> Result<(), PipelineError> {
        match self.repository.latest_run(application_stage_id)? {
            Some(current) if current.sequence == expected.sequence => Ok(()),
            Some(current) => {
                warn!(
                    application_stage_id = %application_stage_id,
                    run_id = %expected.run_id,
                    latest_run_id = %current.run_id,
                    "run superseded during reconcile"
                );
                Err(PipelineError::RunMismatch {
                    latest: current.run_id,
                    received: expected.run_id.clone(),
                })
            }
            None => Err(PipelineError::not_found("run", &expected.run_id)),
        }
    }
}

/// Caller's refs win; resume falls back to the candidate's stored resume and
/// document to the stage's attached document.
pub(crate) fn resolve_evidence(
    evidence: EvidenceRefs,
    candidate: &Candidate,
    stage: &Stage,
) -> EvidenceRefs {
    EvidenceRefs {
        resume: evidence.resume.or_else(|| candidate.default_resume.clone()),
        audio: evidence.audio,
        transcript: evidence.transcript,
        document: evidence.document.or_else(|| stage.default_document.clone()),
    }
}

fn build_request(
    application_id: &ApplicationId,
    stage: &Stage,
    job_description: Option<String>,
    evidence: EvidenceRefs,
) -> EvaluationRequest {
    EvaluationRequest {
        stage_id: stage.id.clone(),
        application_id: application_id.clone(),
        resume_ref: evidence.resume,
        audio_ref: evidence.audio,
        transcript_ref: evidence.transcript,
        document_ref: evidence.document,
        stage: StageContext {
            id: stage.id.clone(),
            name: stage.name.clone(),
            threshold: stage.pass_threshold,
            weight: stage.weight,
            description: stage.description.clone(),
            job_description,
        },
        requirements: stage
            .requirements
            .iter()
            .map(|requirement| RequirementContext {
                id: requirement.id.clone(),
                label: requirement.label.clone(),
                weight: requirement.weight,
            })
            .collect(),
    }
}

fn parse_result(payload: Option<serde_json::Value>) -> Result<EvaluationResult, PipelineError> {
    let payload = payload.ok_or_else(|| {
        PipelineError::MalformedResult("succeeded run carries no result".to_string())
    })?;
    serde_json::from_value(payload).map_err(|err| PipelineError::MalformedResult(err.to_string()))
}
