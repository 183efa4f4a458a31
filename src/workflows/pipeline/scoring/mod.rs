mod heuristics;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::domain::{
    ApplicationId, ApplicationStage, ApplicationStageId, CandidateId, EvaluationResult, JobId,
    RequirementId, RequirementScore, ScoreDraft, ScoreSource, StageId,
};
use super::error::PipelineError;
use super::registry::StageRegistry;
use super::repository::{CatalogRepository, LedgerRepository, RunRepository, ScoreRepository};

pub(crate) use heuristics::clamp_score;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSummary {
    pub id: CandidateId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub title: String,
}

/// One row of a job ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub application_id: ApplicationId,
    pub candidate: CandidateSummary,
    pub job: JobSummary,
    pub current_stage_name: String,
    pub average_score: f64,
}

/// Turns AI results and manual scores into stage aggregates and job rankings.
pub struct ScoreAggregator<R> {
    repository: Arc<R>,
    registry: StageRegistry<R>,
    ranking_limit: usize,
}

impl<R> ScoreAggregator<R>
where
    R: CatalogRepository + LedgerRepository + RunRepository + ScoreRepository,
{
    pub fn new(repository: Arc<R>, ranking_limit: usize) -> Self {
        let registry = StageRegistry::new(repository.clone());
        Self {
            repository,
            registry,
            ranking_limit,
        }
    }

    pub fn ranking_limit(&self) -> usize {
        self.ranking_limit
    }

    /// Spreads one holistic AI score across the stage's requirements.
    pub fn derive_requirement_scores(
        &self,
        stage_id: &StageId,
        result: &EvaluationResult,
    ) -> Result<Vec<ScoreDraft>, PipelineError> {
        let requirements = self.registry.requirements(stage_id)?;
        Ok(heuristics::derive_scores(&requirements, result))
    }

    pub fn record_manual_score(
        &self,
        application_stage_id: ApplicationStageId,
        requirement_id: &RequirementId,
        value: f64,
    ) -> Result<RequirementScore, PipelineError> {
        if !value.is_finite() || !(0.0..=heuristics::MAX_SCORE).contains(&value) {
            return Err(PipelineError::Validation(format!(
                "score {value} is outside the 0-10 scale"
            )));
        }

        let row = self.row(application_stage_id)?;
        let requirements = self.registry.requirements(&row.stage_id)?;
        if !requirements.iter().any(|requirement| &requirement.id == requirement_id) {
            return Err(PipelineError::Validation(format!(
                "requirement '{requirement_id}' is not configured on stage '{}'",
                row.stage_id
            )));
        }

        let score = self.repository.insert_score(
            application_stage_id,
            ScoreDraft {
                requirement_id: requirement_id.clone(),
                source: ScoreSource::Manual,
                value,
            },
        )?;
        info!(
            application_stage_id = %application_stage_id,
            requirement_id = %requirement_id,
            value,
            "manual requirement score recorded"
        );
        Ok(score)
    }

    /// Stage-level score on the 0-10 scale.
    ///
    /// Requirement scores take precedence; without any, the latest successful AI
    /// run's score is used. `None` means the stage has no evidence at all.
    pub fn stage_aggregate(
        &self,
        application_stage_id: ApplicationStageId,
    ) -> Result<Option<f64>, PipelineError> {
        let scores = self.repository.scores_for(application_stage_id)?;
        let values = effective_values(&scores);
        if let Some(aggregate) = heuristics::mean_rescaled(&values) {
            return Ok(Some(clamp_score(aggregate)));
        }

        Ok(self
            .repository
            .latest_succeeded_run(application_stage_id)?
            .and_then(|run| run.result)
            .map(|result| clamp_score(result.score)))
    }

    pub fn job_ranking(&self, job_id: &JobId) -> Result<Vec<RankingEntry>, PipelineError> {
        self.job_ranking_with_limit(job_id, self.ranking_limit)
    }

    /// Weighted roll-up of stage aggregates per application, best first.
    pub fn job_ranking_with_limit(
        &self,
        job_id: &JobId,
        limit: usize,
    ) -> Result<Vec<RankingEntry>, PipelineError> {
        let job = self.registry.job(job_id)?;
        let stages = self.registry.stages_for_job(job_id)?;
        let applications = self.repository.applications_for_job(job_id)?;

        let mut entries = Vec::new();
        for application in applications {
            let Some(candidate) = self.repository.candidate(&application.candidate_id)? else {
                debug!(application_id = %application.id, "skipping application without candidate");
                continue;
            };

            let rows = self.repository.rows_for_application(&application.id)?;
            let mut total_weighted = 0.0;
            let mut total_weight = 0.0;
            let mut current_stage_name = stages.first().map(|stage| stage.name.clone());

            for stage in &stages {
                let Some(row) = representative_row(&rows, &stage.id) else {
                    continue;
                };
                let score = self.stage_aggregate(row.id)?.unwrap_or(0.0);
                if score > 0.0 {
                    current_stage_name = Some(stage.name.clone());
                }
                total_weighted += score * stage.weight;
                total_weight += stage.weight;
            }

            let average_score = if total_weight > 0.0 {
                total_weighted / total_weight
            } else {
                0.0
            };
            if average_score == 0.0 {
                continue;
            }

            entries.push(RankingEntry {
                application_id: application.id,
                candidate: CandidateSummary {
                    id: candidate.id,
                    name: candidate.name,
                    email: candidate.email,
                },
                job: JobSummary {
                    id: job.id.clone(),
                    title: job.title.clone(),
                },
                current_stage_name: current_stage_name.unwrap_or_default(),
                average_score,
            });
        }

        entries.sort_by(|a, b| {
            b.average_score
                .total_cmp(&a.average_score)
                .then_with(|| a.application_id.cmp(&b.application_id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    fn row(&self, id: ApplicationStageId) -> Result<ApplicationStage, PipelineError> {
        self.repository
            .stage_row(id)?
            .ok_or_else(|| PipelineError::not_found("application stage", id))
    }
}

/// The open row for the stage, or the most recent closed one.
fn representative_row<'a>(
    rows: &'a [ApplicationStage],
    stage_id: &StageId,
) -> Option<&'a ApplicationStage> {
    let for_stage = rows.iter().filter(|row| &row.stage_id == stage_id);
    for_stage
        .clone()
        .find(|row| row.is_open())
        .or_else(|| for_stage.max_by_key(|row| row.id))
}

/// One value per requirement: latest manual score, else latest AI score.
fn effective_values(scores: &[RequirementScore]) -> Vec<f64> {
    let mut chosen: HashMap<&RequirementId, &RequirementScore> = HashMap::new();
    for score in scores {
        let replace = chosen
            .get(&score.requirement_id)
            .map_or(true, |current| supersedes(score, current));
        if replace {
            chosen.insert(&score.requirement_id, score);
        }
    }
    chosen.values().map(|score| score.value).collect()
}

fn supersedes(candidate: &RequirementScore, current: &RequirementScore) -> bool {
    match (candidate.source, current.source) {
        (ScoreSource::Manual, ScoreSource::Ai) => true,
        (ScoreSource::Ai, ScoreSource::Manual) => false,
        _ => (candidate.created_at, candidate.id) > (current.created_at, current.id),
    }
}
