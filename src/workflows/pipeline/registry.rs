use std::sync::Arc;

use super::domain::{Job, JobId, Requirement, Stage, StageId};
use super::error::PipelineError;
use super::repository::CatalogRepository;

/// Read-only view over a job's ordered stages.
pub struct StageRegistry<R> {
    catalog: Arc<R>,
}

impl<R> Clone for StageRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
        }
    }
}

impl<R> StageRegistry<R>
where
    R: CatalogRepository,
{
    pub fn new(catalog: Arc<R>) -> Self {
        Self { catalog }
    }

    pub fn job(&self, job_id: &JobId) -> Result<Job, PipelineError> {
        self.catalog
            .job(job_id)?
            .ok_or_else(|| PipelineError::not_found("job", job_id))
    }

    pub fn stage(&self, stage_id: &StageId) -> Result<Stage, PipelineError> {
        self.catalog
            .stage(stage_id)?
            .ok_or_else(|| PipelineError::not_found("stage", stage_id))
    }

    /// Stages of a job in pipeline order. Ties on `order_index` fall back to the stage id.
    pub fn stages_for_job(&self, job_id: &JobId) -> Result<Vec<Stage>, PipelineError> {
        let mut stages = self.catalog.stages_for_job(job_id)?;
        stages.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        Ok(stages)
    }

    /// Entry stage used when an application joins the pipeline.
    pub fn first_stage(&self, job_id: &JobId) -> Result<Stage, PipelineError> {
        self.stages_for_job(job_id)?.into_iter().next().ok_or_else(|| {
            PipelineError::Validation(format!("job '{job_id}' has no stages configured"))
        })
    }

    pub fn requirements(&self, stage_id: &StageId) -> Result<Vec<Requirement>, PipelineError> {
        Ok(self.stage(stage_id)?.requirements)
    }

    /// Confirms `destination` belongs to the same job as `source`.
    pub fn ensure_same_job(&self, source: &Stage, destination: &Stage) -> Result<(), PipelineError> {
        if source.job_id == destination.job_id {
            Ok(())
        } else {
            Err(PipelineError::Validation(format!(
                "stage '{}' belongs to job '{}', not job '{}'",
                destination.id, destination.job_id, source.job_id
            )))
        }
    }
}
