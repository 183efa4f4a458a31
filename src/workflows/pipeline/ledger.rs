use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::domain::{
    ApplicationId, ApplicationStage, ApplicationStageId, Occupancy, Stage, StageId, StageStatus,
};
use super::error::PipelineError;
use super::registry::StageRegistry;
use super::repository::{CatalogRepository, LedgerRepository, RepositoryError};

/// How a ledger row came to be open for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "application_stage_id", rename_all = "snake_case")]
pub enum OpenOutcome {
    AlreadyOpen(ApplicationStageId),
    Reopened(ApplicationStageId),
    Inserted(ApplicationStageId),
}

impl OpenOutcome {
    pub const fn id(self) -> ApplicationStageId {
        match self {
            OpenOutcome::AlreadyOpen(id) | OpenOutcome::Reopened(id) | OpenOutcome::Inserted(id) => {
                id
            }
        }
    }
}

/// Counts reported by a bulk move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MoveSummary {
    pub closed: usize,
    pub reopened: usize,
    pub inserted: usize,
    pub already_open: usize,
}

/// Owns the open/closed lifecycle of `application_stages` rows.
///
/// Mutations are serialized through one transition lock so a bulk move and an
/// evaluation reconcile never interleave their close/reopen steps.
pub struct ApplicationStageLedger<R> {
    repository: Arc<R>,
    registry: StageRegistry<R>,
    transitions: Mutex<()>,
}

impl<R> ApplicationStageLedger<R>
where
    R: CatalogRepository + LedgerRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        let registry = StageRegistry::new(repository.clone());
        Self {
            repository,
            registry,
            transitions: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &StageRegistry<R> {
        &self.registry
    }

    /// Returns the open row for the pair, reopening or creating one when needed.
    pub fn ensure_open(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
    ) -> Result<ApplicationStageId, PipelineError> {
        Ok(self.ensure_open_outcome(application_id, stage_id)?.id())
    }

    pub fn ensure_open_outcome(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
    ) -> Result<OpenOutcome, PipelineError> {
        let application = self
            .repository
            .application(application_id)?
            .ok_or_else(|| PipelineError::not_found("application", application_id))?;
        let stage = self.registry.stage(stage_id)?;
        if stage.job_id != application.job_id {
            return Err(PipelineError::Validation(format!(
                "stage '{}' does not belong to job '{}' of application '{}'",
                stage.id, application.job_id, application.id
            )));
        }

        let _guard = self.lock()?;
        self.open_or_reopen(application_id, stage_id)
    }

    /// Places an application into the first stage of its job.
    pub fn enroll(&self, application_id: &ApplicationId) -> Result<ApplicationStageId, PipelineError> {
        let application = self
            .repository
            .application(application_id)?
            .ok_or_else(|| PipelineError::not_found("application", application_id))?;
        let first = self.registry.first_stage(&application.job_id)?;
        self.ensure_open(application_id, &first.id)
    }

    /// Closes the named rows and opens each affected application in `to_stage_id`.
    ///
    /// All validation happens before the first write, so a rejected move leaves
    /// the ledger untouched.
    pub fn move_bulk(
        &self,
        application_stage_ids: &[ApplicationStageId],
        to_stage_id: &StageId,
    ) -> Result<MoveSummary, PipelineError> {
        if application_stage_ids.is_empty() {
            return Err(PipelineError::Validation(
                "at least one application stage is required".to_string(),
            ));
        }

        let destination = self.registry.stage(to_stage_id)?;
        let _guard = self.lock()?;

        let mut rows = Vec::with_capacity(application_stage_ids.len());
        let mut checked: BTreeMap<StageId, Stage> = BTreeMap::new();
        for id in application_stage_ids {
            let row = self
                .repository
                .stage_row(*id)?
                .ok_or_else(|| PipelineError::not_found("application stage", id))?;
            if !checked.contains_key(&row.stage_id) {
                let source = self.registry.stage(&row.stage_id)?;
                self.registry.ensure_same_job(&source, &destination)?;
                checked.insert(source.id.clone(), source);
            }
            rows.push(row);
        }

        let now = Utc::now();
        let mut summary = MoveSummary::default();
        let mut seen = HashSet::new();
        // Every named row is stamped, even one already closed; `closed` counts open rows only.
        for row in &rows {
            if !seen.insert(row.id) {
                continue;
            }
            let mut closed = row.clone();
            closed.occupancy = Occupancy::Closed { decided_at: now };
            self.repository.update_stage_row(&closed)?;
            if row.is_open() {
                summary.closed += 1;
            }
        }

        let mut applications = Vec::new();
        for row in &rows {
            if !applications.contains(&row.application_id) {
                applications.push(row.application_id.clone());
            }
        }

        for application_id in &applications {
            match self.open_or_reopen(application_id, to_stage_id)? {
                OpenOutcome::AlreadyOpen(_) => summary.already_open += 1,
                OpenOutcome::Reopened(_) => summary.reopened += 1,
                OpenOutcome::Inserted(_) => summary.inserted += 1,
            }
        }

        info!(
            to_stage_id = %to_stage_id,
            closed = summary.closed,
            reopened = summary.reopened,
            inserted = summary.inserted,
            "moved application stages"
        );
        Ok(summary)
    }

    /// Records a final decision on a row. Repeating the same decision is a no-op.
    pub fn close(
        &self,
        application_stage_id: ApplicationStageId,
        final_status: StageStatus,
    ) -> Result<ApplicationStage, PipelineError> {
        let _guard = self.lock()?;
        let mut row = self.fetch(application_stage_id)?;
        if !row.is_open() && row.status == final_status {
            debug!(application_stage_id = %row.id, "close skipped, already decided");
            return Ok(row);
        }

        row.status = final_status;
        row.occupancy = Occupancy::Closed {
            decided_at: Utc::now(),
        };
        self.repository.update_stage_row(&row)?;
        info!(
            application_stage_id = %row.id,
            status = final_status.label(),
            "application stage closed"
        );
        Ok(row)
    }

    /// Flags a row as being evaluated, returning the status it had before.
    pub fn mark_running(
        &self,
        application_stage_id: ApplicationStageId,
    ) -> Result<StageStatus, PipelineError> {
        let _guard = self.lock()?;
        let mut row = self.fetch(application_stage_id)?;
        let previous = row.status;
        row.status = StageStatus::Running;
        self.repository.update_stage_row(&row)?;
        Ok(previous)
    }

    /// Sets the status without touching occupancy.
    pub fn set_status(
        &self,
        application_stage_id: ApplicationStageId,
        status: StageStatus,
    ) -> Result<(), PipelineError> {
        let _guard = self.lock()?;
        let mut row = self.fetch(application_stage_id)?;
        row.status = status;
        self.repository.update_stage_row(&row)?;
        Ok(())
    }

    pub fn get(
        &self,
        application_stage_id: ApplicationStageId,
    ) -> Result<ApplicationStage, PipelineError> {
        self.fetch(application_stage_id)
    }

    /// Every row an application has ever had, in creation order.
    pub fn history(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ApplicationStage>, PipelineError> {
        let mut rows = self.repository.rows_for_application(application_id)?;
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }

    fn fetch(&self, id: ApplicationStageId) -> Result<ApplicationStage, PipelineError> {
        self.repository
            .stage_row(id)?
            .ok_or_else(|| PipelineError::not_found("application stage", id))
    }

    // Caller must hold the transition lock.
    fn open_or_reopen(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
    ) -> Result<OpenOutcome, PipelineError> {
        let rows = self.repository.rows_for_pair(application_id, stage_id)?;

        if let Some(open) = rows.iter().find(|row| row.is_open()) {
            return Ok(OpenOutcome::AlreadyOpen(open.id));
        }

        if let Some(latest) = rows.into_iter().max_by_key(|row| row.id) {
            let mut reopened = latest;
            reopened.occupancy = Occupancy::Open;
            self.repository.update_stage_row(&reopened)?;
            info!(
                application_stage_id = %reopened.id,
                application_id = %application_id,
                stage_id = %stage_id,
                "application stage reopened"
            );
            return Ok(OpenOutcome::Reopened(reopened.id));
        }

        let row = self
            .repository
            .insert_stage_row(application_id, stage_id, StageStatus::Pending)?;
        info!(
            application_stage_id = %row.id,
            application_id = %application_id,
            stage_id = %stage_id,
            "application stage opened"
        );
        Ok(OpenOutcome::Inserted(row.id))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, RepositoryError> {
        self.transitions
            .lock()
            .map_err(|_| RepositoryError::Unavailable("ledger lock poisoned".to_string()))
    }
}
