use std::sync::Arc;

use super::common::*;
use crate::workflows::pipeline::domain::Job;
use crate::workflows::pipeline::{PipelineError, StageRegistry};

#[test]
fn stages_for_job_follow_order_index() {
    let registry = StageRegistry::new(Arc::new(seeded_store()));

    let stages = registry
        .stages_for_job(&job_id(BACKEND_JOB))
        .expect("stages load");

    let ids: Vec<_> = stages.iter().map(|stage| stage.id.0.as_str()).collect();
    assert_eq!(ids, vec![SCREENING, INTERVIEW]);
}

#[test]
fn first_stage_is_lowest_order_index() {
    let registry = StageRegistry::new(Arc::new(seeded_store()));

    let first = registry
        .first_stage(&job_id(BACKEND_JOB))
        .expect("backend job has stages");

    assert_eq!(first.id, stage_id(SCREENING));
}

#[test]
fn first_stage_rejects_job_without_stages() {
    let store = seeded_store();
    store
        .insert_job(Job {
            id: job_id("job-empty"),
            title: "Placeholder".to_string(),
            description: None,
        })
        .expect("insert empty job");
    let registry = StageRegistry::new(Arc::new(store));

    match registry.first_stage(&job_id("job-empty")) {
        Err(err @ PipelineError::Validation(_)) => assert_eq!(err.code(), "validation_error"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn unknown_stage_is_not_found() {
    let registry = StageRegistry::new(Arc::new(seeded_store()));

    match registry.stage(&stage_id("stage-missing")) {
        Err(err @ PipelineError::NotFound { entity: "stage", .. }) => {
            assert_eq!(err.code(), "not_found")
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn requirements_keep_configured_order() {
    let registry = StageRegistry::new(Arc::new(seeded_store()));

    let requirements = registry
        .requirements(&stage_id(SCREENING))
        .expect("requirements load");

    let labels: Vec<_> = requirements.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["Java", "Kubernetes"]);
}

#[test]
fn ensure_same_job_rejects_foreign_stage() {
    let registry = StageRegistry::new(Arc::new(seeded_store()));
    let screening = registry.stage(&stage_id(SCREENING)).expect("screening");
    let interview = registry.stage(&stage_id(INTERVIEW)).expect("interview");
    let portfolio = registry.stage(&stage_id(PORTFOLIO)).expect("portfolio");

    registry
        .ensure_same_job(&screening, &interview)
        .expect("same job is accepted");
    assert!(matches!(
        registry.ensure_same_job(&screening, &portfolio),
        Err(PipelineError::Validation(_))
    ));
}
