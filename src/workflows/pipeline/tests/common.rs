use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::workflows::pipeline::domain::{
    Application, ApplicationId, Candidate, CandidateId, Job, JobId, Requirement, RequirementId,
    RunId, RunStatus, Stage, StageId,
};
use crate::workflows::pipeline::gateway::{
    EvaluationGateway, EvaluationRequest, GatewayError, RunAccepted, RunSnapshot,
};
use crate::workflows::pipeline::{HiringPipeline, MemoryPipelineStore};

pub(super) const BACKEND_JOB: &str = "job-backend";
pub(super) const DESIGN_JOB: &str = "job-design";
pub(super) const SCREENING: &str = "stage-screening";
pub(super) const INTERVIEW: &str = "stage-interview";
pub(super) const PORTFOLIO: &str = "stage-portfolio";
pub(super) const ADA: &str = "app-ada";
pub(super) const LINUS: &str = "app-linus";
pub(super) const GRACE: &str = "app-grace";

pub(super) type TestPipeline = HiringPipeline<MemoryPipelineStore, ScriptedGateway>;

pub(super) fn job_id(id: &str) -> JobId {
    JobId(id.to_string())
}

pub(super) fn stage_id(id: &str) -> StageId {
    StageId(id.to_string())
}

pub(super) fn app_id(id: &str) -> ApplicationId {
    ApplicationId(id.to_string())
}

pub(super) fn requirement_id(id: &str) -> RequirementId {
    RequirementId(id.to_string())
}

pub(super) fn requirement(id: &str, label: &str, weight: f64) -> Requirement {
    Requirement {
        id: requirement_id(id),
        label: label.to_string(),
        weight,
    }
}

fn stage(id: &str, job: &str, name: &str, order_index: i32, weight: f64) -> Stage {
    Stage {
        id: stage_id(id),
        job_id: job_id(job),
        name: name.to_string(),
        description: None,
        order_index,
        pass_threshold: 7.0,
        weight,
        requirements: Vec::new(),
        default_document: None,
    }
}

fn candidate(id: &str, name: &str, resume: Option<&str>) -> Candidate {
    Candidate {
        id: CandidateId(id.to_string()),
        name: name.to_string(),
        email: Some(format!("{id}@example.com")),
        default_resume: resume.map(str::to_string),
    }
}

fn application(id: &str, job: &str, candidate: &str) -> Application {
    Application {
        id: app_id(id),
        job_id: job_id(job),
        candidate_id: CandidateId(candidate.to_string()),
    }
}

/// Backend job with a screening (weight 1) and an interview (weight 2) stage,
/// plus a separate design job used to exercise cross-job rejections.
pub(super) fn seeded_store() -> MemoryPipelineStore {
    let store = MemoryPipelineStore::new();
    store
        .insert_job(Job {
            id: job_id(BACKEND_JOB),
            title: "Backend Engineer".to_string(),
            description: Some("Builds the payments API".to_string()),
        })
        .expect("insert backend job");
    store
        .insert_job(Job {
            id: job_id(DESIGN_JOB),
            title: "Product Designer".to_string(),
            description: None,
        })
        .expect("insert design job");

    // Inserted out of order so registry ordering is observable.
    let mut interview = stage(INTERVIEW, BACKEND_JOB, "Interview", 2, 2.0);
    interview.requirements = vec![requirement("req-comms", "Communication", 1.0)];
    interview.default_document = Some("doc://interview-guide".to_string());
    store.insert_stage(interview).expect("insert interview");

    let mut screening = stage(SCREENING, BACKEND_JOB, "Screening", 1, 1.0);
    screening.requirements = vec![
        requirement("req-java", "Java", 1.0),
        requirement("req-k8s", "Kubernetes", 1.0),
    ];
    store.insert_stage(screening).expect("insert screening");

    store
        .insert_stage(stage(PORTFOLIO, DESIGN_JOB, "Portfolio Review", 1, 1.0))
        .expect("insert portfolio");

    store
        .insert_candidate(candidate("cand-ada", "Ada Lovelace", Some("s3://resumes/ada.pdf")))
        .expect("insert ada");
    store
        .insert_candidate(candidate("cand-linus", "Linus Torvalds", None))
        .expect("insert linus");
    store
        .insert_candidate(candidate("cand-grace", "Grace Hopper", Some("s3://resumes/grace.pdf")))
        .expect("insert grace");

    store
        .insert_application(application(ADA, BACKEND_JOB, "cand-ada"))
        .expect("insert ada application");
    store
        .insert_application(application(LINUS, BACKEND_JOB, "cand-linus"))
        .expect("insert linus application");
    store
        .insert_application(application(GRACE, DESIGN_JOB, "cand-grace"))
        .expect("insert grace application");

    store
}

pub(super) fn pipeline() -> (Arc<MemoryPipelineStore>, Arc<ScriptedGateway>, TestPipeline) {
    let store = Arc::new(seeded_store());
    let gateway = Arc::new(ScriptedGateway::default());
    let pipeline = HiringPipeline::new(store.clone(), gateway.clone(), 20);
    (store, gateway, pipeline)
}

pub(super) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

/// In-memory stand-in for the AI service.
///
/// Every accepted submission gets a sequential run id and starts out running.
/// Tests settle runs explicitly with `succeed` or `fail`.
#[derive(Default)]
pub(super) struct ScriptedGateway {
    runs: Mutex<HashMap<RunId, RunSnapshot>>,
    requests: Mutex<Vec<EvaluationRequest>>,
    rejections: Mutex<VecDeque<GatewayError>>,
    on_next_fetch: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ScriptedGateway {
    pub(super) fn reject_next_submission(&self, error: GatewayError) {
        self.rejections
            .lock()
            .expect("rejections mutex poisoned")
            .push_back(error);
    }

    /// Runs `hook` inside the next `fetch_run`, before the snapshot is read.
    pub(super) fn before_next_fetch(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_next_fetch.lock().expect("hook mutex poisoned") = Some(Box::new(hook));
    }

    pub(super) fn succeed(&self, run_id: &RunId, result: Value) {
        self.settle(run_id, RunStatus::Succeeded, Some(result), None);
    }

    pub(super) fn fail(&self, run_id: &RunId, error: &str) {
        self.settle(run_id, RunStatus::Failed, None, Some(error.to_string()));
    }

    pub(super) fn requests(&self) -> Vec<EvaluationRequest> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .clone()
    }

    fn settle(
        &self,
        run_id: &RunId,
        status: RunStatus,
        result: Option<Value>,
        error: Option<String>,
    ) {
        let mut runs = self.runs.lock().expect("runs mutex poisoned");
        let run = runs.get_mut(run_id).expect("run was issued by the gateway");
        run.status = status;
        run.progress = Some(100);
        run.result = result;
        run.error = error;
    }
}

#[async_trait]
impl EvaluationGateway for ScriptedGateway {
    async fn submit(&self, request: &EvaluationRequest) -> Result<RunAccepted, GatewayError> {
        if let Some(error) = self
            .rejections
            .lock()
            .expect("rejections mutex poisoned")
            .pop_front()
        {
            return Err(error);
        }

        let mut requests = self.requests.lock().expect("requests mutex poisoned");
        requests.push(request.clone());
        let id = RunId(format!("run-{}", requests.len()));
        self.runs.lock().expect("runs mutex poisoned").insert(
            id.clone(),
            RunSnapshot {
                id: Some(id.clone()),
                status: RunStatus::Running,
                progress: Some(0),
                error: None,
                result: None,
            },
        );
        Ok(RunAccepted { id })
    }

    async fn fetch_run(&self, run_id: &RunId) -> Result<RunSnapshot, GatewayError> {
        let hook = self.on_next_fetch.lock().expect("hook mutex poisoned").take();
        if let Some(hook) = hook {
            hook();
        }
        self.runs
            .lock()
            .expect("runs mutex poisoned")
            .get(run_id)
            .cloned()
            .ok_or_else(|| GatewayError::RunNotFound(run_id.clone()))
    }
}
