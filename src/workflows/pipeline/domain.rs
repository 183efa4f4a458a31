use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier wrapper for jobs owning a stage sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequirementId(pub String);

/// Identifier wrapper for a candidate's application to one job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// Opaque run identifier handed out by the AI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

/// Store-assigned identifier of one ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationStageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScoreId(pub u64);

macro_rules! display_string_id {
    ($($name:ident),*) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_string_id!(JobId, StageId, RequirementId, ApplicationId, CandidateId, RunId);

impl fmt::Display for ApplicationStageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "as-{:06}", self.0)
    }
}

impl fmt::Display for ScoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sc-{:06}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Criterion evaluated inside a stage; its weight scales the derived score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: RequirementId,
    pub label: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// One ordered step of a job's hiring pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub job_id: JobId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub order_index: i32,
    #[serde(default)]
    pub pass_threshold: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    /// Document attached to the stage, used when a dispatch carries no document of its own.
    #[serde(default)]
    pub default_document: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub default_resume: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub job_id: JobId,
    pub candidate_id: CandidateId,
}

/// Evaluation status tracked on each ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StageStatus {
    pub const fn label(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::Failed)
    }
}

/// Whether a ledger row is the application's live presence in its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Occupancy {
    Open,
    Closed { decided_at: DateTime<Utc> },
}

impl Occupancy {
    pub const fn is_open(&self) -> bool {
        matches!(self, Occupancy::Open)
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Occupancy::Open => None,
            Occupancy::Closed { decided_at } => Some(*decided_at),
        }
    }
}

/// One (possibly historical) occupancy of an application in a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStage {
    pub id: ApplicationStageId,
    pub application_id: ApplicationId,
    pub stage_id: StageId,
    pub status: StageStatus,
    pub occupancy: Occupancy,
}

impl ApplicationStage {
    pub const fn is_open(&self) -> bool {
        self.occupancy.is_open()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Evaluate,
}

/// Run status as reported by the collaborator and mirrored on stored runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Structured AI verdict. Unknown keys are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: f64,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub matched_requirements: Vec<String>,
    #[serde(default)]
    pub missing_requirements: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One attempt to evaluate a candidate at an application stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRun {
    pub sequence: u64,
    pub run_id: RunId,
    pub application_stage_id: ApplicationStageId,
    pub stage_id: StageId,
    pub kind: RunKind,
    pub status: RunStatus,
    #[serde(default)]
    pub result: Option<EvaluationResult>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Ai,
    Manual,
}

/// Per-requirement score on the 0-10 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementScore {
    pub id: ScoreId,
    pub application_stage_id: ApplicationStageId,
    pub requirement_id: RequirementId,
    pub source: ScoreSource,
    pub value: f64,
    pub created_at: DateTime<Utc>,
}

/// Score produced by aggregation before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDraft {
    pub requirement_id: RequirementId,
    pub source: ScoreSource,
    pub value: f64,
}

/// Candidate evidence pointers a caller may attach to a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRefs {
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
}

impl EvidenceRefs {
    pub fn is_empty(&self) -> bool {
        self.resume.is_none()
            && self.audio.is_none()
            && self.transcript.is_none()
            && self.document.is_none()
    }
}
