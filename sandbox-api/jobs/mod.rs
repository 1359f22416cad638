pub mod ledger;
pub mod repository;
pub mod sqlite_repository;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// Job progress. Legal moves: `new -> running -> {success, error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    New,
    Running,
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }

    /// The only status a job may be in when moved to `target`.
    /// `None` means `target` is never reachable by an advance.
    pub fn required_prior(target: JobStatus) -> Option<JobStatus> {
        match target {
            JobStatus::New => None,
            JobStatus::Running => Some(JobStatus::New),
            JobStatus::Success | JobStatus::Error => Some(JobStatus::Running),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = LifecycleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "new" => Ok(JobStatus::New),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "error" => Ok(JobStatus::Error),
            other => Err(LifecycleError::Validation(format!("unknown job status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Start,
    Stop,
    Destroy,
    Provision,
    Cleanup,
}

impl LifecycleAction {
    pub const ALL: [LifecycleAction; 5] = [
        LifecycleAction::Start,
        LifecycleAction::Stop,
        LifecycleAction::Destroy,
        LifecycleAction::Provision,
        LifecycleAction::Cleanup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Destroy => "destroy",
            LifecycleAction::Provision => "provision",
            LifecycleAction::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleAction {
    type Err = LifecycleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        LifecycleAction::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| LifecycleError::Validation(format!("unknown lifecycle action: {value}")))
    }
}

/// One requested lifecycle action and its outcome. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleResourceJob {
    pub id: i64,
    pub resource_type: String,
    /// Account name this job targets.
    pub resource_name: String,
    pub request_id: String,
    pub action: LifecycleAction,
    pub status: JobStatus,
    /// Worker-supplied outcome, usually set on a terminal status.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload; the ledger fills id, status and timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub resource_type: String,
    pub resource_name: String,
    pub request_id: String,
    pub action: LifecycleAction,
}
