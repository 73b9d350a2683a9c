//! Job domain types

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Kind of asynchronous backend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Verification,
    Consolidation,
    ReportGeneration,
    FileProcessing,
}

impl JobKind {
    /// Polling interval proportional to the expected job latency
    pub fn default_interval(&self) -> Duration {
        match self {
            JobKind::FileProcessing => Duration::from_secs(2),
            JobKind::Verification => Duration::from_secs(3),
            JobKind::Consolidation => Duration::from_secs(5),
            JobKind::ReportGeneration => Duration::from_secs(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Verification => "verification",
            JobKind::Consolidation => "consolidation",
            JobKind::ReportGeneration => "report_generation",
            JobKind::FileProcessing => "file_processing",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "verification" => Ok(JobKind::Verification),
            "consolidation" => Ok(JobKind::Consolidation),
            "report_generation" => Ok(JobKind::ReportGeneration),
            "file_processing" => Ok(JobKind::FileProcessing),
            other => Err(format!("unknown job kind: {}", other)),
        }
    }
}

/// Identifies one asynchronous backend operation
///
/// Status endpoints are scoped by the owning resource, so the handle carries
/// the resource path segment and entity id alongside the opaque task id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub task_id: String,
    pub kind: JobKind,
    pub resource: String,
    pub owner_entity_id: i64,
}

impl JobHandle {
    pub fn new(
        task_id: impl Into<String>,
        kind: JobKind,
        resource: impl Into<String>,
        owner_entity_id: i64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            resource: resource.into(),
            owner_entity_id,
        }
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} task {} ({}/{})",
            self.kind, self.task_id, self.resource, self.owner_entity_id
        )
    }
}

/// Status reported by the backend for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    #[serde(alias = "STARTED", alias = "RETRY")]
    Progress,
    Success,
    #[serde(alias = "REVOKED")]
    Failure,
    /// Also catches status strings this client does not know
    #[serde(other)]
    Pending,
}

impl JobStatus {
    /// SUCCESS and FAILURE end a polling session
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Progress => write!(f, "PROGRESS"),
            JobStatus::Success => write!(f, "SUCCESS"),
            JobStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Progress details attached to a PROGRESS snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default, deserialize_with = "clamped_percentage")]
    pub percentage: u8,
    #[serde(default)]
    pub description: String,
}

fn clamped_percentage<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.clamp(0.0, 100.0).round() as u8)
}

/// One polled observation of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<Progress>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatusSnapshot {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            progress: None,
            result: None,
            error: None,
        }
    }

    pub fn progress(percentage: u8, description: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Progress,
            progress: Some(Progress {
                percentage: percentage.min(100),
                description: description.into(),
            }),
            result: None,
            error: None,
        }
    }

    pub fn success(result: Option<serde_json::Value>) -> Self {
        Self {
            status: JobStatus::Success,
            progress: None,
            result,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failure,
            progress: None,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Drops fields the status does not allow
    ///
    /// `result` only survives on SUCCESS and `error` only on FAILURE.
    pub fn normalized(mut self) -> Self {
        if self.status != JobStatus::Success {
            self.result = None;
        }
        if self.status != JobStatus::Failure {
            self.error = None;
        }
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Entity status embedded in a SUCCESS result, if the backend sent one
    pub fn embedded_estado(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|r| r.get("estado"))
            .and_then(|v| v.as_str())
    }
}
