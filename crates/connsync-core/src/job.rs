//! Sync job domain types.
//!
//! A [`SyncJob`] is one execution attempt of a sync for a given connector. The
//! record is owned by the job store; the runner only ever holds a snapshot and
//! changes it through [`JobStore`](crate::traits::JobStore) calls.
//!
//! # Lifecycle
//!
//! ```text
//! pending → in_progress → completed
//!               ↓   ↘
//!               ↓    canceling → canceled
//!               ↓
//!             error | suspended
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stats::PersistedStats;

// =============================================================================
// Job Type
// =============================================================================

/// Kind of sync a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Full scan of the remote source.
    Full,
    /// Cursor-based delta sync.
    Incremental,
    /// Access-control (document-level security) sync.
    AccessControl,
    /// Any job type this runner does not know about.
    #[serde(other)]
    Unknown,
}

impl JobType {
    /// Returns the string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Full => "full",
            JobType::Incremental => "incremental",
            JobType::AccessControl => "access_control",
            JobType::Unknown => "unknown",
        }
    }

    /// Returns true for the content job family (full and incremental).
    pub fn is_content_sync(&self) -> bool {
        matches!(self, JobType::Full | JobType::Incremental)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "full" => JobType::Full,
            "incremental" => JobType::Incremental,
            "access_control" => JobType::AccessControl,
            _ => JobType::Unknown,
        })
    }
}

// =============================================================================
// Job Status
// =============================================================================

/// Status of a sync job, as stored in the job index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a runner.
    InProgress,
    /// Cancellation requested by an external actor.
    Canceling,
    /// Cancellation honored by the runner.
    Canceled,
    /// Interrupted by a service shutdown; can be resumed.
    Suspended,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
}

impl JobStatus {
    /// Returns the string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Canceling => "canceling",
            JobStatus::Canceled => "canceled",
            JobStatus::Suspended => "suspended",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

/// Error type for parsing JobStatus from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobStatusError(String);

impl fmt::Display for ParseJobStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job status: {}", self.0)
    }
}

impl std::error::Error for ParseJobStatusError {}

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "canceling" => Ok(JobStatus::Canceling),
            "canceled" => Ok(JobStatus::Canceled),
            "suspended" => Ok(JobStatus::Suspended),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            _ => Err(ParseJobStatusError(s.to_string())),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Job Attributes
// =============================================================================

/// Opaque resumption token reported by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(pub Value);

impl SyncCursor {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<&str> for SyncCursor {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

/// Ingest pipeline settings snapshotted into the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub name: String,
    pub extract_binary_content: bool,
    pub reduce_whitespace: bool,
    pub run_ml_inference: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            name: "ent-search-generic-ingestion".to_string(),
            extract_binary_content: true,
            reduce_whitespace: true,
            run_ml_inference: true,
        }
    }
}

/// A basic sync rule applied by the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRule {
    pub id: String,
    pub field: String,
    pub rule: String,
    pub value: String,
    pub policy: String,
    pub order: u32,
}

/// Filtering (sync rules) attached to the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filtering {
    #[serde(default)]
    pub rules: Vec<SyncRule>,
    #[serde(default)]
    pub advanced_rules: Option<Value>,
}

/// Data source configuration snapshotted into the job.
///
/// Field values are kept as raw JSON; each data source interprets its own keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceConfiguration(pub Map<String, Value>);

impl SourceConfiguration {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the boolean value of a field, accepting both a bare value and
    /// the `{"value": ...}` form used by configurable fields.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Object(field)) => {
                field.get("value").and_then(Value::as_bool).unwrap_or(false)
            }
            _ => false,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }
}

// =============================================================================
// Sync Job
// =============================================================================

/// A sync job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// Unique job identifier.
    pub id: String,

    /// Parent connector identifier.
    pub connector_id: String,

    pub job_type: JobType,

    pub status: JobStatus,

    /// Data source configuration at the time the job was created.
    #[serde(default)]
    pub configuration: SourceConfiguration,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub filtering: Filtering,

    /// Checkpoint saved by a previous attempt of this job.
    pub sync_cursor: Option<SyncCursor>,

    /// Destination index.
    pub index_name: String,

    /// Language used when creating the content index.
    pub language: Option<String>,

    /// Error recorded when the job failed.
    pub error: Option<String>,

    /// Counters persisted by the last progress report or finalization.
    #[serde(default)]
    pub ingestion_stats: PersistedStats,

    pub created_at: DateTime<Utc>,

    /// When a runner claimed the job.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// Creates a pending job with default settings.
    pub fn new(
        id: impl Into<String>,
        connector_id: impl Into<String>,
        job_type: JobType,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            connector_id: connector_id.into(),
            job_type,
            status: JobStatus::Pending,
            configuration: SourceConfiguration::default(),
            pipeline: PipelineSettings::default(),
            filtering: Filtering::default(),
            sync_cursor: None,
            index_name: index_name.into(),
            language: None,
            error: None,
            ingestion_stats: PersistedStats::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_content_sync(&self) -> bool {
        self.job_type.is_content_sync()
    }

    /// Returns true if binary content extraction is requested, either through
    /// the local extraction service or through the ingest pipeline.
    pub fn content_extraction_enabled(&self) -> bool {
        self.configuration.get_bool("use_text_extraction_service")
            || self.pipeline.extract_binary_content
    }
}
