use thiserror::Error;

use crate::job::JobStatus;
use crate::traits::License;

/// Error types for sync job execution.
///
/// This enum covers both the failures raised by the runner itself (busy runner,
/// start conflicts, cancellation signals) and the failures surfaced by its
/// collaborators (job/connector stores, data sources, bulk sinks). Collaborators
/// are expected to map their own transport errors into these variants.
///
/// # Error Classification
///
/// The runner performs no retries. Any error reaching it is terminal for the
/// current job attempt and is mapped to a final [`JobStatus`] with
/// [`SyncError::terminal_status`]:
///
/// - [`SyncError::JobSuspended`] → `Suspended`
/// - [`SyncError::JobCanceled`] → `Canceled`
/// - everything else → `Error`
///
/// # Examples
///
/// ```
/// use connsync_core::error::SyncError;
/// use connsync_core::JobStatus;
///
/// let err = SyncError::JobCanceled;
/// assert_eq!(err.terminal_status(), JobStatus::Canceled);
///
/// let err = SyncError::Unreachable("connection refused".to_string());
/// assert_eq!(err.terminal_status(), JobStatus::Error);
/// ```
#[derive(Error, Debug)]
pub enum SyncError {
    /// `execute()` was called on a runner that is already running.
    #[error("Sync job {job_id} is already running.")]
    RunnerBusy { job_id: String },

    /// The job could not be started.
    ///
    /// Raised when the connector could not be reloaded, when another instance
    /// already runs a job of the same family, or when `sync_starts` failed for
    /// any reason other than a storage conflict.
    #[error("Sync job start failed: {message}")]
    StartFailed {
        message: String,
        #[source]
        source: Option<Box<SyncError>>,
    },

    /// Optimistic concurrency conflict reported by the document store.
    ///
    /// Never wrapped into [`SyncError::StartFailed`].
    #[error("Version conflict: {0}")]
    Conflict(String),

    /// A stored record does not exist (anymore).
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The connector vanished while the job was running.
    #[error("Connector is not found for connector ID {0}.")]
    ConnectorNotFound(String),

    /// The job record vanished while the job was running.
    #[error("Connector job is not found for job ID {0}.")]
    JobNotFound(String),

    /// The job was flagged as canceling by an external actor.
    #[error("Connector job was canceled.")]
    JobCanceled,

    /// The job was interrupted by a service shutdown.
    #[error("Connector job was suspended.")]
    JobSuspended,

    /// The job left the in-progress state unexpectedly.
    #[error("Connector job (ID: {job_id}) is not running but in status of {status}.")]
    JobNotRunning { job_id: String, status: JobStatus },

    /// The native connector API key is absent from secret storage.
    #[error("API key not found in secrets storage for index [{0}].")]
    ApiKeyMissing(String),

    /// The destination cluster runs a license below the required one.
    #[error("Minimum required license: '{required}'. Actual license: '{actual}'.")]
    InsufficientLicense { required: License, actual: License },

    /// The job type cannot be handled by this runner or connector.
    #[error("Unsupported job type: {0}")]
    UnsupportedJobType(String),

    /// The destination rejected the request for lack of privileges.
    #[error("Authorization error (status {status_code}): {message}")]
    Authorization { status_code: u16, message: String },

    /// Data source configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The data source backend could not be reached.
    #[error("Data source unreachable: {0}")]
    Unreachable(String),

    /// Sync rules did not pass validation.
    #[error("Invalid filtering: {0}")]
    InvalidFiltering(String),

    /// Data source failure while producing documents.
    #[error("Source error: {0}")]
    Source(String),

    /// Bulk sink failure while ingesting documents.
    #[error("Sink error: {0}")]
    Sink(String),

    /// Service configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl SyncError {
    /// Creates a [`SyncError::StartFailed`] without an underlying cause.
    pub fn start_failed(message: impl Into<String>) -> Self {
        SyncError::StartFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if the error reports a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }

    /// Returns true if the error is a storage-level version conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict(_))
    }

    /// Maps the error to the status the job finalizes with.
    pub fn terminal_status(&self) -> JobStatus {
        match self {
            SyncError::JobSuspended => JobStatus::Suspended,
            SyncError::JobCanceled => JobStatus::Canceled,
            _ => JobStatus::Error,
        }
    }

    /// Returns the message persisted as the job's `sync_error`.
    ///
    /// Authorization failures get an actionable message naming the index and
    /// the status code; every other error is recorded in full.
    pub fn sync_error_message(&self, index_name: &str) -> String {
        match self {
            SyncError::Authorization { status_code, .. } => format!(
                "Connector is not authorized to access index [{}]. API key may need to be regenerated. Status code: [{}].",
                index_name, status_code
            ),
            _ => self.to_string(),
        }
    }
}
