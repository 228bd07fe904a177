//! Trait definitions for the runner's collaborators.
//!
//! The runner owns orchestration only. Persistence, data fetching and indexing
//! are reached through these traits, enabling:
//!
//! - **Testability**: in-memory implementations for tests
//! - **Flexibility**: any document store, any source connector, any sink
//! - **Decoupling**: retry and batching policies stay inside the collaborators
//!
//! Record-returning calls report a vanished record with
//! [`SyncError::NotFound`] and an optimistic concurrency failure with
//! [`SyncError::Conflict`].

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{BulkOptions, FrameworkConfig};
use crate::connector::{Connector, Features};
use crate::document::{
    AccessControlStream, DocStream, Document, IncrementalDocStream, LazyDownload, Operation,
    SyncItemStream,
};
use crate::error::SyncError;
use crate::job::{Filtering, JobType, PipelineSettings, SourceConfiguration, SyncCursor, SyncJob};
use crate::stats::{IngestionStats, PersistedStats};

// =============================================================================
// Stores
// =============================================================================

/// Store for sync job records.
pub trait JobStore: Send + Sync + Clone + 'static {
    /// Marks the job as in progress and records the starting cursor.
    ///
    /// Fails with [`SyncError::Conflict`] if another runner claimed it first.
    fn claim(
        &self,
        job_id: &str,
        sync_cursor: Option<SyncCursor>,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Returns the current job record.
    fn reload(&self, job_id: &str) -> impl Future<Output = Result<SyncJob, SyncError>> + Send;

    /// Persists intermediate counters and the latest cursor.
    fn update_metadata(
        &self,
        job_id: &str,
        stats: &PersistedStats,
        sync_cursor: Option<&SyncCursor>,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Finalizes the job with status `error`.
    fn fail(
        &self,
        job_id: &str,
        error: &str,
        stats: &PersistedStats,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Finalizes the job with status `suspended`.
    fn suspend(
        &self,
        job_id: &str,
        stats: &PersistedStats,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Finalizes the job with status `canceled`.
    fn cancel(
        &self,
        job_id: &str,
        stats: &PersistedStats,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Finalizes the job with status `completed`.
    fn done(
        &self,
        job_id: &str,
        stats: &PersistedStats,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Validates the job's sync rules using the data source as validator.
    ///
    /// The default implementation asks the validator and rejects any rule set
    /// it reports as invalid.
    fn validate_filtering<V: DataSource>(
        &self,
        job: &SyncJob,
        validator: &V,
    ) -> impl Future<Output = Result<(), SyncError>> + Send {
        async move {
            let validation = validator.validate_filtering(&job.filtering).await?;
            if validation.is_valid() {
                Ok(())
            } else {
                Err(SyncError::InvalidFiltering(validation.errors.join("; ")))
            }
        }
    }
}

/// Store for connector records and their secrets.
pub trait ConnectorStore: Send + Sync + Clone + 'static {
    /// Returns the current connector record.
    fn reload(&self, connector_id: &str)
    -> impl Future<Output = Result<Connector, SyncError>> + Send;

    /// Records that a job of the given type started.
    ///
    /// Fails with [`SyncError::Conflict`] if the connector was modified
    /// concurrently.
    fn sync_starts(
        &self,
        connector_id: &str,
        job_type: JobType,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Records the outcome of a job and, for content syncs, the new cursor.
    fn sync_done(
        &self,
        connector_id: &str,
        job: Option<&SyncJob>,
        sync_cursor: Option<&SyncCursor>,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Returns the number of documents in the connector's index.
    fn document_count(&self, connector_id: &str)
    -> impl Future<Output = Result<u64, SyncError>> + Send;

    /// Reads a secret (e.g. the native connector API key).
    ///
    /// Fails with [`SyncError::NotFound`] if the secret does not exist.
    fn get_connector_secret(
        &self,
        secret_id: &str,
    ) -> impl Future<Output = Result<String, SyncError>> + Send;
}

// =============================================================================
// Data Source
// =============================================================================

/// Outcome of sync rule validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteringValidation {
    pub errors: Vec<String>,
}

impl FilteringValidation {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-connector-type document producer.
///
/// Stream-returning methods hand out `'static` streams: implementations clone
/// whatever shared state they need, so the runner's progress reporter can
/// query [`sync_cursor`](DataSource::sync_cursor) while documents flow.
pub trait DataSource: Send + Sync + 'static {
    /// Name of the data source, used in log messages.
    fn name(&self) -> &str;

    /// Hands a checkpoint from a previous attempt of a full sync.
    fn set_sync_cursor(&mut self, cursor: SyncCursor) {
        let _ = cursor;
    }

    /// Hands the connector's feature flags.
    fn set_features(&mut self, features: &Features) {
        let _ = features;
    }

    /// Cheap check telling whether the remote source changed since the last sync.
    fn changed(&self) -> impl Future<Output = Result<bool, SyncError>> + Send {
        async { Ok(true) }
    }

    /// Checks required configuration fields without I/O.
    fn validate_config_fields(&self) -> Result<(), SyncError> {
        Ok(())
    }

    /// Validates the configuration against the remote source.
    fn validate_config(&self) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Checks that the remote source is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Adjusts the bulk options of the current job.
    fn tweak_bulk_options(&self, options: &mut BulkOptions) {
        let _ = options;
    }

    /// Validates sync rules.
    fn validate_filtering(
        &self,
        filtering: &Filtering,
    ) -> impl Future<Output = Result<FilteringValidation, SyncError>> + Send {
        let _ = filtering;
        async { Ok(FilteringValidation::valid()) }
    }

    /// Whether access-control syncs of this source need a platinum license.
    fn requires_platinum_license(&self) -> bool {
        false
    }

    /// Whether this source implements its own cursor-based incremental fetch.
    ///
    /// Sources returning `false` have incremental jobs served by a full scan
    /// with unchanged documents skipped by the sink.
    fn supports_incremental_fetch(&self) -> bool {
        false
    }

    /// Full scan of the remote source.
    fn get_docs(&self, filtering: &Filtering) -> DocStream;

    /// Documents changed since `cursor`, each tagged with its operation.
    fn get_docs_incrementally(
        &self,
        cursor: Option<&SyncCursor>,
        filtering: &Filtering,
    ) -> IncrementalDocStream {
        let _ = (cursor, filtering);
        let err = SyncError::UnsupportedJobType(format!(
            "{} does not implement incremental fetching",
            self.name()
        ));
        Box::pin(futures::stream::once(async move {
            Err::<(Document, Option<LazyDownload>, Operation), _>(err)
        }))
    }

    /// Access-control documents.
    fn get_access_control(&self) -> AccessControlStream {
        let err = SyncError::UnsupportedJobType(format!(
            "{} does not implement access control sync",
            self.name()
        ));
        Box::pin(futures::stream::once(async move { Err::<Document, _>(err) }))
    }

    /// Current resumption cursor.
    fn sync_cursor(&self) -> Option<SyncCursor> {
        None
    }

    /// Deterministic replacement for ids exceeding the size limit.
    ///
    /// Defaults to [`sha256_hex`].
    fn hash_id(&self, id: &str) -> String {
        sha256_hex(id)
    }

    /// Releases the source's resources.
    fn close(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Hex-encoded SHA-256 digest of `id`, always 64 bytes long.
pub fn sha256_hex(id: &str) -> String {
    format!("{:x}", Sha256::digest(id.as_bytes()))
}

/// Factory for creating data sources.
///
/// Separate from [`DataSource`] to avoid async constructors.
pub trait DataSourceFactory: Send + Sync + Clone {
    /// The type of data source this factory creates.
    type Source: DataSource;

    /// Creates a data source for the given connector and job configuration.
    fn create(
        &self,
        connector: &Connector,
        configuration: &SourceConfiguration,
        framework: &FrameworkConfig,
    ) -> Result<Self::Source, SyncError>;
}

// =============================================================================
// Bulk Sink
// =============================================================================

/// License level of the destination cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum License {
    Basic,
    Standard,
    Gold,
    Platinum,
    Enterprise,
    Trial,
}

impl License {
    pub fn as_str(&self) -> &'static str {
        match self {
            License::Basic => "basic",
            License::Standard => "standard",
            License::Gold => "gold",
            License::Platinum => "platinum",
            License::Enterprise => "enterprise",
            License::Trial => "trial",
        }
    }

    /// Returns true if this license grants the features of `required`.
    ///
    /// Trial licenses grant everything.
    pub fn satisfies(&self, required: License) -> bool {
        *self == License::Trial || *self >= required
    }
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters of a bulk ingestion.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub index_name: String,
    pub pipeline: PipelineSettings,
    pub job_type: JobType,
    /// Sync rules to apply; absent for access-control syncs.
    pub filtering: Option<Filtering>,
    pub sync_rules_enabled: bool,
    pub content_extraction_enabled: bool,
    /// Let the sink skip documents whose timestamp did not change.
    pub skip_unchanged_documents: bool,
    pub options: BulkOptions,
}

/// Destination-side batched writer.
pub trait BulkSink: Send + Sync + 'static {
    /// Creates or updates the content index.
    fn prepare_content_index(
        &self,
        index_name: &str,
        language: Option<&str>,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Returns whether `required` is active, together with the actual license.
    fn has_active_license_enabled(
        &self,
        required: License,
    ) -> impl Future<Output = Result<(bool, License), SyncError>> + Send;

    /// Starts ingesting `items` in the background and returns once started.
    fn async_bulk(
        &self,
        request: BulkRequest,
        items: SyncItemStream,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Returns true once ingestion finished, successfully or not.
    fn done(&self) -> bool;

    /// Returns the error that stopped ingestion, if any.
    fn get_error(&self) -> Option<SyncError>;

    /// Current counters.
    fn ingestion_stats(&self) -> IngestionStats;

    /// Flushes buffered operations and waits until they are durable.
    fn trigger_flush(&self) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Stops ingestion; a no-op once stopped.
    fn cancel(&self) -> impl Future<Output = ()> + Send;

    /// Releases the sink's resources.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Connection settings for a sink.
#[derive(Debug, Clone, Default)]
pub struct SinkSettings {
    /// API key obtained for native connectors; `None` uses the default credentials.
    pub api_key: Option<String>,
}

/// Factory for creating bulk sinks.
pub trait SinkFactory: Send + Sync + Clone {
    /// The type of sink this factory creates.
    type Sink: BulkSink;

    fn create(&self, settings: &SinkSettings) -> Result<Self::Sink, SyncError>;
}
