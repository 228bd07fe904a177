//! Configuration types for the sync job runner.
//!
//! [`RunnerConfig`] carries everything a [`SyncJobRunner`](crate::SyncJobRunner)
//! needs at runtime. Host processes usually build it from a TOML service file
//! via [`load_service_config`]:
//!
//! ```toml
//! [service]
//! job_check_interval_ms = 1000
//! job_reporting_interval_ms = 10000
//! max_file_download_size = 10485760
//! use_native_connector_api_keys = true
//!
//! [bulk]
//! chunk_size = 500
//! max_concurrency = 5
//! enable_operations_logging = false
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Maximum byte length of a document id accepted by the destination index.
pub const ID_SIZE_LIMIT: usize = 512;

/// Default interval between job liveness checks.
pub const JOB_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between progress reports.
pub const JOB_REPORTING_INTERVAL: Duration = Duration::from_secs(10);

/// Default maximum size of a downloaded file (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

// =============================================================================
// Bulk Options
// =============================================================================

/// Options handed to the bulk sink.
///
/// Each job gets its own copy, which the data source may adjust through
/// [`DataSource::tweak_bulk_options`](crate::traits::DataSource::tweak_bulk_options).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkOptions {
    /// Maximum number of documents buffered between source and sink.
    pub queue_max_size: usize,
    /// Documents per bulk request.
    pub chunk_size: usize,
    /// Memory cap of a bulk request in megabytes.
    pub chunk_max_mem_size_mb: usize,
    /// Concurrent bulk requests.
    pub max_concurrency: usize,
    /// Concurrent lazy downloads.
    pub concurrent_downloads: usize,
    /// Log progress every N documents.
    pub display_every: usize,
    /// Log every bulk operation (debugging aid).
    pub enable_operations_logging: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            queue_max_size: 1024,
            chunk_size: 500,
            chunk_max_mem_size_mb: 5,
            max_concurrency: 5,
            concurrent_downloads: 10,
            display_every: 100,
            enable_operations_logging: false,
        }
    }
}

// =============================================================================
// Framework Configuration
// =============================================================================

/// Framework-level settings handed to data sources on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkConfig {
    /// Maximum size of a file a data source may download.
    pub max_file_size: u64,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

// =============================================================================
// Runner Configuration
// =============================================================================

/// Runtime configuration of a sync job runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How often the running job is reloaded to detect cancellation.
    pub job_check_interval: Duration,
    /// How often counters and cursor are persisted.
    pub job_reporting_interval: Duration,
    /// Maximum byte length of a document id.
    pub id_size_limit: usize,
    /// Exchange stored credentials for an API key on native connectors.
    pub use_native_connector_api_keys: bool,
    pub bulk: BulkOptions,
    pub framework: FrameworkConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            job_check_interval: JOB_CHECK_INTERVAL,
            job_reporting_interval: JOB_REPORTING_INTERVAL,
            id_size_limit: ID_SIZE_LIMIT,
            use_native_connector_api_keys: true,
            bulk: BulkOptions::default(),
            framework: FrameworkConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Sets the job liveness check interval.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.job_check_interval = interval;
        self
    }

    /// Sets the progress reporting interval.
    pub fn with_reporting_interval(mut self, interval: Duration) -> Self {
        self.job_reporting_interval = interval;
        self
    }

    /// Sets the bulk options.
    pub fn with_bulk_options(mut self, bulk: BulkOptions) -> Self {
        self.bulk = bulk;
        self
    }

    /// Disables or enables native connector API keys.
    pub fn with_native_api_keys(mut self, enabled: bool) -> Self {
        self.use_native_connector_api_keys = enabled;
        self
    }
}

// =============================================================================
// Service Configuration File
// =============================================================================

/// `[service]` table of the service configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub job_check_interval_ms: u64,
    pub job_reporting_interval_ms: u64,
    pub max_file_download_size: u64,
    pub use_native_connector_api_keys: bool,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            job_check_interval_ms: JOB_CHECK_INTERVAL.as_millis() as u64,
            job_reporting_interval_ms: JOB_REPORTING_INTERVAL.as_millis() as u64,
            max_file_download_size: DEFAULT_MAX_FILE_SIZE,
            use_native_connector_api_keys: true,
        }
    }
}

/// Root structure of the service configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    pub bulk: BulkOptions,
}

impl ServiceConfig {
    /// Parses a service configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SyncError> {
        toml::from_str(content)
            .map_err(|e| SyncError::Config(format!("invalid service configuration: {}", e)))
    }

    /// Converts the file representation into a runner configuration.
    pub fn into_runner_config(self) -> RunnerConfig {
        RunnerConfig {
            job_check_interval: Duration::from_millis(self.service.job_check_interval_ms),
            job_reporting_interval: Duration::from_millis(self.service.job_reporting_interval_ms),
            id_size_limit: ID_SIZE_LIMIT,
            use_native_connector_api_keys: self.service.use_native_connector_api_keys,
            bulk: self.bulk,
            framework: FrameworkConfig {
                max_file_size: self.service.max_file_download_size,
            },
        }
    }
}

/// Load the service configuration from a TOML file.
///
/// # Errors
///
/// Returns [`SyncError::Config`] if the file cannot be read or parsed.
pub fn load_service_config(path: &Path) -> Result<ServiceConfig, SyncError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SyncError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    ServiceConfig::from_toml(&content)
}
