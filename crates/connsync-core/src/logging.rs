//! Logging helpers.
//!
//! Every runner logs inside its own `sync_job` span, so all events of a job,
//! including those of its background reporting task, carry the job's identity.

use std::collections::BTreeMap;

use tracing::{Span, info};
use tracing_subscriber::EnvFilter;

use crate::error::SyncError;
use crate::job::SyncJob;

/// Creates the span scoping all log events of one job execution.
pub fn job_span(job: &SyncJob) -> Span {
    tracing::info_span!(
        "sync_job",
        job_id = %job.id,
        connector_id = %job.connector_id,
        job_type = %job.job_type,
        index_name = %job.index_name,
    )
}

/// Installs a stderr fmt subscriber for host processes.
///
/// `RUST_LOG` takes precedence over `default_directive`.
pub fn init_tracing(default_directive: &str) -> Result<(), SyncError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| SyncError::Config(format!("cannot install tracing subscriber: {}", e)))
}

/// Logs a dump of all counters.
///
/// One line per counter for humans, then the whole map as a single JSON
/// object that can be pasted into a script.
pub fn log_counters(counters: &BTreeMap<String, u64>) {
    info!("--- Counters ---");
    for (name, value) in counters {
        info!("'{}' : {}", name, value);
    }
    match serde_json::to_string(counters) {
        Ok(json) => info!("full counters dictionary: {}", json),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize counters"),
    }
    info!("----------------");
}
