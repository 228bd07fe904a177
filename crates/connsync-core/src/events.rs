//! Runner lifecycle events.
//!
//! Host processes observe a runner through a [`RunnerReporter`], decoupling
//! the runner from how progress is surfaced (logs, UI, metrics).

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::job::{JobStatus, JobType};
use crate::runner::RunnerState;
use crate::stats::IngestionStats;

/// Events emitted by a runner during one execution.
#[derive(Debug, Clone)]
pub enum RunnerEvent<'a> {
    /// Execution started.
    Started { job_id: &'a str, job_type: JobType },
    /// The runner moved to another state.
    StateChanged {
        job_id: &'a str,
        from: RunnerState,
        to: RunnerState,
    },
    /// The source reported no change; the job completes without ingestion.
    NoChanges { job_id: &'a str },
    /// The bulk sink started ingesting.
    IngestionStarted {
        job_id: &'a str,
        index_name: &'a str,
    },
    /// The job reached its terminal status.
    Finished {
        job_id: &'a str,
        status: JobStatus,
        stats: &'a IngestionStats,
        elapsed: Duration,
    },
}

/// Trait for reporting runner events.
pub trait RunnerReporter: Send + Sync {
    /// Called when a runner event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: RunnerEvent<'_>) {
        let _ = event;
    }
}

/// Silent reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentRunnerReporter;

impl RunnerReporter for SilentRunnerReporter {}

/// Tracing-based reporter for service logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunnerReporter;

impl RunnerReporter for TracingRunnerReporter {
    fn report(&self, event: RunnerEvent<'_>) {
        match event {
            RunnerEvent::Started { job_id, job_type } => {
                info!(job_id, %job_type, "Sync job started");
            }
            RunnerEvent::StateChanged { job_id, from, to } => {
                debug!(job_id, %from, %to, "Runner state changed");
            }
            RunnerEvent::NoChanges { job_id } => {
                info!(job_id, "No change in remote source");
            }
            RunnerEvent::IngestionStarted { job_id, index_name } => {
                info!(job_id, index_name, "Ingestion started");
            }
            RunnerEvent::Finished {
                job_id,
                status,
                stats,
                elapsed,
            } => {
                if status == JobStatus::Error {
                    warn!(job_id, %status, elapsed_secs = elapsed.as_secs(), "Sync job finished");
                } else {
                    info!(
                        job_id,
                        %status,
                        indexed = stats.indexed_document_count,
                        deleted = stats.deleted_document_count,
                        elapsed_secs = elapsed.as_secs(),
                        "Sync job finished"
                    );
                }
            }
        }
    }
}
