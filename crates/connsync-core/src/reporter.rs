//! Periodic ingestion progress reporting.
//!
//! While the bulk sink works, a background task persists the sink's counters
//! and the data source's cursor to the job record. A cursor is only persisted
//! after the sink flushed every operation queued before it: restarting from a
//! cursor whose preceding documents were never indexed would silently skip
//! them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, Span, debug, warn};

use crate::job::SyncCursor;
use crate::stats::PersistedStats;
use crate::traits::{BulkSink, DataSource, JobStore};

/// Background task persisting counters and cursor of a running job.
pub struct IngestionStatsReporter<J, P, S> {
    job_store: J,
    job_id: String,
    content_sync: bool,
    source: Arc<P>,
    sink: Arc<S>,
    interval: Duration,
    last_cursor: Option<SyncCursor>,
}

impl<J, P, S> IngestionStatsReporter<J, P, S>
where
    J: JobStore,
    P: DataSource,
    S: BulkSink,
{
    /// Creates a reporter; `content_sync` is false for access-control jobs,
    /// whose cursor never changes.
    pub fn new(
        job_store: J,
        job_id: impl Into<String>,
        content_sync: bool,
        source: Arc<P>,
        sink: Arc<S>,
        interval: Duration,
    ) -> Self {
        Self {
            job_store,
            job_id: job_id.into(),
            content_sync,
            source,
            sink,
            interval,
            last_cursor: None,
        }
    }

    /// Spawns the reporting loop inside `span`.
    pub fn spawn(self, span: Span) -> ReporterHandle {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(self.run(cancel_token.clone()).instrument(span));
        ReporterHandle {
            cancel_on_drop: cancel_token.drop_guard(),
            handle,
        }
    }

    /// Runs until cancelled or until the job disappears.
    pub async fn run(mut self, cancel_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let keep_going = tokio::select! {
                _ = cancel_token.cancelled() => false,
                keep_going = self.report() => keep_going,
            };
            if !keep_going {
                break;
            }
        }
    }

    /// One reporting tick. Returns false once the job is gone.
    async fn report(&mut self) -> bool {
        match self.job_store.reload(&self.job_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                warn!(job_id = %self.job_id, "Couldn't reload sync job, stopping progress reports");
                return false;
            }
            Err(e) => {
                warn!(
                    job_id = %self.job_id,
                    error = %e,
                    "Failed to reload sync job, skipping progress report"
                );
                return true;
            }
        }

        let cursor = if self.content_sync {
            self.source.sync_cursor()
        } else {
            None
        };

        if cursor != self.last_cursor {
            debug!("Connector reported a new cursor, triggering batch flush before saving");
            if let Err(e) = self.sink.trigger_flush().await {
                warn!(error = %e, "Flush failed, cursor not saved");
                return true;
            }
            debug!("Data was successfully flushed before saving the cursor");
            self.last_cursor = cursor.clone();
        }

        let stats = PersistedStats::from(&self.sink.ingestion_stats());
        if let Err(e) = self
            .job_store
            .update_metadata(&self.job_id, &stats, cursor.as_ref())
            .await
        {
            warn!(error = %e, "Failed to persist ingestion stats");
        }

        true
    }
}

/// Handle of a spawned [`IngestionStatsReporter`].
///
/// Dropping the handle cancels the task, so a runner future dropped mid-job
/// leaves no reporting loop behind.
pub struct ReporterHandle {
    cancel_on_drop: DropGuard,
    handle: JoinHandle<()>,
}

impl ReporterHandle {
    /// Cancels the task and waits for it to exit.
    ///
    /// Cancellation is the expected way for the task to end and is never
    /// reported as an error.
    pub async fn stop(self) {
        let Self {
            cancel_on_drop,
            handle,
        } = self;
        drop(cancel_on_drop);
        match handle.await {
            Ok(()) => debug!("Job reporting task is stopped."),
            Err(e) if e.is_cancelled() => debug!("Job reporting task is stopped."),
            Err(e) => warn!(error = %e, "Job reporting task panicked"),
        }
    }

    /// Returns true if the task already exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
