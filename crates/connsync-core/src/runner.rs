//! Sync job runner.
//!
//! A [`SyncJobRunner`] drives one sync job through its lifecycle:
//!
//! ```text
//! Idle -> Starting -> Claimed -> Validating -> Running -> Reporting -> Finalizing -> Done -> Idle
//!            |           |            |            |           |
//!            |           +------------+------------+-----------+--> Finalizing (any failure,
//!            |                                                       cancel or shutdown)
//!            +--> Idle (start failure, nothing persisted)
//! ```
//!
//! 1. **Starting**: reload the connector, refuse to run if another instance is
//!    already syncing it, record the start on the connector.
//! 2. **Claimed**: claim the job, build the data source.
//! 3. **Validating**: change check, configuration checks, ping, bulk options,
//!    native API key.
//! 4. **Running**: start the bulk sink on the job's document generator.
//! 5. **Reporting**: poll the job for cancellation while a background task
//!    persists progress.
//! 6. **Finalizing**: stop everything, persist the terminal status, record the
//!    outcome and the new cursor on the connector.
//!
//! The runner performs no retries; any failure terminates the attempt.
//!
//! # Example
//!
//! ```ignore
//! use connsync_core::{SyncJobRunner, TracingRunnerReporter};
//! use tokio_util::sync::CancellationToken;
//!
//! let runner = SyncJobRunner::new(job_store, connector_store, sources, sinks, job, connector);
//! let shutdown = CancellationToken::new();
//!
//! let status = runner.execute(shutdown, &TracingRunnerReporter).await?;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::config::{BulkOptions, RunnerConfig};
use crate::connector::Connector;
use crate::dispatch::{generator, skip_unchanged_documents_enabled};
use crate::error::SyncError;
use crate::events::{RunnerEvent, RunnerReporter};
use crate::job::{JobStatus, JobType, SyncJob};
use crate::logging::{job_span, log_counters};
use crate::prepare::{DocumentAdapter, prepare_docs};
use crate::reporter::{IngestionStatsReporter, ReporterHandle};
use crate::stats::PersistedStats;
use crate::traits::{
    BulkRequest, BulkSink, ConnectorStore, DataSource, DataSourceFactory, JobStore, License,
    SinkFactory, SinkSettings,
};

// =============================================================================
// Runner State
// =============================================================================

/// Lifecycle state of a [`SyncJobRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerState {
    #[default]
    Idle,
    Starting,
    Claimed,
    Validating,
    Running,
    Reporting,
    Finalizing,
    Done,
}

impl RunnerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::Starting => "starting",
            RunnerState::Claimed => "claimed",
            RunnerState::Validating => "validating",
            RunnerState::Running => "running",
            RunnerState::Reporting => "reporting",
            RunnerState::Finalizing => "finalizing",
            RunnerState::Done => "done",
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Run Context
// =============================================================================

/// Resources and snapshots of one execution.
struct RunContext<P, S> {
    job: SyncJob,
    connector: Connector,
    source: Option<Arc<P>>,
    sink: Option<Arc<S>>,
    reporting_task: Option<ReporterHandle>,
    started: Instant,
}

impl<P: DataSource, S: BulkSink> RunContext<P, S> {
    fn new(job: SyncJob, connector: Connector) -> Self {
        Self {
            job,
            connector,
            source: None,
            sink: None,
            reporting_task: None,
            started: Instant::now(),
        }
    }

    /// Closes sink and source, whatever the outcome of the run.
    async fn release(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.close().await;
        }
        if let Some(source) = self.source.take() {
            source.close().await;
        }
    }
}

/// Resets the running flag when an execution ends, even if it is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Sync Job Runner
// =============================================================================

/// Executes one sync job against a data source and a bulk sink.
///
/// # Type Parameters
///
/// * `J` - Job store
/// * `C` - Connector store
/// * `F` - Data source factory
/// * `B` - Bulk sink factory
pub struct SyncJobRunner<J, C, F, B>
where
    J: JobStore,
    C: ConnectorStore,
    F: DataSourceFactory,
    B: SinkFactory,
{
    job_store: J,
    connector_store: C,
    source_factory: F,
    sink_factory: B,
    job: SyncJob,
    connector: Connector,
    config: RunnerConfig,
    span: Span,
    running: AtomicBool,
    state: Mutex<RunnerState>,
}

impl<J, C, F, B> SyncJobRunner<J, C, F, B>
where
    J: JobStore,
    C: ConnectorStore,
    F: DataSourceFactory,
    B: SinkFactory,
{
    /// Creates a runner with default configuration.
    pub fn new(
        job_store: J,
        connector_store: C,
        source_factory: F,
        sink_factory: B,
        job: SyncJob,
        connector: Connector,
    ) -> Self {
        Self::with_config(
            job_store,
            connector_store,
            source_factory,
            sink_factory,
            job,
            connector,
            RunnerConfig::default(),
        )
    }

    /// Creates a runner with custom configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        job_store: J,
        connector_store: C,
        source_factory: F,
        sink_factory: B,
        job: SyncJob,
        connector: Connector,
        config: RunnerConfig,
    ) -> Self {
        let span = job_span(&job);
        Self {
            job_store,
            connector_store,
            source_factory,
            sink_factory,
            job,
            connector,
            config,
            span,
            running: AtomicBool::new(false),
            state: Mutex::new(RunnerState::Idle),
        }
    }

    /// Id of the job this runner executes.
    pub fn job_id(&self) -> &str {
        &self.job.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunnerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true while an execution is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Executes the job once and returns its terminal status.
    ///
    /// Cancelling `shutdown` suspends the job: it finalizes as `suspended`
    /// and may be resumed later from its checkpoint.
    ///
    /// # Errors
    ///
    /// Only start failures are returned: [`SyncError::RunnerBusy`],
    /// [`SyncError::StartFailed`] and [`SyncError::Conflict`]. Nothing is
    /// persisted on the job in these cases. Every later failure is recorded
    /// on the job and reported through the returned status.
    pub async fn execute<R: RunnerReporter>(
        &self,
        shutdown: CancellationToken,
        reporter: &R,
    ) -> Result<JobStatus, SyncError> {
        self.execute_inner(shutdown, reporter)
            .instrument(self.span.clone())
            .await
    }

    async fn execute_inner<R: RunnerReporter>(
        &self,
        shutdown: CancellationToken,
        reporter: &R,
    ) -> Result<JobStatus, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync job is already running.");
            return Err(SyncError::RunnerBusy {
                job_id: self.job.id.clone(),
            });
        }
        let _running = RunningGuard(&self.running);

        reporter.report(RunnerEvent::Started {
            job_id: &self.job.id,
            job_type: self.job.job_type,
        });
        debug!("Starting execution of {} sync job.", self.job.job_type);
        self.transition(RunnerState::Starting, reporter);

        let mut ctx = RunContext::new(self.job.clone(), self.connector.clone());

        if let Err(e) = self.sync_starts(&mut ctx).await {
            self.transition(RunnerState::Idle, reporter);
            return Err(e);
        }

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(SyncError::JobSuspended),
            result = self.run(&mut ctx, reporter) => result,
        };

        let (status, sync_error) = match result {
            Ok(()) => (JobStatus::Completed, None),
            Err(e) => {
                let status = e.terminal_status();
                match status {
                    JobStatus::Suspended => warn!("Caught signal to suspend the job."),
                    JobStatus::Canceled => warn!("Caught signal to cancel the job."),
                    _ => error!(error = %e, "Error while running sync job"),
                }
                let sync_error =
                    (status == JobStatus::Error).then(|| e.sync_error_message(&ctx.job.index_name));
                (status, sync_error)
            }
        };

        self.sync_done(&mut ctx, status, sync_error.as_deref(), reporter)
            .await;

        info!("Job terminated. Cleaning up.");
        ctx.release().await;
        self.transition(RunnerState::Idle, reporter);

        Ok(status)
    }

    // -------------------------------------------------------------------------
    // Start
    // -------------------------------------------------------------------------

    /// Marks the connector as syncing.
    ///
    /// Conflicts propagate unchanged so callers can tell a lost race from a
    /// broken start.
    async fn sync_starts(
        &self,
        ctx: &mut RunContext<F::Source, B::Sink>,
    ) -> Result<(), SyncError> {
        let connector_id = ctx.connector.id.clone();

        match self.reload_connector(&mut ctx.connector).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(SyncError::start_failed(format!(
                    "Couldn't reload connector {}",
                    connector_id
                )));
            }
            Err(e) if e.is_conflict() => return Err(e),
            Err(e) => {
                return Err(SyncError::StartFailed {
                    message: format!("Couldn't reload connector {}", connector_id),
                    source: Some(Box::new(e)),
                });
            }
        }

        let job_type = ctx.job.job_type;
        let busy_message = match job_type {
            JobType::Full | JobType::Incremental => (ctx.connector.last_sync_status
                == Some(JobStatus::InProgress))
            .then(|| {
                format!(
                    "A content sync job is started for connector {} by another connector instance",
                    connector_id
                )
            }),
            JobType::AccessControl => (ctx.connector.last_access_control_sync_status
                == Some(JobStatus::InProgress))
            .then(|| {
                format!(
                    "An access control sync job is started for connector {} by another connector instance",
                    connector_id
                )
            }),
            JobType::Unknown => {
                error!("Unknown job type: '{}'. Skipping running sync job", job_type);
                return Err(SyncError::start_failed(format!(
                    "Unknown job type: '{}'",
                    job_type
                )));
            }
        };

        if let Some(message) = busy_message {
            debug!("{}, skipping...", message);
            return Err(SyncError::start_failed(message));
        }

        match self.connector_store.sync_starts(&connector_id, job_type).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => Err(e),
            Err(e) => Err(SyncError::StartFailed {
                message: format!("Couldn't mark connector {} as syncing", connector_id),
                source: Some(Box::new(e)),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Run
    // -------------------------------------------------------------------------

    async fn run<R: RunnerReporter>(
        &self,
        ctx: &mut RunContext<F::Source, B::Sink>,
        reporter: &R,
    ) -> Result<(), SyncError> {
        let job_type = ctx.job.job_type;
        // Only content syncs resume from the connector's cursor
        let claim_cursor = if job_type.is_content_sync() {
            ctx.connector.sync_cursor.clone()
        } else {
            None
        };

        ctx.started = Instant::now();
        self.job_store.claim(&ctx.job.id, claim_cursor).await?;
        debug!("Successfully claimed the sync job.");
        self.transition(RunnerState::Claimed, reporter);

        let mut source = self.source_factory.create(
            &ctx.connector,
            &ctx.job.configuration,
            &self.config.framework,
        )?;
        if job_type == JobType::Full {
            if let Some(cursor) = ctx.job.sync_cursor.clone() {
                info!("Found a sync_cursor for the job - connector will start from it if possible");
                source.set_sync_cursor(cursor);
            }
        }
        source.set_features(&ctx.connector.features);
        let source = Arc::new(source);
        ctx.source = Some(Arc::clone(&source));
        debug!(source = source.name(), "Instantiated data source for the sync job.");
        self.transition(RunnerState::Validating, reporter);

        if !source.changed().await? {
            info!("No change in remote source, skipping sync");
            reporter.report(RunnerEvent::NoChanges {
                job_id: &ctx.job.id,
            });
            return Ok(());
        }

        debug!("Validating configuration");
        source.validate_config_fields()?;
        source.validate_config().await?;

        debug!("Pinging the backend");
        source.ping().await?;

        let mut bulk_options = self.config.bulk.clone();
        source.tweak_bulk_options(&mut bulk_options);

        let mut sink_settings = SinkSettings::default();
        if ctx.connector.native
            && ctx.connector.features.native_connector_api_keys_enabled
            && self.config.use_native_connector_api_keys
        {
            sink_settings.api_key = Some(self.native_api_key(&ctx.connector).await?);
        }

        let sink = Arc::new(self.sink_factory.create(&sink_settings)?);
        ctx.sink = Some(Arc::clone(&sink));
        self.transition(RunnerState::Running, reporter);

        match job_type {
            JobType::Full | JobType::Incremental => {
                info!("Executing {} sync", job_type);
                self.execute_content_sync_job(ctx, &source, &sink, bulk_options)
                    .await?;
            }
            JobType::AccessControl => {
                info!("Executing access control sync");
                self.execute_access_control_sync_job(ctx, &source, &sink, bulk_options)
                    .await?;
            }
            JobType::Unknown => {
                return Err(SyncError::UnsupportedJobType(job_type.to_string()));
            }
        }
        reporter.report(RunnerEvent::IngestionStarted {
            job_id: &ctx.job.id,
            index_name: &ctx.job.index_name,
        });

        let stats_reporter = IngestionStatsReporter::new(
            self.job_store.clone(),
            ctx.job.id.clone(),
            job_type.is_content_sync(),
            Arc::clone(&source),
            Arc::clone(&sink),
            self.config.job_reporting_interval,
        );
        ctx.reporting_task = Some(stats_reporter.spawn(self.span.clone()));
        self.transition(RunnerState::Reporting, reporter);

        while !sink.done() {
            self.check_job(ctx).await?;
            tokio::time::sleep(self.config.job_check_interval).await;
        }

        match sink.get_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn native_api_key(&self, connector: &Connector) -> Result<String, SyncError> {
        debug!(index = %connector.index_name, "Checking secrets storage for API key");
        let missing = || SyncError::ApiKeyMissing(connector.index_name.clone());

        let secret_id = connector.api_key_secret_id.as_deref().ok_or_else(missing)?;
        match self.connector_store.get_connector_secret(secret_id).await {
            Ok(api_key) => {
                debug!("API key found in secrets storage, will use this for authorization");
                Ok(api_key)
            }
            Err(e) if e.is_not_found() => Err(missing()),
            Err(e) => Err(e),
        }
    }

    async fn execute_content_sync_job(
        &self,
        ctx: &RunContext<F::Source, B::Sink>,
        source: &Arc<F::Source>,
        sink: &Arc<B::Sink>,
        options: BulkOptions,
    ) -> Result<(), SyncError> {
        let job = &ctx.job;
        let features = &ctx.connector.features;

        if job.job_type == JobType::Incremental && !features.incremental_sync_enabled {
            return Err(SyncError::UnsupportedJobType(format!(
                "Connector {} does not support incremental sync.",
                ctx.connector.id
            )));
        }

        if features.sync_rules_enabled {
            debug!("Validating sync rules");
            self.job_store
                .validate_filtering(job, source.as_ref())
                .await?;
        }

        sink.prepare_content_index(&job.index_name, job.language.as_deref())
            .await?;

        let skip_unchanged_documents =
            skip_unchanged_documents_enabled(job.job_type, source.as_ref());
        if skip_unchanged_documents {
            debug!("Incremental job served by a full scan, unchanged documents are skipped");
        }

        let items = generator(source.as_ref(), job, ctx.connector.sync_cursor.as_ref())?;
        let adapter = DocumentAdapter::new(&job.pipeline, self.config.id_size_limit);
        let items = prepare_docs(items, adapter, Arc::clone(source));

        let request = BulkRequest {
            index_name: job.index_name.clone(),
            pipeline: job.pipeline.clone(),
            job_type: job.job_type,
            filtering: Some(job.filtering.clone()),
            sync_rules_enabled: features.sync_rules_enabled,
            content_extraction_enabled: job.content_extraction_enabled(),
            skip_unchanged_documents,
            options,
        };
        sink.async_bulk(request, items).await
    }

    async fn execute_access_control_sync_job(
        &self,
        ctx: &RunContext<F::Source, B::Sink>,
        source: &Arc<F::Source>,
        sink: &Arc<B::Sink>,
        options: BulkOptions,
    ) -> Result<(), SyncError> {
        let job = &ctx.job;

        if ctx.connector.features.document_level_security_enabled
            || source.requires_platinum_license()
        {
            let (enabled, actual) = sink.has_active_license_enabled(License::Platinum).await?;
            if !enabled {
                return Err(SyncError::InsufficientLicense {
                    required: License::Platinum,
                    actual,
                });
            }
        }

        // Access-control documents go to the sink as produced
        let items = generator(source.as_ref(), job, None)?;

        let request = BulkRequest {
            index_name: job.index_name.clone(),
            pipeline: job.pipeline.clone(),
            job_type: job.job_type,
            filtering: None,
            sync_rules_enabled: false,
            content_extraction_enabled: false,
            skip_unchanged_documents: false,
            options,
        };
        sink.async_bulk(request, items).await
    }

    /// Fails if the job can no longer run: a record vanished, the job is
    /// being canceled, or it left the in-progress state.
    async fn check_job(&self, ctx: &mut RunContext<F::Source, B::Sink>) -> Result<(), SyncError> {
        if !self.reload_connector(&mut ctx.connector).await? {
            return Err(SyncError::ConnectorNotFound(ctx.connector.id.clone()));
        }

        if !self.reload_sync_job(&mut ctx.job).await? {
            return Err(SyncError::JobNotFound(ctx.job.id.clone()));
        }

        match ctx.job.status {
            JobStatus::InProgress => Ok(()),
            JobStatus::Canceling => Err(SyncError::JobCanceled),
            status => Err(SyncError::JobNotRunning {
                job_id: ctx.job.id.clone(),
                status,
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Finalize
    // -------------------------------------------------------------------------

    /// Persists the terminal status and the connector's outcome.
    ///
    /// Store failures are logged and skipped: finalization always runs to
    /// the end.
    async fn sync_done<R: RunnerReporter>(
        &self,
        ctx: &mut RunContext<F::Source, B::Sink>,
        status: JobStatus,
        sync_error: Option<&str>,
        reporter: &R,
    ) {
        self.transition(RunnerState::Finalizing, reporter);

        if let Some(task) = ctx.reporting_task.take() {
            task.stop().await;
        }
        if let Some(sink) = &ctx.sink {
            sink.cancel().await;
        }

        let ingestion_stats = ctx
            .sink
            .as_ref()
            .map(|sink| sink.ingestion_stats())
            .unwrap_or_default();
        let mut persisted = PersistedStats::from(&ingestion_stats);

        if self.reload_sync_job_or_skip(&mut ctx.job).await {
            if self.reload_connector_or_skip(&mut ctx.connector).await {
                match self.connector_store.document_count(&ctx.connector.id).await {
                    Ok(count) => persisted.total_document_count = Some(count),
                    Err(e) => warn!(error = %e, "Failed to count documents"),
                }
            }
            self.persist_status(&ctx.job.id, status, sync_error, &persisted)
                .await;
        }

        if self.reload_connector_or_skip(&mut ctx.connector).await {
            let sync_cursor = if ctx.job.is_content_sync() {
                ctx.source.as_ref().and_then(|source| source.sync_cursor())
            } else {
                None
            };
            let job = if self.reload_sync_job_or_skip(&mut ctx.job).await {
                Some(&ctx.job)
            } else {
                None
            };
            if let Err(e) = self
                .connector_store
                .sync_done(&ctx.connector.id, job, sync_cursor.as_ref())
                .await
            {
                warn!(error = %e, "Failed to record sync outcome on connector");
            }
        }

        let elapsed = ctx.started.elapsed();
        info!(
            "Sync ended with status {} -- created: {} | updated: {} | deleted: {} (took {} seconds)",
            status,
            ingestion_stats.doc_creates_queued,
            ingestion_stats.doc_updates_queued,
            ingestion_stats.doc_deletes_queued,
            elapsed.as_secs()
        );
        log_counters(&ingestion_stats.counters());

        reporter.report(RunnerEvent::Finished {
            job_id: &ctx.job.id,
            status,
            stats: &ingestion_stats,
            elapsed,
        });
        self.transition(RunnerState::Done, reporter);
    }

    async fn persist_status(
        &self,
        job_id: &str,
        status: JobStatus,
        sync_error: Option<&str>,
        stats: &PersistedStats,
    ) {
        let result = match status {
            JobStatus::Error => {
                self.job_store
                    .fail(job_id, sync_error.unwrap_or("unknown error"), stats)
                    .await
            }
            JobStatus::Suspended => self.job_store.suspend(job_id, stats).await,
            JobStatus::Canceled => self.job_store.cancel(job_id, stats).await,
            _ => self.job_store.done(job_id, stats).await,
        };
        if let Err(e) = result {
            warn!(error = %e, %status, "Failed to persist terminal job status");
        }
    }

    // -------------------------------------------------------------------------
    // Reloads
    // -------------------------------------------------------------------------

    /// Refreshes the connector snapshot. `Ok(false)` if it vanished.
    async fn reload_connector(&self, connector: &mut Connector) -> Result<bool, SyncError> {
        match self.connector_store.reload(&connector.id).await {
            Ok(fresh) => {
                *connector = fresh;
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                error!(connector_id = %connector.id, "Couldn't reload connector");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Refreshes the job snapshot. `Ok(false)` if it vanished.
    async fn reload_sync_job(&self, job: &mut SyncJob) -> Result<bool, SyncError> {
        match self.job_store.reload(&job.id).await {
            Ok(fresh) => {
                *job = fresh;
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                error!(job_id = %job.id, "Couldn't reload sync job");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn reload_connector_or_skip(&self, connector: &mut Connector) -> bool {
        self.reload_connector(connector).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to reload connector");
            false
        })
    }

    async fn reload_sync_job_or_skip(&self, job: &mut SyncJob) -> bool {
        self.reload_sync_job(job).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to reload sync job");
            false
        })
    }

    fn transition<R: RunnerReporter>(&self, to: RunnerState, reporter: &R) {
        let from = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, to)
        };
        reporter.report(RunnerEvent::StateChanged {
            job_id: &self.job.id,
            from,
            to,
        });
    }
}
