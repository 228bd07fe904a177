//! Test utilities and mock implementations for integration tests.
//!
//! Provides in-memory implementations of the runner's collaborators. The
//! mocks of one [`TestEnv`] share a [`CallLog`], so tests can assert the
//! order of calls across collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use connsync_core::config::FrameworkConfig;
use connsync_core::document::{
    AccessControlStream, DocStream, IncrementalDocStream, SyncItemStream,
};
use connsync_core::job::SourceConfiguration;
use connsync_core::traits::{FilteringValidation, sha256_hex};
use connsync_core::{
    BulkRequest, BulkSink, Connector, ConnectorStore, DataSource, DataSourceFactory, Document,
    Filtering, IngestionStats, JobStatus, JobStore, JobType, LazyDownload, License, Operation,
    PersistedStats, RunnerConfig, RunnerState, SinkFactory, SinkSettings, SyncCursor, SyncError,
    SyncItem, SyncJob, SyncJobRunner,
};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub const CONNECTOR_ID: &str = "conn-1";
pub const JOB_ID: &str = "job-1";
pub const INDEX_NAME: &str = "search-test";

// =============================================================================
// CallLog
// =============================================================================

/// Ordered record of calls made on the mocks.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, call: &str) -> bool {
        self.entries().iter().any(|c| c == call)
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.entries().iter().position(|c| c == call)
    }
}

// =============================================================================
// MockJobStore
// =============================================================================

/// In-memory job store.
#[derive(Clone)]
pub struct MockJobStore {
    jobs: Arc<Mutex<HashMap<String, SyncJob>>>,
    claim_cursors: Arc<Mutex<Vec<Option<SyncCursor>>>>,
    metadata_updates: Arc<Mutex<Vec<(PersistedStats, Option<SyncCursor>)>>>,
    claim_conflict: Arc<Mutex<bool>>,
    calls: CallLog,
}

impl MockJobStore {
    pub fn new(calls: CallLog) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            claim_cursors: Arc::new(Mutex::new(Vec::new())),
            metadata_updates: Arc::new(Mutex::new(Vec::new())),
            claim_conflict: Arc::new(Mutex::new(false)),
            calls,
        }
    }

    /// Makes every claim lose a concurrent-write race.
    pub fn conflict_on_claim(&self) {
        *self.claim_conflict.lock().unwrap() = true;
    }

    pub fn insert(&self, job: SyncJob) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    pub fn remove(&self, job_id: &str) {
        self.jobs.lock().unwrap().remove(job_id);
    }

    pub fn job(&self, job_id: &str) -> Option<SyncJob> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    /// Simulates an external actor changing the job's status.
    pub fn set_status(&self, job_id: &str, status: JobStatus) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_id) {
            job.status = status;
        }
    }

    pub fn claim_cursors(&self) -> Vec<Option<SyncCursor>> {
        self.claim_cursors.lock().unwrap().clone()
    }

    pub fn metadata_updates(&self) -> Vec<(PersistedStats, Option<SyncCursor>)> {
        self.metadata_updates.lock().unwrap().clone()
    }

    fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<&str>,
        stats: &PersistedStats,
    ) -> Result<(), SyncError> {
        self.calls.push(format!("job.{}", status));
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SyncError::NotFound(job_id.to_string()))?;
        job.status = status;
        job.error = error.map(str::to_string);
        job.ingestion_stats = stats.clone();
        Ok(())
    }
}

impl JobStore for MockJobStore {
    async fn claim(&self, job_id: &str, sync_cursor: Option<SyncCursor>) -> Result<(), SyncError> {
        self.calls.push("job.claim");
        self.claim_cursors.lock().unwrap().push(sync_cursor);
        if *self.claim_conflict.lock().unwrap() {
            return Err(SyncError::Conflict(format!("job {} claimed elsewhere", job_id)));
        }
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SyncError::NotFound(job_id.to_string()))?;
        job.status = JobStatus::InProgress;
        Ok(())
    }

    async fn reload(&self, job_id: &str) -> Result<SyncJob, SyncError> {
        self.job(job_id)
            .ok_or_else(|| SyncError::NotFound(job_id.to_string()))
    }

    async fn update_metadata(
        &self,
        job_id: &str,
        stats: &PersistedStats,
        sync_cursor: Option<&SyncCursor>,
    ) -> Result<(), SyncError> {
        let cursor = sync_cursor.map(|c| c.as_value().to_string());
        self.calls.push(format!(
            "job.update_metadata:{}",
            cursor.as_deref().unwrap_or("none")
        ));
        self.metadata_updates
            .lock()
            .unwrap()
            .push((stats.clone(), sync_cursor.cloned()));

        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SyncError::NotFound(job_id.to_string()))?;
        job.ingestion_stats = stats.clone();
        if let Some(cursor) = sync_cursor {
            job.sync_cursor = Some(cursor.clone());
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        error: &str,
        stats: &PersistedStats,
    ) -> Result<(), SyncError> {
        self.finish(job_id, JobStatus::Error, Some(error), stats)
    }

    async fn suspend(&self, job_id: &str, stats: &PersistedStats) -> Result<(), SyncError> {
        self.finish(job_id, JobStatus::Suspended, None, stats)
    }

    async fn cancel(&self, job_id: &str, stats: &PersistedStats) -> Result<(), SyncError> {
        self.finish(job_id, JobStatus::Canceled, None, stats)
    }

    async fn done(&self, job_id: &str, stats: &PersistedStats) -> Result<(), SyncError> {
        self.finish(job_id, JobStatus::Completed, None, stats)
    }
}

// =============================================================================
// MockConnectorStore
// =============================================================================

/// Arguments of one `sync_done` call.
#[derive(Debug, Clone)]
pub struct SyncDoneCall {
    pub job_status: Option<JobStatus>,
    pub sync_cursor: Option<SyncCursor>,
}

/// In-memory connector store with a secret vault.
#[derive(Clone)]
pub struct MockConnectorStore {
    connectors: Arc<Mutex<HashMap<String, Connector>>>,
    secrets: Arc<Mutex<HashMap<String, String>>>,
    sync_starts_error: Arc<Mutex<Option<SyncError>>>,
    sync_done_calls: Arc<Mutex<Vec<SyncDoneCall>>>,
    document_count: u64,
    calls: CallLog,
}

impl MockConnectorStore {
    pub fn new(calls: CallLog) -> Self {
        Self {
            connectors: Arc::new(Mutex::new(HashMap::new())),
            secrets: Arc::new(Mutex::new(HashMap::new())),
            sync_starts_error: Arc::new(Mutex::new(None)),
            sync_done_calls: Arc::new(Mutex::new(Vec::new())),
            document_count: 42,
            calls,
        }
    }

    pub fn insert(&self, connector: Connector) {
        self.connectors
            .lock()
            .unwrap()
            .insert(connector.id.clone(), connector);
    }

    pub fn remove(&self, connector_id: &str) {
        self.connectors.lock().unwrap().remove(connector_id);
    }

    pub fn connector(&self, connector_id: &str) -> Option<Connector> {
        self.connectors.lock().unwrap().get(connector_id).cloned()
    }

    pub fn add_secret(&self, secret_id: &str, value: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(secret_id.to_string(), value.to_string());
    }

    /// Makes the next `sync_starts` call fail with `error`.
    pub fn fail_sync_starts(&self, error: SyncError) {
        *self.sync_starts_error.lock().unwrap() = Some(error);
    }

    pub fn sync_done_calls(&self) -> Vec<SyncDoneCall> {
        self.sync_done_calls.lock().unwrap().clone()
    }

    /// Count reported by `document_count`.
    pub fn stored_document_count(&self) -> u64 {
        self.document_count
    }
}

impl ConnectorStore for MockConnectorStore {
    async fn reload(&self, connector_id: &str) -> Result<Connector, SyncError> {
        self.connector(connector_id)
            .ok_or_else(|| SyncError::NotFound(connector_id.to_string()))
    }

    async fn sync_starts(&self, connector_id: &str, job_type: JobType) -> Result<(), SyncError> {
        self.calls.push("connector.sync_starts");
        if let Some(e) = self.sync_starts_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut connectors = self.connectors.lock().unwrap();
        let connector = connectors
            .get_mut(connector_id)
            .ok_or_else(|| SyncError::NotFound(connector_id.to_string()))?;
        if job_type == JobType::AccessControl {
            connector.last_access_control_sync_status = Some(JobStatus::InProgress);
        } else {
            connector.last_sync_status = Some(JobStatus::InProgress);
        }
        Ok(())
    }

    async fn sync_done(
        &self,
        connector_id: &str,
        job: Option<&SyncJob>,
        sync_cursor: Option<&SyncCursor>,
    ) -> Result<(), SyncError> {
        self.calls.push("connector.sync_done");
        self.sync_done_calls.lock().unwrap().push(SyncDoneCall {
            job_status: job.map(|j| j.status),
            sync_cursor: sync_cursor.cloned(),
        });

        let mut connectors = self.connectors.lock().unwrap();
        let connector = connectors
            .get_mut(connector_id)
            .ok_or_else(|| SyncError::NotFound(connector_id.to_string()))?;
        let status = job.map(|j| j.status).unwrap_or(JobStatus::Error);
        match job.map(|j| j.job_type) {
            Some(JobType::AccessControl) => {
                connector.last_access_control_sync_status = Some(status)
            }
            _ => connector.last_sync_status = Some(status),
        }
        if let Some(cursor) = sync_cursor {
            connector.sync_cursor = Some(cursor.clone());
        }
        Ok(())
    }

    async fn document_count(&self, _connector_id: &str) -> Result<u64, SyncError> {
        Ok(self.document_count)
    }

    async fn get_connector_secret(&self, secret_id: &str) -> Result<String, SyncError> {
        self.calls.push("connector.get_connector_secret");
        self.secrets
            .lock()
            .unwrap()
            .get(secret_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(secret_id.to_string()))
    }
}

// =============================================================================
// MockDataSource
// =============================================================================

/// Behaviour of the data sources built by a [`MockSourceFactory`].
#[derive(Clone, Default)]
pub struct MockSourceSetup {
    pub docs: Vec<Document>,
    pub incremental_docs: Vec<(Document, Operation)>,
    pub access_control_docs: Vec<Document>,
    pub unchanged: bool,
    pub supports_incremental_fetch: bool,
    pub requires_platinum_license: bool,
    pub ping_error: Option<String>,
    pub filtering_error: Option<String>,
    /// Delay before each produced item.
    pub doc_delay: Duration,
    pub hash_id: Option<fn(&str) -> String>,
}

type SharedCursor = Arc<Mutex<Option<SyncCursor>>>;

/// Factory handing out [`MockDataSource`]s that share their state with it.
#[derive(Clone)]
pub struct MockSourceFactory {
    setup: Arc<Mutex<MockSourceSetup>>,
    cursor: SharedCursor,
    resumed_from: SharedCursor,
    incremental_from: SharedCursor,
    created: Arc<AtomicUsize>,
    calls: CallLog,
}

impl MockSourceFactory {
    pub fn new(calls: CallLog) -> Self {
        Self {
            setup: Arc::new(Mutex::new(MockSourceSetup::default())),
            cursor: Arc::new(Mutex::new(None)),
            resumed_from: Arc::new(Mutex::new(None)),
            incremental_from: Arc::new(Mutex::new(None)),
            created: Arc::new(AtomicUsize::new(0)),
            calls,
        }
    }

    pub fn configure(&self, f: impl FnOnce(&mut MockSourceSetup)) {
        f(&mut self.setup.lock().unwrap());
    }

    /// Cursor currently reported by the sources.
    pub fn cursor(&self) -> Option<SyncCursor> {
        self.cursor.lock().unwrap().clone()
    }

    /// Checkpoint handed through `set_sync_cursor`.
    pub fn resumed_from(&self) -> Option<SyncCursor> {
        self.resumed_from.lock().unwrap().clone()
    }

    /// Cursor passed to `get_docs_incrementally`.
    pub fn incremental_from(&self) -> Option<SyncCursor> {
        self.incremental_from.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Builds a source directly, outside of any runner.
    pub fn source(&self) -> MockDataSource {
        MockDataSource {
            setup: self.setup.lock().unwrap().clone(),
            cursor: Arc::clone(&self.cursor),
            resumed_from: Arc::clone(&self.resumed_from),
            incremental_from: Arc::clone(&self.incremental_from),
            calls: self.calls.clone(),
        }
    }
}

impl DataSourceFactory for MockSourceFactory {
    type Source = MockDataSource;

    fn create(
        &self,
        _connector: &Connector,
        _configuration: &SourceConfiguration,
        _framework: &FrameworkConfig,
    ) -> Result<MockDataSource, SyncError> {
        self.calls.push("source.create");
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.source())
    }
}

/// Data source yielding the documents of its [`MockSourceSetup`].
///
/// The cursor advances to `{"position": n}` as the n-th item is produced.
pub struct MockDataSource {
    setup: MockSourceSetup,
    cursor: SharedCursor,
    resumed_from: SharedCursor,
    incremental_from: SharedCursor,
    calls: CallLog,
}

/// Yields `items` one by one, advancing `cursor` as it goes.
fn tracked<T: Send + 'static>(
    items: Vec<T>,
    cursor: SharedCursor,
    delay: Duration,
) -> BoxStream<'static, Result<T, SyncError>> {
    stream::iter(items.into_iter().enumerate())
        .then(move |(position, item)| {
            let cursor = Arc::clone(&cursor);
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                *cursor.lock().unwrap() =
                    Some(SyncCursor::new(json!({ "position": position + 1 })));
                Ok::<T, SyncError>(item)
            }
        })
        .boxed()
}

impl DataSource for MockDataSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn set_sync_cursor(&mut self, cursor: SyncCursor) {
        self.calls.push("source.set_sync_cursor");
        *self.resumed_from.lock().unwrap() = Some(cursor.clone());
        *self.cursor.lock().unwrap() = Some(cursor);
    }

    async fn changed(&self) -> Result<bool, SyncError> {
        self.calls.push("source.changed");
        Ok(!self.setup.unchanged)
    }

    fn validate_config_fields(&self) -> Result<(), SyncError> {
        self.calls.push("source.validate_config_fields");
        Ok(())
    }

    async fn validate_config(&self) -> Result<(), SyncError> {
        self.calls.push("source.validate_config");
        Ok(())
    }

    async fn ping(&self) -> Result<(), SyncError> {
        self.calls.push("source.ping");
        match &self.setup.ping_error {
            Some(message) => Err(SyncError::Unreachable(message.clone())),
            None => Ok(()),
        }
    }

    async fn validate_filtering(
        &self,
        _filtering: &Filtering,
    ) -> Result<FilteringValidation, SyncError> {
        self.calls.push("source.validate_filtering");
        Ok(match &self.setup.filtering_error {
            Some(error) => FilteringValidation::invalid(error.clone()),
            None => FilteringValidation::valid(),
        })
    }

    fn requires_platinum_license(&self) -> bool {
        self.setup.requires_platinum_license
    }

    fn supports_incremental_fetch(&self) -> bool {
        self.setup.supports_incremental_fetch
    }

    fn get_docs(&self, _filtering: &Filtering) -> DocStream {
        self.calls.push("source.get_docs");
        tracked(
            self.setup.docs.clone(),
            Arc::clone(&self.cursor),
            self.setup.doc_delay,
        )
        .map(|res| res.map(|doc| (doc, None::<LazyDownload>)))
        .boxed()
    }

    fn get_docs_incrementally(
        &self,
        cursor: Option<&SyncCursor>,
        _filtering: &Filtering,
    ) -> IncrementalDocStream {
        self.calls.push("source.get_docs_incrementally");
        *self.incremental_from.lock().unwrap() = cursor.cloned();
        tracked(
            self.setup.incremental_docs.clone(),
            Arc::clone(&self.cursor),
            self.setup.doc_delay,
        )
        .map(|res| res.map(|(doc, operation)| (doc, None::<LazyDownload>, operation)))
        .boxed()
    }

    fn get_access_control(&self) -> AccessControlStream {
        self.calls.push("source.get_access_control");
        tracked(
            self.setup.access_control_docs.clone(),
            Arc::clone(&self.cursor),
            self.setup.doc_delay,
        )
    }

    fn sync_cursor(&self) -> Option<SyncCursor> {
        self.cursor.lock().unwrap().clone()
    }

    fn hash_id(&self, id: &str) -> String {
        match self.setup.hash_id {
            Some(hash) => hash(id),
            None => sha256_hex(id),
        }
    }

    async fn close(&self) {
        self.calls.push("source.close");
    }
}

// =============================================================================
// MockSink
// =============================================================================

struct SinkShared {
    items: Mutex<Vec<(Document, Option<Operation>)>>,
    requests: Mutex<Vec<BulkRequest>>,
    stats: Mutex<IngestionStats>,
    done: AtomicBool,
    error: Mutex<Option<SyncError>>,
    fail_with: Mutex<Option<SyncError>>,
    flush_error: AtomicBool,
    flushes: AtomicUsize,
    hold_open: AtomicBool,
    license: Mutex<License>,
    cancel_token: CancellationToken,
}

impl SinkShared {
    fn record(&self, item: SyncItem) {
        {
            let mut stats = self.stats.lock().unwrap();
            match item.operation {
                Some(Operation::Delete) => {
                    stats.doc_deletes_queued += 1;
                    stats.deleted_document_count += 1;
                }
                Some(Operation::Update) => {
                    stats.doc_updates_queued += 1;
                    stats.indexed_document_count += 1;
                }
                Some(Operation::Index) | None => {
                    stats.doc_creates_queued += 1;
                    stats.indexed_document_count += 1;
                }
            }
        }
        self.items.lock().unwrap().push((item.doc, item.operation));
    }
}

/// Bulk sink consuming its stream on a background task.
#[derive(Clone)]
pub struct MockSink {
    shared: Arc<SinkShared>,
    calls: CallLog,
}

impl MockSink {
    pub fn new(calls: CallLog) -> Self {
        Self {
            shared: Arc::new(SinkShared {
                items: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
                stats: Mutex::new(IngestionStats::default()),
                done: AtomicBool::new(false),
                error: Mutex::new(None),
                fail_with: Mutex::new(None),
                flush_error: AtomicBool::new(false),
                flushes: AtomicUsize::new(0),
                hold_open: AtomicBool::new(false),
                license: Mutex::new(License::Platinum),
                cancel_token: CancellationToken::new(),
            }),
            calls,
        }
    }

    /// Keeps ingestion running after the stream is drained, until cancelled.
    pub fn hold_open(&self) {
        self.shared.hold_open.store(true, Ordering::SeqCst);
    }

    /// Reports `error` once the stream is drained.
    pub fn fail_with(&self, error: SyncError) {
        *self.shared.fail_with.lock().unwrap() = Some(error);
    }

    pub fn fail_flushes(&self) {
        self.shared.flush_error.store(true, Ordering::SeqCst);
    }

    pub fn set_license(&self, license: License) {
        *self.shared.license.lock().unwrap() = license;
    }

    pub fn items(&self) -> Vec<(Document, Option<Operation>)> {
        self.shared.items.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<BulkRequest> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.shared.flushes.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel_token.is_cancelled()
    }
}

impl BulkSink for MockSink {
    async fn prepare_content_index(
        &self,
        _index_name: &str,
        _language: Option<&str>,
    ) -> Result<(), SyncError> {
        self.calls.push("sink.prepare_content_index");
        Ok(())
    }

    async fn has_active_license_enabled(
        &self,
        required: License,
    ) -> Result<(bool, License), SyncError> {
        self.calls.push("sink.has_active_license_enabled");
        let license = *self.shared.license.lock().unwrap();
        Ok((license.satisfies(required), license))
    }

    async fn async_bulk(
        &self,
        request: BulkRequest,
        items: SyncItemStream,
    ) -> Result<(), SyncError> {
        self.calls.push("sink.async_bulk");
        self.shared.requests.lock().unwrap().push(request);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut items = items;
            loop {
                let next = tokio::select! {
                    _ = shared.cancel_token.cancelled() => break,
                    next = items.next() => next,
                };
                match next {
                    Some(Ok(item)) => shared.record(item),
                    Some(Err(e)) => {
                        *shared.error.lock().unwrap() = Some(e);
                        break;
                    }
                    None => break,
                }
            }

            let injected = shared.fail_with.lock().unwrap().take();
            if let Some(e) = injected {
                shared.error.lock().unwrap().get_or_insert(e);
            }
            if shared.hold_open.load(Ordering::SeqCst) {
                shared.cancel_token.cancelled().await;
            }
            shared.done.store(true, Ordering::SeqCst);
        });

        Ok(())
    }

    fn done(&self) -> bool {
        self.shared.done.load(Ordering::SeqCst)
    }

    fn get_error(&self) -> Option<SyncError> {
        self.shared.error.lock().unwrap().take()
    }

    fn ingestion_stats(&self) -> IngestionStats {
        self.shared.stats.lock().unwrap().clone()
    }

    async fn trigger_flush(&self) -> Result<(), SyncError> {
        self.calls.push("sink.trigger_flush");
        if self.shared.flush_error.load(Ordering::SeqCst) {
            return Err(SyncError::Sink("flush failed".to_string()));
        }
        self.shared.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cancel(&self) {
        self.calls.push("sink.cancel");
        self.shared.cancel_token.cancel();
    }

    async fn close(&self) {
        self.calls.push("sink.close");
    }
}

/// Factory always handing out the same [`MockSink`].
#[derive(Clone)]
pub struct MockSinkFactory {
    sink: MockSink,
    settings: Arc<Mutex<Vec<SinkSettings>>>,
    calls: CallLog,
}

impl MockSinkFactory {
    pub fn new(calls: CallLog) -> Self {
        Self {
            sink: MockSink::new(calls.clone()),
            settings: Arc::new(Mutex::new(Vec::new())),
            calls,
        }
    }

    pub fn sink(&self) -> &MockSink {
        &self.sink
    }

    /// Settings of every `create` call.
    pub fn settings(&self) -> Vec<SinkSettings> {
        self.settings.lock().unwrap().clone()
    }
}

impl SinkFactory for MockSinkFactory {
    type Sink = MockSink;

    fn create(&self, settings: &SinkSettings) -> Result<MockSink, SyncError> {
        self.calls.push("sink.create");
        self.settings.lock().unwrap().push(settings.clone());
        Ok(self.sink.clone())
    }
}

// =============================================================================
// TestEnv
// =============================================================================

pub type TestRunner =
    SyncJobRunner<MockJobStore, MockConnectorStore, MockSourceFactory, MockSinkFactory>;

/// One job, one connector and a full set of collaborators.
pub struct TestEnv {
    pub calls: CallLog,
    pub job_store: MockJobStore,
    pub connector_store: MockConnectorStore,
    pub sources: MockSourceFactory,
    pub sinks: MockSinkFactory,
    pub job: SyncJob,
    pub connector: Connector,
}

impl TestEnv {
    pub fn new(job_type: JobType) -> Self {
        // Silent unless RUST_LOG is set; only the first test installs it
        let _ = connsync_core::logging::init_tracing("off");
        let calls = CallLog::default();
        Self {
            job_store: MockJobStore::new(calls.clone()),
            connector_store: MockConnectorStore::new(calls.clone()),
            sources: MockSourceFactory::new(calls.clone()),
            sinks: MockSinkFactory::new(calls.clone()),
            job: SyncJob::new(JOB_ID, CONNECTOR_ID, job_type, INDEX_NAME),
            connector: Connector::new(CONNECTOR_ID, "mock", INDEX_NAME),
            calls,
        }
    }

    pub fn with_job(mut self, f: impl FnOnce(&mut SyncJob)) -> Self {
        f(&mut self.job);
        self
    }

    pub fn with_connector(mut self, f: impl FnOnce(&mut Connector)) -> Self {
        f(&mut self.connector);
        self
    }

    pub fn sink(&self) -> &MockSink {
        self.sinks.sink()
    }

    /// Stores job and connector, then builds a runner with short intervals.
    pub fn runner(&self) -> TestRunner {
        self.runner_with_config(fast_config())
    }

    pub fn runner_with_config(&self, config: RunnerConfig) -> TestRunner {
        self.job_store.insert(self.job.clone());
        self.connector_store.insert(self.connector.clone());
        SyncJobRunner::with_config(
            self.job_store.clone(),
            self.connector_store.clone(),
            self.sources.clone(),
            self.sinks.clone(),
            self.job.clone(),
            self.connector.clone(),
            config,
        )
    }

    /// Terminal record of the job.
    pub fn stored_job(&self) -> SyncJob {
        self.job_store.job(JOB_ID).expect("job should exist")
    }
}

pub fn fast_config() -> RunnerConfig {
    RunnerConfig::default()
        .with_check_interval(Duration::from_millis(5))
        .with_reporting_interval(Duration::from_millis(10))
}

pub fn doc(id: &str) -> Document {
    let mut doc = Document::with_id(id);
    doc.insert("title", format!("Document {}", id));
    doc
}

/// Waits until `runner` reaches `state`.
pub async fn wait_for_state(runner: &TestRunner, state: RunnerState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while runner.state() != state {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("runner never reached state {}", state));
}
