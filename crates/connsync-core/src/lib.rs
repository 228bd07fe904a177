//! Connsync Core - Sync job runner for the connsync connector framework.
//!
//! This crate executes a single sync job: it moves documents from a remote
//! data source into a search index through a batched bulk sink, and records
//! the job's lifecycle in a document store.
//!
//! - **Runner**: [`SyncJobRunner`] drives a job from claim to terminal status
//! - **Domain models**: [`SyncJob`], [`Connector`], [`Document`], [`IngestionStats`]
//! - **Dispatch**: picks the generator for full, incremental and access-control jobs
//! - **Traits**: [`JobStore`], [`ConnectorStore`], [`DataSource`], [`BulkSink`] for
//!   dependency injection
//! - **Events**: [`RunnerReporter`] trait for decoupled logging/UI
//!
//! # Architecture
//!
//! The runner is pure orchestration. Persistence, fetching and indexing are
//! reached through traits, so hosts plug in their own document store,
//! connector implementations and index client:
//!
//! - [`JobStore`] / [`ConnectorStore`] - job and connector records
//! - [`DataSourceFactory`] - builds a [`DataSource`] per job
//! - [`SinkFactory`] - builds a [`BulkSink`] per job
//!
//! # Example
//!
//! ```ignore
//! use connsync_core::{RunnerConfig, SyncJobRunner, TracingRunnerReporter, load_service_config};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = load_service_config(path)?.into_runner_config();
//! let runner = SyncJobRunner::with_config(
//!     job_store, connector_store, sources, sinks, job, connector, config,
//! );
//!
//! let shutdown = CancellationToken::new();
//! let status = runner.execute(shutdown, &TracingRunnerReporter).await?;
//! ```

pub mod config;
pub mod connector;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod events;
pub mod job;
pub mod logging;
pub mod prepare;
pub mod reporter;
pub mod runner;
pub mod stats;
pub mod traits;

// Configuration
pub use config::{
    BulkOptions, FrameworkConfig, ID_SIZE_LIMIT, RunnerConfig, ServiceConfig, load_service_config,
};

// Error handling
pub use error::SyncError;

// Domain models
pub use connector::{Connector, Features};
pub use document::{Document, LazyDownload, Operation, SyncItem};
pub use job::{Filtering, JobStatus, JobType, PipelineSettings, SyncCursor, SyncJob};
pub use stats::{IngestionStats, PersistedStats};

// Runner
pub use dispatch::GeneratorStrategy;
pub use events::{RunnerEvent, RunnerReporter, SilentRunnerReporter, TracingRunnerReporter};
pub use runner::{RunnerState, SyncJobRunner};

// Traits
pub use traits::{
    BulkRequest, BulkSink, ConnectorStore, DataSource, DataSourceFactory, FilteringValidation,
    JobStore, License, SinkFactory, SinkSettings,
};
