//! Document generator dispatch.
//!
//! Picks the data source method serving a job and tags every produced item
//! with the bulk operation the sink must apply:
//!
//! | job type      | source overrides incremental fetch | generator                  | tag        |
//! |---------------|------------------------------------|----------------------------|------------|
//! | full          | any                                | `get_docs`                 | index      |
//! | incremental   | yes                                | `get_docs_incrementally`   | as yielded |
//! | incremental   | no                                 | `get_docs` (skip unchanged)| index      |
//! | access control| any                                | `get_access_control`       | none       |

use futures::StreamExt;

use crate::document::{Operation, SyncItem, SyncItemStream};
use crate::error::SyncError;
use crate::job::{JobType, SyncCursor, SyncJob};
use crate::traits::DataSource;

/// Generator selected for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStrategy {
    /// Full scan, every item indexed.
    FullScan,
    /// Cursor-based delta fetch, operations as reported by the source.
    Incremental,
    /// Incremental job served by a full scan; the sink skips unchanged documents.
    FullScanSkipUnchanged,
    /// Access-control documents, untagged.
    AccessControl,
}

/// Returns true if the sink may skip unchanged documents for this job.
///
/// Only incremental jobs of sources without their own incremental fetch
/// qualify.
pub fn skip_unchanged_documents_enabled<P: DataSource>(job_type: JobType, source: &P) -> bool {
    job_type == JobType::Incremental && !source.supports_incremental_fetch()
}

/// Selects the generator for `(job_type, skip_unchanged)`.
///
/// # Errors
///
/// Returns [`SyncError::UnsupportedJobType`] for unknown job types.
pub fn select_strategy(
    job_type: JobType,
    skip_unchanged: bool,
) -> Result<GeneratorStrategy, SyncError> {
    match (job_type, skip_unchanged) {
        (JobType::Full, _) => Ok(GeneratorStrategy::FullScan),
        (JobType::Incremental, false) => Ok(GeneratorStrategy::Incremental),
        (JobType::Incremental, true) => Ok(GeneratorStrategy::FullScanSkipUnchanged),
        (JobType::AccessControl, _) => Ok(GeneratorStrategy::AccessControl),
        (JobType::Unknown, _) => Err(SyncError::UnsupportedJobType(job_type.to_string())),
    }
}

/// Builds the tagged item stream for `job`.
///
/// `connector_cursor` is the connector's persisted cursor, the starting point
/// of incremental fetches.
pub fn generator<P: DataSource>(
    source: &P,
    job: &SyncJob,
    connector_cursor: Option<&SyncCursor>,
) -> Result<SyncItemStream, SyncError> {
    let skip_unchanged = skip_unchanged_documents_enabled(job.job_type, source);

    let stream = match select_strategy(job.job_type, skip_unchanged)? {
        GeneratorStrategy::FullScan | GeneratorStrategy::FullScanSkipUnchanged => source
            .get_docs(&job.filtering)
            .map(|res| {
                res.map(|(doc, lazy_download)| {
                    SyncItem::new(doc, lazy_download, Some(Operation::Index))
                })
            })
            .boxed(),
        GeneratorStrategy::Incremental => source
            .get_docs_incrementally(connector_cursor, &job.filtering)
            .map(|res| {
                res.map(|(doc, lazy_download, operation)| {
                    SyncItem::new(doc, lazy_download, Some(operation))
                })
            })
            .boxed(),
        GeneratorStrategy::AccessControl => source
            .get_access_control()
            .map(|res| res.map(|doc| SyncItem::new(doc, None, None)))
            .boxed(),
    };

    Ok(stream)
}
