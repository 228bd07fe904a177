//! Documents flowing from a data source to a bulk sink.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;

/// Key holding the document id.
pub const ID_FIELD: &str = "_id";

/// Pipeline-control flags stamped onto every content document.
pub const EXTRACT_BINARY_CONTENT_FIELD: &str = "_extract_binary_content";
pub const REDUCE_WHITESPACE_FIELD: &str = "_reduce_whitespace";
pub const RUN_ML_INFERENCE_FIELD: &str = "_run_ml_inference";

/// A JSON document produced by a data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(pub Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document carrying only an id.
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut doc = Self::new();
        doc.set_id(id);
        doc
    }

    /// Returns the document id as a string; numeric ids are stringified and a
    /// missing id yields an empty string.
    pub fn id(&self) -> String {
        match self.0.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }
}

/// Bulk operation requested for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Index,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Index => write!(f, "index"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

type DownloadFn =
    dyn Fn(bool) -> BoxFuture<'static, Result<Option<Document>, SyncError>> + Send + Sync;

/// Deferred fetch of a document's binary content.
///
/// The sink invokes it only when content extraction is needed; `doit = false`
/// lets the source skip the download while still answering.
#[derive(Clone)]
pub struct LazyDownload(Arc<DownloadFn>);

impl LazyDownload {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(bool) -> BoxFuture<'static, Result<Option<Document>, SyncError>>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    pub async fn fetch(&self, doit: bool) -> Result<Option<Document>, SyncError> {
        (self.0)(doit).await
    }
}

impl fmt::Debug for LazyDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazyDownload")
    }
}

/// One unit handed to the bulk sink.
#[derive(Debug, Clone)]
pub struct SyncItem {
    pub doc: Document,
    pub lazy_download: Option<LazyDownload>,
    /// Absent for access-control documents.
    pub operation: Option<Operation>,
}

impl SyncItem {
    pub fn new(
        doc: Document,
        lazy_download: Option<LazyDownload>,
        operation: Option<Operation>,
    ) -> Self {
        Self {
            doc,
            lazy_download,
            operation,
        }
    }
}

/// Output of a full scan: documents with optional lazy downloads.
pub type DocStream = BoxStream<'static, Result<(Document, Option<LazyDownload>), SyncError>>;

/// Output of an incremental sync: documents tagged with their operation.
pub type IncrementalDocStream =
    BoxStream<'static, Result<(Document, Option<LazyDownload>, Operation), SyncError>>;

/// Output of an access-control sync.
pub type AccessControlStream = BoxStream<'static, Result<Document, SyncError>>;

/// Stream consumed by the bulk sink.
pub type SyncItemStream = BoxStream<'static, Result<SyncItem, SyncError>>;
