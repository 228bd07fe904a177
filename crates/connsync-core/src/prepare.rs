//! Document adaptation between a generator and the bulk sink.
//!
//! Every content document goes through [`DocumentAdapter::adapt`]:
//!
//! 1. Ids longer than the size limit (in UTF-8 bytes) are replaced by the
//!    data source's [`hash_id`](crate::traits::DataSource::hash_id).
//! 2. If the hashed id is still too long, the document is dropped. The job
//!    goes on.
//! 3. The pipeline flags of the job are stamped onto the document.

use std::sync::Arc;

use futures::StreamExt;
use futures::future;

use crate::document::{
    EXTRACT_BINARY_CONTENT_FIELD, REDUCE_WHITESPACE_FIELD, RUN_ML_INFERENCE_FIELD, SyncItem,
    SyncItemStream,
};
use crate::job::PipelineSettings;
use crate::traits::DataSource;

/// Longest id prefix echoed in log messages.
const LOGGED_ID_PREFIX: usize = 64;

/// Adapts documents to the destination's constraints and pipeline settings.
#[derive(Debug, Clone)]
pub struct DocumentAdapter {
    id_size_limit: usize,
    extract_binary_content: bool,
    reduce_whitespace: bool,
    run_ml_inference: bool,
}

impl DocumentAdapter {
    pub fn new(pipeline: &PipelineSettings, id_size_limit: usize) -> Self {
        Self {
            id_size_limit,
            extract_binary_content: pipeline.extract_binary_content,
            reduce_whitespace: pipeline.reduce_whitespace,
            run_ml_inference: pipeline.run_ml_inference,
        }
    }

    /// Adapts one item; returns `None` if the item must be dropped.
    pub fn adapt<P: DataSource>(&self, mut item: SyncItem, source: &P) -> Option<SyncItem> {
        let doc_id = item.doc.id();
        let doc_id_size = doc_id.len();

        if doc_id_size > self.id_size_limit {
            tracing::debug!(
                id = %truncate_id(&doc_id),
                size = doc_id_size,
                limit = self.id_size_limit,
                "Document id is too long, hashing"
            );

            let hashed_id = source.hash_id(&doc_id);
            let hashed_id_size = hashed_id.len();

            if hashed_id_size > self.id_size_limit {
                tracing::error!(
                    hashed_id = %truncate_id(&hashed_id),
                    size = hashed_id_size,
                    limit = self.id_size_limit,
                    source = source.name(),
                    "Hashed document id is above the size limit, dropping document. Check the hash_id implementation of the data source"
                );
                return None;
            }

            item.doc.set_id(hashed_id);
        }

        item.doc
            .insert(EXTRACT_BINARY_CONTENT_FIELD, self.extract_binary_content);
        item.doc.insert(REDUCE_WHITESPACE_FIELD, self.reduce_whitespace);
        item.doc.insert(RUN_ML_INFERENCE_FIELD, self.run_ml_inference);

        Some(item)
    }
}

/// Wraps `items` so that every item passes through `adapter`.
///
/// Errors produced by the generator are forwarded untouched.
pub fn prepare_docs<P: DataSource>(
    items: SyncItemStream,
    adapter: DocumentAdapter,
    source: Arc<P>,
) -> SyncItemStream {
    items
        .filter_map(move |res| {
            let adapted = match res {
                Ok(item) => adapter.adapt(item, source.as_ref()).map(Ok),
                Err(e) => Some(Err(e)),
            };
            future::ready(adapted)
        })
        .boxed()
}

fn truncate_id(id: &str) -> String {
    if id.len() <= LOGGED_ID_PREFIX {
        return id.to_string();
    }
    let mut end = LOGGED_ID_PREFIX;
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &id[..end])
}
