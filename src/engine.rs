//! The extraction seam: the trait this engine drives, and the request and
//! response types that cross it.
//!
//! Everything expensive lives on the far side of [`ExtractionEngine`] — the
//! hosted service call, prompt construction, network retry/backoff, and
//! document access itself. This core never opens the source document; it
//! only hands the engine a page window plus continuity context and persists
//! whatever comes back. That keeps the engine swappable (hosted service,
//! local model, scripted fake in tests) without touching the chunk loop.
//!
//! Retry is explicitly the implementor's job: by the time `extract_chunk`
//! returns `Err`, the failure is final for this run.

use crate::error::PagemillError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where a chunk sits in the document. Drives the position-dependent
/// instruction the engine gives the extraction service (document title on
/// the first chunk, bibliography on the last, plain continuation between).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkPosition {
    First,
    Middle,
    Last,
}

/// One extraction request: a page window plus continuity context.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    /// 0-based chunk index.
    pub chunk_index: usize,
    /// Total number of chunks in this run.
    pub total_chunks: usize,
    /// First page of the window (1-based, inclusive).
    pub page_start: usize,
    /// Last page of the window (1-based, inclusive).
    pub page_end: usize,
    /// Position hint for instruction selection.
    pub position: ChunkPosition,
    /// Trailing page-aligned excerpt of the previous chunk's output.
    /// `None` for the first chunk.
    pub previous_context: Option<String>,
}

impl ChunkRequest {
    /// Number of pages in this window.
    pub fn page_count(&self) -> usize {
        self.page_end - self.page_start + 1
    }
}

/// Why the extraction service stopped emitting output.
///
/// [`StopReason::Truncated`] is fatal for the chunk: the payload is
/// incomplete and must not be persisted as if it were done. Transient
/// failures never reach this type — they are retried (or given up on)
/// inside the engine and surface as `Err` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The service finished the window normally.
    Complete,
    /// The service hit its output-size ceiling mid-chunk.
    Truncated,
    /// Any other service-specific reason, carried verbatim.
    Other(String),
}

/// The raw result of one extraction call.
#[derive(Debug, Clone)]
pub struct ChunkResponse {
    /// Markdown payload for the page window.
    pub markdown: String,
    /// Input tokens consumed by the call.
    pub input_tokens: u64,
    /// Output tokens produced by the call.
    pub output_tokens: u64,
    /// Why the service stopped.
    pub stop_reason: StopReason,
}

/// Trait for the externally-hosted extraction service.
///
/// Implementations own document access, prompt construction, transport,
/// and retry. The core calls `page_count` once up front and then
/// `extract_chunk` once per cache miss, strictly in index order.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Number of pages in the source document.
    async fn page_count(&self, source: &Path) -> Result<usize, PagemillError>;

    /// Convert one page window to Markdown.
    async fn extract_chunk(
        &self,
        source: &Path,
        request: &ChunkRequest,
    ) -> Result<ChunkResponse, PagemillError>;

    /// Stable identity of the engine/model, recorded in the staging
    /// fingerprint. Changing models invalidates cached chunks.
    fn engine_id(&self) -> &str;

    /// Hard per-request page limit imposed by the service.
    fn max_pages_per_request(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_is_inclusive() {
        let req = ChunkRequest {
            chunk_index: 0,
            total_chunks: 1,
            page_start: 21,
            page_end: 40,
            position: ChunkPosition::Middle,
            previous_context: None,
        };
        assert_eq!(req.page_count(), 20);
    }

    #[test]
    fn stop_reason_other_carries_detail() {
        let r = StopReason::Other("content_filter".into());
        assert_ne!(r, StopReason::Complete);
        assert_ne!(r, StopReason::Truncated);
    }

    struct NullEngine;

    #[async_trait]
    impl ExtractionEngine for NullEngine {
        async fn page_count(&self, _source: &Path) -> Result<usize, PagemillError> {
            Ok(0)
        }

        async fn extract_chunk(
            &self,
            _source: &Path,
            _request: &ChunkRequest,
        ) -> Result<ChunkResponse, PagemillError> {
            Err(PagemillError::EngineError {
                detail: "null engine".into(),
            })
        }

        fn engine_id(&self) -> &str {
            "null"
        }

        fn max_pages_per_request(&self) -> usize {
            1
        }
    }

    #[test]
    fn trait_is_usable_as_an_arc_dyn_object() {
        let engine: std::sync::Arc<dyn ExtractionEngine> = std::sync::Arc::new(NullEngine);
        let pages = tokio_test::block_on(engine.page_count(Path::new("x.pdf"))).unwrap();
        assert_eq!(pages, 0);
        assert_eq!(engine.engine_id(), "null");
    }
}
