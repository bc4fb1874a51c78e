//! Chunk planning: split a page count into disjoint page windows.
//!
//! Pure and deterministic — the same `(total_pages, pages_per_chunk)` pair
//! always yields the same plan. The plan's length also feeds the staging
//! fingerprint, so a changed window size is caught as a manifest mismatch
//! before any cached chunk is reused against the wrong boundaries.

use crate::engine::ChunkPosition;
use serde::{Deserialize, Serialize};

/// A planned chunk of document pages to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// 0-based chunk index.
    pub index: usize,
    /// 1-based first page (inclusive).
    pub page_start: usize,
    /// 1-based last page (inclusive).
    pub page_end: usize,
    /// This chunk starts the document.
    pub is_first: bool,
    /// This chunk ends the document.
    pub is_last: bool,
}

impl ChunkPlan {
    /// Number of pages in this chunk.
    pub fn page_count(&self) -> usize {
        self.page_end - self.page_start + 1
    }

    /// Position hint derived from the first/last flags.
    ///
    /// A single-chunk document is both first and last; `First` wins because
    /// the start-of-document instruction (title extraction) matters more
    /// than the end-of-document one.
    pub fn position(&self) -> ChunkPosition {
        if self.is_first {
            ChunkPosition::First
        } else if self.is_last {
            ChunkPosition::Last
        } else {
            ChunkPosition::Middle
        }
    }
}

/// Plan chunk boundaries for disjoint page ranges.
///
/// Every chunk gets exactly `pages_per_chunk` pages except possibly the
/// last, which may be smaller. The union of all ranges is `[1, total_pages]`
/// with no gaps or overlaps.
///
/// Example with `total_pages = 88`, `pages_per_chunk = 20`:
///
/// ```text
/// Chunk 0: pages  1-20
/// Chunk 1: pages 21-40
/// Chunk 2: pages 41-60
/// Chunk 3: pages 61-80
/// Chunk 4: pages 81-88
/// ```
pub fn plan_chunks(total_pages: usize, pages_per_chunk: usize) -> Vec<ChunkPlan> {
    debug_assert!(total_pages > 0 && pages_per_chunk > 0);

    if total_pages <= pages_per_chunk {
        return vec![ChunkPlan {
            index: 0,
            page_start: 1,
            page_end: total_pages,
            is_first: true,
            is_last: true,
        }];
    }

    let mut chunks = Vec::new();
    let mut page_start = 1;
    let mut idx = 0;

    while page_start <= total_pages {
        let page_end = (page_start + pages_per_chunk - 1).min(total_pages);
        chunks.push(ChunkPlan {
            index: idx,
            page_start,
            page_end,
            is_first: idx == 0,
            is_last: page_end >= total_pages,
        });
        if page_end >= total_pages {
            break;
        }
        page_start += pages_per_chunk;
        idx += 1;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eighty_eight_pages_window_20_yields_five_chunks() {
        let chunks = plan_chunks(88, 20);
        assert_eq!(chunks.len(), 5);
        let ranges: Vec<(usize, usize)> =
            chunks.iter().map(|c| (c.page_start, c.page_end)).collect();
        assert_eq!(ranges, vec![(1, 20), (21, 40), (41, 60), (61, 80), (81, 88)]);
        assert!(chunks[0].is_first && !chunks[0].is_last);
        assert!(chunks[4].is_last && !chunks[4].is_first);
        for c in &chunks[1..4] {
            assert!(!c.is_first && !c.is_last);
        }
    }

    #[test]
    fn coverage_has_no_gaps_or_overlaps() {
        let chunks = plan_chunks(88, 20);
        let mut covered = Vec::new();
        for c in &chunks {
            covered.extend(c.page_start..=c.page_end);
        }
        assert_eq!(covered, (1..=88).collect::<Vec<_>>());
    }

    #[test]
    fn single_chunk_when_document_fits() {
        let chunks = plan_chunks(7, 10);
        assert_eq!(chunks.len(), 1);
        let c = chunks[0];
        assert_eq!((c.page_start, c.page_end), (1, 7));
        assert!(c.is_first && c.is_last);
        assert_eq!(c.position(), ChunkPosition::First);
    }

    #[test]
    fn exact_multiple_has_full_last_chunk() {
        let chunks = plan_chunks(40, 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].page_count(), 20);
        assert!(chunks[1].is_last);
    }

    #[test]
    fn positions_map_first_middle_last() {
        let chunks = plan_chunks(30, 10);
        assert_eq!(chunks[0].position(), ChunkPosition::First);
        assert_eq!(chunks[1].position(), ChunkPosition::Middle);
        assert_eq!(chunks[2].position(), ChunkPosition::Last);
    }
}
