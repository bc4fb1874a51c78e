//! Output types: per-chunk usage records, aggregate stats, and the final
//! conversion result.
//!
//! [`ChunkUsage`] is the metadata artifact of the staging triplet — it is
//! written last during a save, so its presence on disk *is* the definition
//! of "chunk complete". Keep it small and strictly serialisable; anything
//! that cannot round-trip through JSON does not belong here.

use crate::engine::ChunkPosition;
use crate::pipeline::plan::ChunkPlan;
use serde::{Deserialize, Serialize};

/// Per-chunk token usage and timing.
///
/// Serialised to `chunk_NN_meta.json` in the staging area. Self-contained:
/// the page range is repeated here so a staging area can be audited without
/// re-deriving the chunk plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkUsage {
    /// 0-based chunk index.
    pub index: usize,
    /// 1-based first page (inclusive).
    pub page_start: usize,
    /// 1-based last page (inclusive).
    pub page_end: usize,
    /// Input tokens consumed converting this chunk.
    pub input_tokens: u64,
    /// Output tokens produced for this chunk.
    pub output_tokens: u64,
    /// Wall-clock time spent on the extraction call.
    pub elapsed_ms: u64,
}

/// Result of converting a single chunk, reloaded from the staging area.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    /// The plan entry this chunk was converted from.
    pub plan: ChunkPlan,
    /// Raw markdown payload (after page-number remap).
    pub markdown: String,
    /// Context tail that was passed to the next chunk.
    pub context_tail: String,
    /// Usage metadata.
    pub usage: ChunkUsage,
}

/// Aggregate usage statistics for a whole conversion run.
///
/// Serialised to `chunks/stats.json` in the staging area. `cached_chunks`
/// and `fresh_chunks` describe *this run*: a fully-resumed run has all
/// chunks cached and zero fresh ones, and its token totals still reflect
/// what the cached conversions originally cost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Source document name (file stem).
    pub doc_name: String,
    /// Total pages converted.
    pub pages: usize,
    /// Total number of chunks.
    pub chunks: usize,
    /// Chunks served from the staging area this run.
    pub cached_chunks: usize,
    /// Chunks converted via the engine this run.
    pub fresh_chunks: usize,
    /// Sum of per-chunk input tokens.
    pub input_tokens: u64,
    /// Sum of per-chunk output tokens.
    pub output_tokens: u64,
    /// Wall-clock time for this run (not the cached originals).
    pub elapsed_ms: u64,
}

/// Final result of a conversion: the assembled document plus everything a
/// caller needs to report on it.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// Merged, table-spliced Markdown document.
    pub markdown: String,
    /// Per-chunk outcomes, ascending by index, all reloaded from staging.
    pub chunks: Vec<ChunkOutcome>,
    /// Aggregate stats for the run.
    pub stats: DocumentStats,
    /// Non-fatal data-quality warnings (failed splices, leftover markers).
    pub warnings: Vec<String>,
}

impl ChunkOutcome {
    /// Position of this chunk within the document.
    pub fn position(&self) -> ChunkPosition {
        self.plan.position()
    }
}

/// Format a duration in milliseconds to a human-readable string.
///
/// Examples: `"45s"`, `"2m 15s"`, `"1h 03m 12s"`.
pub fn fmt_duration(ms: u64) -> String {
    let s = ms / 1000;
    if s < 60 {
        return format!("{s}s");
    }
    let (m, s) = (s / 60, s % 60);
    if m < 60 {
        return format!("{m}m {s:02}s");
    }
    let (h, m) = (m / 60, m % 60);
    format!("{h}h {m:02}m {s:02}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_usage_round_trips_json() {
        let usage = ChunkUsage {
            index: 2,
            page_start: 41,
            page_end: 60,
            input_tokens: 120_000,
            output_tokens: 18_500,
            elapsed_ms: 93_000,
        };
        let json = serde_json::to_string_pretty(&usage).unwrap();
        let back: ChunkUsage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, usage);
    }

    #[test]
    fn fmt_duration_ranges() {
        assert_eq!(fmt_duration(45_000), "45s");
        assert_eq!(fmt_duration(135_000), "2m 15s");
        assert_eq!(fmt_duration(3_792_000), "1h 03m 12s");
        assert_eq!(fmt_duration(0), "0s");
    }
}
