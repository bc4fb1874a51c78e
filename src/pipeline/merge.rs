//! Deterministic page-keyed merge of chunked conversion output.
//!
//! Each chunk covers a disjoint page range, so with well-behaved input the
//! merge is a simple ordered join. The page map exists for the misbehaved
//! cases: a chunk-boundary overlap or an accidentally regenerated chunk may
//! emit the same page twice, and the first occurrence (in chunk-processing
//! order) must win so a page is never included twice.
//!
//! Merging is a pure function of the chunk list — no staging access, no
//! engine access — so the same inputs always reassemble identically.

use crate::markers::PAGE_BLOCK_RE;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Extract a mapping of page number → full page block (begin marker through
/// end marker inclusive). Duplicate page numbers within one chunk keep the
/// first occurrence. Content outside any page markers is dropped.
fn extract_pages(markdown: &str) -> BTreeMap<usize, &str> {
    let mut pages = BTreeMap::new();
    for caps in PAGE_BLOCK_RE.captures_iter(markdown) {
        let page_num: usize = match caps[2].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        pages
            .entry(page_num)
            .or_insert_with(|| caps.get(0).unwrap().as_str());
    }
    pages
}

/// Merge a list of markdown chunks into a single document.
///
/// Pages are collected across all chunks first-writer-wins, then emitted in
/// ascending page-number order joined with a blank line. If no page markers
/// are found anywhere, falls back to a trimmed, order-preserving join of
/// the raw chunk texts. A single-element input is returned unchanged; an
/// empty input yields an empty string.
pub fn merge_chunks(markdown_parts: &[String]) -> String {
    if markdown_parts.len() <= 1 {
        return markdown_parts.first().cloned().unwrap_or_default();
    }

    info!("merging {} chunks by page markers", markdown_parts.len());

    // Collect all pages across all chunks (first-writer-wins).
    let mut all_pages: BTreeMap<usize, &str> = BTreeMap::new();
    for (i, part) in markdown_parts.iter().enumerate() {
        let chunk_pages = extract_pages(part);
        let mut new_pages = 0;
        let total = chunk_pages.len();
        for (page_num, content) in chunk_pages {
            all_pages.entry(page_num).or_insert_with(|| {
                new_pages += 1;
                content
            });
        }
        info!("  chunk {}: {} pages ({} new)", i + 1, total, new_pages);
    }

    if all_pages.is_empty() {
        warn!("no page markers found — falling back to simple join");
        return markdown_parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    let (first, last) = (
        *all_pages.keys().next().unwrap(),
        *all_pages.keys().next_back().unwrap(),
    );
    info!("  total: {} unique pages ({first}-{last})", all_pages.len());

    all_pages.values().copied().collect::<Vec<_>>().join("\n\n")
}
