//! Context-tail extraction: the trailing, page-aligned excerpt of one
//! chunk's output passed forward for continuity.
//!
//! The tail must land on unambiguous page boundaries so the next chunk (and
//! later the table splicer) can reason about where content came from. A
//! page-begin marker is the only cut point used; the line-count floor
//! compensates for chunks whose trailing pages are nearly empty.

use crate::markers::PAGE_BEGIN_RE;
use tracing::debug;

/// Extract the last complete pages of `markdown` for context passing.
///
/// Takes the last `min_pages` pages (or all pages if fewer exist). If that
/// excerpt has fewer than `min_lines` newline-delimited lines, one more
/// complete page is included at a time until the threshold is met or no
/// pages remain. The returned slice is verbatim — it always starts at a
/// page-begin marker and runs to the end of the chunk.
///
/// Falls back to the raw last `min_lines` lines when no page markers exist
/// at all; only in this degenerate case may the excerpt cut mid-page.
pub fn context_tail(markdown: &str, min_pages: usize, min_lines: usize) -> &str {
    let begin_positions: Vec<usize> = PAGE_BEGIN_RE
        .find_iter(markdown)
        .map(|m| m.start())
        .collect();

    if begin_positions.is_empty() {
        // No page markers — line-based fallback.
        let tail = last_lines(markdown, min_lines);
        debug!(
            "context tail: no page markers, using last {} lines",
            tail.lines().count()
        );
        return tail;
    }

    let mut take = min_pages.min(begin_positions.len()).max(1);
    while take < begin_positions.len() {
        let cut = begin_positions[begin_positions.len() - take];
        if markdown[cut..].matches('\n').count() >= min_lines {
            break;
        }
        take += 1;
    }

    let cut = begin_positions[begin_positions.len() - take];
    let tail = &markdown[cut..];
    debug!(
        "context tail: {}/{} pages, {} lines (min: {} pages, >={} lines)",
        take,
        begin_positions.len(),
        tail.lines().count(),
        min_pages,
        min_lines
    );
    tail
}

/// The last `n` lines of `text` as a verbatim suffix slice.
fn last_lines(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let mut newlines_seen = 0;
    for (pos, b) in text.bytes().enumerate().rev() {
        if b == b'\n' {
            newlines_seen += 1;
            if newlines_seen == n {
                return &text[pos + 1..];
            }
        }
    }
    text
}
