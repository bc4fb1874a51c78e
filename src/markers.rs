//! Page and table sentinel markers embedded in converted Markdown.
//!
//! The extraction service wraps every page's content in HTML-comment
//! markers carrying the page's original (not window-local) number. All
//! downstream stages — context extraction, merge, table splicing — key off
//! these markers, so the literal strings and regexes live in exactly one
//! place. No other module hard-codes a marker pattern.
//!
//! Markers:
//!
//! - `<!-- PDF_PAGE_BEGIN N -->` / `<!-- PDF_PAGE_END N -->` — page block
//!   boundaries, N is the 1-based document page number
//! - `<!-- PDF_PAGE_SKIP -->` — deliberate empty page (TOC, boilerplate);
//!   keeps page numbering intact without flagging an error
//! - `<!-- TABLE_CONTINUE -->` — the `<table>` following this marker
//!   continues the one ending immediately before it

use once_cell::sync::Lazy;
use regex::Regex;

/// Literal table-continuation marker.
pub const TABLE_CONTINUE: &str = "<!-- TABLE_CONTINUE -->";

/// Literal page-skip marker.
pub const PAGE_SKIP: &str = "<!-- PDF_PAGE_SKIP -->";

/// Render a page-begin marker for page `n`.
pub fn page_begin(n: usize) -> String {
    format!("<!-- PDF_PAGE_BEGIN {n} -->")
}

/// Render a page-end marker for page `n`.
pub fn page_end(n: usize) -> String {
    format!("<!-- PDF_PAGE_END {n} -->")
}

/// Matches a page-begin marker, capturing the page number.
pub static PAGE_BEGIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*PDF_PAGE_BEGIN\s+(\d+)\s*-->").unwrap());

/// Matches a page-end marker, capturing the page number.
pub static PAGE_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*PDF_PAGE_END\s+(\d+)\s*-->").unwrap());

/// Matches the table-continuation marker (valueless).
pub static TABLE_CONTINUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*TABLE_CONTINUE\s*-->").unwrap());

/// Matches a full page block from its begin marker through its end marker
/// (inclusive). Capture 1 is the begin marker, capture 2 the page number,
/// capture 3 the body, capture 4 the end marker.
pub static PAGE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(<!--\s*PDF_PAGE_BEGIN\s+(\d+)\s*-->)(.*?)(<!--\s*PDF_PAGE_END\s+\d+\s*-->)")
        .unwrap()
});

/// Matches a full `<table>...</table>` HTML block (no capture groups).
pub static TABLE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)<table\b[^>]*>.*?</table>").unwrap());

/// Matches an opening `<table>` tag.
pub static TABLE_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<table\b").unwrap());

/// Matches a closing `</table>` tag.
pub static TABLE_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</table>").unwrap());

/// Matches a `<tbody>` block, capturing its row content.
pub static TBODY_ROWS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)<tbody[^>]*>(.*?)</tbody>").unwrap());

/// Matches a single `<tr>...</tr>` row.
pub static TR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?si)<tr\b[^>]*>.*?</tr>").unwrap());

/// Matches the `**Table N – title** *(continued)*` line preceding a
/// continuation table.
pub static CONTINUED_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*\*Table\s+(?:\d+|[A-Z]\.\d+)\s*[–—-][^*]*\*\*\s*\*\(continued\)\*").unwrap()
});
