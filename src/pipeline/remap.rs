//! Page-number remapping: shift window-local page numbers back to document
//! numbers.
//!
//! The extraction service sees each chunk as a standalone document whose
//! pages start at 1. The request tells it to number pages from the chunk's
//! real starting page, but services occasionally use the window-local
//! numbers anyway. Detection heuristic: if the first begin marker carries a
//! number below the chunk's `page_start`, the chunk was numbered locally
//! and every begin/end marker is shifted by `page_start - 1`.

use crate::markers::{PAGE_BEGIN_RE, PAGE_END_RE};
use regex::Captures;
use tracing::warn;

/// Remap page markers from window-local numbers to document numbers.
///
/// Returns the markdown unchanged when there are no markers or the markers
/// already use document numbering.
pub fn remap_page_markers(markdown: &str, page_start: usize) -> String {
    let first_page: Option<usize> = PAGE_BEGIN_RE
        .captures(markdown)
        .and_then(|c| c[1].parse().ok());

    let Some(first_page) = first_page else {
        return markdown.to_string();
    };
    if first_page >= page_start {
        // Markers already use document page numbers.
        return markdown.to_string();
    }

    let offset = page_start - 1;
    warn!(
        "page markers appear window-local (first={first_page}, expected>={page_start}) — \
         remapping with offset +{offset}"
    );

    let shift = |caps: &Captures<'_>, tag: &str| -> String {
        match caps[1].parse::<usize>() {
            Ok(n) => format!("<!-- {tag} {} -->", n + offset),
            Err(_) => caps[0].to_string(),
        }
    };

    let remapped = PAGE_BEGIN_RE
        .replace_all(markdown, |caps: &Captures<'_>| shift(caps, "PDF_PAGE_BEGIN"));
    PAGE_END_RE
        .replace_all(&remapped, |caps: &Captures<'_>| shift(caps, "PDF_PAGE_END"))
        .into_owned()
}
