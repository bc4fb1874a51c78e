//! Continuation-table splicing: reunify tables split across a chunk
//! boundary.
//!
//! The extraction service emits `<!-- TABLE_CONTINUE -->` before a
//! `<table>` whose rows continue the table ending just before it. This
//! stage merges the continuation's `<tbody>` rows into the preceding
//! table, preserving page-boundary markers between the rows so page
//! provenance survives inside the merged table. The continuation table's
//! `<thead>`, its `<table>` wrapper, the marker itself, and any
//! "(continued)" title line are removed.
//!
//! Markers are processed in reverse document order so earlier splices never
//! invalidate the string offsets of markers still to be processed. A splice
//! that cannot find its counterpart structure leaves the document untouched
//! at that spot and records a warning — a partially un-spliced document is
//! preferable to aborting a batch conversion.

use crate::markers::{
    CONTINUED_TITLE_RE, PAGE_BEGIN_RE, PAGE_END_RE, TABLE_BLOCK_RE, TABLE_CLOSE_RE,
    TABLE_CONTINUE_RE, TABLE_OPEN_RE, TBODY_ROWS_RE, TR_RE,
};
use tracing::{debug, info, warn};

/// Result of a splice pass over one document.
#[derive(Debug, Clone)]
pub struct SpliceOutcome {
    /// Document with continuation tables merged.
    pub markdown: String,
    /// Number of continuation tables merged into their predecessors.
    pub merged_tables: usize,
    /// Non-fatal problems: orphan markers, missing structures, leftovers.
    pub warnings: Vec<String>,
}

/// Merge continuation tables into their preceding tables.
///
/// For each `TABLE_CONTINUE` marker (last to first):
///
/// 1. If the marker sits inside an already-open `<table>` (more opens than
///    closes before it), the table never actually closed at the boundary —
///    strip the marker and move on.
/// 2. Otherwise locate the preceding table's `</tbody>`/`</table>`, the
///    continuation `<table>` after the marker, and the continuation's
///    `<tbody>` rows.
/// 3. Insert any page-boundary markers found between the two tables plus
///    the continuation rows immediately before the preceding `</tbody>`,
///    then delete everything from after the preceding `</table>` through
///    the end of the continuation table.
///
/// Multiple consecutive continuations chain naturally: each appends to the
/// growing first table.
pub fn merge_continued_tables(markdown: &str) -> SpliceOutcome {
    let marker_ranges: Vec<(usize, usize)> = TABLE_CONTINUE_RE
        .find_iter(markdown)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut md = markdown.to_string();
    let mut warnings: Vec<String> = Vec::new();
    let mut merged_tables = 0;

    if marker_ranges.is_empty() {
        return SpliceOutcome {
            markdown: md,
            merged_tables,
            warnings,
        };
    }

    info!("merging {} continued table(s)", marker_ranges.len());

    // Reverse document order: earlier offsets stay valid after each splice.
    for &(marker_start, marker_end) in marker_ranges.iter().rev() {
        // ── Classify: marker inside an already-open <table>? ─────────────
        let prefix = &md[..marker_start];
        let opens = TABLE_OPEN_RE.find_iter(prefix).count();
        let closes = TABLE_CLOSE_RE.find_iter(prefix).count();
        if opens > closes {
            info!("continuation marker inside open table — removing marker only");
            md.replace_range(marker_start..marker_end, "");
            continue;
        }

        // ── Locate the preceding table's </tbody></table> ─────────────────
        let Some(preceding_table_end) = md[..marker_start].rfind("</table>") else {
            push_warning(
                &mut warnings,
                format!("continuation marker at offset {marker_start}: no preceding </table>; left unspliced"),
            );
            continue;
        };
        let Some(preceding_tbody_end) = md[..preceding_table_end].rfind("</tbody>") else {
            push_warning(
                &mut warnings,
                format!("continuation marker at offset {marker_start}: preceding table has no </tbody>; left unspliced"),
            );
            continue;
        };

        // ── Locate the continuation table after the marker ────────────────
        let Some(cont) = TABLE_BLOCK_RE.find_at(&md, marker_end) else {
            push_warning(
                &mut warnings,
                format!("continuation marker at offset {marker_start}: no continuation <table> found; left unspliced"),
            );
            continue;
        };
        let (cont_start, cont_end) = (cont.start(), cont.end());

        // ── Extract the continuation's <tbody> rows ───────────────────────
        let Some(tbody) = TBODY_ROWS_RE.captures(&md[cont_start..cont_end]) else {
            push_warning(
                &mut warnings,
                format!("continuation marker at offset {marker_start}: continuation table has no <tbody>; left unspliced"),
            );
            continue;
        };
        let cont_rows = tbody.get(1).unwrap().as_str().trim().to_string();
        let row_count = TR_RE.find_iter(&cont_rows).count();

        // ── Collect page markers between the two tables ───────────────────
        // The between-region also holds the continuation marker and an
        // optional "(continued)" title line; both are discarded with it.
        let after_preceding_table = preceding_table_end + "</table>".len();
        let between = &md[after_preceding_table..cont_start];
        if CONTINUED_TITLE_RE.is_match(between) {
            debug!("dropping '(continued)' title line at boundary");
        }
        let page_markers = extract_page_markers(between);

        let insert_text = if page_markers.is_empty() {
            cont_rows
        } else {
            format!("{page_markers}\n\n{cont_rows}")
        };

        // ── Splice ────────────────────────────────────────────────────────
        let mut new_md = String::with_capacity(md.len() + insert_text.len() + 2);
        new_md.push_str(&md[..preceding_tbody_end]);
        new_md.push('\n');
        new_md.push_str(&insert_text);
        new_md.push('\n');
        new_md.push_str(&md[preceding_tbody_end..after_preceding_table]);
        new_md.push_str(&md[cont_end..]);
        md = new_md;
        merged_tables += 1;

        match stitched_boundary(&page_markers) {
            Some((end_page, begin_page)) => info!(
                "merged continuation table ({row_count} rows, boundary p{end_page} → p{begin_page})"
            ),
            None => info!("merged continuation table ({row_count} rows)"),
        }
    }

    // No continuation markers may survive; any that do are a data-quality
    // problem in the input, not a reason to fail the run.
    let remaining = TABLE_CONTINUE_RE.find_iter(&md).count();
    if remaining > 0 {
        push_warning(
            &mut warnings,
            format!("{remaining} continuation marker(s) still present after splicing"),
        );
    }

    SpliceOutcome {
        markdown: md,
        merged_tables,
        warnings,
    }
}

fn push_warning(warnings: &mut Vec<String>, message: String) {
    warn!("{message}");
    warnings.push(message);
}

/// Extract page begin/end markers from a between-tables region.
///
/// Returns the marker lines in order, joined with blank lines. Everything
/// else in the region (continuation marker, titles, whitespace) is dropped.
fn extract_page_markers(text: &str) -> String {
    let mut markers: Vec<&str> = Vec::new();
    for line in text.lines() {
        let stripped = line.trim();
        let is_marker = [&*PAGE_BEGIN_RE, &*PAGE_END_RE]
            .iter()
            .any(|re| re.find(stripped).is_some_and(|m| m.start() == 0));
        if is_marker {
            markers.push(stripped);
        }
    }
    markers.join("\n\n")
}

/// The page boundary a splice stitched over: (last page-end, first
/// page-begin) found in the collected markers.
fn stitched_boundary(page_markers: &str) -> Option<(usize, usize)> {
    let end_page = PAGE_END_RE
        .captures_iter(page_markers)
        .last()
        .and_then(|c| c[1].parse().ok())?;
    let begin_page = PAGE_BEGIN_RE
        .captures_iter(page_markers)
        .next()
        .and_then(|c| c[1].parse().ok())?;
    Some((end_page, begin_page))
}
