//! Error types for the pagemill library.
//!
//! One enum, fatal errors only. Conditions the engine can work around —
//! a table splice that cannot find its counterpart, a leftover continuation
//! marker — are *warnings* carried in [`crate::output::ConversionOutput`]
//! and logged via `tracing`, never errors. The split matters because a
//! batch conversion that has already paid for forty chunks should not be
//! aborted by one un-spliceable table.
//!
//! Corruption of persisted staging state is deliberately fatal: a manifest
//! or chunk-meta file that exists but cannot be parsed means the staging
//! area no longer reflects what was actually converted. Treating it as
//! "missing" would silently reconvert (and re-bill) chunks while masking
//! the underlying damage, so the error instructs the operator to
//! force-invalidate instead.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pagemill library.
#[derive(Debug, Error)]
pub enum PagemillError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source document was not found at the given path.
    #[error("Source document not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    // ── Staging errors ────────────────────────────────────────────────────
    /// The staging manifest exists but cannot be parsed.
    #[error(
        "Corrupt staging manifest at '{path}': {detail}\n\
         Re-run with force invalidation to rebuild the staging area."
    )]
    CorruptManifest { path: PathBuf, detail: String },

    /// A chunk metadata file exists but cannot be parsed.
    #[error(
        "Corrupt chunk metadata at '{path}': {detail}\n\
         Re-run with force invalidation to rebuild the staging area."
    )]
    CorruptChunkMeta { path: PathBuf, detail: String },

    /// Filesystem operation on the staging area failed.
    #[error("Staging I/O failed at '{path}': {source}")]
    StagingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `remerge` was asked to rebuild from a staging area with no manifest
    /// or incomplete chunks.
    #[error(
        "Staging area '{path}' is not fully populated: {detail}\n\
         Run a conversion first; remerge only reassembles cached chunks."
    )]
    StagingNotPopulated { path: PathBuf, detail: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The extraction service stopped before emitting the whole chunk.
    #[error(
        "Output truncated for pages {page_start}-{page_end}.\n\
         Reduce pages_per_chunk (currently {pages_per_chunk}) so each chunk \
         fits the service's output ceiling."
    )]
    TruncatedOutput {
        page_start: usize,
        page_end: usize,
        pages_per_chunk: usize,
    },

    /// Requested window exceeds the engine's hard per-request page limit.
    #[error("pages_per_chunk ({requested}) exceeds the engine limit of {limit} pages per request")]
    WindowTooLarge { requested: usize, limit: usize },

    /// The extraction collaborator reported a failure it could not recover
    /// from. Retry/backoff is the collaborator's job; by the time this
    /// surfaces here it is final.
    #[error("Extraction engine error: {detail}")]
    EngineError { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
