//! Durable, resumable staging of per-chunk conversion results.
//!
//! Every chunk is expensive — a slow call to a metered extraction service —
//! so each result is persisted the moment it exists and survives crashes,
//! Ctrl-C, and re-runs. The staging area is the single source of truth for
//! cross-chunk state: the orchestrator reads the previous chunk's context
//! tail from here (never from a loop variable) and reassembles the final
//! document from here after the loop.
//!
//! ## Layout
//!
//! ```text
//! <staging>/
//!   manifest.json            conversion parameters (staleness fingerprint)
//!   chunks/
//!     chunk_01.md            markdown payload
//!     chunk_01_context.md    context tail passed to chunk 2
//!     chunk_01_meta.json     usage metadata — written LAST
//!     ...
//!     stats.json             aggregate run stats
//! ```
//!
//! ## Crash safety
//!
//! [`StagingStore::save_chunk`] writes context, payload, metadata — in that
//! order. "Chunk complete" is defined solely by the presence of the
//! metadata file, so a crash after any partial write reads back as "not
//! done" and the chunk is reconverted on the next run. There is no
//! per-field reuse and no repair path: a manifest mismatch invalidates
//! everything, and unparseable persisted state is a fatal error that tells
//! the operator to force-invalidate.

use crate::error::PagemillError;
use crate::output::{ChunkUsage, DocumentStats};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{info, warn};

/// Manifest schema version. Bump when the manifest or chunk record format
/// changes; old staging areas then read as mismatched and are rebuilt.
pub const MANIFEST_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const STATS_FILE: &str = "stats.json";
const CHUNKS_SUBDIR: &str = "chunks";

/// Conversion parameters recorded for staleness detection.
///
/// Equality is structural and all-or-nothing: if any field differs between
/// runs, every cached chunk is invalid. There is deliberately no per-field
/// tolerance — a changed window size moves every chunk boundary, a changed
/// engine changes every payload, a touched source may have changed any
/// page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version ([`MANIFEST_VERSION`]).
    pub version: u32,
    /// Source file size in bytes.
    pub source_size: u64,
    /// Source modification time, whole milliseconds since the Unix epoch.
    pub source_mtime_ms: u64,
    /// Total pages converted (after the `max_pages` cap).
    pub total_pages: usize,
    /// Pages per chunk.
    pub pages_per_chunk: usize,
    /// Optional page cap.
    pub max_pages: Option<usize>,
    /// Extraction engine identity.
    pub engine_id: String,
    /// Expected number of chunks.
    pub num_chunks: usize,
}

impl Manifest {
    /// Build a manifest from the source file's identity plus run parameters.
    pub fn for_source(
        source: &Path,
        total_pages: usize,
        pages_per_chunk: usize,
        max_pages: Option<usize>,
        engine_id: &str,
        num_chunks: usize,
    ) -> Result<Self, PagemillError> {
        let meta = fs::metadata(source).map_err(|e| staging_io(source, e))?;
        let mtime_ms = meta
            .modified()
            .map_err(|e| staging_io(source, e))?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(Self {
            version: MANIFEST_VERSION,
            source_size: meta.len(),
            source_mtime_ms: mtime_ms,
            total_pages,
            pages_per_chunk,
            max_pages,
            engine_id: engine_id.to_string(),
            num_chunks,
        })
    }
}

/// Durable per-chunk staging area with coarse staleness invalidation.
///
/// Single-writer/single-reader: concurrent runs against the same staging
/// directory are undefined behaviour and out of scope.
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
    chunks_dir: PathBuf,
}

impl StagingStore {
    /// Wrap a staging directory path. Nothing is created until
    /// [`StagingStore::create_or_validate`] runs.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let root = path.into();
        let chunks_dir = root.join(CHUNKS_SUBDIR);
        Self { root, chunks_dir }
    }

    /// Path to the staging directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    // ── Naming helpers (1-indexed, zero-padded) ──────────────────────────

    fn chunk_md(&self, index: usize) -> PathBuf {
        self.chunks_dir.join(format!("chunk_{:02}.md", index + 1))
    }

    fn chunk_context(&self, index: usize) -> PathBuf {
        self.chunks_dir
            .join(format!("chunk_{:02}_context.md", index + 1))
    }

    fn chunk_meta(&self, index: usize) -> PathBuf {
        self.chunks_dir
            .join(format!("chunk_{:02}_meta.json", index + 1))
    }

    fn manifest_file(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    // ── Manifest ─────────────────────────────────────────────────────────

    /// Create or validate the staging area against `manifest`.
    ///
    /// No manifest on disk: persists `manifest`, returns no cached indices.
    /// Existing manifest matches exactly: returns every index whose chunk
    /// record is complete. Existing manifest differs in any field: erases
    /// every chunk record and the old manifest, persists the new one, and
    /// returns no cached indices — no partial reuse across a parameter
    /// change.
    ///
    /// # Errors
    /// [`PagemillError::CorruptManifest`] when a manifest file exists but
    /// cannot be parsed — never silently treated as missing.
    pub fn create_or_validate(&self, manifest: &Manifest) -> Result<Vec<usize>, PagemillError> {
        fs::create_dir_all(&self.chunks_dir).map_err(|e| staging_io(&self.chunks_dir, e))?;
        let manifest_file = self.manifest_file();

        if manifest_file.exists() {
            let existing = self.read_manifest(&manifest_file)?;
            if &existing == manifest {
                let cached: Vec<usize> = (0..manifest.num_chunks)
                    .filter(|&i| self.has_chunk(i))
                    .collect();
                if !cached.is_empty() {
                    info!(
                        "staging: {}/{} chunks cached in {}",
                        cached.len(),
                        manifest.num_chunks,
                        self.root.display()
                    );
                }
                return Ok(cached);
            }
            warn!(
                "staging: manifest mismatch, invalidating {}",
                self.root.display()
            );
            self.invalidate()?;
        }

        self.write_manifest(&manifest_file, manifest)?;
        Ok(Vec::new())
    }

    fn read_manifest(&self, path: &Path) -> Result<Manifest, PagemillError> {
        let text = fs::read_to_string(path).map_err(|e| staging_io(path, e))?;
        serde_json::from_str(&text).map_err(|e| PagemillError::CorruptManifest {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    fn write_manifest(&self, path: &Path, manifest: &Manifest) -> Result<(), PagemillError> {
        let mut json = serde_json::to_string_pretty(manifest).expect("manifest serialises");
        json.push('\n');
        fs::write(path, json).map_err(|e| staging_io(path, e))
    }

    /// Read the manifest if present and parseable; `None` otherwise.
    ///
    /// Lenient variant for inspection. Validation and
    /// [`StagingStore::manifest`] still treat a corrupt manifest as fatal.
    pub fn load_manifest(&self) -> Option<Manifest> {
        let path = self.manifest_file();
        if !path.exists() {
            return None;
        }
        self.read_manifest(&path).ok()
    }

    /// Read the manifest, failing if the staging area was never populated.
    pub fn manifest(&self) -> Result<Manifest, PagemillError> {
        let path = self.manifest_file();
        if !path.exists() {
            return Err(PagemillError::StagingNotPopulated {
                path: self.root.clone(),
                detail: "no manifest.json".into(),
            });
        }
        self.read_manifest(&path)
    }

    // ── Chunk I/O ────────────────────────────────────────────────────────

    /// Persist a converted chunk.
    ///
    /// Writes `_context.md`, then `.md`, then `_meta.json`. The meta file
    /// comes last so [`StagingStore::has_chunk`] (which checks meta
    /// existence) only reports fully-written chunks. Any earlier record for
    /// the same index is overwritten wholesale.
    pub fn save_chunk(
        &self,
        index: usize,
        markdown: &str,
        context_tail: &str,
        usage: &ChunkUsage,
    ) -> Result<(), PagemillError> {
        let context_path = self.chunk_context(index);
        fs::write(&context_path, context_tail).map_err(|e| staging_io(&context_path, e))?;

        let md_path = self.chunk_md(index);
        fs::write(&md_path, markdown).map_err(|e| staging_io(&md_path, e))?;

        let meta_path = self.chunk_meta(index);
        let mut json = serde_json::to_string_pretty(usage).expect("usage serialises");
        json.push('\n');
        fs::write(&meta_path, json).map_err(|e| staging_io(&meta_path, e))
    }

    /// Whether a chunk has been fully written (its meta file exists).
    pub fn has_chunk(&self, index: usize) -> bool {
        self.chunk_meta(index).exists()
    }

    /// Read the markdown payload for a chunk.
    pub fn load_chunk_markdown(&self, index: usize) -> Result<String, PagemillError> {
        let path = self.chunk_md(index);
        fs::read_to_string(&path).map_err(|e| staging_io(&path, e))
    }

    /// Read the context tail for a chunk.
    ///
    /// A missing file yields `""` — no prior context. This covers the first
    /// chunk (and a chunk whose tail was legitimately empty) without
    /// special-casing callers.
    pub fn load_chunk_context(&self, index: usize) -> Result<String, PagemillError> {
        let path = self.chunk_context(index);
        if !path.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(&path).map_err(|e| staging_io(&path, e))
    }

    /// Read and deserialise the usage metadata for a chunk.
    ///
    /// # Errors
    /// [`PagemillError::CorruptChunkMeta`] when the file exists but cannot
    /// be parsed.
    pub fn load_chunk_usage(&self, index: usize) -> Result<ChunkUsage, PagemillError> {
        let path = self.chunk_meta(index);
        let text = fs::read_to_string(&path).map_err(|e| staging_io(&path, e))?;
        serde_json::from_str(&text).map_err(|e| PagemillError::CorruptChunkMeta {
            path,
            detail: e.to_string(),
        })
    }

    // ── Stats I/O ────────────────────────────────────────────────────────

    /// Write aggregated run stats to `chunks/stats.json`.
    pub fn save_stats(&self, stats: &DocumentStats) -> Result<(), PagemillError> {
        let path = self.chunks_dir.join(STATS_FILE);
        let mut json = serde_json::to_string_pretty(stats).expect("stats serialise");
        json.push('\n');
        fs::write(&path, json).map_err(|e| staging_io(&path, e))
    }

    /// Read aggregated run stats, if present.
    ///
    /// Stats are advisory, not state: a corrupt stats file is logged and
    /// ignored rather than failing the run.
    pub fn load_stats(&self) -> Option<DocumentStats> {
        let path = self.chunks_dir.join(STATS_FILE);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("corrupt stats file {} — ignoring: {e}", path.display());
                None
            }
        }
    }

    // ── Housekeeping ─────────────────────────────────────────────────────

    /// Remove all contents of the staging area and recreate it empty.
    ///
    /// Deletes chunks, stats, and the manifest. Idempotent: a staging
    /// directory that does not exist yet is left as-is.
    pub fn invalidate(&self) -> Result<(), PagemillError> {
        if !self.root.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&self.root).map_err(|e| staging_io(&self.root, e))?;
        fs::create_dir_all(&self.chunks_dir).map_err(|e| staging_io(&self.chunks_dir, e))
    }
}

fn staging_io(path: &Path, source: std::io::Error) -> PagemillError {
    PagemillError::StagingIo {
        path: path.to_path_buf(),
        source,
    }
}
