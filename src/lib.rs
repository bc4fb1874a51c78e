//! # pagemill
//!
//! Convert large PDF documents to Markdown through a costly, slow,
//! externally-hosted extraction service — in bounded page windows, with
//! durable resume.
//!
//! ## Why this crate?
//!
//! A 300-page document cannot go through an extraction service in one
//! request: output ceilings truncate it and a single failure throws away
//! the whole run. Converting page-by-page instead loses continuity —
//! tables, numbered lists, and running sections break at every boundary.
//! This crate takes the middle road: disjoint page windows ("chunks"),
//! each persisted to disk the moment it is extracted, each handed the tail
//! of its predecessor for continuity, then deterministically reassembled
//! into one coherent document with boundary-split tables spliced back
//! together.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source document
//!  │
//!  ├─ 1. Plan     split page count into disjoint chunk windows
//!  ├─ 2. Extract  one engine call per window (skipped when staged)
//!  ├─ 3. Stage    persist payload + context tail + usage, metadata last
//!  ├─ 4. Merge    page-keyed reassembly, first-writer-wins dedup
//!  ├─ 5. Splice   reunify tables split across chunk boundaries
//!  └─ 6. Output   assembled Markdown + per-chunk stats
//! ```
//!
//! ## Crash safety
//!
//! Every chunk's record is written context → payload → metadata, and only
//! the metadata file marks a chunk complete. Kill the process anywhere and
//! at most the single in-flight extraction call is lost; the next run
//! resumes from the staging area. Changing any conversion parameter
//! (window size, page cap, engine, source file) invalidates the whole
//! staging area — cached chunks are never partially reused.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagemill::{convert, ConversionConfig, StagingStore};
//! use pagemill::ExtractionEngine;
//! use std::sync::Arc;
//!
//! # async fn run(engine: Arc<dyn ExtractionEngine>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConversionConfig::builder()
//!     .pages_per_chunk(10)
//!     .build()?;
//! let staging = StagingStore::new("report.staging");
//! let output = convert("report.pdf", &engine, &staging, &config).await?;
//! println!("{}", output.markdown);
//! eprintln!(
//!     "tokens: {} in / {} out ({} chunks cached)",
//!     output.stats.input_tokens,
//!     output.stats.output_tokens,
//!     output.stats.cached_chunks,
//! );
//! # Ok(())
//! # }
//! ```
//!
//! The extraction service itself — prompting, transport, retry, pricing —
//! lives behind the [`ExtractionEngine`] trait and is supplied by the
//! caller.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod markers;
pub mod output;
pub mod pipeline;
pub mod staging;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_to_file, remerge};
pub use engine::{ChunkPosition, ChunkRequest, ChunkResponse, ExtractionEngine, StopReason};
pub use error::PagemillError;
pub use output::{ChunkOutcome, ChunkUsage, ConversionOutput, DocumentStats};
pub use pipeline::merge::merge_chunks;
pub use pipeline::plan::{plan_chunks, ChunkPlan};
pub use pipeline::splice::{merge_continued_tables, SpliceOutcome};
pub use staging::{Manifest, StagingStore};
