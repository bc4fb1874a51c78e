//! Conversion entry points: the chunk loop and its reassembly.
//!
//! ## Why everything goes through the staging store
//!
//! The loop carries no state between iterations. The previous chunk's
//! context tail is read back from the [`StagingStore`] at the top of each
//! iteration, and the final document is reassembled by reading every chunk
//! back from the store after the loop — not from an in-memory accumulator.
//! Persistence is authoritative, not a best-effort cache: killing the
//! process at any point between chunk boundaries loses at most the single
//! in-flight extraction call, and a restarted run picks up exactly where
//! the store says it left off.
//!
//! Chunks are processed strictly in index order, one at a time. This is
//! deliberate, not a missing optimisation: chunk N+1's continuity context
//! is a true data dependency on chunk N's realized output.

use crate::config::ConversionConfig;
use crate::engine::{ChunkRequest, ExtractionEngine, StopReason};
use crate::error::PagemillError;
use crate::output::{fmt_duration, ChunkOutcome, ChunkUsage, ConversionOutput, DocumentStats};
use crate::pipeline::context::context_tail;
use crate::pipeline::merge::merge_chunks;
use crate::pipeline::plan::{plan_chunks, ChunkPlan};
use crate::pipeline::remap::remap_page_markers;
use crate::pipeline::splice::merge_continued_tables;
use crate::staging::{Manifest, StagingStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Convert a document to Markdown via chunked extraction with resume.
///
/// This is the primary entry point for the library. Each chunk is persisted
/// to `staging` immediately after extraction; chunks already complete in
/// the staging area (under a matching manifest) are skipped without an
/// engine call.
///
/// # Errors
/// Fatal only: missing source, corrupt staging state, a truncated
/// extraction, window larger than the engine allows, I/O failure. Splice
/// problems are reported in [`ConversionOutput::warnings`] instead.
pub async fn convert(
    source: impl AsRef<Path>,
    engine: &Arc<dyn ExtractionEngine>,
    staging: &StagingStore,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PagemillError> {
    let source = source.as_ref();
    if !source.exists() {
        return Err(PagemillError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }

    // Each chunk must fit within the engine's per-request page limit.
    let limit = engine.max_pages_per_request();
    if config.pages_per_chunk > limit {
        return Err(PagemillError::WindowTooLarge {
            requested: config.pages_per_chunk,
            limit,
        });
    }

    let run_start = Instant::now();
    info!("starting conversion: {}", source.display());

    let mut total_pages = engine.page_count(source).await?;
    if let Some(cap) = config.max_pages {
        if cap < total_pages {
            info!("limiting to first {cap} of {total_pages} pages");
            total_pages = cap;
        }
    }

    let chunks = plan_chunks(total_pages, config.pages_per_chunk);
    let num_chunks = chunks.len();
    info!(
        "document has {total_pages} pages — splitting into {num_chunks} chunks \
         ({} pages/chunk)",
        config.pages_per_chunk
    );

    // The operator escape hatch for corrupt or unwanted staging state.
    if config.force {
        info!("force: invalidating staging area {}", staging.path().display());
        staging.invalidate()?;
    }

    let manifest = Manifest::for_source(
        source,
        total_pages,
        config.pages_per_chunk,
        config.max_pages,
        engine.engine_id(),
        num_chunks,
    )?;
    staging.create_or_validate(&manifest)?;

    let mut cached_count = 0;

    for chunk in &chunks {
        // 1. Skip chunks already complete on disk.
        if staging.has_chunk(chunk.index) {
            cached_count += 1;
            info!(
                "chunk {}/{num_chunks}: pages {}-{} (cached, skipping)",
                chunk.index + 1,
                chunk.page_start,
                chunk.page_end
            );
            continue;
        }

        info!(
            "chunk {}/{num_chunks}: pages {}-{} ({} pages)...",
            chunk.index + 1,
            chunk.page_start,
            chunk.page_end,
            chunk.page_count()
        );

        // 2. Pull the previous context from the STORE, not a loop variable —
        //    this is what makes the loop restart-safe at chunk granularity.
        let prev_context = if chunk.index > 0 {
            staging.load_chunk_context(chunk.index - 1)?
        } else {
            String::new()
        };

        let request = ChunkRequest {
            chunk_index: chunk.index,
            total_chunks: num_chunks,
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            position: chunk.position(),
            previous_context: if prev_context.is_empty() {
                None
            } else {
                Some(prev_context)
            },
        };

        // 3. Extract via the engine (the engine owns retry/backoff).
        let chunk_start = Instant::now();
        let resp = engine.extract_chunk(source, &request).await?;
        let elapsed_ms = chunk_start.elapsed().as_millis() as u64;

        debug!(
            "chunk pages {}-{}: {}, stop={:?}",
            chunk.page_start,
            chunk.page_end,
            fmt_duration(elapsed_ms),
            resp.stop_reason
        );

        // A truncated payload is incomplete and must never be persisted as
        // if it were done.
        if resp.stop_reason == StopReason::Truncated {
            return Err(PagemillError::TruncatedOutput {
                page_start: chunk.page_start,
                page_end: chunk.page_end,
                pages_per_chunk: config.pages_per_chunk,
            });
        }

        let markdown = remap_page_markers(&resp.markdown, chunk.page_start);
        let tail = context_tail(&markdown, config.context_min_pages, config.context_min_lines);

        info!(
            "chunk {}/{num_chunks} done ({}) ({} input, {} output)",
            chunk.index + 1,
            fmt_duration(elapsed_ms),
            resp.input_tokens,
            resp.output_tokens
        );

        // 4. Persist IMMEDIATELY, before advancing to the next chunk.
        let usage = ChunkUsage {
            index: chunk.index,
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            input_tokens: resp.input_tokens,
            output_tokens: resp.output_tokens,
            elapsed_ms,
        };
        staging.save_chunk(chunk.index, &markdown, tail, &usage)?;
    }

    // 5. Reconstruct every chunk from the store — persistence is
    //    authoritative, in-loop results are not retained.
    let outcomes = load_outcomes(staging, &chunks)?;

    // 6. Aggregate stats and persist them.
    let stats = aggregate_stats(
        source,
        total_pages,
        &outcomes,
        cached_count,
        run_start.elapsed().as_millis() as u64,
    );
    staging.save_stats(&stats)?;

    info!(
        "conversion done: {} input + {} output tokens, time {}",
        stats.input_tokens,
        stats.output_tokens,
        fmt_duration(stats.elapsed_ms)
    );
    if cached_count > 0 {
        info!(
            "chunks: {} fresh, {} cached, {} total",
            stats.fresh_chunks, cached_count, num_chunks
        );
    }

    Ok(assemble(outcomes, stats))
}

/// Convert a document and write the result atomically to `output_path`.
///
/// The staging area is resolved from the config (or defaults to the output
/// path with a `.staging` extension). The output is written to a temp file
/// and renamed into place so a crash never leaves a partial document.
pub async fn convert_to_file(
    source: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    engine: &Arc<dyn ExtractionEngine>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PagemillError> {
    let output_path = output_path.as_ref();
    let staging = StagingStore::new(config.resolve_staging_dir(output_path));
    let output = convert(source, engine, &staging, config).await?;

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PagemillError::OutputWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = output_path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, &output.markdown)
        .await
        .map_err(|e| PagemillError::OutputWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, output_path)
        .await
        .map_err(|e| PagemillError::OutputWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    Ok(output)
}

/// Rebuild the merged, spliced document from a populated staging area.
///
/// Zero engine calls: the chunk plan is re-derived from the manifest and
/// every chunk is read from disk. Useful after tweaking downstream tooling
/// when the expensive extraction work is already paid for.
///
/// # Errors
/// [`PagemillError::StagingNotPopulated`] when the manifest is missing or
/// any chunk is incomplete.
pub fn remerge(staging: &StagingStore) -> Result<ConversionOutput, PagemillError> {
    let manifest = staging.manifest()?;
    let chunks = plan_chunks(manifest.total_pages, manifest.pages_per_chunk);

    let missing: Vec<usize> = chunks
        .iter()
        .filter(|c| !staging.has_chunk(c.index))
        .map(|c| c.index)
        .collect();
    if !missing.is_empty() {
        return Err(PagemillError::StagingNotPopulated {
            path: staging.path().to_path_buf(),
            detail: format!("chunks {missing:?} incomplete"),
        });
    }

    info!(
        "remerge: reassembling {} chunks from {}",
        chunks.len(),
        staging.path().display()
    );

    let outcomes = load_outcomes(staging, &chunks)?;

    // All chunks count as cached: nothing was converted in this run.
    let stats = match staging.load_stats() {
        Some(mut stats) => {
            stats.cached_chunks = chunks.len();
            stats.fresh_chunks = 0;
            stats
        }
        None => DocumentStats {
            doc_name: String::new(),
            pages: manifest.total_pages,
            chunks: chunks.len(),
            cached_chunks: chunks.len(),
            fresh_chunks: 0,
            input_tokens: outcomes.iter().map(|o| o.usage.input_tokens).sum(),
            output_tokens: outcomes.iter().map(|o| o.usage.output_tokens).sum(),
            elapsed_ms: 0,
        },
    };

    Ok(assemble(outcomes, stats))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Read every chunk's record triplet back from the staging area.
fn load_outcomes(
    staging: &StagingStore,
    chunks: &[ChunkPlan],
) -> Result<Vec<ChunkOutcome>, PagemillError> {
    chunks
        .iter()
        .map(|chunk| {
            Ok(ChunkOutcome {
                plan: *chunk,
                markdown: staging.load_chunk_markdown(chunk.index)?,
                context_tail: staging.load_chunk_context(chunk.index)?,
                usage: staging.load_chunk_usage(chunk.index)?,
            })
        })
        .collect()
}

fn aggregate_stats(
    source: &Path,
    total_pages: usize,
    outcomes: &[ChunkOutcome],
    cached_chunks: usize,
    elapsed_ms: u64,
) -> DocumentStats {
    DocumentStats {
        doc_name: source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        pages: total_pages,
        chunks: outcomes.len(),
        cached_chunks,
        fresh_chunks: outcomes.len() - cached_chunks,
        input_tokens: outcomes.iter().map(|o| o.usage.input_tokens).sum(),
        output_tokens: outcomes.iter().map(|o| o.usage.output_tokens).sum(),
        elapsed_ms,
    }
}

/// Merge and splice the chunk payloads into the final document.
fn assemble(outcomes: Vec<ChunkOutcome>, stats: DocumentStats) -> ConversionOutput {
    let parts: Vec<String> = outcomes.iter().map(|o| o.markdown.clone()).collect();
    let merged = merge_chunks(&parts);
    let spliced = merge_continued_tables(&merged);

    ConversionOutput {
        markdown: spliced.markdown,
        chunks: outcomes,
        stats,
        warnings: spliced.warnings,
    }
}
