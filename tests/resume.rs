//! End-to-end tests for chunked conversion, resume, and reassembly.
//!
//! These tests drive the full pipeline — plan → extract → stage → merge →
//! splice — against a scripted in-memory engine, so they run offline and
//! deterministically. The engine records every request it receives, which
//! lets the tests assert not just on outputs but on what the orchestrator
//! asked for (context passing, call counts, position hints).

use async_trait::async_trait;
use pagemill::{
    convert, convert_to_file, remerge, ChunkPosition, ChunkRequest, ChunkResponse,
    ConversionConfig, ExtractionEngine, PagemillError, StagingStore, StopReason,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Scripted engine ──────────────────────────────────────────────────────────

/// In-memory extraction engine: emits page-marked Markdown for any window,
/// with optional per-page body overrides and a scripted truncation.
struct ScriptedEngine {
    total_pages: usize,
    page_bodies: HashMap<usize, String>,
    truncate_chunk: Option<usize>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChunkRequest>>,
}

impl ScriptedEngine {
    fn new(total_pages: usize) -> Self {
        Self {
            total_pages,
            page_bodies: HashMap::new(),
            truncate_chunk: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_page_body(mut self, page: usize, body: &str) -> Self {
        self.page_bodies.insert(page, body.to_string());
        self
    }

    fn with_truncation_at(mut self, chunk_index: usize) -> Self {
        self.truncate_chunk = Some(chunk_index);
        self
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn recorded_requests(&self) -> Vec<ChunkRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn render_window(&self, page_start: usize, page_end: usize) -> String {
        let mut out = String::new();
        for page in page_start..=page_end {
            out.push_str(&format!("<!-- PDF_PAGE_BEGIN {page} -->\n\n"));
            match self.page_bodies.get(&page) {
                Some(body) => out.push_str(body),
                None => out.push_str(&format!("Content of page {page}.")),
            }
            out.push_str(&format!("\n\n<!-- PDF_PAGE_END {page} -->\n\n"));
        }
        out
    }
}

#[async_trait]
impl ExtractionEngine for ScriptedEngine {
    async fn page_count(&self, _source: &Path) -> Result<usize, PagemillError> {
        Ok(self.total_pages)
    }

    async fn extract_chunk(
        &self,
        _source: &Path,
        request: &ChunkRequest,
    ) -> Result<ChunkResponse, PagemillError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let stop_reason = if self.truncate_chunk == Some(request.chunk_index) {
            StopReason::Truncated
        } else {
            StopReason::Complete
        };

        Ok(ChunkResponse {
            markdown: self.render_window(request.page_start, request.page_end),
            input_tokens: 1_000 * request.page_count() as u64,
            output_tokens: 100 * request.page_count() as u64,
            stop_reason,
        })
    }

    fn engine_id(&self) -> &str {
        "scripted-v1"
    }

    fn max_pages_per_request(&self) -> usize {
        100
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

struct Fixture {
    _dir: TempDir,
    source: PathBuf,
    staging: StagingStore,
}

fn fixture() -> Fixture {
    // RUST_LOG=pagemill=debug surfaces the orchestrator's chunk log lines.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let dir = TempDir::new().unwrap();
    let source = dir.path().join("document.pdf");
    std::fs::write(&source, b"%PDF-1.7 fake body").unwrap();
    let staging = StagingStore::new(dir.path().join("document.staging"));
    Fixture {
        source,
        staging,
        _dir: dir,
    }
}

fn config(pages_per_chunk: usize) -> ConversionConfig {
    ConversionConfig::builder()
        .pages_per_chunk(pages_per_chunk)
        .build()
        .unwrap()
}

fn as_engine(engine: ScriptedEngine) -> (Arc<ScriptedEngine>, Arc<dyn ExtractionEngine>) {
    let concrete = Arc::new(engine);
    let dynamic: Arc<dyn ExtractionEngine> = Arc::clone(&concrete) as Arc<dyn ExtractionEngine>;
    (concrete, dynamic)
}

// ── Full conversion ──────────────────────────────────────────────────────────

#[tokio::test]
async fn converts_all_chunks_and_orders_pages() {
    let fx = fixture();
    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(88));

    let output = convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();

    // 88 pages at 20/chunk → 5 engine calls.
    assert_eq!(engine.call_count(), 5);
    assert_eq!(output.stats.chunks, 5);
    assert_eq!(output.stats.fresh_chunks, 5);
    assert_eq!(output.stats.cached_chunks, 0);
    assert_eq!(output.stats.pages, 88);

    // All pages present, in ascending order.
    let mut last_pos = 0;
    for page in 1..=88 {
        let needle = format!("Content of page {page}.");
        let pos = output.markdown.find(&needle).unwrap_or_else(|| {
            panic!("page {page} missing from merged output");
        });
        assert!(pos >= last_pos, "page {page} out of order");
        last_pos = pos;
    }
    assert!(output.warnings.is_empty());

    // Outcomes come back in index order with their position hints intact.
    assert_eq!(output.chunks.len(), 5);
    assert_eq!(output.chunks[0].position(), ChunkPosition::First);
    assert_eq!(output.chunks[2].position(), ChunkPosition::Middle);
    assert_eq!(output.chunks[4].position(), ChunkPosition::Last);
}

#[tokio::test]
async fn position_hints_follow_chunk_order() {
    let fx = fixture();
    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(30));

    convert(&fx.source, &dyn_engine, &fx.staging, &config(10))
        .await
        .unwrap();

    let positions: Vec<ChunkPosition> = engine
        .recorded_requests()
        .iter()
        .map(|r| r.position)
        .collect();
    assert_eq!(
        positions,
        vec![
            ChunkPosition::First,
            ChunkPosition::Middle,
            ChunkPosition::Last
        ]
    );
}

#[tokio::test]
async fn context_flows_from_previous_chunk_via_store() {
    let fx = fixture();
    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(40));

    convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();

    let requests = engine.recorded_requests();
    assert!(requests[0].previous_context.is_none(), "first chunk has no context");

    let ctx = requests[1].previous_context.as_deref().unwrap();
    // The tail is page-aligned: it starts at a begin marker and carries the
    // trailing pages of chunk 1, and matches what the store persisted.
    assert!(ctx.starts_with("<!-- PDF_PAGE_BEGIN "));
    assert!(ctx.contains("Content of page 20."));
    assert_eq!(ctx, fx.staging.load_chunk_context(0).unwrap());
}

#[tokio::test]
async fn max_pages_caps_the_plan() {
    let fx = fixture();
    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(88));
    let config = ConversionConfig::builder()
        .pages_per_chunk(20)
        .max_pages(25)
        .build()
        .unwrap();

    let output = convert(&fx.source, &dyn_engine, &fx.staging, &config)
        .await
        .unwrap();

    assert_eq!(engine.call_count(), 2);
    assert_eq!(output.stats.pages, 25);
    assert!(output.markdown.contains("Content of page 25."));
    assert!(!output.markdown.contains("Content of page 26."));
}

// ── Resume ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_run_uses_cache_and_calls_nothing() {
    let fx = fixture();
    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(60));

    let first = convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();
    assert_eq!(engine.call_count(), 3);

    let second = convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();
    assert_eq!(engine.call_count(), 3, "no new engine calls on resume");
    assert_eq!(second.stats.cached_chunks, 3);
    assert_eq!(second.stats.fresh_chunks, 0);
    assert_eq!(second.markdown, first.markdown, "resume reproduces the document");
}

#[tokio::test]
async fn interrupted_chunk_is_reconverted_on_resume() {
    let fx = fixture();
    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(60));

    convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();
    assert_eq!(engine.call_count(), 3);

    // Simulate a crash mid-save of chunk 1: context and payload written,
    // metadata missing.
    let chunks_dir = fx.staging.path().join("chunks");
    std::fs::remove_file(chunks_dir.join("chunk_02_meta.json")).unwrap();
    assert!(!fx.staging.has_chunk(1));

    let output = convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();
    assert_eq!(engine.call_count(), 4, "exactly the interrupted chunk re-ran");
    assert_eq!(output.stats.cached_chunks, 2);
    assert_eq!(output.stats.fresh_chunks, 1);
    assert!(output.markdown.contains("Content of page 21."));
}

#[tokio::test]
async fn changed_window_size_reconverts_everything() {
    let fx = fixture();
    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(60));

    convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();
    assert_eq!(engine.call_count(), 3);

    convert(&fx.source, &dyn_engine, &fx.staging, &config(10))
        .await
        .unwrap();
    // 6 new chunks, nothing reused across the parameter change.
    assert_eq!(engine.call_count(), 3 + 6);
}

#[tokio::test]
async fn force_invalidates_matching_cache() {
    let fx = fixture();
    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(40));

    convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();
    assert_eq!(engine.call_count(), 2);

    let forced = ConversionConfig::builder()
        .pages_per_chunk(20)
        .force(true)
        .build()
        .unwrap();
    let output = convert(&fx.source, &dyn_engine, &fx.staging, &forced)
        .await
        .unwrap();
    assert_eq!(engine.call_count(), 4, "force reconverts every chunk");
    assert_eq!(output.stats.fresh_chunks, 2);
}

// ── Failure modes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn truncated_chunk_is_fatal_and_not_persisted() {
    let fx = fixture();
    let (_engine, dyn_engine) = as_engine(ScriptedEngine::new(60).with_truncation_at(1));

    let err = convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap_err();
    match err {
        PagemillError::TruncatedOutput {
            page_start,
            page_end,
            pages_per_chunk,
        } => {
            assert_eq!((page_start, page_end), (21, 40));
            assert_eq!(pages_per_chunk, 20);
        }
        other => panic!("expected TruncatedOutput, got {other:?}"),
    }

    // Chunk 0 survived; the truncated chunk was never marked complete.
    assert!(fx.staging.has_chunk(0));
    assert!(!fx.staging.has_chunk(1));
}

#[tokio::test]
async fn window_above_engine_limit_is_rejected() {
    let fx = fixture();
    let (_engine, dyn_engine) = as_engine(ScriptedEngine::new(500));

    let err = convert(&fx.source, &dyn_engine, &fx.staging, &config(150))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PagemillError::WindowTooLarge {
            requested: 150,
            limit: 100
        }
    ));
}

#[tokio::test]
async fn engine_failure_leaves_staging_resumable() {
    struct FailingEngine {
        inner: ScriptedEngine,
        fail_chunk: usize,
    }

    #[async_trait]
    impl ExtractionEngine for FailingEngine {
        async fn page_count(&self, source: &Path) -> Result<usize, PagemillError> {
            self.inner.page_count(source).await
        }

        async fn extract_chunk(
            &self,
            source: &Path,
            request: &ChunkRequest,
        ) -> Result<ChunkResponse, PagemillError> {
            if request.chunk_index == self.fail_chunk {
                return Err(PagemillError::EngineError {
                    detail: "service unavailable after retries".into(),
                });
            }
            self.inner.extract_chunk(source, request).await
        }

        fn engine_id(&self) -> &str {
            self.inner.engine_id()
        }

        fn max_pages_per_request(&self) -> usize {
            self.inner.max_pages_per_request()
        }
    }

    let fx = fixture();
    let failing: Arc<dyn ExtractionEngine> = Arc::new(FailingEngine {
        inner: ScriptedEngine::new(60),
        fail_chunk: 2,
    });

    let err = convert(&fx.source, &failing, &fx.staging, &config(20))
        .await
        .unwrap_err();
    assert!(matches!(err, PagemillError::EngineError { .. }));

    // The chunks completed before the failure stay paid-for on disk; a
    // healthy engine finishes the remaining one without redoing them.
    assert!(fx.staging.has_chunk(0));
    assert!(fx.staging.has_chunk(1));
    assert!(!fx.staging.has_chunk(2));

    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(60));
    let output = convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();
    assert_eq!(engine.call_count(), 1, "only the failed chunk is converted");
    assert_eq!(output.stats.cached_chunks, 2);
    assert_eq!(output.stats.fresh_chunks, 1);
}

#[tokio::test]
async fn missing_source_is_fatal() {
    let fx = fixture();
    let (_engine, dyn_engine) = as_engine(ScriptedEngine::new(10));

    let err = convert(
        fx.source.with_file_name("nope.pdf"),
        &dyn_engine,
        &fx.staging,
        &config(10),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PagemillError::SourceNotFound { .. }));
}

// ── Remerge ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn remerge_reproduces_output_without_engine_calls() {
    let fx = fixture();
    let (engine, dyn_engine) = as_engine(ScriptedEngine::new(60));

    let converted = convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();
    let calls_after_convert = engine.call_count();

    let remerged = remerge(&fx.staging).unwrap();
    assert_eq!(engine.call_count(), calls_after_convert);
    assert_eq!(remerged.markdown, converted.markdown);
    assert_eq!(remerged.stats.cached_chunks, 3);
    assert_eq!(remerged.stats.fresh_chunks, 0);
}

#[tokio::test]
async fn remerge_requires_populated_staging() {
    let fx = fixture();
    let err = remerge(&fx.staging).unwrap_err();
    assert!(matches!(err, PagemillError::StagingNotPopulated { .. }));
}

// ── Boundary-split tables through the whole pipeline ─────────────────────────

const BROKEN_TABLE_HEAD: &str = "\
**Table 5 – Example table**

<table>
<thead>
<tr><th>Name</th><th>Value</th></tr>
</thead>
<tbody>
<tr><td>Alpha</td><td>1</td></tr>
<tr><td>Beta</td><td>2</td></tr>
</tbody>
</table>";

const BROKEN_TABLE_TAIL: &str = "\
<!-- TABLE_CONTINUE -->

**Table 5 – Example table** *(continued)*

<table>
<thead>
<tr><th>Name</th><th>Value</th></tr>
</thead>
<tbody>
<tr><td>Gamma</td><td>3</td></tr>
</tbody>
</table>";

#[tokio::test]
async fn table_split_across_chunk_boundary_is_spliced() {
    let fx = fixture();
    // Page 20 ends chunk 1 with an open-ended table; page 21 starts chunk 2
    // with its continuation.
    let (_engine, dyn_engine) = as_engine(
        ScriptedEngine::new(40)
            .with_page_body(20, BROKEN_TABLE_HEAD)
            .with_page_body(21, BROKEN_TABLE_TAIL),
    );

    let output = convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();

    // One table, all three rows, header once, no markers left.
    assert_eq!(output.markdown.matches("<table").count(), 1);
    for row in ["Alpha", "Beta", "Gamma"] {
        assert!(output.markdown.contains(row), "{row} missing");
    }
    assert_eq!(output.markdown.matches("<thead>").count(), 1);
    assert!(!output.markdown.contains("TABLE_CONTINUE"));
    assert!(!output.markdown.contains("(continued)"));
    assert!(output.warnings.is_empty());

    // Page provenance survives inside the merged table.
    let table_start = output.markdown.find("<table").unwrap();
    let table_end = output.markdown.find("</table>").unwrap();
    let table = &output.markdown[table_start..table_end];
    assert!(table.contains("<!-- PDF_PAGE_END 20 -->"));
    assert!(table.contains("<!-- PDF_PAGE_BEGIN 21 -->"));
}

#[tokio::test]
async fn orphan_continuation_marker_surfaces_as_warning() {
    let fx = fixture();
    // A continuation marker with no table anywhere before it.
    let (_engine, dyn_engine) = as_engine(
        ScriptedEngine::new(40).with_page_body(21, BROKEN_TABLE_TAIL),
    );

    let output = convert(&fx.source, &dyn_engine, &fx.staging, &config(20))
        .await
        .unwrap();

    assert!(!output.warnings.is_empty(), "orphan marker must warn");
    assert!(output
        .warnings
        .iter()
        .any(|w| w.contains("still present") || w.contains("no preceding")));
}

// ── File output ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_to_file_writes_atomically_and_stages_beside_output() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("document.pdf");
    std::fs::write(&source, b"%PDF-1.7 fake body").unwrap();
    let out_path = dir.path().join("out").join("document.md");

    let (_engine, dyn_engine) = as_engine(ScriptedEngine::new(30));
    let output = convert_to_file(&source, &out_path, &dyn_engine, &config(10))
        .await
        .unwrap();

    let written = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(written, output.markdown);
    assert!(!out_path.with_extension("md.tmp").exists());
    // Default staging convention: next to the output file.
    assert!(dir.path().join("out").join("document.staging").is_dir());
}
