//! Configuration types for chunked document conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to serialise a run's parameters for logging and to diff two
//! runs to understand why their staging areas disagree.
//!
//! Note that most of these knobs feed the staging fingerprint: changing
//! `pages_per_chunk` or `max_pages` between runs invalidates every cached
//! chunk, because chunk boundaries (and therefore chunk content) would no
//! longer line up.

use crate::error::PagemillError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of document pages per extraction chunk.
pub const DEFAULT_PAGES_PER_CHUNK: usize = 10;

/// Context tail: minimum number of complete pages passed to the next chunk.
pub const DEFAULT_CONTEXT_MIN_PAGES: usize = 3;

/// Context tail: minimum line count; more whole pages are included until met.
pub const DEFAULT_CONTEXT_MIN_LINES: usize = 200;

/// Configuration for a chunked conversion run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pagemill::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .pages_per_chunk(20)
///     .max_pages(50)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Number of document pages per extraction chunk. Default: 10.
    ///
    /// Smaller chunks mean more (cheaper, safer) service calls and finer
    /// resume granularity; larger chunks mean fewer calls but each one risks
    /// hitting the service's output ceiling. Must not exceed the engine's
    /// hard per-request page limit — checked at conversion time against
    /// [`crate::engine::ExtractionEngine::max_pages_per_request`].
    pub pages_per_chunk: usize,

    /// Optional cap on total pages converted, counted from page 1.
    ///
    /// Useful for cheap dry runs against the first pages of a large
    /// document. Part of the staging fingerprint: changing it invalidates
    /// cached chunks.
    pub max_pages: Option<usize>,

    /// Wipe the staging area before converting. Default: false.
    ///
    /// The explicit operator escape hatch for corrupt staging state —
    /// corruption is otherwise a fatal error, never silently repaired.
    pub force: bool,

    /// Context tail: minimum complete pages from the previous chunk. Default: 3.
    pub context_min_pages: usize,

    /// Context tail: minimum line count before more pages are pulled in. Default: 200.
    ///
    /// Compensates for chunks whose trailing pages are nearly empty (figures,
    /// part-title pages): three near-blank pages give the next chunk almost
    /// nothing to continue from.
    pub context_min_lines: usize,

    /// Staging directory override.
    ///
    /// When `None`, the staging area lives at the output path with its
    /// extension replaced by `.staging` (so `report.md` stages in
    /// `report.staging/`).
    pub staging_dir: Option<PathBuf>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            pages_per_chunk: DEFAULT_PAGES_PER_CHUNK,
            max_pages: None,
            force: false,
            context_min_pages: DEFAULT_CONTEXT_MIN_PAGES,
            context_min_lines: DEFAULT_CONTEXT_MIN_LINES,
            staging_dir: None,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the staging directory for a given output path.
    pub fn resolve_staging_dir(&self, output_path: &std::path::Path) -> PathBuf {
        match &self.staging_dir {
            Some(dir) => dir.clone(),
            None => output_path.with_extension("staging"),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn pages_per_chunk(mut self, n: usize) -> Self {
        self.config.pages_per_chunk = n.max(1);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = Some(n);
        self
    }

    pub fn force(mut self, v: bool) -> Self {
        self.config.force = v;
        self
    }

    pub fn context_min_pages(mut self, n: usize) -> Self {
        self.config.context_min_pages = n.max(1);
        self
    }

    pub fn context_min_lines(mut self, n: usize) -> Self {
        self.config.context_min_lines = n;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, PagemillError> {
        let c = &self.config;
        if c.pages_per_chunk == 0 {
            return Err(PagemillError::InvalidConfig(
                "pages_per_chunk must be ≥ 1".into(),
            ));
        }
        if let Some(cap) = c.max_pages {
            if cap == 0 {
                return Err(PagemillError::InvalidConfig(
                    "max_pages must be ≥ 1 when set".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn defaults_match_constants() {
        let c = ConversionConfig::default();
        assert_eq!(c.pages_per_chunk, 10);
        assert_eq!(c.context_min_pages, 3);
        assert_eq!(c.context_min_lines, 200);
        assert!(c.max_pages.is_none());
        assert!(!c.force);
    }

    #[test]
    fn builder_clamps_zero_window() {
        let c = ConversionConfig::builder().pages_per_chunk(0).build().unwrap();
        assert_eq!(c.pages_per_chunk, 1);
    }

    #[test]
    fn zero_max_pages_rejected() {
        let result = ConversionConfig::builder()
            .max_pages(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn staging_dir_defaults_beside_output() {
        let c = ConversionConfig::default();
        let staging = c.resolve_staging_dir(Path::new("/out/report.md"));
        assert_eq!(staging, PathBuf::from("/out/report.staging"));
    }

    #[test]
    fn staging_dir_override_wins() {
        let c = ConversionConfig::builder()
            .staging_dir("/var/cache/pm")
            .build()
            .unwrap();
        let staging = c.resolve_staging_dir(Path::new("/out/report.md"));
        assert_eq!(staging, PathBuf::from("/var/cache/pm"));
    }
}
