//! Pipeline stages for chunked document conversion.
//!
//! Each submodule implements exactly one transformation step. Keeping the
//! stages separate makes each independently testable and keeps the
//! orchestrator in [`crate::convert`] a plain loop over well-named calls.
//!
//! ## Data Flow
//!
//! ```text
//! plan ──▶ extract ──▶ remap ──▶ stage ──▶ merge ──▶ splice
//! (pages)  (engine)   (numbers) (disk)    (dedup)   (tables)
//! ```
//!
//! 1. [`plan`]    — split the page count into disjoint chunk windows
//! 2. [`remap`]   — shift window-local page numbers back to document numbers
//! 3. [`context`] — cut the page-aligned tail passed to the next chunk
//! 4. [`merge`]   — reassemble chunks into one document, page-keyed, deduped
//! 5. [`splice`]  — reunify tables split across a chunk boundary
//!
//! The staging store sits between extract and merge but is not a
//! transformation — it lives at [`crate::staging`].

pub mod context;
pub mod merge;
pub mod plan;
pub mod remap;
pub mod splice;
