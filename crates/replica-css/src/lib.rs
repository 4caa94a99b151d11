//! Stylesheet text handling for snapshot replay.
//!
//! # Scope
//!
//! This crate implements:
//! - **Rule scanning** ([§ 5 Parsing](https://www.w3.org/TR/css-syntax-3/#parsing))
//!   - Qualified rules and at-rules, with conditional group rules nested
//!   - Comments, strings and escapes skipped without tokenizing
//!   - Source spans, so rewrites keep the rest of the text intact
//!
//! - **Replay adaptation**
//!   - `:hover` selectors duplicated as `.\:hover` class selectors
//!   - `(max|min)-device-(width|height)` media features unprefixed
//!   - [`BuildCache`] memoization keyed by the captured text
//!
//! - **Split style text**
//!   - [`SPLIT_MARKER`] insertion at text-node boundaries on capture
//!   - Reassembly over text-node slots on rebuild
//!
//! # Not Implemented
//!
//! - Declaration parsing or any value-level rewrite
//! - Nested style rules (CSS Nesting) inside qualified rule blocks

/// Replay adaptation and [`BuildCache`].
pub mod adapt;
/// Span-preserving rule scanner per [§ 5 Parsing](https://www.w3.org/TR/css-syntax-3/#parsing).
pub mod scanner;
/// Split marker insertion and reassembly.
pub mod split;

pub use adapt::{BuildCache, HOVER_CLASS_SELECTOR, adapt_css_for_replay, try_adapt_css};
pub use scanner::{CssError, CssRule, CssScanner, Span};
pub use split::{SPLIT_MARKER, apply_css_splits, mark_css_splits};
