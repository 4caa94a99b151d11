//! Common utilities for the replica snapshot engine.
//!
//! This crate provides shared infrastructure used by all snapshot components:
//! - **Warning System** - deduplicated warnings routed through `tracing`
//! - **URL Resolution** - absolutizing attribute values, `srcset` lists and
//!   CSS `url(...)` references against a document base

pub mod url;
pub mod warning;
