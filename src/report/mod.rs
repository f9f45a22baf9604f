//! Run summaries printed once the dataset is written.
//!
//! - [`terminal`] — colored summary box, per-tool table, and failure details.
//! - [`json`] — the same figures as one JSON document.

pub mod json;
pub mod terminal;
