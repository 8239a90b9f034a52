//! Analyzer module — attachment-to-result orchestration.
//!
//! Selects a source handler, wires it to the parser through a bounded pipe,
//! and turns timeouts, panics and producer failures into error codes.

pub mod run;

pub use run::LogAnalyzer;
