//! Parser module — section grammar and the streaming line state machine.
//!
//! # Architecture
//!
//! - `grammar.rs`: section table types and builder
//! - `sections.rs`: the built-in emulator log grammar
//! - `lines.rs`: chunk-to-line framing (BOM, CRLF, over-long lines)
//! - `state.rs`: per-parse accumulator
//! - `machine.rs`: the state machine and its async pipe driver
//! - `model.rs`: `ParseResult` and the error taxonomy
//! - `metrics.rs`: analyzer counters
//!
//! # Safety Guarantees
//!
//! - Bounded memory: one partial line plus the pipe's in-flight chunks
//! - Binary safety: invalid UTF-8 is decoded lossily
//! - Byte ceiling: parsing stops with `SizeLimit` before the ceiling is crossed

pub mod grammar;
pub mod lines;
pub mod machine;
pub mod metrics;
pub mod model;
pub mod sections;
pub mod state;
mod serde_utils;

pub use grammar::{Grammar, GrammarError, SectionBuilder};
pub use machine::{LogParser, ParserLimits};
pub use model::{ErrorCode, ParseResult, PolicyViolation};

// Constants
pub const MAX_LINE_SIZE: usize = 1_048_576; // 1MB
