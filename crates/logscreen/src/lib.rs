// Domain-driven module structure for logscreen.

// Core infrastructure
pub mod conf;
pub mod filter;
pub mod source;
pub mod parser;

// Orchestration
pub mod analyzer;
pub mod runtime;
