//! Conf module — configuration model and loading.

pub mod model;
pub mod load;

pub use model::{AnalyzerConfig, FetchConfig};
pub use load::ConfigError;
