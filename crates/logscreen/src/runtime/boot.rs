//! Boot — logging init, config load, term store, analyzer creation.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::analyzer::LogAnalyzer;
use crate::conf::AnalyzerConfig;
use crate::filter::{FilterAdmin, JsonTermStore};

/// Initialise the tracing / logging subsystem.
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logscreen=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load config and the persisted banned-term list.
pub fn load_admin() -> Result<(FilterAdmin, AnalyzerConfig), Box<dyn std::error::Error>> {
    let config = AnalyzerConfig::load()?;
    info!(
        "Loaded configuration: log_size_limit={} bytes, parse_timeout={}s, max_concurrent_parses={}",
        config.log_size_limit, config.parse_timeout_secs, config.max_concurrent_parses
    );

    let store = Arc::new(JsonTermStore::new(&config.term_store_path));
    let admin = FilterAdmin::load(store, config.min_term_length).map_err(|e| {
        error!("Failed to load banned terms from {}: {}", config.term_store_path, e);
        e
    })?;
    info!("Loaded {} banned terms", admin.filter().len());

    Ok((admin, config))
}

/// Load config and terms, then build the analyzer around the shared filter.
///
/// Returns `(LogAnalyzer, FilterAdmin, AnalyzerConfig)` on success.
pub async fn boot() -> Result<(LogAnalyzer, FilterAdmin, AnalyzerConfig), Box<dyn std::error::Error>> {
    info!("Starting logscreen v{}", env!("CARGO_PKG_VERSION"));

    let (admin, config) = load_admin()?;

    let analyzer = LogAnalyzer::with_defaults(&config, admin.filter()).map_err(|e| {
        error!("Failed to build log grammar: {}", e);
        e
    })?;
    info!("Registered source handlers: {:?}", analyzer.registry().names());

    Ok((analyzer, admin, config))
}
