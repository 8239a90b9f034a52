//! logscreen CLI
//!
//! # Usage
//!
//! ```bash
//! logscreen analyze RPCS3.log
//! logscreen analyze https://cdn.example/attachments/RPCS3.log.gz --pretty
//! logscreen terms add "some banned title"
//! logscreen terms list
//! ```

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use tracing::info;

use logscreen::filter::TermId;
use logscreen::runtime::{boot, stop};
use logscreen::source::Attachment;

#[derive(Parser)]
#[command(name = "logscreen")]
#[command(version)]
#[command(about = "Streaming emulator log analyzer with banned-content screening", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more log attachments (paths or URLs)
    Analyze {
        #[arg(required = true)]
        sources: Vec<String>,
        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
        /// Print analyzer counters after all results
        #[arg(long)]
        metrics: bool,
    },
    /// Manage banned terms
    Terms {
        #[command(subcommand)]
        action: TermCommands,
    },
}

#[derive(Subcommand)]
enum TermCommands {
    /// List all banned terms
    List,
    /// Add a banned term
    Add { text: String },
    /// Remove a banned term by id
    Remove { id: TermId },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    boot::init_logging();

    match cli.command {
        Commands::Analyze { sources, pretty, metrics } => analyze(sources, pretty, metrics).await,
        Commands::Terms { action } => terms(action),
    }
}

async fn analyze(sources: Vec<String>, pretty: bool, metrics: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (analyzer, _admin, _config) = boot::boot().await?;
    let analyzer = Arc::new(analyzer);
    let cancel = stop::cancel_on_shutdown();

    let runs = sources.into_iter().map(|source| {
        let analyzer = Arc::clone(&analyzer);
        let cancel = cancel.clone();
        async move {
            let attachment = describe(source).await;
            analyzer.analyze_with_cancel(attachment, cancel).await
        }
    });

    let mut failed = false;
    for result in join_all(runs).await {
        failed |= !result.is_success();
        let json = if pretty {
            serde_json::to_string_pretty(&result)?
        } else {
            serde_json::to_string(&result)?
        };
        println!("{}", json);
        if !result.is_success() {
            eprintln!("{}", result.user_message());
        }
    }

    if metrics {
        println!("{}", serde_json::to_string_pretty(&analyzer.metrics().snapshot())?);
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Build an attachment descriptor, filling in the size of local files.
async fn describe(source: String) -> Attachment {
    let mut attachment = Attachment::from_path(source);
    if !attachment.is_remote() {
        let path = attachment.url.strip_prefix("file://").unwrap_or(&attachment.url);
        if let Ok(meta) = tokio::fs::metadata(path).await {
            attachment.size = Some(meta.len());
        }
    }
    attachment
}

fn terms(action: TermCommands) -> Result<(), Box<dyn std::error::Error>> {
    let (admin, _config) = boot::load_admin()?;

    match action {
        TermCommands::List => {
            for term in admin.list_terms() {
                println!("{}\t{}", term.id, term.text);
            }
        }
        TermCommands::Add { text } => {
            if admin.add_term(&text)? {
                info!("Added banned term");
                println!("added");
            } else {
                println!("already present");
            }
        }
        TermCommands::Remove { id } => {
            if admin.remove_term(id)? {
                println!("removed {}", id);
            } else {
                println!("no term with id {}", id);
            }
        }
    }
    Ok(())
}
