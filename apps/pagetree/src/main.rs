//! # pagetree - Page Tree Server
//!
//! The main binary for the pagetree engine.
//!
//! This application provides:
//! - HTTP JSON API server (axum-based)
//! - CLI interface for tree operations
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │              apps/pagetree (THE BINARY)           │
//! │                                                   │
//! │   ┌─────────────┐          ┌─────────────┐        │
//! │   │    CLI      │          │  HTTP API   │        │
//! │   │   (clap)    │          │   (axum)    │        │
//! │   └──────┬──────┘          └──────┬──────┘        │
//! │          └───────────┬────────────┘               │
//! │                      ▼                            │
//! │              ┌───────────────┐                    │
//! │              │ pagetree-core │                    │
//! │              │ (THE ENGINE)  │                    │
//! │              └───────────────┘                    │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Create a database with the home page and trash can
//! pagetree init
//!
//! # Start the HTTP server
//! pagetree server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! pagetree insert --parent 0 --slug news
//! pagetree move --node 2 --target 1 --position inside
//! pagetree find --path /news --ancestors all
//! ```

use clap::Parser;
use pagetree::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // PAGETREE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("PAGETREE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "pagetree=debug,pagetree_core=debug,tower_http=debug"
    } else {
        "pagetree=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  pagetree v{}
  materialized-path page tree
"#,
        env!("CARGO_PKG_VERSION")
    );
}
