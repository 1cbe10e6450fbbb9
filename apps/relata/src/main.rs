//! # Relata
//!
//! Command line front end for the relata-core relation engine.
//!
//! ## Usage
//!
//! ```bash
//! relata init
//! relata add ct --uid ct-1 --kind image -p DICOM.0008.0018=ct-1
//! relata add seg --uid seg-1
//! relata connect -r image:segmentation seg ct
//! relata types -r image:segmentation seg ct
//! relata disconnect -r image:segmentation seg ct --layer id
//! ```

use clap::Parser;
use relata::cli::{self, Cli};
use relata::config::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // RELATA_LOG_FORMAT=json enables machine-parseable output.
    let env_format = std::env::var("RELATA_LOG_FORMAT").ok();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "relata=info,relata_core=info".into());

    // Logs go to stderr so stdout stays parseable in --json mode.
    match config.resolve_log_format(env_format.as_deref()) {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli, &config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
