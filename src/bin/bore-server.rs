//! `bore-server`, the public relay.
//!
//! Binds the configured port (walking forward on conflicts), accepts
//! downstream registrations on `/register`, and proxies every other request
//! through the matching tunnel.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};

use bore::observability::{self, LogOptions};
use bore::{BoreServer, ServerConfig};

#[derive(Parser)]
#[command(name = "bore-server", version, disable_version_flag = true)]
#[command(about = "Public relay for bore tunnels", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short = 'p', long, default_value_t = 8080)]
    port: u16,

    /// Structured log destination
    #[arg(short = 'l', long, default_value = "./logs/bore.log")]
    log_file: PathBuf,

    /// Show application version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_options = LogOptions {
        log_file: cli.log_file.clone(),
        stdout: true,
        debug: false,
    };
    if let Err(err) = observability::init(&log_options) {
        eprintln!("Failed to initialize logging: {err}");
        process::exit(1);
    }

    let config = ServerConfig {
        port: cli.port,
        log_file: cli.log_file,
        ..ServerConfig::default()
    };

    tracing::info!(
        port = config.port,
        log_file = %config.log_file.display(),
        "bore-server starting"
    );

    let server = BoreServer::new(config);
    if let Err(err) = server.run().await {
        tracing::error!(error = %err, "bore-server failed");
        eprintln!("Failed to start bore server: {err}");
        process::exit(1);
    }
}
