//! `bore`, the relay client.
//!
//! Registers with the bore server, relays framed requests to the local
//! upstream, and runs the inspector surfaces (TUI + web) over the captured
//! traffic.

use std::process;
use std::sync::Arc;

use clap::{ArgAction, Parser};

use bore::inspect::{self, TuiOptions};
use bore::observability::{self, LogOptions};
use bore::{BoreClient, ClientConfig, ClientInfo, TrafficLog};

#[derive(Parser)]
#[command(name = "bore", version, disable_version_flag = true)]
#[command(about = "Expose a local HTTP service through a bore server", long_about = None)]
struct Cli {
    /// Upstream URL to proxy requests to
    #[arg(short = 'u', long = "url")]
    url: Option<String>,

    /// Enable the web inspector
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    inspect: bool,

    /// Port to run the web inspector
    #[arg(long, default_value_t = 8000)]
    inspect_port: u16,

    /// Proxy non-localhost upstreams
    #[arg(long, default_value_t = false)]
    allow_external: bool,

    /// Debug-level logging
    #[arg(short = 'd', long)]
    debug: bool,

    /// Show application version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Some(upstream_url) = cli.url else {
        eprintln!("Upstream URL is required. Use --url or -u to specify it.");
        process::exit(1);
    };

    let config = ClientConfig {
        upstream_url,
        allow_external: cli.allow_external,
        inspect: cli.inspect,
        inspect_port: cli.inspect_port,
        debug: cli.debug,
        ..ClientConfig::default()
    };

    // The TUI owns the terminal, so logs go to the file only.
    let log_options = LogOptions {
        log_file: config.log_file.clone(),
        stdout: false,
        debug: config.debug,
    };
    if let Err(err) = observability::init(&log_options) {
        eprintln!("Failed to initialize logging: {err}");
        process::exit(1);
    }

    let traffic = Arc::new(TrafficLog::new());

    let (client, ready_rx) = match BoreClient::new(config.clone(), traffic.clone()) {
        Ok(parts) => parts,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };

    let mut client_task = tokio::spawn(client.run());

    let info = wait_for_ready(ready_rx, &mut client_task).await;

    let inspector_url = config
        .inspect
        .then(|| format!("http://localhost:{}", config.inspect_port));

    if config.inspect {
        let inspect_traffic = traffic.clone();
        let inspect_port = config.inspect_port;
        tokio::spawn(async move {
            if let Err(err) = inspect::web::serve(inspect_traffic, inspect_port).await {
                tracing::error!(error = %err, "web inspector failed");
            }
        });
    }

    let tui_options = TuiOptions {
        app_url: info.public_url.clone(),
        inspector_url,
    };
    let tui_task = tokio::task::spawn_blocking(move || inspect::tui::run(traffic, tui_options));

    tokio::select! {
        tui_result = tui_task => {
            match tui_result {
                Ok(Ok(())) => process::exit(0),
                Ok(Err(err)) => {
                    eprintln!("failed to run TUI: {err}");
                    process::exit(1);
                }
                Err(err) => {
                    eprintln!("TUI thread panicked: {err}");
                    process::exit(1);
                }
            }
        }
        client_result = &mut client_task => {
            // The tunnel died underneath the inspector.
            ratatui::restore();
            match client_result {
                Ok(Ok(())) => process::exit(0),
                Ok(Err(err)) => {
                    eprintln!("bore client stopped: {err}");
                    process::exit(1);
                }
                Err(err) => {
                    eprintln!("bore client panicked: {err}");
                    process::exit(1);
                }
            }
        }
    }
}

/// Block until registration reports the public URL, or exit when the client
/// dies first.
async fn wait_for_ready(
    mut ready_rx: tokio::sync::watch::Receiver<Option<ClientInfo>>,
    client_task: &mut tokio::task::JoinHandle<Result<(), bore::ClientError>>,
) -> ClientInfo {
    loop {
        if ready_rx.changed().await.is_err() {
            // Sender dropped without signaling: the client failed to start.
            match (&mut *client_task).await {
                Ok(Err(err)) => eprintln!("Failed to start bore client: {err}"),
                Ok(Ok(())) => eprintln!("Failed to start bore client"),
                Err(err) => eprintln!("bore client panicked: {err}"),
            }
            process::exit(1);
        }

        let info = ready_rx.borrow().clone();
        if let Some(info) = info {
            return info;
        }
    }
}
