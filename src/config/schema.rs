//! Configuration schema definitions.
//!
//! Runtime configuration for both binaries. Values come from CLI flags; the
//! structs carry the defaults and derive Serde so deployments can embed them
//! in config files later without reshaping anything.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Relay server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// First port to try; binding walks forward on conflicts.
    pub port: u16,

    /// Structured log destination.
    pub log_file: PathBuf,

    /// Upper bound on one proxied request's round trip, in seconds. A
    /// downstream that never answers costs the caller at most this long.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            log_file: PathBuf::from("./logs/bore.log"),
            request_timeout_secs: 30,
        }
    }
}

/// Relay client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local service to expose, e.g. `http://localhost:3000`.
    pub upstream_url: String,

    /// Relay server host (with port when non-standard). Baked in at build
    /// time for release binaries, overridable for development.
    pub server_host: String,

    /// `ws` for plain connections, `wss` behind TLS termination.
    pub ws_scheme: String,

    /// Permit upstreams that do not resolve to the local machine.
    pub allow_external: bool,

    /// Serve the web inspector.
    pub inspect: bool,

    /// First port to try for the web inspector.
    pub inspect_port: u16,

    /// Structured log destination. The client never logs to stdout; the
    /// TUI owns the terminal.
    pub log_file: PathBuf,

    /// Debug-level logging.
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            upstream_url: String::new(),
            server_host: option_env!("BORE_SERVER_HOST").unwrap_or("localhost:8080").to_string(),
            ws_scheme: option_env!("BORE_WS_SCHEME").unwrap_or("ws").to_string(),
            allow_external: false,
            inspect: true,
            inspect_port: 8000,
            log_file: PathBuf::from("./logs/bore.log"),
            debug: false,
        }
    }
}
