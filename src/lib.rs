//! bore: a reverse HTTP tunnel.
//!
//! A publicly reachable **server** exposes local HTTP services to the
//! internet by funneling external requests through a persistent websocket
//! held open by a **client** running next to each service.
//!
//! # Architecture Overview
//!
//! ```text
//!              ┌───────────────────── bore-server ─────────────────────┐
//!              │                                                        │
//!  external    │  ┌─────────┐   ┌──────────┐   ┌─────────────────────┐ │
//!  caller ─────┼─▶│  relay  │──▶│ registry │──▶│ session (websocket) │─┼─┐
//!  GET https://│  │  plane  │   │ app id → │   │ writer / reader /   │ │ │
//!  <app>.<dom> │  └────┬────┘   │ session  │   │ keepalive workers   │ │ │
//!              │       │        └──────────┘   └─────────────────────┘ │ │
//!              │       ▼                                  ▲            │ │ ws
//!              │  ┌───────────┐    response frame         │            │ │
//!  response ◀──┼──│ pending   │◀──────────────────────────┘            │ │
//!              │  │ one-shots │  (correlated by message id)            │ │
//!              │  └───────────┘                                        │ │
//!              └────────────────────────────────────────────────────────┘ │
//!                                                                         │
//!              ┌──────────────────────── bore ─────────────────────────┐  │
//!              │  ┌──────────────┐   ┌──────────┐   ┌───────────────┐  │  │
//!  local       │  │ message loop │◀──│  codec   │◀──│ /register ws  │◀─┼──┘
//!  service ◀───┼──│ + upstream   │   └──────────┘   └───────────────┘  │
//!              │  │ HTTP call    │──▶ traffic log ──▶ TUI + web API    │
//!              │  └──────────────┘                                     │
//!              └───────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod client;
pub mod codec;
pub mod server;
pub mod traffic;

// Cross-cutting concerns
pub mod config;
pub mod inspect;
pub mod net;
pub mod observability;

pub use client::{BoreClient, ClientError, ClientInfo};
pub use config::{ClientConfig, ServerConfig};
pub use server::BoreServer;
pub use traffic::TrafficLog;
