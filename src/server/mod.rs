//! Relay server subsystem.
//!
//! # Data Flow
//! ```text
//! external caller
//!     → relay.rs proxy plane (frame request, register one-shot)
//!     → session.rs from_upstream queue → websocket → downstream client
//!     ← websocket ← session.rs from_downstream queue
//!     → relay.rs correlator (one-shot keyed by message id)
//!     → external caller
//!
//! downstream client → GET /register → registry.rs (app id) → session.rs
//! ```

pub mod pending;
pub mod registry;
pub mod relay;
pub mod session;

pub use pending::PendingRequests;
pub use registry::{AppRegistry, RegistryError};
pub use relay::{router, serve, BoreServer, RelayState, APP_ID_HEADER};
pub use session::{AppSession, SessionError};
