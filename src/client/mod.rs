//! Relay client subsystem.
//!
//! # Data Flow
//! ```text
//! bore server websocket
//!     → relay.rs message loop (decode request frame)
//!     → upstream.rs (HTTP call to the local service)
//!     → traffic log (request, then response + duration)
//!     → relay.rs (encode response frame, write under the sink mutex)
//!     → bore server websocket
//! ```

pub mod relay;
pub mod upstream;

pub use relay::{public_url, BoreClient, ClientError, ClientInfo};
