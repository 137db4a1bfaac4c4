//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags (clap)
//!     → schema.rs (typed config structs with defaults)
//!     → consumed by server/client startup
//! ```

pub mod schema;

pub use schema::{ClientConfig, ServerConfig};
