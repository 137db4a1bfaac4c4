//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems emit tracing events
//!     → logging.rs (subscriber: env filter, file sink, optional stdout tee)
//!     → ./logs/bore.log
//! ```

pub mod logging;

pub use logging::{init, LogOptions, LoggingError};
