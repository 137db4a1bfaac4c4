//! In-memory traffic capture.
//!
//! # Data Flow
//! ```text
//! relay client message loop
//!     → log.rs (store request, then response + duration, keyed by request id)
//!     → filter.rs (parse `field:opvalue` queries, evaluate per entry)
//!     → inspector surfaces (TUI table, web JSON API) read snapshots
//! ```

pub mod filter;
pub mod log;

pub use filter::{format_query, parse_query, Filter, FilterError, FilterField, FilterOp};
pub use log::{LogEntry, LoggedRequest, LoggedResponse, TrafficLog};
