//! Inspector surfaces: read-only views over the traffic log.
//!
//! # Data Flow
//! ```text
//! traffic log snapshots
//!     → web.rs (JSON API + static page on the inspect port)
//!     → tui.rs (1 Hz table with filter entry and a details pane)
//! ```

pub mod tui;
pub mod web;

pub use tui::TuiOptions;
