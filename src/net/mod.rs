//! Network plumbing shared by the relay server and the web inspector.

pub mod bind;

pub use bind::{bind_with_fallback, BIND_ATTEMPTS};
