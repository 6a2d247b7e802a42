//! facnet-worker library target.
//!
//! Exposes the health router and state for integration tests; the binary
//! `main.rs` depends on this library target.

pub mod routes;
pub mod state;
