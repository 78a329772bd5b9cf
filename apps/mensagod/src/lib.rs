//! mensagod — the Mensago server daemon
//!
//! Library surface for the binary and its integration tests: config,
//! shared state, the per-connection session loop, command handlers, and
//! the delivery pipeline.

pub mod config;
pub mod delivery;
pub mod handlers;
pub mod resolver;
pub mod session;
pub mod setup;
pub mod state;
