//! Domain-level building blocks shared across the monitor and bot crates.
//!
//! Holds the ledger model (networks, addresses, mosaics, blocks), the
//! process-wide divisibility cache, environment configuration and the
//! storage contracts the bot persists registrations through.

pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use config::*;
pub use model::*;
pub use services::*;
pub use storage::*;
