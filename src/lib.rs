//! L.E.A.F server library
//!
//! Peer-to-peer book lending: a shared catalog, borrow requests negotiated between
//! readers, social features and a points economy with achievements, ranks and a
//! power-up store, served as a JSON REST API.

pub mod api;
pub mod auth;
pub mod core;
pub mod db;

// Re-export commonly used types
pub use crate::core::{Config, LeafError};
pub use api::ApiServer;
pub use db::DatabaseManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
