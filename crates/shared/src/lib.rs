//! Shared building blocks for the ledgerlens services.
//!
//! Caches, the history data model, the error taxonomy, collaborator traits and the concrete
//! Postgres/Etherscan collaborators used by the API binary and the hot-cache refresh engine.

pub mod cache;
pub mod chains;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod etherscan;
pub mod explorer;
pub mod filters;
pub mod models;
pub mod sources;
pub mod stats;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
