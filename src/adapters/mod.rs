//! Adapters Layer
//!
//! Inbound adapters drive the application (HTTP API); outbound adapters
//! implement the domain ports (SQLite, caches, metrics, remote transport).

pub mod inbound;
pub mod outbound;
