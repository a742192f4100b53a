//! Connection management.
//!
//! Centralizes connector lifecycle for all configured sources.

pub mod manager;

pub use manager::ConnectorManager;
