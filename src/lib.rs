//! safe-sql-gateway - SQL execution gateway for tool-calling agents.
//!
//! Classifies statements before they reach a database, bounds execution
//! time, and stages result rows out-of-band so they never enter the
//! response channel.

pub mod cli;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod response;
pub mod safety;
pub mod staging;
pub mod tools;
