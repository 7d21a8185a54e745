//! WebSocket game server for the rummy session engine.
//!
//! The binary wires configuration, stores and the table manager together;
//! this library exposes the router and helpers so they can be driven from
//! integration tests.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
