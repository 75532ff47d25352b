//! Shared building blocks for the stockroute workspace.
//!
//! Holds the error taxonomy, startup configuration, data models, the JSON
//! response envelope, HTTP middleware and the statement helpers the gateway
//! relies on.

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
