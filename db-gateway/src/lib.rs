//! Primary/replica statement gateway.
//!
//! [`Gateway`] classifies and routes statements, [`HealthMonitor`] probes
//! both endpoints in the background.

pub mod backend;
pub mod decode;
pub mod gateway;
pub mod health;

pub use backend::{Backend, PgBackend, PROBE_STATEMENT};
pub use gateway::{Execution, Gateway};
pub use health::{HealthMonitor, MonitorHandle, DEFAULT_PROBE_INTERVAL};

/// Gateway over a type-erased backend, as shared by the HTTP layer.
pub type SharedGateway = std::sync::Arc<Gateway<Box<dyn Backend>>>;
