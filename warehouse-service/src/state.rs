//! Application state for warehouse service.

use tokio::sync::watch;

use common::config::AppConfig;
use common::models::monitor::HealthSnapshot;
use db_gateway::{Backend, SharedGateway};

use crate::workflow::ShipmentWorkflow;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// The single gateway every request goes through.
    pub gateway: SharedGateway,
    /// Latest endpoint probe results from the health monitor.
    pub health: watch::Receiver<HealthSnapshot>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        config: AppConfig,
        gateway: SharedGateway,
        health: watch::Receiver<HealthSnapshot>,
    ) -> Self {
        Self {
            config,
            gateway,
            health,
        }
    }

    pub fn workflow(&self) -> ShipmentWorkflow<Box<dyn Backend>> {
        ShipmentWorkflow::new(self.gateway.clone())
    }
}
