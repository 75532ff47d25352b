//! Shared data models.

pub mod connection;
pub mod monitor;
pub mod query;
pub mod shipment;

// Re-export commonly used types
pub use connection::{ConnectionProfile, Target};
pub use monitor::{EndpointHealth, HealthSnapshot};
pub use query::{
    Params, QueryRequest, QueryResult, Row, ScriptReport, ScriptRequest, SqlValue,
    StatementRequest, StatementResult,
};
pub use shipment::{
    Courier, CreateShipmentRequest, Item, LineEdit, LineRequest, Shipment, ShipmentDetail,
    ShipmentLine, ShipmentStatus,
};
