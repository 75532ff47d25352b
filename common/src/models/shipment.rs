//! Shipment fulfillment models.
//!
//! Row shapes of `shipments`, `shipment_items`, `items` and `employees`, plus
//! the request bodies of the shipment endpoints.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Shipment lifecycle. Moves only forward: PENDING, PREPARED, COMPLETED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    /// Created; lines may still change, no stock reserved.
    Pending,
    /// Every line's stock has been reserved.
    Prepared,
    /// Handed to a courier. Terminal.
    Completed,
}

impl ShipmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::Prepared => "PREPARED",
            ShipmentStatus::Completed => "COMPLETED",
        }
    }

    /// Whether lines may be added or removed.
    pub fn lines_editable(self) -> bool {
        self == ShipmentStatus::Pending
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ShipmentStatus::Pending),
            "PREPARED" => Ok(ShipmentStatus::Prepared),
            "COMPLETED" => Ok(ShipmentStatus::Completed),
            other => Err(format!("unknown shipment status: {other}")),
        }
    }
}

/// A row of `shipments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Shipment {
    pub id: i64,
    pub warehouse_id: i64,
    pub status: ShipmentStatus,
    /// Set on completion.
    #[serde(default)]
    pub courier_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Set on completion.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A row of `shipment_items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ShipmentLine {
    pub shipment_id: i64,
    pub item_id: i64,
    /// Requested quantity, always positive.
    pub quantity: i64,
}

/// A shipment together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShipmentDetail {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub lines: Vec<ShipmentLine>,
}

/// A row of `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Item {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub weight: Option<f64>,
    pub warehouse_id: i64,
    /// Stock on hand; never negative.
    pub quantity: i64,
}

/// An employee whose position is `courier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Courier {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub warehouse_id: i64,
}

/// One requested item of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct LineRequest {
    pub item_id: i64,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i64,
}

/// Request body for creating a shipment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateShipmentRequest {
    /// Source warehouse.
    pub warehouse_id: Option<i64>,
    #[validate(length(min = 1, message = "At least one item is required"), nested)]
    pub lines: Vec<LineRequest>,
}

/// Request body for completing a shipment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct CompleteShipmentRequest {
    pub courier_id: i64,
}

/// Query string for listing shipments.
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
pub struct ListShipmentsQuery {
    pub status: Option<ShipmentStatus>,
}

/// A change to a pending shipment's lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEdit {
    Add { item_id: i64, quantity: i64 },
    Remove { item_id: i64 },
}

impl LineEdit {
    pub fn item_id(&self) -> i64 {
        match self {
            LineEdit::Add { item_id, .. } | LineEdit::Remove { item_id } => *item_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(ShipmentStatus::Prepared).unwrap(),
            json!("PREPARED")
        );
        assert_eq!("completed".parse::<ShipmentStatus>(), Ok(ShipmentStatus::Completed));
        assert!(ShipmentStatus::Pending.lines_editable());
        assert!(!ShipmentStatus::Prepared.lines_editable());
    }

    #[test]
    fn test_create_request_requires_lines() {
        let req = CreateShipmentRequest {
            warehouse_id: Some(1),
            lines: vec![],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_rejects_zero_quantity() {
        let req = CreateShipmentRequest {
            warehouse_id: Some(1),
            lines: vec![LineRequest {
                item_id: 3,
                quantity: 0,
            }],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_shipment_row_decodes_with_nulls() {
        let shipment: Shipment = serde_json::from_value(json!({
            "id": 1,
            "warehouse_id": 2,
            "status": "PENDING",
            "courier_id": null,
            "created_at": "2024-05-01T10:00:00+00:00",
            "completed_at": null,
        }))
        .unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Pending);
        assert!(shipment.courier_id.is_none());
        assert!(shipment.created_at.is_some());
    }
}
