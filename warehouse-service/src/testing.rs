//! In-memory warehouse backend for tests.
//!
//! Interprets exactly the statements the workflow and reservation modules
//! issue and records every statement with the endpoint it was routed to.
//! Primary and replica share one store, so there is no replication lag.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use common::errors::{AppError, AppResult};
use common::models::connection::Target;
use common::models::query::{Row, SqlValue, StatementResult};
use common::models::shipment::{Courier, Item, Shipment, ShipmentLine, ShipmentStatus};
use db_gateway::Backend;

use crate::reservation::RESERVE_STOCK;
use crate::workflow::{
    DELETE_LINE, INSERT_LINE, INSERT_SHIPMENT, MARK_COMPLETED, MARK_PREPARED,
    SELECT_AVAILABLE_ITEMS, SELECT_COURIERS, SELECT_LINES, SELECT_SHIPMENT, SELECT_SHIPMENTS,
    SELECT_SHIPMENTS_BY_STATUS,
};

#[derive(Default)]
struct Store {
    items: BTreeMap<i64, Item>,
    couriers: Vec<Courier>,
    shipments: BTreeMap<i64, Shipment>,
    lines: Vec<ShipmentLine>,
    next_shipment_id: i64,
    /// Status forced onto a shipment right before the named statement runs.
    interference: Option<(&'static str, i64, ShipmentStatus)>,
}

#[derive(Default)]
pub struct MemoryWarehouse {
    store: Mutex<Store>,
    statements: Mutex<Vec<(Target, String)>>,
    down: Vec<Target>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// A warehouse whose listed endpoints refuse every connection.
    pub fn with_down(down: Vec<Target>) -> Self {
        Self {
            down,
            ..Self::default()
        }
    }

    pub fn add_item(&self, id: i64, warehouse_id: i64, quantity: i64) {
        self.store.lock().unwrap().items.insert(
            id,
            Item {
                id,
                name: format!("item-{id}"),
                description: None,
                barcode: None,
                category_id: None,
                weight: None,
                warehouse_id,
                quantity,
            },
        );
    }

    pub fn add_courier(&self, id: i64, name: &str, warehouse_id: i64) {
        self.store.lock().unwrap().couriers.push(Courier {
            id,
            name: name.to_string(),
            phone: None,
            warehouse_id,
        });
    }

    pub fn quantity(&self, item_id: i64) -> i64 {
        self.store.lock().unwrap().items[&item_id].quantity
    }

    pub fn status(&self, shipment_id: i64) -> Option<ShipmentStatus> {
        self.store
            .lock()
            .unwrap()
            .shipments
            .get(&shipment_id)
            .map(|s| s.status)
    }

    /// Simulates another client moving the shipment just before `statement`.
    pub fn move_before(&self, statement: &'static str, shipment_id: i64, status: ShipmentStatus) {
        self.store.lock().unwrap().interference = Some((statement, shipment_id, status));
    }

    pub fn statements(&self) -> Vec<(Target, String)> {
        self.statements.lock().unwrap().clone()
    }

    pub fn count(&self, sql: &str) -> usize {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s == sql)
            .count()
    }
}

fn int(params: &[SqlValue], idx: usize) -> AppResult<i64> {
    match params.get(idx) {
        Some(SqlValue::Int(v)) => Ok(*v),
        other => Err(AppError::DatabaseQuery(format!(
            "parameter ${} is not an integer: {other:?}",
            idx + 1
        ))),
    }
}

fn text(params: &[SqlValue], idx: usize) -> AppResult<String> {
    match params.get(idx) {
        Some(SqlValue::Text(v)) => Ok(v.clone()),
        other => Err(AppError::DatabaseQuery(format!(
            "parameter ${} is not text: {other:?}",
            idx + 1
        ))),
    }
}

fn to_rows<'a, T: Serialize + 'a>(values: impl IntoIterator<Item = &'a T>) -> StatementResult {
    let rows = values
        .into_iter()
        .filter_map(|value| match serde_json::to_value(value) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect::<Vec<Row>>();
    StatementResult::Rows(rows)
}

fn set_status(store: &mut Store, id: i64, from: ShipmentStatus, to: ShipmentStatus) -> Option<&mut Shipment> {
    store
        .shipments
        .get_mut(&id)
        .filter(|s| s.status == from)
        .map(|s| {
            s.status = to;
            s
        })
}

#[async_trait]
impl Backend for MemoryWarehouse {
    async fn run(
        &self,
        target: Target,
        sql: &str,
        params: &[SqlValue],
        _want_rows: bool,
    ) -> AppResult<StatementResult> {
        if self.down.contains(&target) {
            return Err(AppError::DatabaseConnection(format!("{target}: refused")));
        }
        self.statements
            .lock()
            .unwrap()
            .push((target, sql.to_string()));

        let mut store = self.store.lock().unwrap();
        if let Some((statement, id, status)) = store.interference {
            if statement == sql {
                if let Some(shipment) = store.shipments.get_mut(&id) {
                    shipment.status = status;
                }
                store.interference = None;
            }
        }

        let result = match sql {
            RESERVE_STOCK => {
                let (quantity, id) = (int(params, 0)?, int(params, 1)?);
                match store.items.get_mut(&id) {
                    Some(item) if item.quantity >= quantity => {
                        item.quantity -= quantity;
                        StatementResult::Affected(1)
                    }
                    _ => StatementResult::Affected(0),
                }
            }
            INSERT_SHIPMENT => {
                store.next_shipment_id += 1;
                let id = store.next_shipment_id;
                let shipment = Shipment {
                    id,
                    warehouse_id: int(params, 0)?,
                    status: ShipmentStatus::Pending,
                    courier_id: None,
                    created_at: Some(Utc::now()),
                    completed_at: None,
                };
                store.shipments.insert(id, shipment);
                let mut row = Row::new();
                row.insert("id".into(), id.into());
                StatementResult::Rows(vec![row])
            }
            INSERT_LINE => {
                store.lines.push(ShipmentLine {
                    shipment_id: int(params, 0)?,
                    item_id: int(params, 1)?,
                    quantity: int(params, 2)?,
                });
                StatementResult::Affected(1)
            }
            DELETE_LINE => {
                let (shipment_id, item_id) = (int(params, 0)?, int(params, 1)?);
                let before = store.lines.len();
                store
                    .lines
                    .retain(|l| !(l.shipment_id == shipment_id && l.item_id == item_id));
                StatementResult::Affected((before - store.lines.len()) as u64)
            }
            SELECT_SHIPMENT => to_rows(store.shipments.get(&int(params, 0)?)),
            SELECT_SHIPMENTS => to_rows(store.shipments.values().rev()),
            SELECT_SHIPMENTS_BY_STATUS => {
                let status = text(params, 0)?;
                to_rows(
                    store
                        .shipments
                        .values()
                        .rev()
                        .filter(|s| s.status.as_str() == status),
                )
            }
            SELECT_LINES => {
                let shipment_id = int(params, 0)?;
                to_rows(store.lines.iter().filter(|l| l.shipment_id == shipment_id))
            }
            MARK_PREPARED => {
                let id = int(params, 0)?;
                let moved = set_status(&mut store, id, ShipmentStatus::Pending, ShipmentStatus::Prepared);
                StatementResult::Affected(u64::from(moved.is_some()))
            }
            MARK_COMPLETED => {
                let (courier_id, id) = (int(params, 0)?, int(params, 1)?);
                let moved = set_status(&mut store, id, ShipmentStatus::Prepared, ShipmentStatus::Completed)
                    .map(|s| {
                        s.courier_id = Some(courier_id);
                        s.completed_at = Some(Utc::now());
                    });
                StatementResult::Affected(u64::from(moved.is_some()))
            }
            SELECT_COURIERS => {
                let warehouse_id = int(params, 0)?;
                to_rows(store.couriers.iter().filter(|c| c.warehouse_id == warehouse_id))
            }
            SELECT_AVAILABLE_ITEMS => {
                let warehouse_id = int(params, 0)?;
                let mut items: Vec<&Item> = store
                    .items
                    .values()
                    .filter(|i| i.warehouse_id == warehouse_id && i.quantity > 0)
                    .collect();
                items.sort_by(|a, b| a.name.cmp(&b.name));
                to_rows(items)
            }
            other => {
                return Err(AppError::DatabaseQuery(format!(
                    "syntax error at or near \"{}\"",
                    other.split_whitespace().next().unwrap_or_default()
                )))
            }
        };
        Ok(result)
    }

    async fn ping(&self, target: Target) -> AppResult<()> {
        if self.down.contains(&target) {
            Err(AppError::DatabaseConnection(format!("{target}: refused")))
        } else {
            Ok(())
        }
    }
}
