//! Shipment fulfillment workflow.
//!
//! A shipment moves PENDING → PREPARED → COMPLETED and never back. Every
//! step is a sequence of independently committed gateway statements; there
//! is no transaction around a step. In particular a `prepare` that fails on
//! line `k` leaves lines `1..k-1` reserved while the shipment stays PENDING.
//!
//! Reads that decide whether a transition is allowed are pinned to the
//! primary, so replica lag cannot let a stale status through. Status
//! updates also carry the expected current status, so of two concurrent
//! transitions only one moves the shipment.

use std::sync::Arc;

use serde::Deserialize;

use common::errors::{AppError, AppResult};
use common::models::connection::Target;
use common::models::query::StatementRequest;
use common::models::shipment::{
    Courier, Item, LineEdit, LineRequest, Shipment, ShipmentDetail, ShipmentLine, ShipmentStatus,
};
use db_gateway::{Backend, Gateway};

use crate::reservation;

pub(crate) const INSERT_SHIPMENT: &str =
    "INSERT INTO shipments (warehouse_id, status, created_at) VALUES ($1, 'PENDING', NOW()) RETURNING id";

pub(crate) const INSERT_LINE: &str =
    "INSERT INTO shipment_items (shipment_id, item_id, quantity) VALUES ($1, $2, $3)";

pub(crate) const DELETE_LINE: &str =
    "DELETE FROM shipment_items WHERE shipment_id = $1 AND item_id = $2";

pub(crate) const SELECT_SHIPMENT: &str = "SELECT id, warehouse_id, status::text AS status, courier_id, created_at, completed_at \
     FROM shipments WHERE id = $1";

pub(crate) const SELECT_SHIPMENTS: &str = "SELECT id, warehouse_id, status::text AS status, courier_id, created_at, completed_at \
     FROM shipments ORDER BY created_at DESC, id DESC";

pub(crate) const SELECT_SHIPMENTS_BY_STATUS: &str = "SELECT id, warehouse_id, status::text AS status, courier_id, created_at, completed_at \
     FROM shipments WHERE status = $1 ORDER BY created_at DESC, id DESC";

pub(crate) const SELECT_LINES: &str =
    "SELECT shipment_id, item_id, quantity FROM shipment_items WHERE shipment_id = $1";

pub(crate) const MARK_PREPARED: &str =
    "UPDATE shipments SET status = 'PREPARED' WHERE id = $1 AND status = 'PENDING'";

pub(crate) const MARK_COMPLETED: &str = "UPDATE shipments SET courier_id = $1, status = 'COMPLETED', completed_at = NOW() \
     WHERE id = $2 AND status = 'PREPARED'";

/// Couriers eligible for a warehouse's shipments.
pub(crate) const SELECT_COURIERS: &str = "SELECT id, first_name || ' ' || last_name AS name, phone, warehouse_id \
     FROM employees WHERE position = 'courier' AND warehouse_id = $1 ORDER BY id";

/// Items a shipment of the warehouse can be built from.
pub(crate) const SELECT_AVAILABLE_ITEMS: &str = "SELECT id, name, description, barcode, category_id, weight::float8 AS weight, warehouse_id, quantity \
     FROM items WHERE warehouse_id = $1 AND quantity > 0 ORDER BY name";

#[derive(Deserialize)]
struct InsertedId {
    id: i64,
}

/// Shipment operations over a shared gateway.
pub struct ShipmentWorkflow<B> {
    gateway: Arc<Gateway<B>>,
}

impl<B: Backend> ShipmentWorkflow<B> {
    pub fn new(gateway: Arc<Gateway<B>>) -> Self {
        Self { gateway }
    }

    /// Creates a PENDING shipment with the given lines and returns its id.
    ///
    /// Stock is not checked here; it is reserved by [`Self::prepare`].
    pub async fn create(&self, warehouse_id: Option<i64>, lines: &[LineRequest]) -> AppResult<i64> {
        let warehouse_id = warehouse_id
            .ok_or_else(|| AppError::Validation("a source warehouse is required".into()))?;
        if lines.is_empty() {
            return Err(AppError::Validation("at least one item is required".into()));
        }
        if let Some(line) = lines.iter().find(|line| line.quantity <= 0) {
            return Err(AppError::Validation(format!(
                "quantity for item {} must be positive",
                line.item_id
            )));
        }

        let shipment_id = self
            .gateway
            .execute(StatementRequest::new(INSERT_SHIPMENT).bind(warehouse_id).fetch())
            .await?
            .decode_first::<InsertedId>()?
            .map(|row| row.id)
            .ok_or_else(|| AppError::Internal("shipment insert returned no id".into()))?;

        for line in lines {
            self.insert_line(shipment_id, line.item_id, line.quantity)
                .await?;
        }

        tracing::info!(shipment_id, warehouse_id, lines = lines.len(), "shipment created");
        Ok(shipment_id)
    }

    /// Reserves stock for every line and moves the shipment to PREPARED.
    pub async fn prepare(&self, shipment_id: i64) -> AppResult<()> {
        let shipment = self.load(shipment_id, Some(Target::Primary)).await?;
        ensure_status(&shipment, ShipmentStatus::Pending, "prepare")?;

        let lines = self.load_lines(shipment_id, Some(Target::Primary)).await?;
        for line in &lines {
            let reserved = reservation::reserve(&*self.gateway, line.item_id, line.quantity).await?;
            if reserved != 1 {
                tracing::warn!(
                    shipment_id,
                    item_id = line.item_id,
                    requested = line.quantity,
                    "prepare stopped, earlier lines stay reserved"
                );
                return Err(AppError::InsufficientStock {
                    item_id: line.item_id,
                    requested: line.quantity,
                });
            }
        }

        let moved = self
            .gateway
            .execute(StatementRequest::new(MARK_PREPARED).bind(shipment_id))
            .await?
            .into_affected()?;
        if moved != 1 {
            return Err(self.lost_transition(shipment_id, "prepare").await);
        }

        tracing::info!(shipment_id, lines = lines.len(), "shipment prepared");
        Ok(())
    }

    /// Hands a PREPARED shipment to a courier of its warehouse.
    pub async fn complete(&self, shipment_id: i64, courier_id: i64) -> AppResult<()> {
        let shipment = self.load(shipment_id, Some(Target::Primary)).await?;
        ensure_status(&shipment, ShipmentStatus::Prepared, "complete")?;

        let candidates = self
            .couriers_of(shipment.warehouse_id, Some(Target::Primary))
            .await?;
        if !candidates.iter().any(|courier| courier.id == courier_id) {
            return Err(AppError::CourierNotEligible {
                courier_id,
                warehouse_id: shipment.warehouse_id,
            });
        }

        let moved = self
            .gateway
            .execute(
                StatementRequest::new(MARK_COMPLETED)
                    .bind(courier_id)
                    .bind(shipment_id),
            )
            .await?
            .into_affected()?;
        if moved != 1 {
            return Err(self.lost_transition(shipment_id, "complete").await);
        }

        tracing::info!(shipment_id, courier_id, "shipment completed");
        Ok(())
    }

    /// Adds or removes a line of a PENDING shipment. Stock is left alone.
    ///
    /// Returns the number of lines inserted or deleted.
    pub async fn edit_lines(&self, shipment_id: i64, edit: LineEdit) -> AppResult<u64> {
        let shipment = self.load(shipment_id, Some(Target::Primary)).await?;
        if !shipment.status.lines_editable() {
            return Err(AppError::InvalidTransition {
                shipment_id,
                status: shipment.status,
                action: "edit lines of",
            });
        }

        let affected = match edit {
            LineEdit::Add { item_id, quantity } => {
                if quantity <= 0 {
                    return Err(AppError::Validation(format!(
                        "quantity for item {item_id} must be positive"
                    )));
                }
                self.insert_line(shipment_id, item_id, quantity).await?
            }
            LineEdit::Remove { item_id } => self
                .gateway
                .execute(StatementRequest::new(DELETE_LINE).bind(shipment_id).bind(item_id))
                .await?
                .into_affected()?,
        };

        tracing::info!(shipment_id, item_id = edit.item_id(), affected, "shipment lines edited");
        Ok(affected)
    }

    /// A shipment with its lines.
    pub async fn get(&self, shipment_id: i64) -> AppResult<ShipmentDetail> {
        let shipment = self.load(shipment_id, None).await?;
        let lines = self.load_lines(shipment_id, None).await?;
        Ok(ShipmentDetail { shipment, lines })
    }

    /// Shipments, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<ShipmentStatus>) -> AppResult<Vec<Shipment>> {
        let request = match status {
            Some(status) => StatementRequest::new(SELECT_SHIPMENTS_BY_STATUS).bind(status.as_str()),
            None => StatementRequest::new(SELECT_SHIPMENTS),
        };
        self.gateway.execute(request).await?.decode()
    }

    pub async fn lines(&self, shipment_id: i64) -> AppResult<Vec<ShipmentLine>> {
        self.load_lines(shipment_id, None).await
    }

    /// Couriers that may complete the shipment.
    pub async fn available_couriers(&self, shipment_id: i64) -> AppResult<Vec<Courier>> {
        let shipment = self.load(shipment_id, None).await?;
        self.couriers_of(shipment.warehouse_id, None).await
    }

    /// In-stock items of a warehouse.
    pub async fn available_items(&self, warehouse_id: i64) -> AppResult<Vec<Item>> {
        self.gateway
            .execute(StatementRequest::new(SELECT_AVAILABLE_ITEMS).bind(warehouse_id))
            .await?
            .decode()
    }

    async fn load(&self, shipment_id: i64, target: Option<Target>) -> AppResult<Shipment> {
        self.gateway
            .execute(
                StatementRequest::new(SELECT_SHIPMENT)
                    .bind(shipment_id)
                    .with_target(target),
            )
            .await?
            .decode_first()?
            .ok_or(AppError::ShipmentNotFound(shipment_id))
    }

    async fn load_lines(
        &self,
        shipment_id: i64,
        target: Option<Target>,
    ) -> AppResult<Vec<ShipmentLine>> {
        self.gateway
            .execute(
                StatementRequest::new(SELECT_LINES)
                    .bind(shipment_id)
                    .with_target(target),
            )
            .await?
            .decode()
    }

    async fn couriers_of(&self, warehouse_id: i64, target: Option<Target>) -> AppResult<Vec<Courier>> {
        self.gateway
            .execute(
                StatementRequest::new(SELECT_COURIERS)
                    .bind(warehouse_id)
                    .with_target(target),
            )
            .await?
            .decode()
    }

    async fn insert_line(&self, shipment_id: i64, item_id: i64, quantity: i64) -> AppResult<u64> {
        self.gateway
            .execute(
                StatementRequest::new(INSERT_LINE)
                    .bind(shipment_id)
                    .bind(item_id)
                    .bind(quantity),
            )
            .await?
            .into_affected()
    }

    /// Error for a guarded status update that matched no row: someone else
    /// moved the shipment between the check and the update.
    async fn lost_transition(&self, shipment_id: i64, action: &'static str) -> AppError {
        match self.load(shipment_id, Some(Target::Primary)).await {
            Ok(current) => {
                tracing::warn!(shipment_id, status = %current.status, action, "concurrent transition");
                AppError::InvalidTransition {
                    shipment_id,
                    status: current.status,
                    action,
                }
            }
            Err(e) => e,
        }
    }
}

fn ensure_status(shipment: &Shipment, expected: ShipmentStatus, action: &'static str) -> AppResult<()> {
    if shipment.status == expected {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            shipment_id: shipment.id,
            status: shipment.status,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::RESERVE_STOCK;
    use crate::testing::MemoryWarehouse;

    fn line(item_id: i64, quantity: i64) -> LineRequest {
        LineRequest { item_id, quantity }
    }

    fn setup() -> (Arc<MemoryWarehouse>, ShipmentWorkflow<Arc<MemoryWarehouse>>) {
        let store = Arc::new(MemoryWarehouse::new());
        let workflow = ShipmentWorkflow::new(Arc::new(Gateway::new(store.clone())));
        (store, workflow)
    }

    #[tokio::test]
    async fn test_create_inserts_pending_shipment_with_lines() {
        let (store, workflow) = setup();
        let id = workflow
            .create(Some(2), &[line(10, 3), line(11, 1)])
            .await
            .unwrap();

        let detail = workflow.get(id).await.unwrap();
        assert_eq!(detail.shipment.status, ShipmentStatus::Pending);
        assert_eq!(detail.shipment.warehouse_id, 2);
        assert_eq!(detail.shipment.courier_id, None);
        assert_eq!(detail.lines.len(), 2);
        assert_eq!(detail.lines[0].quantity, 3);

        // Creating does not touch stock.
        assert!(store.statements().iter().all(|(_, sql)| sql != RESERVE_STOCK));
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let (store, workflow) = setup();

        for (warehouse, lines) in [
            (None, vec![line(1, 1)]),
            (Some(1), vec![]),
            (Some(1), vec![line(1, 2), line(2, 0)]),
        ] {
            let err = workflow.create(warehouse, &lines).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{err}");
        }
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_reserves_every_line() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        store.add_item(11, 1, 2);
        let id = workflow.create(Some(1), &[line(10, 5), line(11, 2)]).await.unwrap();

        workflow.prepare(id).await.unwrap();

        assert_eq!(store.quantity(10), 0);
        assert_eq!(store.quantity(11), 0);
        assert_eq!(store.status(id), Some(ShipmentStatus::Prepared));
    }

    #[tokio::test]
    async fn test_prepare_keeps_earlier_reservations_on_shortage() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        store.add_item(11, 1, 1);
        let id = workflow.create(Some(1), &[line(10, 3), line(11, 2)]).await.unwrap();

        let err = workflow.prepare(id).await.unwrap_err();
        match err {
            AppError::InsufficientStock { item_id, requested } => {
                assert_eq!(item_id, 11);
                assert_eq!(requested, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(store.quantity(10), 2);
        assert_eq!(store.quantity(11), 1);
        assert_eq!(store.status(id), Some(ShipmentStatus::Pending));
    }

    #[tokio::test]
    async fn test_prepare_requires_pending() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        let id = workflow.create(Some(1), &[line(10, 1)]).await.unwrap();
        workflow.prepare(id).await.unwrap();
        let reservations = store.count(RESERVE_STOCK);

        let err = workflow.prepare(id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                status: ShipmentStatus::Prepared,
                ..
            }
        ));
        assert_eq!(store.quantity(10), 4);
        assert_eq!(store.count(RESERVE_STOCK), reservations);
    }

    #[tokio::test]
    async fn test_prepare_unknown_shipment() {
        let (_, workflow) = setup();
        let err = workflow.prepare(99).await.unwrap_err();
        assert!(matches!(err, AppError::ShipmentNotFound(99)));
    }

    #[tokio::test]
    async fn test_complete_assigns_same_warehouse_courier() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        store.add_courier(100, "Ann Lee", 1);
        store.add_courier(200, "Bo Park", 2);
        let id = workflow.create(Some(1), &[line(10, 1)]).await.unwrap();
        workflow.prepare(id).await.unwrap();

        let err = workflow.complete(id, 200).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::CourierNotEligible {
                courier_id: 200,
                warehouse_id: 1
            }
        ));
        assert_eq!(store.status(id), Some(ShipmentStatus::Prepared));

        workflow.complete(id, 100).await.unwrap();
        let shipment = workflow.get(id).await.unwrap().shipment;
        assert_eq!(shipment.status, ShipmentStatus::Completed);
        assert_eq!(shipment.courier_id, Some(100));
        assert!(shipment.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_complete_requires_prepared() {
        let (store, workflow) = setup();
        store.add_courier(100, "Ann Lee", 1);
        let id = workflow.create(Some(1), &[line(10, 1)]).await.unwrap();

        let err = workflow.complete(id, 100).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                status: ShipmentStatus::Pending,
                action: "complete",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_lines_editable_only_while_pending() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        store.add_courier(100, "Ann Lee", 1);
        let id = workflow.create(Some(1), &[line(10, 1)]).await.unwrap();

        assert_eq!(
            workflow
                .edit_lines(id, LineEdit::Add { item_id: 11, quantity: 4 })
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            workflow
                .edit_lines(id, LineEdit::Remove { item_id: 11 })
                .await
                .unwrap(),
            1
        );
        let err = workflow
            .edit_lines(id, LineEdit::Add { item_id: 11, quantity: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        workflow.prepare(id).await.unwrap();
        for edit in [
            LineEdit::Add { item_id: 12, quantity: 1 },
            LineEdit::Remove { item_id: 10 },
        ] {
            let err = workflow.edit_lines(id, edit).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidTransition { .. }), "{err}");
        }

        workflow.complete(id, 100).await.unwrap();
        let err = workflow
            .edit_lines(id, LineEdit::Remove { item_id: 10 })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                status: ShipmentStatus::Completed,
                ..
            }
        ));
        assert_eq!(workflow.lines(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_removing_a_line_leaves_stock_alone() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        let id = workflow.create(Some(1), &[line(10, 2)]).await.unwrap();

        workflow
            .edit_lines(id, LineEdit::Remove { item_id: 10 })
            .await
            .unwrap();
        assert_eq!(store.quantity(10), 5);
        assert!(workflow.lines(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lost_race_is_invalid_transition() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        let id = workflow.create(Some(1), &[line(10, 1)]).await.unwrap();
        // Another client prepares the shipment between our check and update.
        store.move_before(MARK_PREPARED, id, ShipmentStatus::Prepared);

        let err = workflow.prepare(id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                status: ShipmentStatus::Prepared,
                action: "prepare",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_gating_reads_use_primary_and_browsing_uses_replica() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        let id = workflow.create(Some(1), &[line(10, 1)]).await.unwrap();

        workflow.get(id).await.unwrap();
        workflow.prepare(id).await.unwrap();

        let statements = store.statements();
        let targets_of = |sql: &str| -> Vec<Target> {
            statements
                .iter()
                .filter(|(_, s)| s == sql)
                .map(|(t, _)| *t)
                .collect()
        };
        // get() then prepare()
        assert_eq!(targets_of(SELECT_SHIPMENT), vec![Target::Replica, Target::Primary]);
        assert_eq!(targets_of(SELECT_LINES), vec![Target::Replica, Target::Primary]);
        assert_eq!(targets_of(INSERT_SHIPMENT), vec![Target::Primary]);
        assert_eq!(targets_of(MARK_PREPARED), vec![Target::Primary]);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        let first = workflow.create(Some(1), &[line(10, 1)]).await.unwrap();
        let second = workflow.create(Some(1), &[line(10, 1)]).await.unwrap();
        workflow.prepare(second).await.unwrap();

        let all: Vec<i64> = workflow.list(None).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(all, vec![second, first]);

        let pending = workflow.list(Some(ShipmentStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first);
    }

    #[tokio::test]
    async fn test_available_reads() {
        let (store, workflow) = setup();
        store.add_item(10, 1, 5);
        store.add_item(11, 1, 0);
        store.add_item(12, 2, 9);
        store.add_courier(100, "Ann Lee", 1);
        store.add_courier(200, "Bo Park", 2);
        let id = workflow.create(Some(1), &[line(10, 1)]).await.unwrap();

        let items: Vec<i64> = workflow
            .available_items(1)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(items, vec![10]);

        let couriers = workflow.available_couriers(id).await.unwrap();
        assert_eq!(couriers.len(), 1);
        assert_eq!(couriers[0].name, "Ann Lee");
    }
}
