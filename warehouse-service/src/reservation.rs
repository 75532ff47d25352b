//! Inventory reservation.
//!
//! A reservation is one conditional decrement. The availability check and
//! the decrement happen in the same statement, so two concurrent
//! reservations can never drive an item's quantity below zero.

use common::errors::{AppError, AppResult};
use common::models::query::StatementRequest;
use db_gateway::{Backend, Gateway};

/// Decrements stock only when enough is on hand.
pub(crate) const RESERVE_STOCK: &str =
    "UPDATE items SET quantity = quantity - $1 WHERE id = $2 AND quantity >= $1";

/// Reserves `quantity` units of `item_id`.
///
/// Returns the affected-row count: `1` when reserved, `0` when stock was
/// insufficient or the item does not exist. A `0` is not an error here; it
/// is up to the caller to decide. Never retried.
pub async fn reserve<B: Backend>(
    gateway: &Gateway<B>,
    item_id: i64,
    quantity: i64,
) -> AppResult<u64> {
    if quantity <= 0 {
        return Err(AppError::Validation(format!(
            "reservation quantity must be positive, got {quantity}"
        )));
    }

    let affected = gateway
        .execute(StatementRequest::new(RESERVE_STOCK).bind(quantity).bind(item_id))
        .await?
        .into_affected()?;

    if affected == 1 {
        tracing::debug!(item_id, quantity, "stock reserved");
    } else {
        tracing::info!(item_id, quantity, "not enough stock to reserve");
    }
    Ok(affected)
}
