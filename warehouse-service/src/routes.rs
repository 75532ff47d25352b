//! 路由模块

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/query", post(handlers::execute_query))
        .route("/api/scripts", post(handlers::run_script))
        .route("/api/connections/status", get(handlers::connection_status))
        .route("/api/connections/{target}/test", get(handlers::test_connection))
        .route("/api/health", get(handlers::health_check))
        .route(
            "/api/shipments",
            get(handlers::list_shipments).post(handlers::create_shipment),
        )
        .route("/api/shipments/{id}", get(handlers::get_shipment))
        .route("/api/shipments/{id}/prepare", post(handlers::prepare_shipment))
        .route("/api/shipments/{id}/complete", post(handlers::complete_shipment))
        .route("/api/shipments/{id}/couriers", get(handlers::available_couriers))
        .route("/api/shipments/{id}/lines", post(handlers::add_line))
        .route("/api/shipments/{id}/lines/{item_id}", delete(handlers::remove_line))
        .route("/api/warehouses/{id}/items", get(handlers::available_items))
}
