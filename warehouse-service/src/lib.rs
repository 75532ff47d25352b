//! 仓库出库服务
//!
//! 提供以下功能：
//! - 经主库/副本网关执行 SQL 语句与脚本
//! - 主库与副本的连通性测试与健康监测
//! - 出库单流程：创建、备货（扣减库存）、交付快递员

pub mod handlers;
pub mod reservation;
pub mod routes;
pub mod state;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

use axum::{routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use common::middleware::{make_request_span, propagate_request_id_layer, set_request_id_layer};

use crate::state::AppState;

pub const SERVICE_NAME: &str = "warehouse-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "仓库服务 API",
        version = "0.1.0",
        description = "主库/副本语句路由与出库单流程"
    ),
    paths(
        handlers::execute_query,
        handlers::run_script,
        handlers::test_connection,
        handlers::connection_status,
        handlers::health_check,
        handlers::list_shipments,
        handlers::create_shipment,
        handlers::get_shipment,
        handlers::prepare_shipment,
        handlers::complete_shipment,
        handlers::available_couriers,
        handlers::add_line,
        handlers::remove_line,
        handlers::available_items,
    ),
    components(schemas(
        common::models::QueryRequest,
        common::models::QueryResult,
        common::models::ScriptRequest,
        common::models::ScriptReport,
        common::models::Target,
        common::models::EndpointHealth,
        common::models::HealthSnapshot,
        common::models::Shipment,
        common::models::ShipmentStatus,
        common::models::ShipmentLine,
        common::models::ShipmentDetail,
        common::models::Courier,
        common::models::Item,
        common::models::LineRequest,
        common::models::CreateShipmentRequest,
        common::models::shipment::CompleteShipmentRequest,
        handlers::ConnectionTestResult,
        handlers::ShipmentStatusResponse,
        handlers::HealthResponse,
    )),
    tags(
        (name = "query", description = "语句与脚本执行端点"),
        (name = "connections", description = "主库/副本连通性端点"),
        (name = "shipments", description = "出库单流程端点"),
        (name = "warehouses", description = "仓库库存端点"),
        (name = "health", description = "健康检查端点")
    )
)]
pub struct ApiDoc;

/// Builds the service router with tracing, request ids and CORS applied.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(set_request_id_layer())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
