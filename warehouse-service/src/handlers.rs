//! Handler模块

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppError;
use common::models::connection::Target;
use common::models::monitor::HealthSnapshot;
use common::models::query::{QueryRequest, QueryResult, ScriptReport, ScriptRequest};
use common::models::shipment::{
    CompleteShipmentRequest, Courier, CreateShipmentRequest, Item, LineEdit, LineRequest,
    ListShipmentsQuery, Shipment, ShipmentDetail, ShipmentStatus,
};
use common::response::ApiResponse;

use crate::state::AppState;
use crate::SERVICE_NAME;

/// 执行单条 SQL 语句（按语句分类路由到主库或副本）
#[utoipa::path(
    post,
    path = "/api/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "语句执行成功", body = ApiResponse<QueryResult>),
        (status = 400, description = "语句被数据库拒绝或参数校验失败"),
        (status = 503, description = "目标数据库不可达")
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ApiResponse<QueryResult>>, AppError> {
    req.validate()?;
    let execution = state.gateway.dispatch(req.into_statement()).await?;
    let execution_time_ms = execution.elapsed.as_millis() as u64;

    Ok(Json(
        ApiResponse::ok_with_service(
            QueryResult {
                endpoint: execution.endpoint,
                result: execution.result,
                execution_time_ms,
            },
            SERVICE_NAME,
        )
        .with_duration(execution_time_ms),
    ))
}

/// 执行服务器上的 SQL 脚本文件，逐条提交，遇错即停
#[utoipa::path(
    post,
    path = "/api/scripts",
    tag = "query",
    request_body = ScriptRequest,
    responses(
        (status = 200, description = "脚本全部执行成功", body = ApiResponse<ScriptReport>),
        (status = 400, description = "脚本不可读或某条语句失败，之前的语句已提交")
    )
)]
pub async fn run_script(
    State(state): State<AppState>,
    Json(req): Json<ScriptRequest>,
) -> Result<Json<ApiResponse<ScriptReport>>, AppError> {
    req.validate()?;
    let report = state.gateway.run_script(&req.path, req.replica).await?;
    Ok(Json(ApiResponse::ok_with_service(report, SERVICE_NAME)))
}

/// 测试主库或副本的连通性
#[utoipa::path(
    get,
    path = "/api/connections/{target}/test",
    tag = "connections",
    params(
        ("target" = Target, Path, description = "primary 或 replica")
    ),
    responses(
        (status = 200, description = "连接测试结果", body = ApiResponse<ConnectionTestResult>),
        (status = 400, description = "未知的端点")
    )
)]
pub async fn test_connection(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<ApiResponse<ConnectionTestResult>>, AppError> {
    let endpoint: Target = target.parse().map_err(AppError::Validation)?;
    let (success, latency_ms) = state
        .gateway
        .check_connection(endpoint == Target::Replica)
        .await;

    Ok(Json(ApiResponse::ok_with_service(
        ConnectionTestResult {
            endpoint,
            success,
            latency_ms,
        },
        SERVICE_NAME,
    )))
}

/// 健康监测器最近一次的探测结果
#[utoipa::path(
    get,
    path = "/api/connections/status",
    tag = "connections",
    responses(
        (status = 200, description = "主库与副本的最新状态", body = ApiResponse<HealthSnapshot>)
    )
)]
pub async fn connection_status(State(state): State<AppState>) -> Json<ApiResponse<HealthSnapshot>> {
    let snapshot = state.health.borrow().clone();
    Json(ApiResponse::ok_with_service(snapshot, SERVICE_NAME))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// 列出出库单，可按状态过滤
#[utoipa::path(
    get,
    path = "/api/shipments",
    tag = "shipments",
    params(
        ("status" = Option<ShipmentStatus>, Query, description = "PENDING、PREPARED 或 COMPLETED")
    ),
    responses(
        (status = 200, description = "出库单列表", body = ApiResponse<Vec<Shipment>>)
    )
)]
pub async fn list_shipments(
    State(state): State<AppState>,
    Query(query): Query<ListShipmentsQuery>,
) -> Result<Json<ApiResponse<Vec<Shipment>>>, AppError> {
    let data = state.workflow().list(query.status).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 创建出库单（状态 PENDING，不检查库存）
#[utoipa::path(
    post,
    path = "/api/shipments",
    tag = "shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 200, description = "出库单已创建", body = ApiResponse<ShipmentStatusResponse>),
        (status = 400, description = "未指定仓库、没有明细或数量不为正")
    )
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    Json(req): Json<CreateShipmentRequest>,
) -> Result<Json<ApiResponse<ShipmentStatusResponse>>, AppError> {
    req.validate()?;
    let id = state.workflow().create(req.warehouse_id, &req.lines).await?;
    Ok(Json(ApiResponse::ok_with_service(
        ShipmentStatusResponse {
            id,
            status: ShipmentStatus::Pending,
        },
        SERVICE_NAME,
    )))
}

/// 根据 ID 获取出库单及其明细
#[utoipa::path(
    get,
    path = "/api/shipments/{id}",
    tag = "shipments",
    params(
        ("id" = i64, Path, description = "出库单 ID")
    ),
    responses(
        (status = 200, description = "出库单详情", body = ApiResponse<ShipmentDetail>),
        (status = 404, description = "出库单未找到")
    )
)]
pub async fn get_shipment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ShipmentDetail>>, AppError> {
    let data = state.workflow().get(id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 备货：逐行扣减库存，全部成功后置为 PREPARED
#[utoipa::path(
    post,
    path = "/api/shipments/{id}/prepare",
    tag = "shipments",
    params(
        ("id" = i64, Path, description = "出库单 ID")
    ),
    responses(
        (status = 200, description = "已备货", body = ApiResponse<ShipmentStatusResponse>),
        (status = 404, description = "出库单未找到"),
        (status = 409, description = "状态不是 PENDING，或某行库存不足（之前的行已扣减）")
    )
)]
pub async fn prepare_shipment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ShipmentStatusResponse>>, AppError> {
    state.workflow().prepare(id).await?;
    Ok(Json(ApiResponse::ok_with_service(
        ShipmentStatusResponse {
            id,
            status: ShipmentStatus::Prepared,
        },
        SERVICE_NAME,
    )))
}

/// 交付：指派同仓库的快递员并置为 COMPLETED
#[utoipa::path(
    post,
    path = "/api/shipments/{id}/complete",
    tag = "shipments",
    params(
        ("id" = i64, Path, description = "出库单 ID")
    ),
    request_body = CompleteShipmentRequest,
    responses(
        (status = 200, description = "已完成", body = ApiResponse<ShipmentStatusResponse>),
        (status = 404, description = "出库单未找到"),
        (status = 409, description = "状态不是 PREPARED"),
        (status = 422, description = "快递员不属于该仓库")
    )
)]
pub async fn complete_shipment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CompleteShipmentRequest>,
) -> Result<Json<ApiResponse<ShipmentStatusResponse>>, AppError> {
    state.workflow().complete(id, req.courier_id).await?;
    Ok(Json(ApiResponse::ok_with_service(
        ShipmentStatusResponse {
            id,
            status: ShipmentStatus::Completed,
        },
        SERVICE_NAME,
    )))
}

/// 可以交付该出库单的快递员
#[utoipa::path(
    get,
    path = "/api/shipments/{id}/couriers",
    tag = "shipments",
    params(
        ("id" = i64, Path, description = "出库单 ID")
    ),
    responses(
        (status = 200, description = "同仓库的快递员", body = ApiResponse<Vec<Courier>>),
        (status = 404, description = "出库单未找到")
    )
)]
pub async fn available_couriers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Courier>>>, AppError> {
    let data = state.workflow().available_couriers(id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 向 PENDING 出库单添加一行
#[utoipa::path(
    post,
    path = "/api/shipments/{id}/lines",
    tag = "shipments",
    params(
        ("id" = i64, Path, description = "出库单 ID")
    ),
    request_body = LineRequest,
    responses(
        (status = 200, description = "明细已添加", body = ApiResponse<u64>),
        (status = 409, description = "出库单已不是 PENDING")
    )
)]
pub async fn add_line(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<LineRequest>,
) -> Result<Json<ApiResponse<u64>>, AppError> {
    req.validate()?;
    let affected = state
        .workflow()
        .edit_lines(
            id,
            LineEdit::Add {
                item_id: req.item_id,
                quantity: req.quantity,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok_with_service(affected, SERVICE_NAME)))
}

/// 从 PENDING 出库单删除一行（不回补库存）
#[utoipa::path(
    delete,
    path = "/api/shipments/{id}/lines/{item_id}",
    tag = "shipments",
    params(
        ("id" = i64, Path, description = "出库单 ID"),
        ("item_id" = i64, Path, description = "商品 ID")
    ),
    responses(
        (status = 200, description = "删除的明细行数", body = ApiResponse<u64>),
        (status = 409, description = "出库单已不是 PENDING")
    )
)]
pub async fn remove_line(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<u64>>, AppError> {
    let affected = state
        .workflow()
        .edit_lines(id, LineEdit::Remove { item_id })
        .await?;
    Ok(Json(ApiResponse::ok_with_service(affected, SERVICE_NAME)))
}

/// 仓库中有库存的商品
#[utoipa::path(
    get,
    path = "/api/warehouses/{id}/items",
    tag = "warehouses",
    params(
        ("id" = i64, Path, description = "仓库 ID")
    ),
    responses(
        (status = 200, description = "数量大于 0 的商品", body = ApiResponse<Vec<Item>>)
    )
)]
pub async fn available_items(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Item>>>, AppError> {
    let data = state.workflow().available_items(id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 连接测试结果
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionTestResult {
    /// 被测试的端点
    pub endpoint: Target,
    /// 测试是否成功
    pub success: bool,
    /// 往返延迟（毫秒，保留两位小数）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

/// 出库单 ID 及其当前状态
#[derive(Debug, Serialize, ToSchema)]
pub struct ShipmentStatusResponse {
    pub id: i64,
    pub status: ShipmentStatus,
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
}
