//! 仓库出库服务入口
//!
//! 启动顺序：加载配置 → 创建唯一的主库/副本网关 → 启动健康监测 → 启动 HTTP 服务

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use common::config::{load_dotenv, AppConfig};
use db_gateway::{Backend, Gateway, HealthMonitor, PgBackend, SharedGateway};
use warehouse_service::state::AppState;
use warehouse_service::{create_router, SERVICE_NAME};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME);
    info!(
        primary = %config.primary.address(),
        replica = %config.replica.address(),
        "database endpoints configured"
    );

    // 网关在整个进程中只创建一次
    let backend: Box<dyn Backend> = Box::new(PgBackend::from_config(&config));
    let gateway: SharedGateway = Arc::new(Gateway::new(backend));

    // 健康监测
    let monitor = HealthMonitor::new(gateway.clone(), config.health_interval()).spawn();

    // 创建应用状态与路由
    let state = AppState::new(config.clone(), gateway, monitor.subscribe());
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务异常退出")?;

    monitor.shutdown().await;
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
