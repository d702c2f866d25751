// HTTP server wiring: webhook intake, the Tool-Discovery RPC facade, and
// the health endpoint, mounted on one Axum router. Built on Axum 0.6,
// same as the server this crate's dependency stack was inherited from.

use std::net::SocketAddr;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::engine::storage::Storage;
use crate::engine::{ToolRegistry, WorkflowExecutor};
use crate::rpc::RpcState;
use crate::trigger::{Scheduler, WebhookState};

#[derive(Clone)]
struct HealthState {
    registry: Arc<ToolRegistry>,
    scheduler: Arc<Scheduler>,
}

/// Builds the full Axum app: webhook routes, the RPC endpoint at the
/// configured path, and `/health`. Kept separate from [`run`] so tests can
/// exercise routing without binding a socket.
pub fn build_router(
    config: &CoreConfig,
    registry: Arc<ToolRegistry>,
    executor: Arc<WorkflowExecutor>,
    storage: Arc<dyn Storage>,
    scheduler: Arc<Scheduler>,
) -> Router {
    let webhook_state = WebhookState {
        storage: storage.clone(),
        executor: executor.clone(),
        default_secret: config.webhook_default_secret.clone(),
    };
    let rpc_state = RpcState {
        registry: registry.clone(),
        executor,
        storage,
        request_timeout_secs: config.rpc_timeout_secs,
    };
    let health_state = HealthState { registry, scheduler };

    let webhook_routes = Router::new()
        .route(
            "/:automation_id",
            post(crate::trigger::webhook::receive).get(crate::trigger::webhook::readiness_probe),
        )
        .with_state(webhook_state);

    let rpc_routes = Router::new()
        .route(
            &config.rpc_path,
            post(crate::rpc::handle_post)
                .get(crate::rpc::handle_method_not_allowed)
                .delete(crate::rpc::handle_method_not_allowed),
        )
        .with_state(rpc_state);

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .with_state(health_state);

    Router::new()
        .merge(webhook_routes)
        .merge(rpc_routes)
        .merge(health_routes)
        .layer(CorsLayer::permissive())
}

async fn health_check(axum::extract::State(state): axum::extract::State<HealthState>) -> impl IntoResponse {
    let total_tools = state.registry.list().await.len();
    let exposable_count = state.registry.list_exposable().await.len();
    let active_jobs = state.scheduler.active_job_count();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "scheduler": { "activeJobs": active_jobs },
            "registry": { "totalTools": total_tools, "exposableCount": exposable_count },
            "rpc": { "toolCount": exposable_count },
        })),
    )
}

/// Bind and serve `router`, retrying once after attempting to free the
/// port if it's held by a stale process (spec §5 "Port reclamation").
/// `shutdown` is signalled to start a graceful shutdown: stop accepting
/// new connections, cancel scheduled jobs, and let in-flight executions
/// run to their next commit boundary before the process exits.
pub async fn run(
    config: &CoreConfig,
    router: Router,
    scheduler: Arc<Scheduler>,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .map_err(|e| crate::CoreError::Internal(format!("invalid bind address: {}", e)))?;

    let listener = match bind_with_reclamation(addr).await {
        Ok(listener) => listener,
        Err(e) => return Err(crate::CoreError::Internal(format!("failed to bind {}: {}", addr, e))),
    };

    info!(%addr, "server listening");

    let shutdown_signal = Arc::new(Notify::new());
    let notify = shutdown_signal.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        notify.notify_one();
    });

    axum::Server::from_tcp(listener)
        .map_err(|e| crate::CoreError::Internal(format!("failed to attach listener: {}", e)))?
        .serve(router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal.notified().await;
            scheduler.shutdown_jobs().await;
            warn!("graceful shutdown: no longer accepting new requests");
        })
        .await
        .map_err(|e| crate::CoreError::Internal(format!("server error: {}", e)))
}

async fn bind_with_reclamation(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    match std::net::TcpListener::bind(addr) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            warn!(%addr, "port in use, attempting reclamation before one retry");
            let _ = Command::new("fuser").arg("-k").arg(format!("{}/tcp", addr.port())).output();
            tokio::time::sleep(Duration::from_millis(300)).await;
            std::net::TcpListener::bind(addr)
        }
        Err(e) => Err(e),
    }
}
