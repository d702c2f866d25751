// Workflow automation execution core — server binary.
// Run with: cargo run --bin server

use std::sync::Arc;

use automation_core::config::CoreConfig;
use automation_core::engine::storage::{InMemoryStorage, Storage};
use automation_core::engine::{registry, ToolRegistry, WorkflowExecutor};
use automation_core::trigger::{RssPoller, Scheduler};
use automation_core::{handlers, server};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("no .env file loaded ({}); continuing with process environment", e);
    }
    tracing_subscriber::fmt::init();

    let config = CoreConfig::from_env()?;
    info!(host = %config.server_host, port = config.server_port, storage = %config.storage_backend, "starting automation core server");

    let storage: Arc<dyn Storage> = match config.storage_backend.as_str() {
        "nats" => {
            info!(url = %config.nats_url, "connecting to NATS JetStream");
            Arc::new(automation_core::engine::nats_storage::NatsStorage::connect(&config.nats_url).await?)
        }
        other => {
            if other != "memory" {
                warn!(backend = %other, "unknown storage_backend, falling back to memory");
            }
            Arc::new(InMemoryStorage::new())
        }
    };

    let tool_registry = Arc::new(ToolRegistry::new());
    registry::load_definitions(&tool_registry, handlers::bundled_definitions()).await;
    handlers::register_builtins(&tool_registry).await;
    registry::warn_unbound(&tool_registry).await;

    let executor = Arc::new(WorkflowExecutor::new(tool_registry.clone(), storage.clone()));

    let scheduler = Arc::new(Scheduler::new(executor.clone(), storage.clone()).await?);
    scheduler.load_active().await?;
    scheduler.start().await?;

    spawn_rss_poll_loop(executor.clone(), storage.clone(), config.rss_seen_set_cap);

    let router = server::build_router(&config, tool_registry, executor, storage, scheduler.clone());

    let shutdown = CancellationToken::new();
    let shutdown_trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            return;
        }
        info!("shutdown signal received");
        shutdown_trigger.cancel();
    });

    server::run(&config, router, scheduler, shutdown).await?;
    Ok(())
}

/// RSS triggers have no built-in scheduler support (the cron job table only
/// understands `interval`/`daily`), so a coarse 1-minute tick loop checks
/// every active `rss`-triggered automation, but only actually polls one
/// once its own configured `interval` (default 15m) has elapsed since its
/// last poll — the tick rate is just the loop's resolution, not the poll
/// cadence spec §4.6 describes.
fn spawn_rss_poll_loop(executor: Arc<WorkflowExecutor>, storage: Arc<dyn Storage>, seen_set_cap: usize) {
    tokio::spawn(async move {
        let poller = match RssPoller::new(executor, storage.clone(), seen_set_cap) {
            Ok(poller) => poller,
            Err(e) => {
                error!(error = %e, "failed to start rss poller");
                return;
            }
        };
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let automations = match storage.list_active_automations().await {
                Ok(a) => a,
                Err(e) => {
                    warn!(error = %e, "rss poll tick: failed to list active automations");
                    continue;
                }
            };
            for automation in automations {
                let automation_core::TriggerSpec::Rss { .. } = &automation.trigger else {
                    continue;
                };
                match due_for_poll(&automation, storage.as_ref()).await {
                    Ok(true) => {
                        if let Err(e) = poller.poll(&automation).await {
                            warn!(automation = %automation.id, error = %e, "rss poll failed");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!(automation = %automation.id, error = %e, "failed to check rss poll due time"),
                }
            }
        }
    });
}

/// Whether `automation`'s configured RSS interval has elapsed since its
/// last recorded poll. An automation with no prior poll state is always due
/// (its first poll only seeds the seen-set, per spec scenario S6).
async fn due_for_poll(
    automation: &automation_core::Automation,
    storage: &dyn Storage,
) -> automation_core::Result<bool> {
    let interval = automation.trigger.rss_interval()?;
    let Some(state) = storage.get_rss_state(&automation.id).await? else {
        return Ok(true);
    };
    let Some(last_poll) = state.last_poll_time else {
        return Ok(true);
    };
    let period = interval.as_duration();
    Ok(chrono::Utc::now() - last_poll >= period)
}
