// Workflow automation execution core — admin CLI.
// Run with: cargo run --bin admin -- <command>

use std::sync::Arc;

use automation_core::config::CoreConfig;
use automation_core::engine::storage::{InMemoryStorage, Storage};
use automation_core::engine::{registry, ToolRegistry, WorkflowExecutor};
use automation_core::models::{AutomationId, ExecutionId};
use automation_core::trigger::RssPoller;
use automation_core::{handlers, CoreError};
use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "automation-core-admin")]
#[command(about = "Inspect and poke at a running automation core's durable state")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// `memory` or `nats`; defaults to the process environment's CoreConfig.
    #[arg(long)]
    storage_backend: Option<String>,

    #[arg(long, env = "NATS_URL")]
    nats_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every tool in the bundled registry, with exposable status.
    Tools,
    /// Inspect one execution's state log and step results.
    Inspect {
        execution_id: String,
    },
    /// Force an out-of-band RSS poll for one automation.
    PollRss {
        automation_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let cli = Cli::parse();
    let mut config = CoreConfig::from_env().unwrap_or_default();
    if let Some(backend) = cli.storage_backend {
        config.storage_backend = backend;
    }
    if let Some(url) = cli.nats_url {
        config.nats_url = url;
    }

    let storage: Arc<dyn Storage> = match config.storage_backend.as_str() {
        "nats" => Arc::new(automation_core::engine::nats_storage::NatsStorage::connect(&config.nats_url).await?),
        _ => Arc::new(InMemoryStorage::new()),
    };

    match cli.command {
        Commands::Tools => print_tools().await?,
        Commands::Inspect { execution_id } => print_execution(storage.as_ref(), &execution_id).await?,
        Commands::PollRss { automation_id } => {
            force_poll(storage.clone(), &automation_id, config.rss_seen_set_cap).await?
        }
    }

    Ok(())
}

async fn print_tools() -> anyhow::Result<()> {
    let registry = ToolRegistry::new();
    registry::load_definitions(&registry, handlers::bundled_definitions()).await;
    handlers::register_builtins(&registry).await;

    let tools = registry.list().await;
    println!("{}", format!("{} registered tools", tools.len()).bold());
    for tool in tools {
        let marker = if tool.externally_exposable {
            "exposable".green()
        } else {
            "internal".yellow()
        };
        println!("  {} [{}] {} — {}", tool.name.as_str().bold(), tool.category, marker, tool.description);
    }
    Ok(())
}

async fn print_execution(storage: &dyn Storage, execution_id: &str) -> anyhow::Result<()> {
    let id = ExecutionId::new(execution_id);
    let Some(execution) = storage.get_execution(&id).await? else {
        println!("{}", format!("no execution found with id {:?}", execution_id).red());
        return Ok(());
    };

    println!("{} {}", "execution".bold(), execution.id.as_str());
    println!("  automation: {}", execution.automation_id.as_str());
    println!("  status:     {:?}", execution.status);
    if let Some(err) = &execution.error_message {
        println!("  error:      {}", err.red());
    }
    println!("  steps:");
    for step in &execution.step_results {
        let marker = if step.is_error() { "FAILED".red() } else { "ok".green() };
        println!(
            "    [{}] {} ({}ms, {} retries) {}",
            step.step_index, step.tool_type, step.duration_ms, step.retries, marker
        );
        if let Some(err) = &step.error {
            println!("        {}", err);
        }
    }

    let log = storage.get_state_log(&id).await?;
    println!("  state log:");
    for transition in &log.entries {
        println!("    {:?} -> {:?} @ {}", transition.from, transition.to, transition.timestamp.to_rfc3339());
    }
    Ok(())
}

async fn force_poll(storage: Arc<dyn Storage>, automation_id: &str, seen_set_cap: usize) -> anyhow::Result<()> {
    let id = AutomationId::new(automation_id);
    let Some(automation) = storage.get_automation(&id).await? else {
        println!("{}", format!("no automation found with id {:?}", automation_id).red());
        return Ok(());
    };

    let registry = Arc::new(ToolRegistry::new());
    registry::load_definitions(&registry, handlers::bundled_definitions()).await;
    handlers::register_builtins(&registry).await;
    let executor = Arc::new(WorkflowExecutor::new(registry, storage.clone()));
    let poller = RssPoller::new(executor, storage, seen_set_cap).map_err(|e: CoreError| anyhow::anyhow!(e))?;

    poller.poll(&automation).await?;
    println!("{}", "poll complete".green());
    Ok(())
}
