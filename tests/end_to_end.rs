// End-to-end scenarios exercised through the public API: an automation
// definition goes in, a terminal `Execution` (or HTTP response) comes out.
// Handlers here are small deterministic stand-ins for the real
// `fetch_stock_price` / `send_email` integrations, which hit real networks
// and can't run in a test process.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use automation_core::engine::registry::{Handler, HandlerError, ToolRegistry};
use automation_core::engine::storage::{InMemoryStorage, Storage};
use automation_core::engine::ExecutionContext;
use automation_core::engine::WorkflowExecutor;
use automation_core::models::{ExecutionStatus, Step, ToolCategory, ToolDefinition};
use automation_core::trigger::webhook::{self, WebhookState};
use automation_core::{Automation, AutomationId, ExecutionId, TriggerSpec, UserIdentity};

fn schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

async fn define_and_bind(registry: &ToolRegistry, name: &str, handler: Arc<dyn Handler>) {
    registry
        .define(ToolDefinition::new(name, "1.0.0", "test handler", ToolCategory::Fetch, true, schema()))
        .await;
    registry.bind(name, handler).await;
}

// S1: a two-step interval automation resolves the first step's output into
// the second step's params and reaches Success.
#[tokio::test]
async fn s1_happy_path_interval_resolves_step_output_into_next_step() {
    let registry = Arc::new(ToolRegistry::new());
    define_and_bind(
        &registry,
        "fetch_stock_price",
        Arc::new(|params: serde_json::Value, _ctx: automation_core::engine::context::StepContext| async move {
            let symbol = params.get("symbol").and_then(|v| v.as_str()).unwrap_or("?");
            Ok(serde_json::json!({"symbol": symbol, "price": "190.23"}))
        }),
    )
    .await;
    define_and_bind(
        &registry,
        "send_email",
        Arc::new(|params: serde_json::Value, _ctx: automation_core::engine::context::StepContext| async move {
            let body = params.get("body").cloned().unwrap_or(serde_json::Value::Null);
            Ok(serde_json::json!({"sent": true, "body": body}))
        }),
    )
    .await;

    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let executor = WorkflowExecutor::new(registry, storage.clone());

    let automation = Automation::new(
        AutomationId::new("daily-stock"),
        "daily-stock-alert",
        TriggerSpec::Interval { every: "5m".to_string() },
        vec![
            Step::new("fetch_stock_price").with_param("symbol", serde_json::json!("AAPL")),
            Step::new("send_email")
                .with_param("body", serde_json::json!("price is {{step_1.price}}"))
                .with_output_as("notification"),
        ],
    );
    storage.put_automation(automation.clone()).await.unwrap();
    let execution_id = ExecutionId::generate();
    storage
        .put_execution(automation_core::Execution::new_pending(
            execution_id.clone(),
            automation.id.clone(),
            serde_json::Value::Null,
        ))
        .await
        .unwrap();

    let execution = executor
        .execute(
            &automation,
            execution_id,
            UserIdentity::new("u1", "user@example.com"),
            automation_core::engine::context::TriggerPayload::Interval,
        )
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.step_results.len(), 2);
    assert_eq!(execution.step_results[1].output_summary.as_ref().unwrap()["body"], "price is 190.23");
}

// S2: a transient failure on the first two attempts is retried and the
// third attempt succeeds; the state log records the retrying<->running
// round trips and the final step result shows 2 retries.
#[tokio::test]
async fn s2_transient_failure_retries_then_succeeds() {
    let registry = Arc::new(ToolRegistry::new());
    let calls = Arc::new(AtomicU32::new(0));
    {
        let calls = calls.clone();
        define_and_bind(
            &registry,
            "fetch_stock_price",
            Arc::new(move |_p: serde_json::Value, _c: automation_core::engine::context::StepContext| {
                let calls = calls.clone();
                async move {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(HandlerError::new("connection reset by peer"))
                    } else {
                        Ok(serde_json::json!({"price": "190.23"}))
                    }
                }
            }),
        )
        .await;
    }

    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let executor = WorkflowExecutor::new(registry, storage.clone());

    let automation = Automation::new(
        AutomationId::new("a1"),
        "daily-stock",
        TriggerSpec::Manual,
        vec![Step::new("fetch_stock_price")],
    );
    storage.put_automation(automation.clone()).await.unwrap();
    let execution_id = ExecutionId::generate();
    storage
        .put_execution(automation_core::Execution::new_pending(
            execution_id.clone(),
            automation.id.clone(),
            serde_json::Value::Null,
        ))
        .await
        .unwrap();

    let execution = executor
        .execute(
            &automation,
            execution_id.clone(),
            UserIdentity::new("u1", "user@example.com"),
            automation_core::engine::context::TriggerPayload::Manual,
        )
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.step_results.len(), 1);
    assert_eq!(execution.step_results[0].retries, 2);

    let log = storage.get_state_log(&execution_id).await.unwrap();
    assert!(log.is_valid_path());
    let retrying_transitions = log
        .entries
        .iter()
        .filter(|t| t.to == ExecutionStatus::Retrying)
        .count();
    assert_eq!(retrying_transitions, 2);
}

// S5: a webhook POST with a correct HMAC-SHA256 signature dispatches a
// background execution that can see context.webhookPayload / triggerType
// at the top level, per the field paths the scenario names.
#[tokio::test]
async fn s5_webhook_delivery_with_valid_signature_dispatches_execution() {
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let registry = Arc::new(ToolRegistry::new());
    define_and_bind(
        &registry,
        "send_email",
        Arc::new(|_p: serde_json::Value, ctx: automation_core::engine::context::StepContext| async move {
            let value = ctx.as_value();
            assert_eq!(value["triggerType"], "webhook");
            assert_eq!(value["webhookPayload"]["ticker"], "NVDA");
            Ok(serde_json::json!({"sent": true}))
        }),
    )
    .await;

    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let executor = Arc::new(WorkflowExecutor::new(registry, storage.clone()));

    let mut automation = Automation::new(
        AutomationId::new("nvda-alert"),
        "nvda-alert",
        TriggerSpec::Webhook { secret: Some("mysecret".to_string()) },
        vec![Step::new("send_email")],
    );
    automation.status = automation_core::AutomationStatus::Active;
    storage.put_automation(automation.clone()).await.unwrap();

    let body = br#"{"ticker":"NVDA"}"#.to_vec();
    let mut mac = Hmac::<Sha256>::new_from_slice(b"mysecret").unwrap();
    mac.update(&body);
    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

    let mut headers = HeaderMap::new();
    headers.insert("X-Hub-Signature-256", format!("sha256={}", hex).parse().unwrap());

    let state = WebhookState {
        storage: storage.clone(),
        executor: executor.clone(),
        default_secret: None,
    };

    let response = webhook::receive(
        State(state),
        Path("nvda-alert".to_string()),
        headers,
        axum::body::Bytes::from(body),
    )
    .await;
    use axum::response::IntoResponse;
    let response = response.into_response();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    // The handler runs on a spawned background task; give it a moment.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let executions = storage.get_automation(&automation.id).await.unwrap();
    assert!(executions.is_some());
}

// S6: a seen-set bounded model of the RSS new-items invariant: the first
// observation of a feed only seeds the seen-set, and an item is reported
// "new" only once, even across repeated identical polls.
#[tokio::test]
async fn s6_rss_seen_set_suppresses_repeats_after_first_observation() {
    use automation_core::models::RssPollState;

    let mut state = RssPollState::with_cap(AutomationId::new("rss-a"), 100);
    let first_poll_items = ["1", "2", "3"];
    for id in first_poll_items {
        state.mark_seen(id.to_string());
    }
    // First poll establishes the baseline; nothing is "new" yet.
    let new_on_first_poll: Vec<&str> = first_poll_items.iter().filter(|id| !state.has_seen(id)).copied().collect();
    assert!(new_on_first_poll.is_empty());

    // Second poll sees one genuinely new item alongside the three already seen.
    let second_poll_items = ["4", "1", "2", "3"];
    let new_on_second_poll: Vec<&str> =
        second_poll_items.iter().filter(|id| !state.has_seen(id)).copied().collect();
    assert_eq!(new_on_second_poll, vec!["4"]);
    for id in second_poll_items {
        state.mark_seen(id.to_string());
    }

    // A third, identical poll finds nothing new at all.
    let new_on_third_poll: Vec<&str> =
        second_poll_items.iter().filter(|id| !state.has_seen(id)).copied().collect();
    assert!(new_on_third_poll.is_empty());
}

// Cross-cutting: the Context Memory snapshot handed to a step always
// carries the trigger payload at the top level, not nested under a
// `trigger` key, regardless of which trigger produced the execution.
#[tokio::test]
async fn step_context_flattens_trigger_payload_fields() {
    let ctx = ExecutionContext::new(
        ExecutionId::new("e1"),
        AutomationId::new("a1"),
        UserIdentity::new("u1", "u@example.com"),
        automation_core::engine::context::TriggerPayload::Rss {
            feed_url: "https://example.com/feed".to_string(),
            new_items: serde_json::json!([{"id": "1"}]),
        },
    );
    let snapshot = ctx.build_step_context();
    let value = snapshot.as_value();
    assert_eq!(value["triggerType"], "rss");
    assert_eq!(value["rssFeed"], "https://example.com/feed");
    assert!(value.get("trigger").is_none());
}
