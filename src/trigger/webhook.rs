// Webhook Intake — `POST /<automation_id>`, unauthenticated except for an
// optional HMAC-SHA-256 signature check.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

use crate::engine::context::TriggerPayload;
use crate::engine::storage::Storage;
use crate::engine::WorkflowExecutor;
use crate::models::{AutomationId, Execution, ExecutionId, Trigger, UserIdentity};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct WebhookState {
    pub storage: Arc<dyn Storage>,
    pub executor: Arc<WorkflowExecutor>,
    pub default_secret: Option<String>,
}

pub async fn readiness_probe(
    State(state): State<WebhookState>,
    Path(automation_id): Path<String>,
) -> impl IntoResponse {
    let id = AutomationId::new(automation_id);
    match state.storage.get_automation(&id).await {
        Ok(Some(automation)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "automationId": automation.id.as_str(),
                "triggerType": trigger_type_name(&automation.trigger),
                "active": automation.is_active(),
            })),
        ),
        Ok(None) => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "unknown automation"}))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

pub async fn receive(
    State(state): State<WebhookState>,
    Path(automation_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let id = AutomationId::new(automation_id);

    let automation = match state.storage.get_automation(&id).await {
        Ok(Some(a)) => a,
        Ok(None) => return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "unknown automation"}))),
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    };

    let Trigger::Webhook { secret } = &automation.trigger else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "automation is not configured for webhook delivery"})),
        );
    };

    let effective_secret = secret.clone().or_else(|| state.default_secret.clone());
    if let Some(secret) = effective_secret {
        if !signature_matches(&secret, &body, &headers) {
            warn!(automation = %id, "webhook signature mismatch");
            return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "invalid signature"})));
        }
    }

    if !automation.is_active() {
        return (
            StatusCode::OK,
            Json(serde_json::json!({"status": "skipped", "reason": "automation is not active"})),
        );
    }

    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let execution_id = ExecutionId::generate();
    let metadata = serde_json::json!({
        "receivedAt": chrono::Utc::now().to_rfc3339(),
        "headers": selected_headers(&headers),
    });
    let execution = Execution::new_pending(
        execution_id.clone(),
        automation.id.clone(),
        serde_json::json!({"payload": payload, "metadata": metadata}),
    );
    if let Err(e) = state.storage.put_execution(execution).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        );
    }

    info!(automation = %id, execution = %execution_id, "webhook accepted, dispatching execution");

    // Respond before the executor runs; failures afterward are visible
    // only via the execution log, never to this caller.
    let executor = state.executor.clone();
    let execution_id_bg = execution_id.clone();
    tokio::spawn(async move {
        if let Err(e) = executor
            .execute(
                &automation,
                execution_id_bg.clone(),
                UserIdentity::new("webhook", ""),
                TriggerPayload::Webhook { payload },
            )
            .await
        {
            warn!(execution = %execution_id_bg, error = %e, "background webhook execution failed to run");
        }
    });

    (StatusCode::OK, Json(serde_json::json!({"execution_id": execution_id.as_str()})))
}

fn signature_matches(secret: &str, body: &[u8], headers: &HeaderMap) -> bool {
    let Some(header_value) = headers
        .get("X-Hub-Signature-256")
        .or_else(|| headers.get("X-Webhook-Secret"))
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let provided_hex = header_value.strip_prefix("sha256=").unwrap_or(header_value);
    let Ok(provided) = hex_decode(provided_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // `verify_slice` does a constant-time comparison internally (the hmac
    // crate builds on `subtle`), so callers never need to import it directly.
    mac.verify_slice(&provided).is_ok()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

fn selected_headers(headers: &HeaderMap) -> serde_json::Value {
    const KEEP: &[&str] = &["content-type", "user-agent", "x-forwarded-for"];
    let mut out = serde_json::Map::new();
    for name in KEEP {
        if let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) {
            out.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        }
    }
    serde_json::Value::Object(out)
}

fn trigger_type_name(trigger: &Trigger) -> &'static str {
    match trigger {
        Trigger::Manual => "manual",
        Trigger::Interval { .. } => "interval",
        Trigger::Daily { .. } => "daily",
        Trigger::Webhook { .. } => "webhook",
        Trigger::Rss { .. } => "rss",
        Trigger::Event { .. } => "event",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_signature_verifies_against_known_vector() {
        let secret = "mysecret";
        let body = b"{\"ticker\":\"NVDA\"}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let digest = mac.finalize().into_bytes();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

        let mut headers = HeaderMap::new();
        headers.insert("X-Hub-Signature-256", format!("sha256={}", hex).parse().unwrap());
        assert!(signature_matches(secret, body, &headers));
    }

    #[test]
    fn mismatched_signature_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Hub-Signature-256", "sha256=deadbeef".parse().unwrap());
        assert!(!signature_matches("mysecret", b"body", &headers));
    }

    #[test]
    fn missing_header_rejected() {
        let headers = HeaderMap::new();
        assert!(!signature_matches("mysecret", b"body", &headers));
    }
}
