// Tool-Discovery RPC — a JSON-RPC 2.0 facade over the Tool Registry and
// Workflow Executor. `tools/call` runs a tool's handler as a single-step
// execution through the exact same executor path every trigger uses;
// this module owns no engine state of its own.

pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::engine::storage::Storage;
use crate::engine::{ToolRegistry, WorkflowExecutor};
use crate::engine::context::TriggerPayload;
use crate::models::{Automation, AutomationId, Execution, ExecutionId, Step, Trigger, UserIdentity};

use types::{error_codes, JsonRpcRequest, JsonRpcResponse};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "automation-core-rpc";

#[derive(Clone)]
pub struct RpcState {
    pub registry: Arc<ToolRegistry>,
    pub executor: Arc<WorkflowExecutor>,
    pub storage: Arc<dyn Storage>,
    pub request_timeout_secs: u64,
}

/// `POST /<rpc_path>` entry point. Wraps the whole dispatch in the
/// request-level timeout (default 25s) and cancels the in-flight handler
/// context on timeout, per spec §4.7/§5. The dispatched task is not
/// aborted — it keeps running in the background to reach a commit
/// boundary and finish logging, same as a webhook-triggered execution.
pub async fn handle_post(State(state): State<RpcState>, Json(req): Json<JsonRpcRequest>) -> impl IntoResponse {
    let id = req.id.clone();
    let cancellation = CancellationToken::new();
    let timeout = Duration::from_secs(state.request_timeout_secs);

    let task = tokio::spawn(dispatch(state.clone(), req, cancellation.clone()));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)),
        Ok(Err(join_error)) => (
            StatusCode::OK,
            Json(JsonRpcResponse::error(
                id,
                error_codes::INTERNAL_ERROR,
                format!("request handling panicked: {}", join_error),
            )),
        ),
        Err(_) => {
            cancellation.cancel();
            warn!(timeout_secs = state.request_timeout_secs, "rpc request timed out");
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(
                    id,
                    error_codes::TIMEOUT_OR_METHOD_NOT_ALLOWED,
                    format!("Request timeout after {}s", state.request_timeout_secs),
                )),
            )
        }
    }
}

/// `GET`/`DELETE` on the RPC endpoint: always 405, with a JSON-RPC error
/// body rather than a bare status code.
pub async fn handle_method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(JsonRpcResponse::error(
            None,
            error_codes::TIMEOUT_OR_METHOD_NOT_ALLOWED,
            "method not allowed; this endpoint only accepts POST",
        )),
    )
}

async fn dispatch(state: RpcState, request: JsonRpcRequest, cancellation: CancellationToken) -> JsonRpcResponse {
    let id = request.id.clone();
    match request.method.as_str() {
        "initialize" => handle_initialize(id),
        "tools/list" => handle_tools_list(&state, id).await,
        "tools/call" => handle_tools_call(&state, id, request.params, cancellation).await,
        "resources/list" => handle_resources_list(id),
        "resources/read" => handle_resources_read(&state, id, request.params).await,
        other => JsonRpcResponse::error(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("method {:?} not found", other),
        ),
    }
}

fn handle_initialize(id: Option<Value>) -> JsonRpcResponse {
    let result = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": true,
            "resources": true,
        },
    });
    JsonRpcResponse::success(id, result)
}

async fn handle_tools_list(state: &RpcState, id: Option<Value>) -> JsonRpcResponse {
    let tools: Vec<Value> = state
        .registry
        .list_exposable()
        .await
        .into_iter()
        .map(|def| {
            serde_json::json!({
                "name": def.name.as_str(),
                "description": def.description,
                "inputSchema": def.input_schema,
            })
        })
        .collect();
    JsonRpcResponse::success(id, serde_json::json!({ "tools": tools }))
}

async fn handle_tools_call(
    state: &RpcState,
    id: Option<Value>,
    params: Option<Value>,
    cancellation: CancellationToken,
) -> JsonRpcResponse {
    let Some(params) = params else {
        return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "missing params");
    };
    let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
        return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "missing tool name");
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));

    let Some((definition, handler)) = state.registry.lookup(name).await else {
        let suggestion = state.registry.suggest_similar(name).await;
        return JsonRpcResponse::success(id, tool_error_result(unknown_tool_message(name, suggestion)));
    };
    if !definition.externally_exposable {
        return JsonRpcResponse::success(
            id,
            tool_error_result(format!("tool {:?} is not externally exposable", name)),
        );
    }
    if handler.is_none() {
        return JsonRpcResponse::success(id, tool_error_result(format!("tool {:?} has no bound handler", name)));
    }

    let params_map: HashMap<String, Value> = arguments
        .as_object()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .collect();
    let automation = Automation::new(
        AutomationId::new(format!("rpc:{}", name)),
        format!("rpc:{}", name),
        Trigger::Manual,
        vec![Step {
            tool_type: name.to_string(),
            params: params_map,
            output_as: None,
        }],
    );

    let execution_id = ExecutionId::generate_rpc(chrono::Utc::now().timestamp_millis());
    if let Err(e) = state
        .storage
        .put_execution(Execution::new_pending(
            execution_id.clone(),
            automation.id.clone(),
            arguments.clone(),
        ))
        .await
    {
        return JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string());
    }

    let outcome = state
        .executor
        .execute_cancellable(
            &automation,
            execution_id,
            UserIdentity::new("rpc", ""),
            TriggerPayload::Manual,
            cancellation,
        )
        .await;

    match outcome {
        Ok(execution) if execution.status == crate::models::ExecutionStatus::Success => {
            let output = execution
                .step_results
                .first()
                .and_then(|r| r.output_summary.clone())
                .unwrap_or(Value::Null);
            JsonRpcResponse::success(id, tool_success_result(&output))
        }
        Ok(execution) => {
            let message = execution
                .step_results
                .first()
                .and_then(|r| r.error.clone())
                .or(execution.error_message)
                .unwrap_or_else(|| "tool call failed".to_string());
            JsonRpcResponse::success(id, tool_error_result(message))
        }
        Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string()),
    }
}

fn unknown_tool_message(name: &str, suggestion: Option<String>) -> String {
    match suggestion {
        Some(s) => format!("unknown tool {:?}; did you mean `{}`?", name, s),
        None => format!("unknown tool {:?}", name),
    }
}

fn tool_success_result(output: &Value) -> Value {
    let text = match output {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    };
    serde_json::json!({
        "content": [{ "type": "text", "text": text }],
        "isError": false,
    })
}

fn tool_error_result(message: impl Into<String>) -> Value {
    let message = message.into();
    let error_json = serde_json::json!({ "error": message }).to_string();
    serde_json::json!({
        "content": [{ "type": "text", "text": error_json }],
        "isError": true,
    })
}

fn handle_resources_list(id: Option<Value>) -> JsonRpcResponse {
    let resources = serde_json::json!([
        {
            "uri": "registry://catalog",
            "name": "Tool Catalog",
            "description": "Every registered tool definition, with its input schema",
            "mimeType": "application/json",
        },
        {
            "uri": "registry://categories",
            "name": "Tool Categories",
            "description": "Registered tools grouped by category",
            "mimeType": "application/json",
        },
        {
            "uri": "registry://metadata",
            "name": "Registry Metadata",
            "description": "Tool counts and exposable-tool counts",
            "mimeType": "application/json",
        },
    ]);
    JsonRpcResponse::success(id, serde_json::json!({ "resources": resources }))
}

async fn handle_resources_read(state: &RpcState, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
    let Some(uri) = params.as_ref().and_then(|p| p.get("uri")).and_then(|v| v.as_str()) else {
        return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "missing resource uri");
    };

    let contents = match uri {
        "registry://catalog" => {
            let tools = state.registry.list().await;
            serde_json::to_value(tools).unwrap_or_default()
        }
        "registry://categories" => {
            let tools = state.registry.list().await;
            let mut groups: HashMap<String, Vec<&str>> = HashMap::new();
            for tool in &tools {
                groups.entry(tool.category.to_string()).or_default().push(tool.name.as_str());
            }
            serde_json::to_value(groups).unwrap_or_default()
        }
        "registry://metadata" => {
            let total = state.registry.list().await.len();
            let exposable = state.registry.list_exposable().await.len();
            serde_json::json!({ "totalTools": total, "exposableCount": exposable })
        }
        other => {
            return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, format!("unknown resource uri {:?}", other));
        }
    };

    JsonRpcResponse::success(
        id,
        serde_json::json!({
            "contents": [{
                "uri": uri,
                "mimeType": "application/json",
                "text": contents.to_string(),
            }]
        }),
    )
}
