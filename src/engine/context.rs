// Context Memory — per-execution store of step outputs, user identity,
// and trigger payload; builds the snapshot passed to each handler and
// persists a summary at end-of-run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::engine::sanitize::summarize_context;
use crate::models::{AutomationId, ExecutionId, UserIdentity};

/// Marks which trigger produced the execution, and carries the
/// trigger-specific payload injected before the first step runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "triggerType")]
pub enum TriggerPayload {
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "interval")]
    Interval,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "webhook")]
    Webhook { #[serde(rename = "webhookPayload")] payload: serde_json::Value },
    #[serde(rename = "rss")]
    Rss {
        #[serde(rename = "rssFeed")]
        feed_url: String,
        #[serde(rename = "rssNewItems")]
        new_items: serde_json::Value,
    },
}

/// Per-execution, in-memory store of user identity, trigger payload, and
/// step outputs. Created fresh for every execution; never shared across
/// executions.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub automation_id: AutomationId,
    pub user: UserIdentity,
    pub started_at: DateTime<Utc>,
    pub trigger: TriggerPayload,
    /// Keys are both positional (`step_1`, `step_2`, …) and any
    /// `output_as` alias a step declared.
    step_outputs: HashMap<String, serde_json::Value>,
    /// Cancellation signal propagated from the RPC 25s timeout or a
    /// graceful-shutdown request.
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        execution_id: ExecutionId,
        automation_id: AutomationId,
        user: UserIdentity,
        trigger: TriggerPayload,
    ) -> Self {
        Self::with_cancellation(execution_id, automation_id, user, trigger, CancellationToken::new())
    }

    /// Like [`Self::new`], but with an externally-owned cancellation token
    /// so a caller (e.g. the RPC surface's 25s request timeout) can signal
    /// cancellation into a running execution from outside the executor.
    pub fn with_cancellation(
        execution_id: ExecutionId,
        automation_id: AutomationId,
        user: UserIdentity,
        trigger: TriggerPayload,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            automation_id,
            user,
            started_at: Utc::now(),
            trigger,
            step_outputs: HashMap::new(),
            cancellation,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.step_outputs.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.step_outputs.get(key)
    }

    /// Store a step's output under its positional alias and, if declared,
    /// its `output_as` alias.
    pub fn store_step_output(
        &mut self,
        index: usize,
        output: serde_json::Value,
        output_as: Option<&str>,
    ) {
        self.set(format!("step_{}", index), output.clone());
        if let Some(alias) = output_as {
            self.set(alias.to_string(), output);
        }
    }

    /// Build the frozen snapshot passed to the next handler. Each step
    /// receives a fresh shallow copy: mutations by a handler to its copy
    /// must never affect later steps.
    pub fn build_step_context(&self) -> StepContext {
        StepContext {
            execution_id: self.execution_id.clone(),
            automation_id: self.automation_id.clone(),
            user: self.user.clone(),
            started_at: self.started_at,
            trigger: self.trigger.clone(),
            step_outputs: self.step_outputs.clone(),
            cancellation: self.cancellation.clone(),
        }
    }

    /// Summarized context written once at terminal state: strings capped
    /// at 100 chars, arrays reported by length only, objects keep only
    /// their first five keys.
    pub fn persist_summary(&self) -> serde_json::Value {
        let full = serde_json::json!({
            "executionId": self.execution_id.as_str(),
            "automationId": self.automation_id.as_str(),
            "user": { "id": self.user.id, "email": self.user.email },
            "startedAt": self.started_at.to_rfc3339(),
            "stepOutputs": self.step_outputs,
        });
        summarize_context(&full, 100, 5)
    }
}

/// Read-only snapshot handed to a single handler invocation. The snapshot
/// is a plain value, not a reference into [`ExecutionContext`]: the
/// executor calls [`ExecutionContext::build_step_context`] fresh before
/// every step so handlers can never see later mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepContext {
    pub execution_id: ExecutionId,
    pub automation_id: AutomationId,
    pub user: UserIdentity,
    pub started_at: DateTime<Utc>,
    // Flattened so the trigger-specific fields the spec names
    // (`triggerType`, `webhookPayload`, `rssFeed`, `rssNewItems`) sit at
    // the top level of the context a handler/resolver sees, not nested
    // under a `trigger` key (spec §4.5, scenario S5/S6).
    #[serde(flatten)]
    pub trigger: TriggerPayload,
    pub step_outputs: HashMap<String, serde_json::Value>,
    #[serde(skip, default = "CancellationToken::new")]
    pub cancellation: CancellationToken,
}

impl StepContext {
    /// A minimal context for unit tests that don't care about identity.
    pub fn empty_for_test() -> Self {
        Self {
            execution_id: ExecutionId::new("test"),
            automation_id: AutomationId::new("test"),
            user: UserIdentity::new("u1", "user@example.com"),
            started_at: Utc::now(),
            trigger: TriggerPayload::Manual,
            step_outputs: HashMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// A view of the context as a `serde_json::Value`, used by the
    /// Variable Resolver to walk dotted paths.
    pub fn as_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
