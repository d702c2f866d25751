// Execution and State Log domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AutomationId, ExecutionId};

/// Terminal and intermediate states of an Execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Retrying,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }
}

/// The outcome of one attempted step, recorded in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub tool_type: String,
    pub duration_ms: u64,
    pub retries: u32,
    /// Sanitized summary of the handler's output (see
    /// [`crate::engine::sanitize`]). `None` when the step failed.
    pub output_summary: Option<serde_json::Value>,
    /// `None` on success; the human-readable cause on failure.
    pub error: Option<String>,
}

impl StepResult {
    pub fn succeeded(
        step_index: usize,
        tool_type: impl Into<String>,
        duration_ms: u64,
        retries: u32,
        output_summary: serde_json::Value,
    ) -> Self {
        Self {
            step_index,
            tool_type: tool_type.into(),
            duration_ms,
            retries,
            output_summary: Some(output_summary),
            error: None,
        }
    }

    pub fn failed(
        step_index: usize,
        tool_type: impl Into<String>,
        duration_ms: u64,
        retries: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            step_index,
            tool_type: tool_type.into(),
            duration_ms,
            retries,
            output_summary: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One entry in an execution's state log: `(from, to, timestamp, metadata)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Per-execution ordered sequence of state transitions.
///
/// Invariant: the first entry is `(pending→running)`, the last is either
/// `(…→success)` or `(…→failed)`, and every `retrying` entry is bracketed
/// by an adjacent `running` entry on both sides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateLog {
    pub entries: Vec<StateTransition>,
}

impl StateLog {
    pub fn push(&mut self, from: ExecutionStatus, to: ExecutionStatus, metadata: serde_json::Value) {
        self.entries.push(StateTransition {
            from,
            to,
            timestamp: Utc::now(),
            metadata,
        });
    }

    pub fn is_valid_path(&self) -> bool {
        let Some(first) = self.entries.first() else {
            return false;
        };
        if first.from != ExecutionStatus::Pending || first.to != ExecutionStatus::Running {
            return false;
        }
        let Some(last) = self.entries.last() else {
            return false;
        };
        if !last.to.is_terminal() {
            return false;
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.to == ExecutionStatus::Retrying {
                let prev_running = self.entries.get(i.wrapping_sub(1)).map(|e| e.to) == Some(ExecutionStatus::Running)
                    || i == 0;
                let next_running = self
                    .entries
                    .get(i + 1)
                    .map(|e| e.to == ExecutionStatus::Running)
                    .unwrap_or(false);
                if !prev_running || !next_running {
                    return false;
                }
            }
        }
        true
    }
}

/// One end-to-end run of an automation, with a durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub automation_id: AutomationId,
    /// The triggering payload, if any (webhook body, RSS new-items, etc).
    #[serde(default)]
    pub input: serde_json::Value,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub step_results: Vec<StepResult>,
    pub aggregate_duration_ms: Option<u64>,
    pub error_message: Option<String>,
    /// Summarized context snapshot at termination (debuggability only).
    pub context_snapshot: Option<serde_json::Value>,
}

impl Execution {
    pub fn new_pending(id: ExecutionId, automation_id: AutomationId, input: serde_json::Value) -> Self {
        Self {
            id,
            automation_id,
            input,
            status: ExecutionStatus::Pending,
            started_at: None,
            finished_at: None,
            step_results: Vec::new(),
            aggregate_duration_ms: None,
            error_message: None,
            context_snapshot: None,
        }
    }

    pub fn total_retries(&self) -> u32 {
        self.step_results.iter().map(|r| r.retries).sum()
    }
}
