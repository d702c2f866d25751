// Workflow Executor — the single code path every trigger funnels through.
// `execute` never rejects input; all validation failures flow through
// `StepFailure` and are folded into the execution record rather than
// propagated to the caller.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::context::{ExecutionContext, StepContext, TriggerPayload};
use crate::engine::logger::ExecutionLogger;
use crate::engine::registry::{HandlerError, ToolRegistry};
use crate::engine::resolver;
use crate::engine::retry::{self, Classification, RetryPolicy};
use crate::engine::storage::Storage;
use crate::models::{Automation, ExecutionId, ExecutionStatus, StepResult, UserIdentity};

/// Error taxonomy for a failed execution. Never escapes `execute` as a
/// `Result::Err` — it's folded into the execution record's `error_message`
/// (spec §7: triggers never see step errors).
#[derive(Debug, Clone)]
pub enum StepFailure {
    UnsupportedStep { step_index: usize, tool_type: String, suggestion: Option<String> },
    StepFailed { step_index: usize, tool_type: String, cause: String },
    Timeout { step_index: usize },
    Internal(String),
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepFailure::UnsupportedStep { tool_type, suggestion, .. } => {
                write!(f, "unsupported step type {:?}", tool_type)?;
                if let Some(s) = suggestion {
                    write!(f, "; did you mean `{}`?", s)?;
                }
                Ok(())
            }
            StepFailure::StepFailed { step_index, tool_type, cause } => {
                write!(f, "step {} ({}) failed: {}", step_index, tool_type, cause)
            }
            StepFailure::Timeout { step_index } => write!(f, "step {} timed out", step_index),
            StepFailure::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

pub struct WorkflowExecutor {
    registry: Arc<ToolRegistry>,
    storage: Arc<dyn Storage>,
    retry_policy: RetryPolicy,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<ToolRegistry>, storage: Arc<dyn Storage>) -> Self {
        Self {
            registry,
            storage,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Run one automation to its terminal state. The returned `Execution`
    /// is also the exact record left in storage.
    pub async fn execute(
        &self,
        automation: &Automation,
        execution_id: ExecutionId,
        user: UserIdentity,
        trigger: TriggerPayload,
    ) -> crate::Result<crate::models::Execution> {
        self.execute_cancellable(automation, execution_id, user, trigger, CancellationToken::new())
            .await
    }

    /// Like [`Self::execute`], but with an externally-owned cancellation
    /// token. The Tool-Discovery RPC surface uses this to cancel a
    /// `tools/call` single-step execution when its 25s request timeout
    /// elapses.
    pub async fn execute_cancellable(
        &self,
        automation: &Automation,
        execution_id: ExecutionId,
        user: UserIdentity,
        trigger: TriggerPayload,
        cancellation: CancellationToken,
    ) -> crate::Result<crate::models::Execution> {
        let logger = ExecutionLogger::new(self.storage.as_ref());
        let mut context = ExecutionContext::with_cancellation(
            execution_id.clone(),
            automation.id.clone(),
            user,
            trigger,
            cancellation,
        );

        logger
            .log_state_transition(&execution_id, ExecutionStatus::Pending, ExecutionStatus::Running, serde_json::Value::Null)
            .await?;
        let started_at = chrono::Utc::now();
        logger
            .update_execution_status(&execution_id, ExecutionStatus::Running, move |e| {
                e.started_at = Some(started_at);
            })
            .await?;

        let run_start = Instant::now();
        let failure = self.run_steps(automation, &mut context, &logger).await;

        let finished_at = chrono::Utc::now();
        let aggregate_duration_ms = run_start.elapsed().as_millis() as u64;
        let snapshot = context.persist_summary();

        match &failure {
            None => {
                logger
                    .log_state_transition(&execution_id, ExecutionStatus::Running, ExecutionStatus::Success, serde_json::Value::Null)
                    .await?;
                logger
                    .update_execution_status(&execution_id, ExecutionStatus::Success, move |e| {
                        e.finished_at = Some(finished_at);
                        e.aggregate_duration_ms = Some(aggregate_duration_ms);
                        e.context_snapshot = Some(snapshot);
                    })
                    .await?;
            }
            Some(cause) => {
                error!(execution = %execution_id, %cause, "execution failed");
                let message = cause.to_string();
                logger
                    .log_state_transition(
                        &execution_id,
                        ExecutionStatus::Running,
                        ExecutionStatus::Failed,
                        serde_json::json!({"error": message}),
                    )
                    .await?;
                logger
                    .update_execution_status(&execution_id, ExecutionStatus::Failed, move |e| {
                        e.finished_at = Some(finished_at);
                        e.aggregate_duration_ms = Some(aggregate_duration_ms);
                        e.context_snapshot = Some(snapshot);
                        e.error_message = Some(message);
                    })
                    .await?;
            }
        }

        self.storage
            .get_execution(&execution_id)
            .await?
            .ok_or_else(|| crate::CoreError::Internal("execution vanished mid-run".into()))
    }

    async fn run_steps(
        &self,
        automation: &Automation,
        context: &mut ExecutionContext,
        logger: &ExecutionLogger<'_>,
    ) -> Option<StepFailure> {
        for (zero_based, step) in automation.steps.iter().enumerate() {
            let step_index = zero_based + 1;

            let Some((_, handler)) = self.registry.lookup(&step.tool_type).await else {
                let suggestion = self.registry.suggest_similar(&step.tool_type).await;
                return Some(StepFailure::UnsupportedStep {
                    step_index,
                    tool_type: step.tool_type.clone(),
                    suggestion,
                });
            };
            let Some(handler) = handler else {
                let suggestion = self.registry.suggest_similar(&step.tool_type).await;
                return Some(StepFailure::UnsupportedStep {
                    step_index,
                    tool_type: step.tool_type.clone(),
                    suggestion,
                });
            };

            let mut attempt: u32 = 0;
            let step_start = Instant::now();
            loop {
                if context.cancellation.is_cancelled() {
                    return Some(StepFailure::Timeout { step_index });
                }

                let snapshot: StepContext = context.build_step_context();
                let resolved_params = resolver::resolve_params(&step.params, &snapshot);
                let params_value = serde_json::to_value(&resolved_params).unwrap_or_default();

                let outcome = handler.call(params_value, &snapshot).await;
                match outcome {
                    Ok(output) => {
                        let duration_ms = step_start.elapsed().as_millis() as u64;
                        let result = StepResult::succeeded(
                            step_index,
                            step.tool_type.clone(),
                            duration_ms,
                            attempt,
                            output.clone(),
                        );
                        if let Err(e) = logger.log_step_result(&context.execution_id, result).await {
                            return Some(StepFailure::Internal(e.to_string()));
                        }
                        context.store_step_output(step_index, output, step.output_as.as_deref());
                        break;
                    }
                    Err(err) => {
                        let classification = self.retry_policy.classify(&err);
                        if classification == Classification::Transient && attempt < retry::MAX_RETRIES {
                            let delay_ms = self.retry_policy.delay(attempt);
                            if let Err(e) = logger
                                .log_state_transition(
                                    &context.execution_id,
                                    ExecutionStatus::Running,
                                    ExecutionStatus::Retrying,
                                    serde_json::json!({
                                        "step_index": step_index,
                                        "attempt": attempt,
                                        "error": err.message,
                                        "delay_ms": delay_ms,
                                    }),
                                )
                                .await
                            {
                                return Some(StepFailure::Internal(e.to_string()));
                            }
                            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                            attempt += 1;
                            if let Err(e) = logger
                                .log_state_transition(
                                    &context.execution_id,
                                    ExecutionStatus::Retrying,
                                    ExecutionStatus::Running,
                                    serde_json::json!({"step_index": step_index, "next_attempt": attempt}),
                                )
                                .await
                            {
                                return Some(StepFailure::Internal(e.to_string()));
                            }
                            continue;
                        }

                        let duration_ms = step_start.elapsed().as_millis() as u64;
                        let result = StepResult::failed(
                            step_index,
                            step.tool_type.clone(),
                            duration_ms,
                            attempt,
                            err.to_string(),
                        );
                        let _ = logger.log_step_result(&context.execution_id, result).await;
                        return Some(StepFailure::StepFailed {
                            step_index,
                            tool_type: step.tool_type.clone(),
                            cause: err.to_string(),
                        });
                    }
                }
            }
        }
        info!(execution = %context.execution_id, "all steps completed");
        None
    }
}

impl From<HandlerError> for StepFailure {
    fn from(err: HandlerError) -> Self {
        StepFailure::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::InMemoryStorage;
    use crate::models::{Automation, AutomationId, Step, ToolCategory, ToolDefinition, Trigger};
    use std::sync::Arc;

    async fn registry_with(name: &str, ok: bool) -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .define(ToolDefinition::new(
                name,
                "1.0.0",
                "test",
                ToolCategory::Fetch,
                true,
                serde_json::json!({"type": "object"}),
            ))
            .await;
        let ok = ok;
        registry
            .bind(
                name,
                Arc::new(move |_p: serde_json::Value, _c: StepContext| {
                    let ok = ok;
                    async move {
                        if ok {
                            Ok(serde_json::json!({"price": "190.23"}))
                        } else {
                            Err(HandlerError::with_status("unauthorized", 401))
                        }
                    }
                }),
            )
            .await;
        registry
    }

    #[tokio::test]
    async fn happy_path_two_steps_succeeds() {
        let registry = registry_with("fetch_stock_price", true).await;
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let executor = WorkflowExecutor::new(registry, storage.clone());

        let automation = Automation::new(
            AutomationId::new("a1"),
            "daily-stock",
            Trigger::Interval { every: "5m".to_string() },
            vec![Step::new("fetch_stock_price").with_param("symbol", serde_json::json!("AAPL"))],
        );
        storage.put_automation(automation.clone()).await.unwrap();
        let execution_id = ExecutionId::new("e1");
        storage
            .put_execution(crate::models::Execution::new_pending(
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
                TriggerPayload::Interval,
            )
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.step_results.len(), 1);
        assert_eq!(execution.step_results[0].retries, 0);
    }

    #[tokio::test]
    async fn terminal_failure_stops_execution() {
        let registry = registry_with("fetch_stock_price", false).await;
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let executor = WorkflowExecutor::new(registry, storage.clone());

        let automation = Automation::new(
            AutomationId::new("a1"),
            "daily-stock",
            Trigger::Manual,
            vec![
                Step::new("fetch_stock_price"),
                Step::new("send_email"),
            ],
        );
        storage.put_automation(automation.clone()).await.unwrap();
        let execution_id = ExecutionId::new("e1");
        storage
            .put_execution(crate::models::Execution::new_pending(
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
                TriggerPayload::Manual,
            )
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.step_results.len(), 1);
        assert!(execution.step_results[0].is_error());
    }

    #[tokio::test]
    async fn unknown_tool_aborts_with_suggestion() {
        let registry = registry_with("fetch_stock_price", true).await;
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let executor = WorkflowExecutor::new(registry, storage.clone());

        let automation = Automation::new(
            AutomationId::new("a1"),
            "daily-stock",
            Trigger::Manual,
            vec![Step::new("fetch_stonk_price")],
        );
        storage.put_automation(automation.clone()).await.unwrap();
        let execution_id = ExecutionId::new("e1");
        storage
            .put_execution(crate::models::Execution::new_pending(
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
                TriggerPayload::Manual,
            )
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error_message.unwrap().contains("fetch_stock_price"));
        assert_eq!(execution.step_results.len(), 0);
    }
}
