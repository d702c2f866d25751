// Execution Logger — the write path for state transitions, step results,
// and execution status, with its own sanitization pass distinct from (but
// reusing the same helper as) Context Memory's persistence summary.

use tracing::info;

use crate::engine::sanitize::summarize;
use crate::engine::storage::Storage;
use crate::models::{Execution, ExecutionId, ExecutionStatus, StepResult};
use crate::Result;

const MAX_STRING_LEN: usize = 200;
const MAX_OBJECT_KEYS: usize = 8;

pub struct ExecutionLogger<'a> {
    storage: &'a dyn Storage,
}

impl<'a> ExecutionLogger<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    pub async fn log_state_transition(
        &self,
        execution_id: &ExecutionId,
        from: ExecutionStatus,
        to: ExecutionStatus,
        metadata: serde_json::Value,
    ) -> Result<()> {
        info!(execution = %execution_id, ?from, ?to, "state transition");
        let sanitized = summarize(&metadata, MAX_STRING_LEN, MAX_OBJECT_KEYS);
        self.storage
            .append_state_transition(execution_id, from, to, sanitized)
            .await
    }

    pub async fn update_execution_status(
        &self,
        execution_id: &ExecutionId,
        status: ExecutionStatus,
        mutate: impl FnOnce(&mut Execution) + Send,
    ) -> Result<()> {
        self.storage
            .update_execution(execution_id, status, Box::new(mutate))
            .await
    }

    pub async fn log_step_result(&self, execution_id: &ExecutionId, result: StepResult) -> Result<()> {
        let sanitized_output = result
            .output_summary
            .as_ref()
            .map(|v| summarize(v, MAX_STRING_LEN, MAX_OBJECT_KEYS));
        let mut result = result;
        result.output_summary = sanitized_output;
        info!(
            execution = %execution_id,
            step = result.step_index,
            tool = %result.tool_type,
            retries = result.retries,
            error = result.error.is_some(),
            "step result"
        );
        self.storage.append_step_result(execution_id, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::InMemoryStorage;
    use crate::models::{Automation, AutomationId, Trigger};

    #[tokio::test]
    async fn logs_round_trip_through_storage() {
        let storage = InMemoryStorage::new();
        let automation = Automation::new(
            AutomationId::new("a1"),
            "test",
            Trigger::Manual,
            vec![],
        );
        storage.put_automation(automation.clone()).await.unwrap();
        let execution = Execution::new_pending(
            ExecutionId::new("e1"),
            automation.id.clone(),
            serde_json::Value::Null,
        );
        storage.put_execution(execution).await.unwrap();

        let logger = ExecutionLogger::new(&storage);
        logger
            .log_state_transition(
                &ExecutionId::new("e1"),
                ExecutionStatus::Pending,
                ExecutionStatus::Running,
                serde_json::json!({}),
            )
            .await
            .unwrap();
        logger
            .log_step_result(
                &ExecutionId::new("e1"),
                StepResult::succeeded(1, "fetch_stock_price", 12, 0, serde_json::json!({"price": "1"})),
            )
            .await
            .unwrap();

        let stored = storage.get_execution(&ExecutionId::new("e1")).await.unwrap().unwrap();
        assert_eq!(stored.step_results.len(), 1);
    }
}
