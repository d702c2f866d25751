// Durable storage abstraction. `InMemoryStorage` backs tests and local
// development; `NatsStorage` (engine/nats_storage.rs) is the production
// backend, the synchronization point across executor instances.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{
    Automation, AutomationId, Execution, ExecutionId, ExecutionStatus, RssPollState, StateLog,
    StepResult,
};
use crate::{CoreError, Result};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn put_automation(&self, automation: Automation) -> Result<()>;
    async fn get_automation(&self, id: &AutomationId) -> Result<Option<Automation>>;
    async fn list_active_automations(&self) -> Result<Vec<Automation>>;
    /// Used by the Scheduler's rollback path: revert a status change that
    /// failed to apply at the scheduler level.
    async fn set_automation_status(
        &self,
        id: &AutomationId,
        status: crate::models::AutomationStatus,
    ) -> Result<()>;

    async fn put_execution(&self, execution: Execution) -> Result<()>;
    async fn get_execution(&self, id: &ExecutionId) -> Result<Option<Execution>>;

    async fn append_state_transition(
        &self,
        execution_id: &ExecutionId,
        from: ExecutionStatus,
        to: ExecutionStatus,
        metadata: serde_json::Value,
    ) -> Result<()>;
    async fn get_state_log(&self, execution_id: &ExecutionId) -> Result<StateLog>;

    async fn append_step_result(&self, execution_id: &ExecutionId, result: StepResult) -> Result<()>;

    /// Apply an arbitrary, in-process mutation to the stored execution and
    /// persist the resulting status.
    async fn update_execution(
        &self,
        execution_id: &ExecutionId,
        status: ExecutionStatus,
        mutate: Box<dyn FnOnce(&mut Execution) + Send>,
    ) -> Result<()>;

    async fn get_rss_state(&self, automation_id: &AutomationId) -> Result<Option<RssPollState>>;
    async fn put_rss_state(&self, state: RssPollState) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryStorage {
    automations: RwLock<HashMap<AutomationId, Automation>>,
    executions: RwLock<HashMap<ExecutionId, Execution>>,
    state_logs: RwLock<HashMap<ExecutionId, StateLog>>,
    rss_state: RwLock<HashMap<AutomationId, RssPollState>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put_automation(&self, automation: Automation) -> Result<()> {
        self.automations
            .write()
            .await
            .insert(automation.id.clone(), automation);
        Ok(())
    }

    async fn get_automation(&self, id: &AutomationId) -> Result<Option<Automation>> {
        Ok(self.automations.read().await.get(id).cloned())
    }

    async fn list_active_automations(&self) -> Result<Vec<Automation>> {
        Ok(self
            .automations
            .read()
            .await
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect())
    }

    async fn set_automation_status(
        &self,
        id: &AutomationId,
        status: crate::models::AutomationStatus,
    ) -> Result<()> {
        let mut automations = self.automations.write().await;
        let automation = automations
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("automation {}", id)))?;
        automation.status = status;
        Ok(())
    }

    async fn put_execution(&self, execution: Execution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.id.clone(), execution);
        Ok(())
    }

    async fn get_execution(&self, id: &ExecutionId) -> Result<Option<Execution>> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn append_state_transition(
        &self,
        execution_id: &ExecutionId,
        from: ExecutionStatus,
        to: ExecutionStatus,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let mut logs = self.state_logs.write().await;
        logs.entry(execution_id.clone())
            .or_default()
            .push(from, to, metadata);
        Ok(())
    }

    async fn get_state_log(&self, execution_id: &ExecutionId) -> Result<StateLog> {
        Ok(self
            .state_logs
            .read()
            .await
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_step_result(&self, execution_id: &ExecutionId, result: StepResult) -> Result<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| CoreError::NotFound(format!("execution {}", execution_id)))?;
        execution.step_results.push(result);
        Ok(())
    }

    async fn update_execution(
        &self,
        execution_id: &ExecutionId,
        status: ExecutionStatus,
        mutate: Box<dyn FnOnce(&mut Execution) + Send>,
    ) -> Result<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| CoreError::NotFound(format!("execution {}", execution_id)))?;
        execution.status = status;
        mutate(execution);
        Ok(())
    }

    async fn get_rss_state(&self, automation_id: &AutomationId) -> Result<Option<RssPollState>> {
        Ok(self.rss_state.read().await.get(automation_id).cloned())
    }

    async fn put_rss_state(&self, state: RssPollState) -> Result<()> {
        self.rss_state
            .write()
            .await
            .insert(state.automation_id.clone(), state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Trigger;

    #[tokio::test]
    async fn round_trips_automation_and_execution() {
        let storage = InMemoryStorage::new();
        let automation = Automation::new(AutomationId::new("a1"), "t", Trigger::Manual, vec![]);
        storage.put_automation(automation.clone()).await.unwrap();
        assert!(storage.get_automation(&automation.id).await.unwrap().is_some());

        let execution = Execution::new_pending(
            ExecutionId::new("e1"),
            automation.id,
            serde_json::Value::Null,
        );
        storage.put_execution(execution).await.unwrap();
        assert!(storage
            .get_execution(&ExecutionId::new("e1"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn rollback_restores_prior_status() {
        let storage = InMemoryStorage::new();
        let mut automation = Automation::new(AutomationId::new("a1"), "t", Trigger::Manual, vec![]);
        automation.status = crate::models::AutomationStatus::Draft;
        storage.put_automation(automation.clone()).await.unwrap();

        storage
            .set_automation_status(&automation.id, crate::models::AutomationStatus::Active)
            .await
            .unwrap();
        storage
            .set_automation_status(&automation.id, crate::models::AutomationStatus::Draft)
            .await
            .unwrap();

        let stored = storage.get_automation(&automation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, crate::models::AutomationStatus::Draft);
    }
}
