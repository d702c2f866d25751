// NATS JetStream-backed storage: the production `Storage` implementation,
// and the synchronization point across executor instances. Each
// collection from the persisted layout becomes a JetStream key-value
// bucket, keyed by the natural id and holding a JSON-encoded document.

use async_trait::async_trait;
use async_nats::jetstream::{self, kv};

use crate::models::{
    Automation, AutomationId, AutomationStatus, Execution, ExecutionId, ExecutionStatus,
    RssPollState, StateLog, StepResult,
};
use crate::{engine::storage::Storage, CoreError, Result};

const AUTOMATIONS_BUCKET: &str = "automations";
const EXECUTIONS_BUCKET: &str = "executions";
const STATE_LOGS_BUCKET: &str = "state_logs";
const RSS_STATE_BUCKET: &str = "rss_poll_state";

pub struct NatsStorage {
    automations: kv::Store,
    executions: kv::Store,
    state_logs: kv::Store,
    rss_state: kv::Store,
}

impl NatsStorage {
    pub async fn connect(nats_url: &str) -> Result<Self> {
        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to connect to NATS at {}: {}", nats_url, e)))?;
        let js = jetstream::new(client);

        Ok(Self {
            automations: open_bucket(&js, AUTOMATIONS_BUCKET).await?,
            executions: open_bucket(&js, EXECUTIONS_BUCKET).await?,
            state_logs: open_bucket(&js, STATE_LOGS_BUCKET).await?,
            rss_state: open_bucket(&js, RSS_STATE_BUCKET).await?,
        })
    }
}

async fn open_bucket(js: &jetstream::Context, bucket: &str) -> Result<kv::Store> {
    let config = kv::Config {
        bucket: bucket.to_string(),
        ..Default::default()
    };
    match js.create_key_value(config.clone()).await {
        Ok(store) => Ok(store),
        Err(_) => js
            .get_key_value(bucket)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to open KV bucket {}: {}", bucket, e))),
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(store: &kv::Store, key: &str) -> Result<Option<T>> {
    match store.get(key).await {
        Ok(Some(bytes)) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(CoreError::Storage(anyhow::anyhow!(e.to_string()))),
    }
}

async fn put_json<T: serde::Serialize>(store: &kv::Store, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store
        .put(key, bytes.into())
        .await
        .map_err(|e| CoreError::Storage(anyhow::anyhow!(e.to_string())))?;
    Ok(())
}

#[async_trait]
impl Storage for NatsStorage {
    async fn put_automation(&self, automation: Automation) -> Result<()> {
        put_json(&self.automations, automation.id.as_str(), &automation).await
    }

    async fn get_automation(&self, id: &AutomationId) -> Result<Option<Automation>> {
        get_json(&self.automations, id.as_str()).await
    }

    async fn list_active_automations(&self) -> Result<Vec<Automation>> {
        let keys = self
            .automations
            .keys()
            .await
            .map_err(|e| CoreError::Storage(anyhow::anyhow!(e.to_string())))?;
        use futures::TryStreamExt;
        let keys: Vec<String> = keys
            .try_collect()
            .await
            .map_err(|e| CoreError::Storage(anyhow::anyhow!(e.to_string())))?;
        let mut out = Vec::new();
        for key in keys {
            if let Some(automation) = get_json::<Automation>(&self.automations, &key).await? {
                if automation.is_active() {
                    out.push(automation);
                }
            }
        }
        Ok(out)
    }

    async fn set_automation_status(&self, id: &AutomationId, status: AutomationStatus) -> Result<()> {
        let mut automation = self
            .get_automation(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("automation {}", id)))?;
        automation.status = status;
        self.put_automation(automation).await
    }

    async fn put_execution(&self, execution: Execution) -> Result<()> {
        put_json(&self.executions, execution.id.as_str(), &execution).await
    }

    async fn get_execution(&self, id: &ExecutionId) -> Result<Option<Execution>> {
        get_json(&self.executions, id.as_str()).await
    }

    async fn append_state_transition(
        &self,
        execution_id: &ExecutionId,
        from: ExecutionStatus,
        to: ExecutionStatus,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let mut log = self.get_state_log(execution_id).await?;
        log.push(from, to, metadata);
        put_json(&self.state_logs, execution_id.as_str(), &log).await
    }

    async fn get_state_log(&self, execution_id: &ExecutionId) -> Result<StateLog> {
        Ok(get_json(&self.state_logs, execution_id.as_str())
            .await?
            .unwrap_or_default())
    }

    async fn append_step_result(&self, execution_id: &ExecutionId, result: StepResult) -> Result<()> {
        let mut execution = self
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("execution {}", execution_id)))?;
        execution.step_results.push(result);
        self.put_execution(execution).await
    }

    async fn update_execution(
        &self,
        execution_id: &ExecutionId,
        status: ExecutionStatus,
        mutate: Box<dyn FnOnce(&mut Execution) + Send>,
    ) -> Result<()> {
        let mut execution = self
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("execution {}", execution_id)))?;
        execution.status = status;
        mutate(&mut execution);
        self.put_execution(execution).await
    }

    async fn get_rss_state(&self, automation_id: &AutomationId) -> Result<Option<RssPollState>> {
        get_json(&self.rss_state, automation_id.as_str()).await
    }

    async fn put_rss_state(&self, state: RssPollState) -> Result<()> {
        put_json(&self.rss_state, state.automation_id.as_str(), &state).await
    }
}
