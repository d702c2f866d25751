// Scheduler — converts `interval`/`daily` triggers into cron jobs and
// keeps a job table in sync with each automation's `status` field.
//
// Atomicity between the in-memory job table and the persisted status is
// best-effort: update the store, then try to apply at the scheduler, and
// roll the store back on scheduler failure. This mirrors a small window
// of inconsistency rather than strengthening it with a distributed lock
// (see DESIGN.md for the reasoning).

use dashmap::DashMap;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::context::TriggerPayload;
use crate::engine::storage::Storage;
use crate::engine::WorkflowExecutor;
use crate::models::{Automation, AutomationId, AutomationStatus, ExecutionId, IntervalUnit, Trigger, UserIdentity};
use crate::{CoreError, Result};

pub struct Scheduler {
    inner: JobScheduler,
    jobs: DashMap<AutomationId, Uuid>,
    executor: Arc<WorkflowExecutor>,
    storage: Arc<dyn Storage>,
}

impl Scheduler {
    pub async fn new(executor: Arc<WorkflowExecutor>, storage: Arc<dyn Storage>) -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .map_err(|e| CoreError::Internal(format!("failed to start job scheduler: {}", e)))?;
        Ok(Self {
            inner,
            jobs: DashMap::new(),
            executor,
            storage,
        })
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .map_err(|e| CoreError::Internal(format!("failed to start job scheduler loop: {}", e)))
    }

    /// On process start: load every active, schedulable automation and
    /// schedule it.
    pub async fn load_active(&self) -> Result<()> {
        for automation in self.storage.list_active_automations().await? {
            if automation.trigger.is_schedulable() {
                if let Err(e) = self.schedule(&automation).await {
                    warn!(automation = %automation.id, error = %e, "failed to schedule automation at startup");
                }
            }
        }
        Ok(())
    }

    /// Handle a `* -> active` status transition: schedule the job and run
    /// it once immediately in the background, rolling the persisted
    /// status back if scheduling fails.
    pub async fn activate(&self, automation: &Automation) -> Result<()> {
        if !automation.trigger.is_schedulable() {
            return Ok(());
        }
        match self.schedule(automation).await {
            Ok(()) => {
                self.run_once_in_background(automation.clone());
                Ok(())
            }
            Err(e) => {
                warn!(automation = %automation.id, error = %e, "scheduler activation failed, rolling back status");
                self.storage
                    .set_automation_status(&automation.id, AutomationStatus::Draft)
                    .await?;
                Err(e)
            }
        }
    }

    pub async fn deactivate(&self, automation_id: &AutomationId) -> Result<()> {
        if let Some((_, job_id)) = self.jobs.remove(automation_id) {
            self.inner
                .remove(&job_id)
                .await
                .map_err(|e| CoreError::Internal(format!("failed to remove job: {}", e)))?;
        }
        Ok(())
    }

    async fn schedule(&self, automation: &Automation) -> Result<()> {
        let cron_expr = cron_expression(&automation.trigger)?;
        let executor = self.executor.clone();
        let storage = self.storage.clone();
        let automation_id = automation.id.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let executor = executor.clone();
            let storage = storage.clone();
            let automation_id = automation_id.clone();
            Box::pin(async move {
                if let Err(e) = run_tick(executor, storage, automation_id.clone()).await {
                    warn!(automation = %automation_id, error = %e, "scheduled tick failed");
                }
            })
        })
        .map_err(|e| CoreError::Internal(format!("invalid cron expression {:?}: {}", cron_expr, e)))?;

        let job_id = self
            .inner
            .add(job)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to add job: {}", e)))?;

        if let Some(old) = self.jobs.insert(automation.id.clone(), job_id) {
            let _ = self.inner.remove(&old).await;
        }
        Ok(())
    }

    fn run_once_in_background(&self, automation: Automation) {
        let executor = self.executor.clone();
        let storage = self.storage.clone();
        tokio::spawn(async move {
            let automation_id = automation.id.clone();
            if let Err(e) = run_tick(executor, storage, automation_id.clone()).await {
                warn!(automation = %automation_id, error = %e, "immediate activation run failed");
            }
        });
    }

    pub fn active_job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Cancel every scheduled job without touching persisted automation
    /// status, for graceful shutdown (spec §5): stop producing new
    /// scheduled executions while in-flight ones run to a commit boundary.
    pub async fn shutdown_jobs(&self) {
        let ids: Vec<AutomationId> = self.jobs.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, job_id)) = self.jobs.remove(&id) {
                if let Err(e) = self.inner.remove(&job_id).await {
                    warn!(automation = %id, error = %e, "failed to remove job during shutdown");
                }
            }
        }
    }
}

async fn run_tick(executor: Arc<WorkflowExecutor>, storage: Arc<dyn Storage>, automation_id: AutomationId) -> Result<()> {
    let Some(automation) = storage.get_automation(&automation_id).await? else {
        return Ok(());
    };
    if !automation.is_active() {
        return Ok(());
    }
    let execution_id = ExecutionId::generate();
    let execution = crate::models::Execution::new_pending(
        execution_id.clone(),
        automation.id.clone(),
        serde_json::Value::Null,
    );
    storage.put_execution(execution).await?;

    let trigger_payload = match &automation.trigger {
        Trigger::Interval { .. } => TriggerPayload::Interval,
        Trigger::Daily { .. } => TriggerPayload::Daily,
        _ => TriggerPayload::Manual,
    };
    info!(automation = %automation_id, execution = %execution_id, "scheduler tick firing");
    executor
        .execute(&automation, execution_id, UserIdentity::new("scheduler", ""), trigger_payload)
        .await?;
    Ok(())
}

/// Convert a schedulable trigger into the 6-field (seconds-prefixed) cron
/// expression `tokio-cron-scheduler` expects.
fn cron_expression(trigger: &Trigger) -> Result<String> {
    match trigger {
        Trigger::Interval { every } => {
            let interval = crate::models::Interval::parse(every)?;
            Ok(match interval.unit {
                // Sub-minute intervals are coerced to run once a minute;
                // the underlying cron layer has 1-minute resolution.
                IntervalUnit::Seconds => "0 * * * * *".to_string(),
                IntervalUnit::Minutes => format!("0 */{} * * * *", interval.value),
                IntervalUnit::Hours => format!("0 0 */{} * * *", interval.value),
                IntervalUnit::Days => format!("0 0 0 */{} * *", interval.value),
                // Weekly cadence is pinned to Sunday at midnight; the `N`
                // multiplier isn't representable in standard cron and is
                // not honored beyond "runs weekly" (see DESIGN.md).
                IntervalUnit::Weeks => "0 0 0 * * Sun".to_string(),
            })
        }
        Trigger::Daily { at } => {
            let time = crate::models::TimeOfDay::parse(at)?;
            Ok(format!("0 {} {} * * *", time.minute, time.hour))
        }
        _ => Err(CoreError::Internal(
            "cron_expression called on a non-schedulable trigger".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_interval_converts_to_cron() {
        let trigger = Trigger::Interval { every: "5m".to_string() };
        assert_eq!(cron_expression(&trigger).unwrap(), "0 */5 * * * *");
    }

    #[test]
    fn daily_converts_to_cron() {
        let trigger = Trigger::Daily { at: "09:05".to_string() };
        assert_eq!(cron_expression(&trigger).unwrap(), "0 5 9 * * *");
    }

    #[test]
    fn sub_minute_seconds_coerced_to_one_minute() {
        let trigger = Trigger::Interval { every: "30s".to_string() };
        assert_eq!(cron_expression(&trigger).unwrap(), "0 * * * * *");
    }
}
