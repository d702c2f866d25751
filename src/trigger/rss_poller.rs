// RSS Poller — ticks at the trigger's interval, diffs the feed against a
// per-automation seen-set, and invokes the executor only on new items.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::engine::context::TriggerPayload;
use crate::engine::storage::Storage;
use crate::engine::WorkflowExecutor;
use crate::models::{Automation, Execution, ExecutionId, RssPollState, Trigger, UserIdentity};
use crate::{CoreError, Result};

const FETCH_TIMEOUT_SECS: u64 = 15;
const USER_AGENT: &str = "automation-core-rss-poller/1.0";

struct FeedItem {
    id: String,
    published: Option<DateTime<Utc>>,
    value: serde_json::Value,
}

pub struct RssPoller {
    client: reqwest::Client,
    executor: Arc<WorkflowExecutor>,
    storage: Arc<dyn Storage>,
    seen_set_cap: usize,
}

impl RssPoller {
    pub fn new(executor: Arc<WorkflowExecutor>, storage: Arc<dyn Storage>, seen_set_cap: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| CoreError::Internal(format!("failed to build RSS http client: {}", e)))?;
        Ok(Self {
            client,
            executor,
            storage,
            seen_set_cap,
        })
    }

    /// Run one poll tick for `automation`. No-op if the trigger isn't
    /// `rss`. Atomicity note: the seen-set is persisted *before* the
    /// executor is invoked, so a slow execution can't produce duplicate
    /// triggers on the next tick.
    pub async fn poll(&self, automation: &Automation) -> Result<()> {
        let Trigger::Rss { url, .. } = &automation.trigger else {
            return Ok(());
        };

        let existing_state = self.storage.get_rss_state(&automation.id).await?;
        let is_first_poll = existing_state.is_none();
        let mut state = existing_state
            .unwrap_or_else(|| RssPollState::with_cap(automation.id.clone(), self.seen_set_cap));

        let items = self.fetch_feed(url).await?;
        let last_poll_time = state.last_poll_time;

        // The very first poll for an automation only establishes the
        // baseline seen-set; every item present at that point is "already
        // known", not newly arrived (spec S6).
        let new_items: Vec<&FeedItem> = if is_first_poll {
            Vec::new()
        } else {
            items
                .iter()
                .filter(|item| {
                    !state.has_seen(&item.id)
                        && last_poll_time
                            .map(|t| item.published.map(|p| p > t).unwrap_or(true))
                            .unwrap_or(true)
                })
                .collect()
        };

        for item in items.iter().take(100.min(items.len())) {
            state.mark_seen(item.id.clone());
        }
        state.last_poll_time = Some(Utc::now());
        state.last_feed_url = Some(url.clone());
        self.storage.put_rss_state(state).await?;

        if new_items.is_empty() {
            return Ok(());
        }

        let new_items_value: Vec<serde_json::Value> = new_items.iter().map(|i| i.value.clone()).collect();
        let execution_id = ExecutionId::generate();
        self.storage
            .put_execution(Execution::new_pending(
                execution_id.clone(),
                automation.id.clone(),
                serde_json::json!({ "rssNewItems": new_items_value }),
            ))
            .await?;

        info!(automation = %automation.id, new_items = new_items.len(), "rss poll produced new items");
        self.executor
            .execute(
                automation,
                execution_id,
                UserIdentity::new("rss-poller", ""),
                TriggerPayload::Rss {
                    feed_url: url.clone(),
                    new_items: serde_json::Value::Array(new_items_value),
                },
            )
            .await?;
        Ok(())
    }

    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedItem>> {
        // Reject a malformed feed URL with a clear validation error before
        // handing it to reqwest, rather than surfacing reqwest's opaque
        // "builder error" for the same input.
        let parsed = url::Url::parse(url)
            .map_err(|e| CoreError::Validation(format!("invalid rss feed url {:?}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CoreError::Validation(format!(
                "rss feed url {:?} must be http or https, got scheme {:?}",
                url,
                parsed.scheme()
            )));
        }

        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::Storage(anyhow::anyhow!("rss fetch failed: {}", e)))?
            .bytes()
            .await
            .map_err(|e| CoreError::Storage(anyhow::anyhow!("rss body read failed: {}", e)))?;

        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| CoreError::Validation(format!("failed to parse feed: {}", e)))?;

        Ok(feed
            .entries
            .into_iter()
            .map(|entry| {
                let id = if !entry.id.is_empty() {
                    entry.id.clone()
                } else if let Some(link) = entry.links.first() {
                    link.href.clone()
                } else {
                    entry.title.as_ref().map(|t| t.content.clone()).unwrap_or_default()
                };
                let published = entry.published.or(entry.updated);
                let value = serde_json::json!({
                    "id": id,
                    "title": entry.title.as_ref().map(|t| t.content.clone()),
                    "link": entry.links.first().map(|l| l.href.clone()),
                    "published": published.map(|p| p.to_rfc3339()),
                });
                FeedItem { id, published, value }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::InMemoryStorage;
    use crate::models::AutomationId;

    #[tokio::test]
    async fn non_rss_trigger_is_a_noop() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let registry = Arc::new(crate::engine::ToolRegistry::new());
        let executor = Arc::new(WorkflowExecutor::new(registry, storage.clone()));
        let poller = RssPoller::new(executor, storage.clone(), 100).unwrap();

        let automation = Automation::new(AutomationId::new("a1"), "t", Trigger::Manual, vec![]);
        poller.poll(&automation).await.unwrap();
        assert!(storage.get_rss_state(&automation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_feed_rejects_non_http_scheme() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let registry = Arc::new(crate::engine::ToolRegistry::new());
        let executor = Arc::new(WorkflowExecutor::new(registry, storage.clone()));
        let poller = RssPoller::new(executor, storage, 100).unwrap();

        let err = poller.fetch_feed("ftp://example.com/feed.xml").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn fetch_feed_rejects_malformed_url() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let registry = Arc::new(crate::engine::ToolRegistry::new());
        let executor = Arc::new(WorkflowExecutor::new(registry, storage.clone()));
        let poller = RssPoller::new(executor, storage, 100).unwrap();

        let err = poller.fetch_feed("not-a-url").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
