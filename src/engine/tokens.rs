// Per-user OAuth token store, supplemental to the execution core proper:
// several integrations rely on per-user tokens (sheets, mail, drive,
// calendar, …) stored alongside the user record. The token store is the
// source of truth for connection status per service; refresh-on-expiry is
// transparent to the handler through `token_for`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp <= Utc::now()).unwrap_or(false)
    }
}

/// A service able to exchange a refresh token for a fresh access token.
/// Implemented per-integration (Google, Slack, …) outside this crate.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, service: &str, token: &OAuthToken) -> Result<OAuthToken>;
}

#[async_trait]
pub trait IntegrationTokenStore: Send + Sync {
    async fn get(&self, user_id: &str, service: &str) -> Result<Option<OAuthToken>>;
    async fn put(&self, user_id: &str, service: &str, token: OAuthToken) -> Result<()>;
    async fn remove(&self, user_id: &str, service: &str) -> Result<()>;

    /// Return a live token for `user_id`/`service`, transparently
    /// refreshing through `refresher` when the stored one has expired.
    async fn token_for(
        &self,
        user_id: &str,
        service: &str,
        refresher: &dyn TokenRefresher,
    ) -> Result<OAuthToken> {
        let token = self
            .get(user_id, service)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no {} token for user {}", service, user_id)))?;
        if !token.is_expired() {
            return Ok(token);
        }
        let refreshed = refresher.refresh(service, &token).await?;
        self.put(user_id, service, refreshed.clone()).await?;
        Ok(refreshed)
    }
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<(String, String), OAuthToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationTokenStore for InMemoryTokenStore {
    async fn get(&self, user_id: &str, service: &str) -> Result<Option<OAuthToken>> {
        Ok(self
            .tokens
            .read()
            .await
            .get(&(user_id.to_string(), service.to_string()))
            .cloned())
    }

    async fn put(&self, user_id: &str, service: &str, token: OAuthToken) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert((user_id.to_string(), service.to_string()), token);
        Ok(())
    }

    async fn remove(&self, user_id: &str, service: &str) -> Result<()> {
        self.tokens
            .write()
            .await
            .remove(&(user_id.to_string(), service.to_string()));
        Ok(())
    }
}
