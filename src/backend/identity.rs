use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{error, warn};

use crate::{types::Principal, utils::error::EntitlementError};

/// Turns a bearer credential into the principal it belongs to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal, EntitlementError>;
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Asks the managed backend's auth API who owns the token.
pub struct RemoteIdentityProvider {
    client: Client,
    user_url: String,
    api_key: String,
    cache: Cache<String, Principal>,
}

impl RemoteIdentityProvider {
    pub fn new(
        auth_url: &str,
        api_key: String,
        cache_ttl: Duration,
        max_entries: u64,
    ) -> Result<Self, EntitlementError> {
        let client = Client::builder()
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(3))
            .use_rustls_tls()
            .build()?;

        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(cache_ttl)
            .build();

        Ok(Self {
            client,
            user_url: format!("{}/user", auth_url.trim_end_matches('/')),
            api_key,
            cache,
        })
    }

    async fn fetch(&self, token: &str) -> Result<Principal, EntitlementError> {
        let resp = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Identity provider unreachable");
                EntitlementError::Network(e.to_string())
            })?;

        match resp.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(EntitlementError::AuthenticationInvalid(
                    "credential rejected by identity provider".to_string(),
                ));
            }
            status => {
                warn!(status = %status, "Identity provider returned non-2xx");
                return Err(EntitlementError::Network(format!(
                    "identity provider returned HTTP {}",
                    status
                )));
            }
        }

        let user: UserResponse = resp.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse identity provider response");
            EntitlementError::InvalidResponse(e.to_string())
        })?;

        Ok(Principal::new(user.id, user.email.unwrap_or_default()))
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<Principal, EntitlementError> {
        if let Some(principal) = self.cache.get(token).await {
            return Ok(principal);
        }

        let principal = self.fetch(token).await?;
        self.cache
            .insert(token.to_string(), principal.clone())
            .await;
        Ok(principal)
    }
}

/// Fixed token table, for local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Principal>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<Principal, EntitlementError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| EntitlementError::AuthenticationInvalid("unknown token".to_string()))
    }
}
