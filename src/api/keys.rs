use reqwest::Method;
use serde_json::json;
use tracing::warn;

use super::ManagementClient;
use super::types::{ApiKeyLimit, Envelope};
use crate::error::ApiError;

/// Outcome of the limit cleanup that follows a key deletion
#[derive(Debug)]
pub enum LimitCleanup {
    Removed,
    /// The key had no limit; the backend answered 404
    NotPresent,
    /// The key is gone but its limit could not be removed
    Failed(ApiError),
}

impl ManagementClient {
    pub async fn api_keys(&self) -> Result<Vec<String>, ApiError> {
        let doc = self.get("/api-keys", &[]).await?.into_json();
        Envelope::API_KEYS.unwrap_list(doc)
    }

    pub async fn add_api_key(&self, key: &str) -> Result<(), ApiError> {
        self.rename_api_key("", key).await
    }

    /// Replace `old` with `new`; an empty `old` appends
    pub async fn rename_api_key(&self, old: &str, new: &str) -> Result<(), ApiError> {
        self.send_json(Method::PATCH, "/api-keys", &[], &json!({ "old": old, "new": new }))
            .await?;
        Ok(())
    }

    /// Delete a key, then its limit.
    ///
    /// The limit is removed on a best-effort basis: the key deletion is not
    /// rolled back when the cleanup fails.
    pub async fn delete_api_key(&self, key: &str) -> Result<LimitCleanup, ApiError> {
        self.delete("/api-keys", &[("value", key)]).await?;

        Ok(match self.delete_api_key_limit(key).await {
            Ok(()) => LimitCleanup::Removed,
            Err(e) if e.is_not_found() => LimitCleanup::NotPresent,
            Err(e) => {
                warn!("API key deleted but its limit was not: {e}");
                LimitCleanup::Failed(e)
            }
        })
    }

    // --- Per-key limits ---

    pub async fn api_key_limits(&self) -> Result<Vec<ApiKeyLimit>, ApiError> {
        let doc = self.get("/api-key-limits", &[]).await?.into_json();
        Envelope::API_KEY_LIMITS.unwrap_list(doc)
    }

    /// Add or update the limit of `limit.api_key`
    pub async fn upsert_api_key_limit(&self, limit: &ApiKeyLimit) -> Result<(), ApiError> {
        self.send_json(Method::PATCH, "/api-key-limits", &[], limit)
            .await?;
        Ok(())
    }

    pub async fn replace_api_key_limits(&self, limits: &[ApiKeyLimit]) -> Result<(), ApiError> {
        self.send_json(
            Method::PUT,
            "/api-key-limits",
            &[],
            &json!({ "api_key_limits": limits }),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_api_key_limit(&self, key: &str) -> Result<(), ApiError> {
        self.delete("/api-key-limits", &[("api_key", key)]).await?;
        Ok(())
    }
}
