use serde_json::Value;
use tracing::warn;

use super::ManagementClient;
use super::types::{Envelope, ModelInfo};
use crate::error::ApiError;

impl ManagementClient {
    /// Latest released version, as reported by the backend
    pub async fn latest_version(&self) -> Result<String, ApiError> {
        let doc = self.get("/latest-version", &[]).await?.into_json();
        Ok(Envelope::LATEST_VERSION
            .pick(&doc)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .unwrap_or("Unknown")
            .to_string())
    }

    /// Model catalog from `/v1/models`.
    ///
    /// This endpoint lives outside the management API: failures are logged and
    /// yield an empty list, and a 401 here never revokes the session.
    pub async fn available_models(&self) -> Vec<ModelInfo> {
        match self.fetch_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!("Failed to fetch models: {e}");
                Vec::new()
            }
        }
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>, ApiError> {
        if self.is_revoked() {
            return Err(ApiError::Unauthorized);
        }
        let response = self
            .inner
            .http
            .get(self.public_url("/v1/models")?)
            .bearer_auth(&self.inner.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let doc: Value = response.json().await?;
        Envelope::MODELS.unwrap_list(doc)
    }
}
