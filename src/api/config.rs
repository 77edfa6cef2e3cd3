use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use super::types::{AmpcodeSettings, Envelope, ServerConfig, ServerVersion};
use super::{Body, ManagementClient};
use crate::constants::VERSION_HEADER;
use crate::error::ApiError;

/// Boolean server settings exposed as individual endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Debug,
    LoggingToFile,
    UsageStatistics,
    RequestLog,
    WsAuth,
    ForceModelPrefix,
    SwitchProject,
    SwitchPreviewModel,
    AmpForceModelMappings,
    AmpRestrictToLocalhost,
}

impl Toggle {
    pub const ALL: [Toggle; 10] = [
        Toggle::Debug,
        Toggle::LoggingToFile,
        Toggle::UsageStatistics,
        Toggle::RequestLog,
        Toggle::WsAuth,
        Toggle::ForceModelPrefix,
        Toggle::SwitchProject,
        Toggle::SwitchPreviewModel,
        Toggle::AmpForceModelMappings,
        Toggle::AmpRestrictToLocalhost,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Toggle::Debug => "/debug",
            Toggle::LoggingToFile => "/logging-to-file",
            Toggle::UsageStatistics => "/usage-statistics-enabled",
            Toggle::RequestLog => "/request-log",
            Toggle::WsAuth => "/ws-auth",
            Toggle::ForceModelPrefix => "/force-model-prefix",
            Toggle::SwitchProject => "/quota-exceeded/switch-project",
            Toggle::SwitchPreviewModel => "/quota-exceeded/switch-preview-model",
            Toggle::AmpForceModelMappings => "/ampcode/force-model-mappings",
            Toggle::AmpRestrictToLocalhost => "/ampcode/restrict-management-to-localhost",
        }
    }

    /// JSON key the backend expects the flag under
    fn body_key(self) -> &'static str {
        match self {
            Toggle::Debug
            | Toggle::LoggingToFile
            | Toggle::UsageStatistics
            | Toggle::RequestLog => "enabled",
            _ => "value",
        }
    }

    /// Form/URL identifier
    pub fn slug(self) -> &'static str {
        self.path().trim_start_matches('/')
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.slug() == slug)
    }

    pub fn label(self) -> &'static str {
        match self {
            Toggle::Debug => "Debug Mode",
            Toggle::LoggingToFile => "Logging to File",
            Toggle::UsageStatistics => "Usage Statistics",
            Toggle::RequestLog => "Request Logging",
            Toggle::WsAuth => "WebSocket Authentication",
            Toggle::ForceModelPrefix => "Force Model Prefix",
            Toggle::SwitchProject => "Switch Project on Quota Exceeded",
            Toggle::SwitchPreviewModel => "Switch to Preview Model on Quota Exceeded",
            Toggle::AmpForceModelMappings => "Force Model Mappings",
            Toggle::AmpRestrictToLocalhost => "Restrict Management to Localhost",
        }
    }

    pub fn current(self, config: &ServerConfig, amp: &AmpcodeSettings) -> bool {
        match self {
            Toggle::Debug => config.debug,
            Toggle::LoggingToFile => config.logging_to_file,
            Toggle::UsageStatistics => config.usage_statistics_enabled,
            Toggle::RequestLog => config.request_log,
            Toggle::WsAuth => config.ws_auth,
            Toggle::ForceModelPrefix => config.force_model_prefix,
            Toggle::SwitchProject => config.quota_exceeded.switch_project,
            Toggle::SwitchPreviewModel => config.quota_exceeded.switch_preview_model,
            Toggle::AmpForceModelMappings => amp.force_model_mappings,
            Toggle::AmpRestrictToLocalhost => amp.restrict_management_to_localhost,
        }
    }
}

impl ManagementClient {
    pub async fn config(&self) -> Result<ServerConfig, ApiError> {
        self.get_as("/config", &[]).await
    }

    /// Version from the `X-CPA-VERSION` header of `GET /config`
    pub async fn server_version(&self) -> Result<ServerVersion, ApiError> {
        let response = self.send(Method::GET, "/config", &[], Body::Empty).await?;
        Ok(ServerVersion {
            version: version_from_headers(response.headers()),
            status: response.status().as_u16(),
        })
    }

    pub async fn config_yaml(&self) -> Result<String, ApiError> {
        Ok(self.get("/config.yaml", &[]).await?.into_text())
    }

    /// Store the YAML document exactly as given
    pub async fn save_config_yaml(&self, yaml: &str) -> Result<(), ApiError> {
        self.call(
            Method::PUT,
            "/config.yaml",
            &[],
            Body::Raw {
                content_type: "application/yaml",
                body: yaml.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    pub async fn set_toggle(&self, toggle: Toggle, enabled: bool) -> Result<(), ApiError> {
        let mut body = serde_json::Map::new();
        body.insert(toggle.body_key().to_string(), Value::Bool(enabled));
        self.send_json(Method::PUT, toggle.path(), &[], &body).await?;
        Ok(())
    }

    /// Empty URL removes the proxy
    pub async fn set_proxy_url(&self, url: &str) -> Result<(), ApiError> {
        let url = url.trim();
        if url.is_empty() {
            self.delete("/proxy-url", &[]).await?;
        } else {
            self.send_json(Method::PUT, "/proxy-url", &[], &json!({ "proxy_url": url }))
                .await?;
        }
        Ok(())
    }

    pub async fn set_request_retry(&self, count: u32) -> Result<(), ApiError> {
        self.put_value("/request-retry", json!(count)).await
    }

    pub async fn set_max_retry_interval(&self, seconds: u32) -> Result<(), ApiError> {
        self.put_value("/max-retry-interval", json!(seconds)).await
    }

    pub async fn set_logs_max_total_size(&self, megabytes: u64) -> Result<(), ApiError> {
        self.put_value("/logs-max-total-size-mb", json!(megabytes))
            .await
    }

    pub async fn set_routing_strategy(&self, strategy: &str) -> Result<(), ApiError> {
        self.put_value("/routing/strategy", json!(strategy)).await
    }

    pub(crate) async fn put_value(&self, path: &str, value: Value) -> Result<(), ApiError> {
        self.send_json(Method::PUT, path, &[], &json!({ "value": value }))
            .await?;
        Ok(())
    }

    // --- Amp code ---

    pub async fn ampcode(&self) -> Result<AmpcodeSettings, ApiError> {
        let doc = self.get("/ampcode", &[]).await?.into_json();
        Ok(serde_json::from_value(Envelope::AMPCODE.unwrap_or_self(doc))?)
    }

    /// Empty URL removes the upstream override
    pub async fn set_amp_upstream_url(&self, url: &str) -> Result<(), ApiError> {
        self.put_or_delete("/ampcode/upstream-url", url.trim()).await
    }

    pub async fn set_amp_upstream_api_key(&self, key: &str) -> Result<(), ApiError> {
        self.put_or_delete("/ampcode/upstream-api-key", key.trim())
            .await
    }

    pub async fn set_amp_model_mappings(&self, mappings: Value) -> Result<(), ApiError> {
        self.put_value("/ampcode/model-mappings", mappings).await
    }

    async fn put_or_delete(&self, path: &str, value: &str) -> Result<(), ApiError> {
        if value.is_empty() {
            self.delete(path, &[]).await?;
            Ok(())
        } else {
            self.put_value(path, json!(value)).await
        }
    }
}

fn version_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
