//! Typed read models of the management API.
//!
//! The backend is not consistent about key spelling (`api-key`, `apiKey`,
//! `api_key`) or about wrapping lists in an object. Every response is decoded
//! here, once, so screens only ever see these types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::ApiError;
use crate::model_pattern::match_model;

// --- Envelopes ---

/// Accepted spellings of the key a payload may be wrapped under
#[derive(Debug, Clone, Copy)]
pub struct Envelope(&'static [&'static str]);

impl Envelope {
    pub const API_KEYS: Envelope = Envelope(&["api-keys", "api_keys", "apiKeys"]);
    pub const API_KEY_LIMITS: Envelope =
        Envelope(&["api_key_limits", "api-key-limits", "apiKeyLimits"]);
    pub const GEMINI_KEYS: Envelope = Envelope(&["gemini-api-key", "geminiApiKey"]);
    pub const CLAUDE_KEYS: Envelope = Envelope(&["claude-api-key", "claudeApiKey"]);
    pub const CODEX_KEYS: Envelope = Envelope(&["codex-api-key", "codexApiKey"]);
    pub const VERTEX_KEYS: Envelope = Envelope(&["vertex-api-key", "vertexApiKey"]);
    pub const OPENAI_COMPAT: Envelope =
        Envelope(&["openai-compatibility", "openaiCompatibility"]);
    pub const AUTH_FILES: Envelope = Envelope(&["files", "auth-files", "auth_files"]);
    pub const ERROR_LOG_FILES: Envelope = Envelope(&["files"]);
    pub const MODELS: Envelope = Envelope(&["data", "models"]);
    pub const USAGE: Envelope = Envelope(&["usage"]);
    pub const EXCLUDED_MODELS: Envelope =
        Envelope(&["oauth-excluded-models", "oauthExcludedModels"]);
    pub const MODEL_MAPPINGS: Envelope =
        Envelope(&["oauth-model-mappings", "oauthModelMappings"]);
    pub const AMPCODE: Envelope = Envelope(&["ampcode"]);
    pub const LATEST_VERSION: Envelope =
        Envelope(&["latest-version", "latest_version", "latest"]);

    /// First non-null value stored under one of the accepted keys
    pub fn pick<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.0
            .iter()
            .find_map(|key| doc.get(*key).filter(|v| !v.is_null()))
    }

    fn take(&self, doc: Value) -> Option<Value> {
        match doc {
            Value::Object(mut map) => self
                .0
                .iter()
                .find_map(|key| map.remove(*key).filter(|v| !v.is_null())),
            _ => None,
        }
    }

    /// Decode a list that may be bare or wrapped; a missing key is an empty list
    pub fn unwrap_list<T: DeserializeOwned>(&self, doc: Value) -> Result<Vec<T>, ApiError> {
        let list = match doc {
            Value::Array(_) => doc,
            other => self.take(other).unwrap_or_else(|| Value::Array(Vec::new())),
        };
        Ok(serde_json::from_value(list)?)
    }

    /// The wrapped value, or the document itself when it is not wrapped
    pub fn unwrap_or_self(&self, doc: Value) -> Value {
        match self.pick(&doc) {
            Some(inner) => inner.clone(),
            None => doc,
        }
    }
}

/// Treat an explicit `null` like a missing field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Seconds, milliseconds or an RFC 3339 string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Number(f64),
    Text(String),
}

// --- Per-key limits ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyLimit {
    #[serde(rename = "api-key", alias = "apiKey", alias = "api_key")]
    pub api_key: String,

    /// Glob patterns; empty means every model is allowed
    #[serde(
        rename = "allowed-models",
        alias = "allowedModels",
        alias = "allowed_models",
        default,
        deserialize_with = "nullable"
    )]
    pub allowed_models: Vec<String>,

    /// Pattern → requests per month
    #[serde(
        rename = "monthly-quotas",
        alias = "monthlyQuotas",
        alias = "monthly_quotas",
        default,
        deserialize_with = "nullable"
    )]
    pub monthly_quotas: BTreeMap<String, u64>,

    #[serde(
        rename = "allowed-providers",
        alias = "allowedProviders",
        alias = "allowed_providers",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allowed_providers: Vec<String>,

    #[serde(
        rename = "allowed-credentials",
        alias = "allowedCredentials",
        alias = "allowed_credentials",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allowed_credentials: Vec<String>,
}

impl ApiKeyLimit {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Whether any restriction is configured at all
    pub fn is_restrictive(&self) -> bool {
        !self.allowed_models.is_empty() || !self.monthly_quotas.is_empty()
    }

    pub fn allows(&self, model: &str) -> bool {
        self.allowed_models.is_empty()
            || self.allowed_models.iter().any(|p| match_model(p, model))
    }

    /// Quota pattern governing `model`: an exact entry first, then the first
    /// matching pattern in key order
    pub fn quota_for(&self, model: &str) -> Option<(&str, u64)> {
        if let Some((pattern, quota)) = self.monthly_quotas.get_key_value(model) {
            return Some((pattern.as_str(), *quota));
        }
        self.monthly_quotas
            .iter()
            .find(|(pattern, _)| match_model(pattern, model))
            .map(|(pattern, quota)| (pattern.as_str(), *quota))
    }
}

// --- Provider credentials ---

/// One Gemini/Claude/Codex/Vertex key entry; unknown fields survive a round trip
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderKey {
    #[serde(rename = "api-key", alias = "apiKey")]
    pub api_key: String,

    #[serde(
        rename = "base-url",
        alias = "baseUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub base_url: Option<String>,

    #[serde(
        rename = "proxy-url",
        alias = "proxyUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub proxy_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiCompat {
    pub name: String,

    #[serde(rename = "base-url", alias = "baseUrl", default)]
    pub base_url: String,

    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<Value>,

    #[serde(
        rename = "api-key-entries",
        alias = "apiKeyEntries",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub api_key_entries: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// --- Auth files ---

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthFile {
    pub name: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modtime: Option<Timestamp>,
    #[serde(default)]
    pub modified_time: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl AuthFile {
    pub fn provider_label(&self) -> &str {
        self.provider
            .as_deref()
            .or(self.kind.as_deref())
            .filter(|p| !p.is_empty())
            .unwrap_or("Unknown")
    }

    pub fn modified(&self) -> Option<&Timestamp> {
        self.modified_time
            .as_ref()
            .or(self.modtime.as_ref())
            .or(self.updated_at.as_ref())
    }
}

// --- OAuth ---

/// Reply of an `*-auth-url` initiation call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthUrlReply {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub device_code: Option<String>,
    #[serde(default)]
    pub user_code: Option<String>,
    #[serde(default)]
    pub verification_uri: Option<String>,
    #[serde(default)]
    pub verification_url: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub interval: Option<u64>,
}

/// What the operator has to do once a flow was initiated
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStart {
    /// Open `url`; completion is observed through `get-auth-status?state=`
    Redirect { url: String, state: Option<String> },
    /// Enter `user_code` at `verification_uri`
    Device {
        device_code: String,
        user_code: String,
        verification_uri: String,
        expires_in: u64,
        interval: u64,
    },
}

impl AuthUrlReply {
    pub fn into_start(
        self,
        default_interval: u64,
        default_expires_in: u64,
    ) -> Result<FlowStart, ApiError> {
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());

        if let Some(device_code) = non_empty(self.device_code) {
            let verification_uri = non_empty(self.verification_uri)
                .or(non_empty(self.verification_url))
                .or(non_empty(self.url.clone()))
                .ok_or_else(|| ApiError::Parse("device flow without verification URI".into()))?;
            return Ok(FlowStart::Device {
                device_code,
                user_code: self.user_code.unwrap_or_default(),
                verification_uri,
                expires_in: self.expires_in.filter(|v| *v > 0).unwrap_or(default_expires_in),
                interval: self.interval.filter(|v| *v > 0).unwrap_or(default_interval),
            });
        }

        match non_empty(self.url) {
            Some(url) => Ok(FlowStart::Redirect {
                url,
                state: non_empty(self.state),
            }),
            None => Err(ApiError::Parse(
                "response contained neither an auth URL nor a device code".into(),
            )),
        }
    }
}

/// One status poll outcome
#[derive(Debug, Clone, PartialEq)]
pub enum PollReply {
    Complete,
    Failed(String),
    Pending,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthStatusReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<AuthStatusReply> for PollReply {
    fn from(reply: AuthStatusReply) -> Self {
        match reply.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("ok" | "success" | "complete" | "completed") => PollReply::Complete,
            Some("error" | "failed") => PollReply::Failed(
                reply
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
            _ => PollReply::Pending,
        }
    }
}

// --- Usage ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelUsage {
    pub total_requests: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiUsage {
    pub total_requests: u64,
    pub total_tokens: u64,
    #[serde(deserialize_with = "nullable")]
    pub models: BTreeMap<String, ModelUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct UsageStats {
    total_requests: u64,
    success_count: Option<u64>,
    failure_count: Option<u64>,
    total_tokens: u64,
    #[serde(deserialize_with = "nullable")]
    apis: BTreeMap<String, ApiUsage>,
}

/// Aggregated per-model line of the usage screen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStat {
    pub model: String,
    pub requests: u64,
    pub tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub struct UsageReport {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_tokens: u64,
    pub apis: BTreeMap<String, ApiUsage>,
    /// The `usage` object as received, for the raw view
    pub raw: Value,
}

impl UsageReport {
    pub fn from_document(doc: Value) -> Result<Self, ApiError> {
        let failed_requests = doc.get("failed_requests").and_then(Value::as_u64);
        let raw = Envelope::USAGE.unwrap_or_self(doc);
        let stats: UsageStats = serde_json::from_value(raw.clone())?;

        let failure_count = failed_requests
            .filter(|n| *n > 0)
            .or(stats.failure_count)
            .unwrap_or(0);
        let success_count = stats
            .success_count
            .filter(|n| *n > 0)
            .unwrap_or_else(|| stats.total_requests.saturating_sub(failure_count));

        Ok(Self {
            total_requests: stats.total_requests,
            success_count,
            failure_count,
            total_tokens: stats.total_tokens,
            apis: stats.apis,
            raw,
        })
    }

    /// Success percentage with one decimal; `0` without traffic
    pub fn success_rate(&self) -> String {
        if self.total_requests == 0 {
            return "0".to_string();
        }
        format!(
            "{:.1}",
            self.success_count as f64 / self.total_requests as f64 * 100.0
        )
    }

    /// Per-model totals across all API keys, busiest first
    pub fn model_stats(&self, limit: usize) -> Vec<ModelStat> {
        let mut totals: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
        for api in self.apis.values() {
            for (name, usage) in &api.models {
                let entry = totals.entry(name.as_str()).or_default();
                entry.0 += usage.total_requests;
                entry.1 += usage.total_tokens;
            }
        }

        let mut stats: Vec<ModelStat> = totals
            .into_iter()
            .map(|(model, (requests, tokens))| ModelStat {
                model: model.to_string(),
                requests,
                tokens,
            })
            .collect();
        stats.sort_by(|a, b| b.requests.cmp(&a.requests));
        stats.truncate(limit);
        stats
    }
}

// --- Config ---

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RoutingConfig {
    pub strategy: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QuotaExceeded {
    #[serde(alias = "switch_project")]
    pub switch_project: bool,
    #[serde(alias = "switch_preview_model")]
    pub switch_preview_model: bool,
}

/// Subset of `GET /config` the screens display
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(deserialize_with = "nullable")]
    pub host: String,
    pub port: Option<u16>,
    pub debug: bool,
    #[serde(alias = "request_log")]
    pub request_log: bool,
    #[serde(alias = "usage_statistics_enabled")]
    pub usage_statistics_enabled: bool,
    #[serde(alias = "logging_to_file")]
    pub logging_to_file: bool,
    #[serde(alias = "ws_auth")]
    pub ws_auth: bool,
    #[serde(alias = "force_model_prefix")]
    pub force_model_prefix: bool,
    #[serde(alias = "proxy_url", deserialize_with = "nullable")]
    pub proxy_url: String,
    #[serde(alias = "request_retry")]
    pub request_retry: Option<u32>,
    #[serde(alias = "max_retry_interval")]
    pub max_retry_interval: Option<u32>,
    #[serde(alias = "logs_max_total_size_mb")]
    pub logs_max_total_size_mb: Option<u64>,
    #[serde(deserialize_with = "nullable")]
    pub routing: RoutingConfig,
    #[serde(alias = "quota_exceeded", deserialize_with = "nullable")]
    pub quota_exceeded: QuotaExceeded,
}

impl ServerConfig {
    /// `host:port` the proxy listens on
    pub fn listen_address(&self) -> String {
        let host = if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        };
        format!("{host}:{}", self.port.unwrap_or(8080))
    }

    pub fn routing_strategy(&self) -> &str {
        if self.routing.strategy.is_empty() {
            "round-robin"
        } else {
            &self.routing.strategy
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AmpcodeSettings {
    #[serde(deserialize_with = "nullable")]
    pub upstream_url: String,
    #[serde(deserialize_with = "nullable")]
    pub upstream_api_key: String,
    #[serde(deserialize_with = "nullable")]
    pub model_mappings: Vec<Value>,
    pub force_model_mappings: bool,
    pub restrict_management_to_localhost: bool,
}

// --- Quota ---

/// `oauth-excluded-models` is either a flat list or keyed by provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExcludedModels {
    List(Vec<String>),
    PerProvider(BTreeMap<String, Vec<String>>),
}

impl Default for ExcludedModels {
    fn default() -> Self {
        ExcludedModels::List(Vec::new())
    }
}

impl ExcludedModels {
    /// Editor text: one model per line, or pretty JSON for the provider map
    pub fn to_editor_text(&self) -> String {
        match self {
            ExcludedModels::List(models) => models.join("\n"),
            ExcludedModels::PerProvider(map) => {
                serde_json::to_string_pretty(map).unwrap_or_default()
            }
        }
    }
}

// --- System ---

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub owned_by: Option<String>,
}

impl ModelInfo {
    /// Identifier to copy into client configs
    pub fn model_id(&self) -> &str {
        if self.id.is_empty() {
            self.name.as_deref().unwrap_or_default()
        } else {
            &self.id
        }
    }

    pub fn display(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| match self.model_id() {
                "" => "Unknown",
                id => id,
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorLogFile {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, alias = "modtime", alias = "modified_time")]
    pub modified: Option<Timestamp>,
}

/// Version reported by the management server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerVersion {
    pub version: String,
    pub status: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_limits_envelope_spellings() {
        for key in ["api_key_limits", "api-key-limits", "apiKeyLimits"] {
            let doc = json!({ key: [{"api-key": "sk-a", "allowed-models": ["gpt-*"]}] });
            let limits: Vec<ApiKeyLimit> = Envelope::API_KEY_LIMITS.unwrap_list(doc).unwrap();
            assert_eq!(limits.len(), 1, "envelope key {key}");
            assert_eq!(limits[0].allowed_models, vec!["gpt-*"]);
        }

        let empty: Vec<ApiKeyLimit> = Envelope::API_KEY_LIMITS.unwrap_list(json!({})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_limit_field_spellings_and_nulls() {
        let limit: ApiKeyLimit = serde_json::from_value(json!({
            "apiKey": "sk-b",
            "allowed_models": null,
            "monthlyQuotas": {"gpt-*": 100}
        }))
        .unwrap();
        assert_eq!(limit.api_key, "sk-b");
        assert!(limit.allowed_models.is_empty());
        assert_eq!(limit.monthly_quotas["gpt-*"], 100);

        let out = serde_json::to_value(&limit).unwrap();
        assert_eq!(out["api-key"], "sk-b");
        assert!(out.get("allowed-providers").is_none());
    }

    #[test]
    fn test_limit_access_and_quota_resolution() {
        let mut limit = ApiKeyLimit::new("sk-a");
        assert!(limit.allows("anything"));
        assert!(!limit.is_restrictive());

        limit.allowed_models = vec!["gpt-*".into(), "claude-sonnet-4".into()];
        limit.monthly_quotas.insert("gpt-*".into(), 500);
        limit.monthly_quotas.insert("gpt-4o".into(), 50);

        assert!(limit.allows("gpt-4o"));
        assert!(limit.allows("claude-sonnet-4"));
        assert!(!limit.allows("gemini-2.5-pro"));

        assert_eq!(limit.quota_for("gpt-4o"), Some(("gpt-4o", 50)));
        assert_eq!(limit.quota_for("gpt-4.1"), Some(("gpt-*", 500)));
        assert_eq!(limit.quota_for("claude-sonnet-4"), None);
    }

    #[test]
    fn test_provider_key_keeps_unknown_fields() {
        let doc = json!({"gemini-api-key": [{
            "api-key": "AIza", "base-url": "https://g", "headers": {"X-A": "1"}
        }]});
        let keys: Vec<ProviderKey> = Envelope::GEMINI_KEYS.unwrap_list(doc).unwrap();
        assert_eq!(keys[0].base_url.as_deref(), Some("https://g"));

        let out = serde_json::to_value(&keys[0]).unwrap();
        assert_eq!(out["headers"]["X-A"], "1");
        assert!(out.get("proxy-url").is_none());
    }

    #[test]
    fn test_auth_file_fallbacks() {
        let files: Vec<AuthFile> = Envelope::AUTH_FILES
            .unwrap_list(json!({"files": [
                {"name": "a.json", "type": "claude", "modtime": "2025-01-24T23:29:16Z"},
                {"name": "b.json", "provider": "gemini", "type": "gemini-cli", "modified_time": 1700000000}
            ]}))
            .unwrap();
        assert_eq!(files[0].provider_label(), "claude");
        assert_eq!(
            files[0].modified(),
            Some(&Timestamp::Text("2025-01-24T23:29:16Z".into()))
        );
        assert_eq!(files[1].provider_label(), "gemini");
        assert_eq!(files[1].modified(), Some(&Timestamp::Number(1700000000.0)));
    }

    #[test]
    fn test_auth_url_reply_shapes() {
        let reply: AuthUrlReply =
            serde_json::from_value(json!({"status": "ok", "url": "https://auth", "state": "s1"}))
                .unwrap();
        assert_eq!(
            reply.into_start(5, 900).unwrap(),
            FlowStart::Redirect {
                url: "https://auth".into(),
                state: Some("s1".into())
            }
        );

        let reply: AuthUrlReply = serde_json::from_value(json!({
            "device_code": "dc", "user_code": "ABCD-1234",
            "verification_url": "https://github.com/login/device"
        }))
        .unwrap();
        assert_eq!(
            reply.into_start(5, 900).unwrap(),
            FlowStart::Device {
                device_code: "dc".into(),
                user_code: "ABCD-1234".into(),
                verification_uri: "https://github.com/login/device".into(),
                expires_in: 900,
                interval: 5,
            }
        );

        let reply: AuthUrlReply = serde_json::from_value(json!({"status": "ok"})).unwrap();
        assert!(reply.into_start(5, 900).is_err());
    }

    #[test]
    fn test_poll_reply_mapping() {
        let status = |s: Value| PollReply::from(serde_json::from_value::<AuthStatusReply>(s).unwrap());
        assert_eq!(status(json!({"status": "ok"})), PollReply::Complete);
        assert_eq!(status(json!({"status": "completed"})), PollReply::Complete);
        assert_eq!(
            status(json!({"status": "error", "error": "access_denied"})),
            PollReply::Failed("access_denied".into())
        );
        assert_eq!(
            status(json!({"status": "failed"})),
            PollReply::Failed("Unknown error".into())
        );
        assert_eq!(status(json!({"status": "wait"})), PollReply::Pending);
        assert_eq!(status(json!({})), PollReply::Pending);
    }

    #[test]
    fn test_usage_report() {
        let report = UsageReport::from_document(json!({
            "failed_requests": 2,
            "usage": {
                "total_requests": 10,
                "apis": {
                    "sk-1": {"total_requests": 6, "models": {
                        "gpt-4o": {"total_requests": 4, "total_tokens": 400},
                        "claude": {"total_requests": 2, "total_tokens": 50}
                    }},
                    "sk-2": {"total_requests": 4, "models": {
                        "claude": {"total_requests": 4, "total_tokens": 90}
                    }}
                }
            }
        }))
        .unwrap();

        assert_eq!(report.failure_count, 2);
        assert_eq!(report.success_count, 8);
        assert_eq!(report.success_rate(), "80.0");

        let models = report.model_stats(10);
        assert_eq!(models[0].model, "claude");
        assert_eq!(models[0].requests, 6);
        assert_eq!(models[0].tokens, 140);
        assert_eq!(report.model_stats(1).len(), 1);
    }

    #[test]
    fn test_usage_report_unwrapped_and_empty() {
        let report = UsageReport::from_document(json!({"total_requests": 0})).unwrap();
        assert_eq!(report.success_rate(), "0");
        assert!(report.model_stats(10).is_empty());
    }

    #[test]
    fn test_server_config_defaults() {
        let config: ServerConfig = serde_json::from_value(json!({
            "port": 8317,
            "request-log": true,
            "quota-exceeded": {"switch-project": true},
            "routing": {"strategy": "fill-first"},
            "proxy-url": null
        }))
        .unwrap();
        assert_eq!(config.listen_address(), "0.0.0.0:8317");
        assert!(config.request_log);
        assert!(config.quota_exceeded.switch_project);
        assert_eq!(config.routing_strategy(), "fill-first");
        assert_eq!(config.proxy_url, "");
        assert_eq!(ServerConfig::default().routing_strategy(), "round-robin");
    }

    #[test]
    fn test_excluded_models_shapes() {
        let list: ExcludedModels = serde_json::from_value(json!(["a", "b*"])).unwrap();
        assert_eq!(list.to_editor_text(), "a\nb*");

        let map: ExcludedModels =
            serde_json::from_value(json!({"gemini-cli": ["gemini-2.5-pro"]})).unwrap();
        assert!(matches!(map, ExcludedModels::PerProvider(_)));
        assert!(map.to_editor_text().contains("\"gemini-cli\""));
    }
}
