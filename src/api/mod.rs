//! Client facade for the management API.
//!
//! Every dashboard screen goes through [`ManagementClient`]. It owns URL
//! construction, bearer-token injection, body encoding and uniform error
//! surfacing. A 401 from any management endpoint revokes the client for good:
//! later calls fail with [`ApiError::Unauthorized`] without touching the network.

mod auth_files;
mod config;
mod keys;
mod oauth;
mod providers;
mod quota;
mod system;
pub mod types;
mod usage;

pub use config::Toggle;
pub use keys::LimitCleanup;
pub use oauth::OAuthProvider;
pub use providers::ProviderKind;
pub use usage::LogsReply;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use url::Url;

use crate::constants::MANAGEMENT_PREFIX;
use crate::error::ApiError;

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    pub fn into_json(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Text(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        }
    }

    /// Body as text; JSON documents are pretty-printed
    pub fn into_text(self) -> String {
        match self {
            Payload::Json(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
            Payload::Text(text) => text,
        }
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        Ok(serde_json::from_value(self.into_json())?)
    }
}

/// Request body encodings accepted by the management API
pub(crate) enum Body {
    Empty,
    Json(Value),
    /// Sent byte-for-byte with the given content type
    Raw {
        content_type: &'static str,
        body: String,
    },
    Multipart(reqwest::multipart::Form),
}

struct Inner {
    http: Client,
    base_url: String,
    token: String,
    revoked: AtomicBool,
}

/// Authenticated handle on one management API
#[derive(Clone)]
pub struct ManagementClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ManagementClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementClient")
            .field("base_url", &self.inner.base_url)
            .field("revoked", &self.is_revoked())
            .finish_non_exhaustive()
    }
}

impl ManagementClient {
    pub fn new(http: Client, api_base: &str, token: &str) -> Result<Self, ApiError> {
        let base_url = api_base.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                token: token.to_string(),
                revoked: AtomicBool::new(false),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn is_revoked(&self) -> bool {
        self.inner.revoked.load(Ordering::Acquire)
    }

    /// Permanently disable this client
    pub fn revoke(&self) {
        if !self.inner.revoked.swap(true, Ordering::AcqRel) {
            info!("Management session for {} revoked", self.inner.base_url);
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!(
            "{}{}{}",
            self.inner.base_url, MANAGEMENT_PREFIX, path
        ))?;
        let pairs: Vec<_> = query.iter().filter(|(_, v)| !v.is_empty()).collect();
        if !pairs.is_empty() {
            let mut serializer = url.query_pairs_mut();
            for (key, value) in pairs {
                serializer.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// URL of an endpoint outside the management prefix
    pub(crate) fn public_url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(Url::parse(&format!("{}{}", self.inner.base_url, path))?)
    }

    /// Issue one management call and return the raw successful response
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Body,
    ) -> Result<reqwest::Response, ApiError> {
        if self.is_revoked() {
            return Err(ApiError::Unauthorized);
        }

        let url = self.endpoint(path, query)?;
        let mut request = self
            .inner
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.inner.token);

        request = match body {
            Body::Empty => request,
            Body::Json(value) => request.json(&value),
            Body::Raw { content_type, body } => request.header(CONTENT_TYPE, content_type).body(body),
            Body::Multipart(form) => request.multipart(form),
        };

        let response = request.send().await.inspect_err(|e| {
            warn!("Management API {method} {path} unreachable: {e}");
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.revoke();
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = if text.trim().is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                text
            };
            warn!("Management API {method} {path} failed ({status}): {message}");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    pub(crate) async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Body,
    ) -> Result<Payload, ApiError> {
        let response = self.send(method, path, query, body).await?;
        read_payload(response).await
    }

    pub(crate) async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Payload, ApiError> {
        self.call(Method::GET, path, query, Body::Empty).await
    }

    pub(crate) async fn get_as<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.get(path, query).await?.decode()
    }

    pub(crate) async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<Payload, ApiError> {
        let value = serde_json::to_value(body)?;
        self.call(method, path, query, Body::Json(value)).await
    }

    pub(crate) async fn delete(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Payload, ApiError> {
        self.call(Method::DELETE, path, query, Body::Empty).await
    }
}

async fn read_payload(response: reqwest::Response) -> Result<Payload, ApiError> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));

    let text = response.text().await?;
    if is_json {
        if text.trim().is_empty() {
            return Ok(Payload::Json(Value::Null));
        }
        Ok(Payload::Json(serde_json::from_str(&text)?))
    } else {
        Ok(Payload::Text(text))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{TEST_KEY, client_for};
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_new_strips_trailing_slash() {
        let client =
            ManagementClient::new(Client::new(), " http://localhost:8317/ ", "k").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8317");
        let url = client.endpoint("/config", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8317/v0/management/config");
    }

    #[test]
    fn test_endpoint_skips_empty_query_values() {
        let client = ManagementClient::new(Client::new(), "http://h:1", "k").unwrap();
        let url = client
            .endpoint("/gemini-cli-auth-url", &[("is_webui", "true"), ("project_id", "")])
            .unwrap();
        assert_eq!(url.query(), Some("is_webui=true"));

        let url = client.endpoint("/api-keys", &[("value", "sk a&b")]).unwrap();
        assert_eq!(url.query(), Some("value=sk+a%26b"));
    }

    #[test]
    fn test_new_rejects_garbage_base() {
        assert!(ManagementClient::new(Client::new(), "not a url", "k").is_err());
    }

    #[tokio::test]
    async fn test_bearer_header_and_json_decoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/config"))
            .and(header("authorization", format!("Bearer {TEST_KEY}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"port": 8317})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let payload = client.get("/config", &[]).await.unwrap();
        assert_eq!(payload, Payload::Json(json!({"port": 8317})));
    }

    #[tokio::test]
    async fn test_non_json_body_is_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("line 1\nline 2\n"))
            .mount(&server)
            .await;

        let payload = client_for(&server).get("/logs", &[]).await.unwrap();
        assert_eq!(payload, Payload::Text("line 1\nline 2\n".into()));
    }

    #[tokio::test]
    async fn test_error_carries_body_text_or_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v0/management/api-key-limits"))
            .and(query_param("api_key", "sk-missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("API key limit not found"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/management/usage"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .delete("/api-key-limits", &[("api_key", "sk-missing")])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "API key limit not found");

        let err = client.get("/usage", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503");
    }

    #[tokio::test]
    async fn test_unauthorized_revokes_and_stops_further_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/config"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid management key"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/management/api-keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"api-keys": []})))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get("/config", &[]).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(client.is_revoked());

        // Clones share the revocation
        let clone = client.clone();
        let err = clone.get("/api-keys", &[]).await.unwrap_err();
        assert!(err.is_unauthorized());
        // `expect(0)` on the second mock is verified when the server drops
    }

    #[tokio::test]
    async fn test_raw_body_sent_verbatim() {
        let server = MockServer::start().await;
        let yaml = "port: 8317\n# comment\n  indented: true\n";
        Mock::given(method("PUT"))
            .and(path("/v0/management/config.yaml"))
            .and(header("content-type", "application/yaml"))
            .and(wiremock::matchers::body_string(yaml))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .call(
                Method::PUT,
                "/config.yaml",
                &[],
                Body::Raw {
                    content_type: "application/yaml",
                    body: yaml.to_string(),
                },
            )
            .await
            .unwrap();
    }
}
