use reqwest::Method;
use serde::Serialize;
use serde_json::json;

use super::types::{Envelope, OpenAiCompat, ProviderKey};
use super::{Body, ManagementClient};
use crate::error::ApiError;

/// Providers configured with plain API key entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Claude,
    Codex,
    Vertex,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gemini,
        ProviderKind::Claude,
        ProviderKind::Codex,
        ProviderKind::Vertex,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Claude => "claude",
            ProviderKind::Codex => "codex",
            ProviderKind::Vertex => "vertex",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.slug() == slug)
    }

    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Claude => "Claude",
            ProviderKind::Codex => "Codex",
            ProviderKind::Vertex => "Vertex",
        }
    }

    fn path(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "/gemini-api-key",
            ProviderKind::Claude => "/claude-api-key",
            ProviderKind::Codex => "/codex-api-key",
            ProviderKind::Vertex => "/vertex-api-key",
        }
    }

    fn envelope(self) -> Envelope {
        match self {
            ProviderKind::Gemini => Envelope::GEMINI_KEYS,
            ProviderKind::Claude => Envelope::CLAUDE_KEYS,
            ProviderKind::Codex => Envelope::CODEX_KEYS,
            ProviderKind::Vertex => Envelope::VERTEX_KEYS,
        }
    }
}

const OPENAI_COMPAT_PATH: &str = "/openai-compatibility";

impl ManagementClient {
    pub async fn provider_keys(&self, kind: ProviderKind) -> Result<Vec<ProviderKey>, ApiError> {
        let doc = self.get(kind.path(), &[]).await?.into_json();
        kind.envelope().unwrap_list(doc)
    }

    pub async fn add_provider_key(
        &self,
        kind: ProviderKind,
        entry: &ProviderKey,
    ) -> Result<(), ApiError> {
        self.send_values(Method::PUT, kind.path(), &[entry]).await
    }

    pub async fn update_provider_key(
        &self,
        kind: ProviderKind,
        entry: &ProviderKey,
    ) -> Result<(), ApiError> {
        self.send_values(Method::PATCH, kind.path(), &[entry]).await
    }

    pub async fn delete_provider_key(&self, kind: ProviderKind, api_key: &str) -> Result<(), ApiError> {
        self.send_values(Method::DELETE, kind.path(), &[api_key]).await
    }

    pub async fn openai_compat(&self) -> Result<Vec<OpenAiCompat>, ApiError> {
        let doc = self.get(OPENAI_COMPAT_PATH, &[]).await?.into_json();
        Envelope::OPENAI_COMPAT.unwrap_list(doc)
    }

    pub async fn add_openai_compat(&self, entry: &OpenAiCompat) -> Result<(), ApiError> {
        self.send_values(Method::PUT, OPENAI_COMPAT_PATH, &[entry]).await
    }

    pub async fn update_openai_compat(&self, entry: &OpenAiCompat) -> Result<(), ApiError> {
        self.send_values(Method::PATCH, OPENAI_COMPAT_PATH, &[entry])
            .await
    }

    pub async fn delete_openai_compat(&self, name: &str) -> Result<(), ApiError> {
        self.send_values(Method::DELETE, OPENAI_COMPAT_PATH, &[name])
            .await
    }

    /// Send `{"value": [...]}`, the body shape of every array-valued setting
    async fn send_values<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        values: &[T],
    ) -> Result<(), ApiError> {
        let body = json!({ "value": serde_json::to_value(values)? });
        self.call(method, path, &[], Body::Json(body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::client_for;
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_claude_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/claude-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "claude-api-key": [{"api-key": "sk-ant-1", "base-url": "https://api.anthropic.com"}]
            })))
            .mount(&server)
            .await;

        let keys = client_for(&server)
            .provider_keys(ProviderKind::Claude)
            .await
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].api_key, "sk-ant-1");
    }

    #[tokio::test]
    async fn test_add_and_delete_use_value_arrays() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v0/management/gemini-api-key"))
            .and(body_json(json!({"value": [{"api-key": "AIza-1"}]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v0/management/gemini-api-key"))
            .and(body_json(json!({"value": ["AIza-1"]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let entry = ProviderKey {
            api_key: "AIza-1".into(),
            ..Default::default()
        };
        client
            .add_provider_key(ProviderKind::Gemini, &entry)
            .await
            .unwrap();
        client
            .delete_provider_key(ProviderKind::Gemini, "AIza-1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_openai_compat_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v0/management/openai-compatibility"))
            .and(body_json(json!({"value": ["openrouter"]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .delete_openai_compat("openrouter")
            .await
            .unwrap();
    }

    #[test]
    fn test_kind_slugs() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::from_slug(kind.slug()), Some(kind));
        }
        assert_eq!(ProviderKind::from_slug("openai"), None);
    }
}
