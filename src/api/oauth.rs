use reqwest::Method;
use serde_json::json;

use super::ManagementClient;
use super::types::{AuthStatusReply, AuthUrlReply, FlowStart, PollReply};
use crate::constants::{DEVICE_DEFAULT_EXPIRES_SECS, DEVICE_DEFAULT_INTERVAL_SECS};
use crate::error::ApiError;

/// Providers with a dashboard-initiated login flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Anthropic,
    Codex,
    GeminiCli,
    Antigravity,
    Qwen,
    Copilot,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 6] = [
        OAuthProvider::Anthropic,
        OAuthProvider::Codex,
        OAuthProvider::GeminiCli,
        OAuthProvider::Antigravity,
        OAuthProvider::Qwen,
        OAuthProvider::Copilot,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            OAuthProvider::Anthropic => "anthropic",
            OAuthProvider::Codex => "codex",
            OAuthProvider::GeminiCli => "gemini-cli",
            OAuthProvider::Antigravity => "antigravity",
            OAuthProvider::Qwen => "qwen",
            OAuthProvider::Copilot => "copilot",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.slug() == slug)
    }

    pub fn label(self) -> &'static str {
        match self {
            OAuthProvider::Anthropic => "Anthropic (Claude)",
            OAuthProvider::Codex => "Codex",
            OAuthProvider::GeminiCli => "Gemini CLI",
            OAuthProvider::Antigravity => "Antigravity",
            OAuthProvider::Qwen => "Qwen",
            OAuthProvider::Copilot => "GitHub Copilot",
        }
    }

    fn auth_url_path(self) -> String {
        format!("/{}-auth-url", self.slug())
    }

    /// Qwen's initiation endpoint does not take the web UI flag
    fn is_webui(self) -> bool {
        !matches!(self, OAuthProvider::Qwen)
    }
}

impl ManagementClient {
    /// Initiate a login flow. `project_id` is only sent for Gemini CLI.
    pub async fn start_oauth(
        &self,
        provider: OAuthProvider,
        project_id: Option<&str>,
    ) -> Result<FlowStart, ApiError> {
        let mut query = Vec::new();
        if provider.is_webui() {
            query.push(("is_webui", "true"));
        }
        if provider == OAuthProvider::GeminiCli {
            query.push(("project_id", project_id.unwrap_or_default().trim()));
        }

        let reply: AuthUrlReply = self.get_as(&provider.auth_url_path(), &query).await?;
        reply.into_start(DEVICE_DEFAULT_INTERVAL_SECS, DEVICE_DEFAULT_EXPIRES_SECS)
    }

    pub async fn auth_status(&self, state: &str) -> Result<PollReply, ApiError> {
        let reply: AuthStatusReply = self.get_as("/get-auth-status", &[("state", state)]).await?;
        Ok(reply.into())
    }

    pub async fn copilot_token_status(&self, device_code: &str) -> Result<PollReply, ApiError> {
        let reply: AuthStatusReply = self
            .get_as("/copilot-token-status", &[("device_code", device_code)])
            .await?;
        Ok(reply.into())
    }

    pub async fn submit_copilot_token(
        &self,
        github_token: &str,
        email: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut body = json!({ "github_token": github_token });
        if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
            body["email"] = json!(email);
        }
        self.send_json(Method::POST, "/copilot-token", &[], &body)
            .await?;
        Ok(())
    }

    /// iFlow login URL, when the backend offers one
    pub async fn iflow_auth_url(&self) -> Result<Option<String>, ApiError> {
        let reply: AuthUrlReply = self.get_as("/iflow-auth-url", &[]).await?;
        Ok(reply.url.filter(|u| !u.is_empty()))
    }

    pub async fn submit_iflow_cookie(&self, cookie: &str) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            "/iflow-auth-url",
            &[],
            &json!({ "cookie": cookie }),
        )
        .await?;
        Ok(())
    }

    /// Hand the backend a redirect URL the browser could not deliver itself
    pub async fn submit_oauth_callback(
        &self,
        provider: &str,
        redirect_url: &str,
    ) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            "/oauth-callback",
            &[],
            &json!({ "provider": provider, "redirect_url": redirect_url }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::client_for;
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_start_redirect_flow_sends_webui_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/anthropic-auth-url"))
            .and(query_param("is_webui", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok", "url": "https://claude.ai/oauth", "state": "st-1"
            })))
            .mount(&server)
            .await;

        let start = client_for(&server)
            .start_oauth(OAuthProvider::Anthropic, None)
            .await
            .unwrap();
        assert_eq!(
            start,
            FlowStart::Redirect {
                url: "https://claude.ai/oauth".into(),
                state: Some("st-1".into())
            }
        );
    }

    #[tokio::test]
    async fn test_qwen_omits_webui_and_gemini_sends_project() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/qwen-auth-url"))
            .and(query_param_is_missing("is_webui"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": "https://chat.qwen.ai/x", "state": "q"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/management/gemini-cli-auth-url"))
            .and(query_param("project_id", "my-proj"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": "https://accounts.google.com/x", "state": "g"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.start_oauth(OAuthProvider::Qwen, None).await.unwrap();
        client
            .start_oauth(OAuthProvider::GeminiCli, Some(" my-proj "))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_copilot_device_flow_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/copilot-auth-url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dev-1",
                "user_code": "WXYZ-9876",
                "verification_uri": "https://github.com/login/device"
            })))
            .mount(&server)
            .await;

        let start = client_for(&server)
            .start_oauth(OAuthProvider::Copilot, None)
            .await
            .unwrap();
        match start {
            FlowStart::Device {
                expires_in,
                interval,
                ..
            } => {
                assert_eq!(expires_in, 900);
                assert_eq!(interval, 5);
            }
            other => panic!("expected device flow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_copilot_token_without_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v0/management/copilot-token"))
            .and(body_json(json!({"github_token": "ghu_abc"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .submit_copilot_token("ghu_abc", Some(" "))
            .await
            .unwrap();
    }

    #[test]
    fn test_provider_slugs() {
        for provider in OAuthProvider::ALL {
            assert_eq!(OAuthProvider::from_slug(provider.slug()), Some(provider));
        }
    }
}
