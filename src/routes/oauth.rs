use axum::{
    Extension, Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use minijinja::context;
use serde::Deserialize;
use std::sync::Arc;

use super::{Flash, Notice, auth_files::file_rows, failed, finish, render_page, tolerate};
use crate::AppState;
use crate::api::OAuthProvider;
use crate::api::types::FlowStart;
use crate::error::DashboardError;
use crate::oauth::{FlowState, OAuthFlow};
use crate::session::{FlowSnapshot, Session};

/// Seconds between page reloads while a flow is being polled
const REFRESH_SECS: u32 = 2;

#[derive(Debug, Default, Deserialize)]
pub struct OAuthQuery {
    iflow: Option<String>,
}

fn status(snapshot: &FlowSnapshot) -> (String, &'static str) {
    match &snapshot.state {
        FlowState::Idle | FlowState::Started => match &snapshot.start {
            FlowStart::Redirect { state: None, .. } => (
                "Finish the login in the opened page; the credential then shows up under Auth Files."
                    .to_string(),
                "info",
            ),
            _ => ("Waiting for authorization...".to_string(), "info"),
        },
        FlowState::Polling { attempts } => {
            (format!("Waiting for authorization (attempt {attempts})"), "info")
        }
        FlowState::Succeeded => ("Authentication successful!".to_string(), "success"),
        FlowState::Failed(message) => (format!("Authentication failed: {message}"), "error"),
        FlowState::TimedOut => (
            "Authentication timed out. Please try again.".to_string(),
            "warning",
        ),
        FlowState::Cancelled => ("Login cancelled".to_string(), "info"),
    }
}

/// Whether a background task is still reporting on this flow
fn is_polled(snapshot: &FlowSnapshot) -> bool {
    snapshot.state.is_active() && !matches!(snapshot.start, FlowStart::Redirect { state: None, .. })
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
    Query(query): Query<OAuthQuery>,
) -> Result<Response, DashboardError> {
    let snapshot = session.flow().await;

    let flow = snapshot.as_ref().map(|snapshot| {
        let (status, level) = status(snapshot);
        let (kind, url, user_code) = match &snapshot.start {
            FlowStart::Redirect { url, .. } => ("redirect", url.as_str(), ""),
            FlowStart::Device {
                verification_uri,
                user_code,
                ..
            } => ("device", verification_uri.as_str(), user_code.as_str()),
        };
        context! {
            provider => snapshot.provider.label(),
            kind => kind,
            url => url,
            user_code => user_code,
            status => status,
            level => level,
            active => snapshot.state.is_active(),
        }
    });

    let succeeded = snapshot
        .as_ref()
        .is_some_and(|s| s.state == FlowState::Succeeded);
    let auth_files = if succeeded {
        tolerate("auth files", session.client.auth_files().await)?
            .map(|files| file_rows(&files))
    } else {
        None
    };

    let iflow_url = if query.iflow.is_some() {
        tolerate("iFlow login URL", session.client.iflow_auth_url().await)?.flatten()
    } else {
        None
    };

    let providers: Vec<_> = OAuthProvider::ALL
        .into_iter()
        .map(|p| context! { slug => p.slug(), label => p.label() })
        .collect();
    let refresh = snapshot.as_ref().filter(|s| is_polled(s)).map(|_| REFRESH_SECS);

    render_page(
        &state,
        &session,
        "oauth.html",
        "oauth",
        &flash,
        context! {
            flow => flow,
            auth_files => auth_files,
            providers => providers,
            iflow_url => iflow_url,
            refresh => refresh,
        },
    )
}

#[derive(Debug, Deserialize)]
pub struct StartForm {
    provider: String,
    project_id: Option<String>,
}

/// Initiate a login; any flow already running for this session is aborted
pub async fn start(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<StartForm>,
) -> Result<Response, DashboardError> {
    let provider = OAuthProvider::from_slug(&form.provider);
    let result = async {
        let provider = provider.ok_or_else(|| {
            DashboardError::validation(format!("Unknown OAuth provider: {}", form.provider))
        })?;
        let start = session
            .client
            .start_oauth(provider, form.project_id.as_deref())
            .await
            .map_err(failed("start OAuth"))?;

        session
            .replace_flow(OAuthFlow::begin(&session.client, provider, start))
            .await;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => Ok(Redirect::to("/oauth").into_response()),
        Err(e) => finish("/oauth", Err(e)),
    }
}

pub async fn cancel(Extension(session): Extension<Arc<Session>>) -> Response {
    session.cancel_flow().await;
    Redirect::to("/oauth").into_response()
}

pub async fn dismiss(Extension(session): Extension<Arc<Session>>) -> Response {
    session.dismiss_flow().await;
    Redirect::to("/oauth").into_response()
}

#[derive(Debug, Deserialize)]
pub struct CopilotTokenForm {
    github_token: String,
    #[serde(default)]
    email: String,
}

pub async fn copilot_token(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<CopilotTokenForm>,
) -> Result<Response, DashboardError> {
    finish("/oauth", async {
        let token = form.github_token.trim();
        if token.is_empty() {
            return Err(DashboardError::validation("Please enter a token"));
        }
        session
            .client
            .submit_copilot_token(token, Some(&form.email))
            .await
            .map_err(failed("submit token"))?;
        Ok(Notice::success("Copilot token submitted successfully!"))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct IflowForm {
    cookie: String,
}

pub async fn iflow_cookie(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<IflowForm>,
) -> Result<Response, DashboardError> {
    finish("/oauth", async {
        let cookie = form.cookie.trim();
        if cookie.is_empty() {
            return Err(DashboardError::validation("Please enter a cookie"));
        }
        session
            .client
            .submit_iflow_cookie(cookie)
            .await
            .map_err(failed("submit cookie"))?;
        Ok(Notice::success("iFlow cookie submitted successfully!"))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct CallbackForm {
    provider: String,
    redirect_url: String,
}

pub async fn callback(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<CallbackForm>,
) -> Result<Response, DashboardError> {
    finish("/oauth", async {
        let redirect_url = form.redirect_url.trim();
        if redirect_url.is_empty() {
            return Err(DashboardError::validation("Please enter the redirect URL"));
        }
        url::Url::parse(redirect_url)
            .map_err(|e| DashboardError::validation(format!("Invalid redirect URL: {e}")))?;
        session
            .client
            .submit_oauth_callback(&form.provider, redirect_url)
            .await
            .map_err(failed("submit callback"))?;
        Ok(Notice::success("Callback submitted successfully!"))
    }
    .await)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::oauth::FlowState;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_successful_login_lists_auth_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/anthropic-auth-url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "url": "https://claude.ai/oauth/authorize?x=1",
                "state": "st-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/management/get-auth-status"))
            .and(query_param("state", "st-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/management/auth-files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{"name": "claude-user@example.com.json", "provider": "claude"}]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(
            &state,
            post_form("/oauth/start", &token, &[("provider", "anthropic")]),
        )
        .await;
        assert_eq!(location(&response), "/oauth");

        let session = state.sessions.get(&token).await.unwrap();
        for _ in 0..100 {
            if session.flow().await.is_some_and(|f| f.state == FlowState::Succeeded) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let html = body_text(send(&state, get("/oauth", &token)).await).await;
        assert!(html.contains("Authentication successful!"));
        assert!(html.contains("claude-user@example.com.json"));
        assert!(!html.contains("http-equiv=\"refresh\""));
    }

    #[tokio::test]
    async fn test_cancel_stops_flow() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/copilot-auth-url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dc-1",
                "user_code": "ABCD-1234",
                "verification_uri": "https://github.com/login/device",
                "interval": 5,
                "expires_in": 900
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/management/copilot-token-status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "wait"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        send(&state, post_form("/oauth/start", &token, &[("provider", "copilot")])).await;
        let html = body_text(send(&state, get("/oauth", &token)).await).await;
        assert!(html.contains("ABCD-1234"));
        assert!(html.contains(r#"<meta http-equiv="refresh" content="2">"#));

        send(&state, post_form("/oauth/cancel", &token, &[])).await;
        let html = body_text(send(&state, get("/oauth", &token)).await).await;
        assert!(html.contains("Login cancelled"));
        assert!(!html.contains("http-equiv=\"refresh\""));

        send(&state, post_form("/oauth/dismiss", &token, &[])).await;
        let session = state.sessions.get(&token).await.unwrap();
        assert!(session.flow().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_manual_inputs_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(
            &state,
            post_form("/oauth/copilot-token", &token, &[("github_token", "  ")]),
        )
        .await;
        assert_eq!(notice(&response), "Please enter a token");

        let response = send(&state, post_form("/oauth/iflow", &token, &[("cookie", "")])).await;
        assert_eq!(notice(&response), "Please enter a cookie");

        let response = send(
            &state,
            post_form(
                "/oauth/callback",
                &token,
                &[("provider", "codex"), ("redirect_url", "")],
            ),
        )
        .await;
        assert_eq!(notice(&response), "Please enter the redirect URL");
    }

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(
            &state,
            post_form("/oauth/start", &token, &[("provider", "myspace")]),
        )
        .await;
        assert_eq!(notice(&response), "Unknown OAuth provider: myspace");
    }
}
