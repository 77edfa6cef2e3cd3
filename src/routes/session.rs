use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::context;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::session_token;
use crate::AppState;
use crate::constants::SESSION_COOKIE;
use crate::error::{DashboardError, clear_session_cookie};

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    expired: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    api_base: String,
    #[serde(default)]
    management_key: String,
}

async fn login_page(
    state: &AppState,
    api_base: Option<String>,
    error: Option<String>,
    expired: bool,
) -> Result<Response, DashboardError> {
    let api_base = match api_base {
        Some(base) => base,
        None => state
            .sessions
            .last_api_base()
            .await
            .unwrap_or_else(|| state.default_api_base.clone()),
    };
    let html = state.renderer.render(
        "login.html",
        context! {
            api_base => api_base,
            error => error,
            app_version => crate::VERSION,
            notice => expired.then_some("Your session ended. Please log in again."),
            level => "warning",
        },
    )?;
    Ok(Html(html).into_response())
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, DashboardError> {
    login_page(&state, None, None, query.expired.is_some()).await
}

/// Validate the management key with `GET /config` before storing a session
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, DashboardError> {
    let api_base = form.api_base.trim().to_string();
    let key = form.management_key.trim();
    if key.is_empty() {
        return login_page(
            &state,
            Some(api_base),
            Some("Please enter a management key".into()),
            false,
        )
        .await;
    }

    let attempt = match state.sessions.connect(&api_base, key) {
        Ok(client) => client.config().await.map(|_| client),
        Err(e) => Err(e),
    };
    let client = match attempt {
        Ok(client) => client,
        Err(e) => {
            warn!("Login to {api_base} failed: {e}");
            return login_page(&state, Some(api_base), Some(format!("Login failed: {e}")), false)
                .await;
        }
    };

    let session = state.sessions.create(client).await?;
    let secure_flag = if state.secure_cookies { "; Secure" } else { "" };
    let cookie = format!(
        "{SESSION_COOKIE}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{secure_flag}",
        session.token,
        state.sessions.ttl_secs()
    );
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        if let Err(e) = state.sessions.remove(&token).await {
            warn!("Failed to persist session removal: {e}");
        }
        info!("Dashboard logout");
    }

    (
        [(header::SET_COOKIE, clear_session_cookie(state.secure_cookies))],
        Redirect::to("/login"),
    )
        .into_response()
}
