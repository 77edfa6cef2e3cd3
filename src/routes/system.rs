use axum::{
    Extension,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use minijinja::context;
use std::sync::Arc;
use tracing::{info, warn};

use super::dashboard::VersionQuery;
use super::{Flash, render_page, version_check};
use crate::AppState;
use crate::constants::{PROJECT_DOCS_URL, PROJECT_REPO_URL};
use crate::error::{DashboardError, clear_session_cookie};
use crate::session::Session;

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
    Query(query): Query<VersionQuery>,
) -> Result<Response, DashboardError> {
    let client = &session.client;
    let (config, server_version) = tokio::join!(client.config(), client.server_version());
    let config = config?;
    let server_version = server_version?;

    let version_check = match query.check_version {
        Some(_) => Some(version_check(&server_version, client.latest_version().await)?),
        None => None,
    };

    render_page(
        &state,
        &session,
        "system.html",
        "system",
        &flash,
        context! {
            listen_address => config.listen_address(),
            server_version => server_version.version,
            version_check => version_check,
            repo_url => PROJECT_REPO_URL,
            docs_url => PROJECT_DOCS_URL,
            git_hash => crate::GIT_HASH,
            build_time => crate::BUILD_TIME,
        },
    )
}

/// End the session and forget the remembered API base
pub async fn forget(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
) -> Response {
    if let Err(e) = state.sessions.forget_login(&session.token).await {
        warn!("Failed to persist cleared login data: {e}");
    }
    info!("Stored login data cleared");

    (
        [(header::SET_COOKIE, clear_session_cookie(state.secure_cookies))],
        Redirect::to("/login"),
    )
        .into_response()
}
