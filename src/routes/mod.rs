pub mod auth_files;
pub mod config;
pub mod dashboard;
pub mod health;
pub mod keys;
pub mod limits;
pub mod logs;
pub mod oauth;
pub mod providers;
pub mod quota;
pub mod session;
pub mod settings;
pub mod system;
pub mod usage;

use axum::{
    Router,
    extract::{Request, State},
    http::header,
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use minijinja::context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::AppState;
use crate::api::types::{ApiKeyLimit, ServerVersion};
use crate::constants::SESSION_COOKIE;
use crate::error::{ApiError, DashboardError, login_redirect};
use crate::format::VersionStatus;
use crate::session::Session;

pub fn router(state: Arc<AppState>) -> Router {
    let pages = Router::new()
        .route("/", get(dashboard::show))
        .route("/toggle", post(settings::toggle))
        .route("/settings", get(settings::show).post(settings::save))
        .route("/settings/ampcode", post(settings::save_ampcode))
        .route("/config", get(config::show).post(config::save))
        .route("/api-keys", get(keys::show).post(keys::create))
        .route("/api-keys/rename", post(keys::rename))
        .route("/api-keys/delete", post(keys::delete))
        .route("/api-key-limits", get(limits::show).post(limits::save))
        .route("/api-key-limits/delete", post(limits::delete))
        .route("/providers", get(providers::show))
        .route("/providers/openai", post(providers::save_compat))
        .route("/providers/openai/delete", post(providers::delete_compat))
        .route("/providers/{kind}", post(providers::save_key))
        .route("/providers/{kind}/delete", post(providers::delete_key))
        .route("/auth-files", get(auth_files::show).post(auth_files::upload))
        .route("/auth-files/download", get(auth_files::download))
        .route("/auth-files/delete", post(auth_files::delete))
        .route("/auth-files/models", get(auth_files::models))
        .route("/auth-files/vertex", post(auth_files::import_vertex))
        .route("/oauth", get(oauth::show))
        .route("/oauth/start", post(oauth::start))
        .route("/oauth/cancel", post(oauth::cancel))
        .route("/oauth/dismiss", post(oauth::dismiss))
        .route("/oauth/copilot-token", post(oauth::copilot_token))
        .route("/oauth/iflow", post(oauth::iflow_cookie))
        .route("/oauth/callback", post(oauth::callback))
        .route("/quota", get(quota::show))
        .route("/quota/excluded-models", post(quota::save_excluded))
        .route("/quota/model-mappings", post(quota::save_mappings))
        .route("/usage", get(usage::show))
        .route("/usage/export", get(usage::export))
        .route("/usage/import", post(usage::import))
        .route("/logs", get(logs::show))
        .route("/logs/download", get(logs::download))
        .route("/logs/clear", post(logs::clear))
        .route("/logs/errors/download", get(logs::download_error_log))
        .route("/logs/request", get(logs::request_log))
        .route("/system", get(system::show))
        .route("/system/forget", post(system::forget))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/login", get(session::show).post(session::login))
        .route("/logout", post(session::logout))
        .merge(pages)
        .with_state(state)
}

/// Parse a named cookie from the Cookie header
pub fn parse_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|cookie| {
        let (key, value) = cookie.trim().split_once('=')?;
        if key.trim() == name {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

pub(crate) fn session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| parse_cookie(h, SESSION_COOKIE))
        .filter(|t| !t.is_empty())
}

/// Attach the caller's [`Session`] to the request, or send them to the login form.
///
/// A session whose client got revoked while handling the request is removed
/// before the response leaves.
async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = session_token(request.headers()) else {
        return Redirect::to("/login").into_response();
    };
    let Some(session) = state.sessions.get(&token).await else {
        return login_redirect(state.secure_cookies);
    };

    request.extensions_mut().insert(session.clone());
    let response = next.run(request).await;

    if session.client.is_revoked() {
        if let Err(e) = state.sessions.remove(&token).await {
            warn!("Failed to persist session removal: {e}");
        }
        return login_redirect(state.secure_cookies);
    }
    response
}

// --- Flash banners ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
    Warning,
    Info,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        }
    }
}

/// Banner carried across a redirect in the query string
#[derive(Debug, Default, Deserialize)]
pub struct Flash {
    pub notice: Option<String>,
    pub level: Option<Level>,
}

/// Outcome of a form submission
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

impl Notice {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Level::Success, message)
    }
}

/// Redirect to `to` with a banner
pub fn flash_redirect(to: &str, notice: &Notice) -> Response {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("notice", &notice.message)
        .append_pair("level", notice.level.as_str())
        .finish();
    let separator = if to.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{to}{separator}{query}")).into_response()
}

/// Finish a form handler: a rejected management key ends the session, any
/// other failure comes back as an error banner on `back`.
pub fn finish(back: &str, result: Result<Notice, DashboardError>) -> Result<Response, DashboardError> {
    match result {
        Ok(notice) => Ok(flash_redirect(back, &notice)),
        Err(DashboardError::Api(ApiError::Unauthorized)) => {
            Err(DashboardError::Api(ApiError::Unauthorized))
        }
        Err(
            e @ (DashboardError::Api(_)
            | DashboardError::Action { .. }
            | DashboardError::Validation(_)),
        ) => {
            Ok(flash_redirect(back, &Notice::new(Level::Error, e.to_string())))
        }
        Err(e) => Err(e),
    }
}

/// Error banner text prefixed the way each screen reports failures
pub fn failed(action: &str) -> impl Fn(ApiError) -> DashboardError + '_ {
    move |e| match e {
        ApiError::Unauthorized => DashboardError::Api(ApiError::Unauthorized),
        source => DashboardError::Action {
            action: action.to_string(),
            source,
        },
    }
}

/// Keep a secondary read model optional; only a rejected key aborts the page
pub fn tolerate<T>(what: &str, result: Result<T, ApiError>) -> Result<Option<T>, DashboardError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ApiError::Unauthorized) => Err(DashboardError::Api(ApiError::Unauthorized)),
        Err(e) => {
            warn!("Could not load {what}: {e}");
            Ok(None)
        }
    }
}

/// Only same-site absolute paths are accepted as redirect targets
pub fn safe_back(back: Option<&str>, default: &'static str) -> String {
    match back {
        Some(b) if b.starts_with('/') && !b.starts_with("//") && !b.contains('\\') => b.to_string(),
        _ => default.to_string(),
    }
}

/// File download response
pub fn attachment(filename: &str, content_type: &'static str, body: String) -> Response {
    let filename: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

/// Files posted as `file` parts of a multipart form; empty parts are skipped
pub async fn uploaded_files(
    mut multipart: axum::extract::Multipart,
) -> Result<Vec<(String, Vec<u8>)>, DashboardError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DashboardError::validation(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| DashboardError::validation(format!("Invalid upload: {e}")))?;
        if !name.is_empty() && !bytes.is_empty() {
            files.push((name, bytes.to_vec()));
        }
    }
    Ok(files)
}

// --- Page rendering ---

/// Render a page inside the layout for a logged-in session
pub fn render_page(
    state: &AppState,
    session: &Session,
    template: &str,
    active: &str,
    flash: &Flash,
    ctx: minijinja::Value,
) -> Result<Response, DashboardError> {
    let html = state.renderer.render(
        template,
        context! {
            logged_in => true,
            active => active,
            api_base => session.client.base_url(),
            app_version => crate::VERSION,
            notice => flash.notice.as_deref(),
            level => flash.level.unwrap_or(Level::Info),
            ..ctx
        },
    )?;
    Ok(Html(html).into_response())
}

/// Template data of a latest-version check
pub fn version_check(current: &ServerVersion, latest: Result<String, ApiError>) -> Result<minijinja::Value, DashboardError> {
    match latest {
        Ok(latest) => {
            let status = VersionStatus::of(&current.version, &latest);
            Ok(context! {
                latest => latest,
                label => status.label(),
                class => status.class(),
            })
        }
        Err(ApiError::Unauthorized) => Err(DashboardError::Api(ApiError::Unauthorized)),
        Err(e) => Ok(context! { error => e.to_string() }),
    }
}

/// Build a limit from the add/edit form fields
pub fn limit_from_form(
    api_key: &str,
    allowed_models: &str,
    monthly_quotas: &str,
) -> Result<ApiKeyLimit, DashboardError> {
    let mut limit = ApiKeyLimit::new(api_key.trim());
    limit.allowed_models = crate::format::parse_lines(allowed_models);
    limit.monthly_quotas =
        crate::format::parse_quota_lines(monthly_quotas).map_err(DashboardError::Validation)?;
    Ok(limit)
}
