use axum::{
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::constants::SESSION_COOKIE;

/// Failures of a call against the management API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The management key was rejected, or the session was already revoked
    #[error("Unauthorized")]
    Unauthorized,

    /// Non-2xx response; the message is the backend's body text or `HTTP <status>`
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Parse(e.to_string())
    }
}

/// Failures of a dashboard page or form handler
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A management call behind a named dashboard action failed
    #[error("Failed to {action}: {source}")]
    Action {
        action: String,
        #[source]
        source: ApiError,
    },

    /// Rejected before any network call
    #[error("{0}")]
    Validation(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DashboardError {
    pub fn validation(message: impl Into<String>) -> Self {
        DashboardError::Validation(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            DashboardError::Api(ApiError::Unauthorized) => StatusCode::UNAUTHORIZED,
            DashboardError::Api(_) | DashboardError::Action { .. } => StatusCode::BAD_GATEWAY,
            DashboardError::Validation(_) => StatusCode::BAD_REQUEST,
            DashboardError::Template(_) | DashboardError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// `Set-Cookie` value expiring the session cookie
pub fn clear_session_cookie(secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{secure_flag}")
}

/// Response sending the browser back to the login form with the session cookie cleared
pub fn login_redirect(secure: bool) -> Response {
    (
        [(header::SET_COOKIE, clear_session_cookie(secure))],
        Redirect::to("/login?expired=1"),
    )
        .into_response()
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        if matches!(self, DashboardError::Api(ApiError::Unauthorized)) {
            return login_redirect(false);
        }

        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Dashboard error: {self}");
        }

        let body = format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Error</title></head>\
             <body><h1>{}</h1><p>{}</p><p><a href=\"/\">Back to dashboard</a></p></body></html>",
            status,
            html_escape(&self.to_string())
        );
        (status, Html(body)).into_response()
    }
}

/// Minimal HTML entity escaping for messages rendered outside templates
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
