use axum::{
    Extension,
    extract::{Query, State},
    response::Response,
};
use minijinja::context;
use serde::Deserialize;
use std::sync::Arc;

use super::{Flash, Level, Notice, attachment, failed, finish, render_page};
use crate::AppState;
use crate::api::LogsReply;
use crate::error::{ApiError, DashboardError};
use crate::format::{format_file_size, format_timestamp};
use crate::session::Session;

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
) -> Result<Response, DashboardError> {
    let client = &session.client;
    let (logs, error_logs) = tokio::join!(client.logs(), client.request_error_logs());

    let (logs, logs_disabled) = match logs? {
        LogsReply::Text(text) => (text, None),
        LogsReply::Disabled(message) => (String::new(), Some(message)),
    };
    let (error_logs, error_logs_error) = match error_logs {
        Ok(files) => (files, None),
        Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized.into()),
        Err(e) => (Vec::new(), Some(format!("Could not load request error logs: {e}"))),
    };
    let error_logs: Vec<_> = error_logs
        .iter()
        .map(|file| {
            context! {
                name => &file.name,
                size => format_file_size(file.size),
                modified => format_timestamp(file.modified.as_ref()),
            }
        })
        .collect();

    render_page(
        &state,
        &session,
        "logs.html",
        "logs",
        &flash,
        context! {
            logs => logs,
            logs_disabled => logs_disabled,
            error_logs => error_logs,
            error_logs_error => error_logs_error,
        },
    )
}

pub async fn download(Extension(session): Extension<Arc<Session>>) -> Result<Response, DashboardError> {
    match session.client.logs().await {
        Ok(LogsReply::Text(text)) if !text.trim().is_empty() => {
            Ok(attachment("logs.txt", "text/plain; charset=utf-8", text))
        }
        Ok(_) => finish(
            "/logs",
            Ok(Notice::new(Level::Warning, "No logs available to download")),
        ),
        Err(e) => finish("/logs", Err(failed("download logs")(e))),
    }
}

pub async fn clear(Extension(session): Extension<Arc<Session>>) -> Result<Response, DashboardError> {
    finish("/logs", async {
        session
            .client
            .clear_logs()
            .await
            .map_err(failed("clear logs"))?;
        Ok(Notice::success("Logs cleared successfully!"))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct ErrorLogQuery {
    name: String,
}

pub async fn download_error_log(
    Extension(session): Extension<Arc<Session>>,
    Query(query): Query<ErrorLogQuery>,
) -> Result<Response, DashboardError> {
    match session.client.request_error_log(&query.name).await {
        Ok(content) => Ok(attachment(&query.name, "text/plain; charset=utf-8", content)),
        Err(e) => finish("/logs", Err(failed("download error log")(e))),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestLogQuery {
    #[serde(default)]
    id: String,
}

/// Show the stored log of one request
pub async fn request_log(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
    Query(query): Query<RequestLogQuery>,
) -> Result<Response, DashboardError> {
    let id = query.id.trim();
    if id.is_empty() {
        return finish("/logs", Err(DashboardError::validation("Please enter a request ID")));
    }
    let content = match session.client.request_log_by_id(id).await {
        Ok(content) => content,
        Err(e) => return finish("/logs", Err(failed("load request log")(e))),
    };

    render_page(
        &state,
        &session,
        "text_view.html",
        "logs",
        &flash,
        context! {
            title => format!("Request {id}"),
            content => content,
            back => "/logs",
        },
    )
}
