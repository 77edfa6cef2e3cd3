use axum::{
    Extension,
    extract::{Multipart, Query, State},
    response::Response,
};
use chrono::Utc;
use minijinja::context;
use std::sync::Arc;

use super::{Flash, Notice, attachment, failed, finish, render_page, uploaded_files};
use crate::AppState;
use crate::api::types::UsageReport;
use crate::error::{ApiError, DashboardError};
use crate::format::{format_number, truncate_key};
use crate::session::Session;

const TOP_MODELS: usize = 10;

fn usage_context(report: &UsageReport) -> minijinja::Value {
    let apis: Vec<_> = report
        .apis
        .iter()
        .map(|(key, api)| {
            context! {
                key => truncate_key(key),
                requests => format_number(api.total_requests),
                tokens => format_number(api.total_tokens),
            }
        })
        .collect();
    let models: Vec<_> = report
        .model_stats(TOP_MODELS)
        .into_iter()
        .map(|stat| {
            context! {
                model => stat.model,
                requests => format_number(stat.requests),
                tokens => format_number(stat.tokens),
            }
        })
        .collect();

    context! {
        total_requests => format_number(report.total_requests),
        success_count => format_number(report.success_count),
        failure_count => format_number(report.failure_count),
        success_rate => report.success_rate(),
        total_tokens => format_number(report.total_tokens),
        apis => apis,
        models => models,
    }
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
) -> Result<Response, DashboardError> {
    let (usage, usage_error) = match session.client.usage().await {
        Ok(report) => (Some(usage_context(&report)), None),
        Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized.into()),
        Err(e) => (None, Some(e.to_string())),
    };

    render_page(
        &state,
        &session,
        "usage.html",
        "usage",
        &flash,
        context! { usage => usage, usage_error => usage_error },
    )
}

/// Download the backend's export document
pub async fn export(Extension(session): Extension<Arc<Session>>) -> Result<Response, DashboardError> {
    match session.client.export_usage().await {
        Ok(document) => {
            let filename = format!("usage-export-{}.json", Utc::now().format("%Y-%m-%d"));
            Ok(attachment(&filename, "application/json", document))
        }
        Err(e) => finish("/usage", Err(failed("export usage")(e))),
    }
}

/// Merge an export document into the backend's statistics
pub async fn import(
    Extension(session): Extension<Arc<Session>>,
    multipart: Multipart,
) -> Result<Response, DashboardError> {
    let files = uploaded_files(multipart).await;
    finish("/usage", async {
        let Some((name, bytes)) = files?.into_iter().next() else {
            return Err(DashboardError::validation("Please select a JSON file to import"));
        };
        if !name.to_ascii_lowercase().ends_with(".json") {
            return Err(DashboardError::validation("Please select a valid JSON file"));
        }

        session
            .client
            .import_usage(&name, bytes)
            .await
            .map_err(failed("import usage data"))?;
        Ok(Notice::success("Usage data imported successfully!"))
    }
    .await)
}
