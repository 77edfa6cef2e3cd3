use axum::{
    Extension,
    extract::{Query, State},
    response::Response,
};
use minijinja::context;
use serde::Deserialize;
use std::sync::Arc;

use super::{Flash, render_page, tolerate, version_check};
use crate::AppState;
use crate::error::DashboardError;
use crate::format::{format_number, group_models};
use crate::session::Session;

#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    pub check_version: Option<String>,
}

/// Overview: server info, flags, traffic and the model catalog
pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
    Query(query): Query<VersionQuery>,
) -> Result<Response, DashboardError> {
    let client = &session.client;
    let (config, server_version, usage, models) = tokio::join!(
        client.config(),
        client.server_version(),
        client.usage(),
        client.available_models(),
    );
    let config = config?;
    let server_version = server_version?;
    let usage = tolerate("usage statistics", usage)?;

    let version_check = match query.check_version {
        Some(_) => Some(version_check(&server_version, client.latest_version().await)?),
        None => None,
    };

    let flags = [
        ("Debug", config.debug),
        ("Request logging", config.request_log),
        ("Usage statistics", config.usage_statistics_enabled),
    ]
    .map(|(label, enabled)| context! { label => label, enabled => enabled });

    render_page(
        &state,
        &session,
        "dashboard.html",
        "dashboard",
        &flash,
        context! {
            listen_address => config.listen_address(),
            server_version => server_version.version,
            version_check => version_check,
            flags => flags.to_vec(),
            usage => usage.map(|u| context! {
                total_requests => format_number(u.total_requests),
                success_rate => u.success_rate(),
            }),
            model_count => models.len(),
            model_groups => group_models(&models),
        },
    )
}
