use axum::{
    Extension, Form,
    extract::{Query, State},
    response::Response,
};
use minijinja::context;
use serde::Deserialize;
use std::sync::Arc;

use super::{Flash, Level, Notice, failed, finish, render_page};
use crate::AppState;
use crate::error::DashboardError;
use crate::session::Session;

#[derive(Debug, Default, Deserialize)]
pub struct ReloadQuery {
    reloaded: Option<String>,
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(mut flash): Query<Flash>,
    Query(query): Query<ReloadQuery>,
) -> Result<Response, DashboardError> {
    let yaml = session.client.config_yaml().await?;
    if query.reloaded.is_some() && flash.notice.is_none() {
        flash.notice = Some("Configuration reloaded".into());
        flash.level = Some(Level::Info);
    }

    render_page(
        &state,
        &session,
        "config.html",
        "config",
        &flash,
        context! { yaml => yaml },
    )
}

#[derive(Debug, Deserialize)]
pub struct ConfigForm {
    yaml: String,
}

/// Store the editor text unchanged apart from browser line endings
pub async fn save(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<ConfigForm>,
) -> Result<Response, DashboardError> {
    finish("/config", async {
        // Browsers submit textarea content with CRLF line breaks
        let yaml = form.yaml.replace("\r\n", "\n");
        session
            .client
            .save_config_yaml(&yaml)
            .await
            .map_err(failed("save configuration"))?;
        Ok(Notice::success("Configuration saved successfully!"))
    }
    .await)
}
