use axum::{
    Extension, Form,
    extract::{Query, State},
    response::Response,
};
use minijinja::context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Flash, Notice, failed, finish, render_page, settings::toggle_rows};
use crate::AppState;
use crate::api::Toggle;
use crate::api::types::{AmpcodeSettings, ExcludedModels};
use crate::error::DashboardError;
use crate::format::parse_lines;
use crate::session::Session;

const QUOTA_TOGGLES: [Toggle; 2] = [Toggle::SwitchProject, Toggle::SwitchPreviewModel];

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
) -> Result<Response, DashboardError> {
    let client = &session.client;
    let (config, excluded, mappings) = tokio::join!(
        client.config(),
        client.oauth_excluded_models(),
        client.oauth_model_mappings(),
    );
    let config = config?;
    let excluded = excluded?;
    let mappings = mappings?;

    let excluded_format = match excluded {
        ExcludedModels::PerProvider(_) => "json",
        ExcludedModels::List(_) => "lines",
    };
    let model_mappings = match &mappings {
        Value::Array(items) if items.is_empty() => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };

    render_page(
        &state,
        &session,
        "quota.html",
        "quota",
        &flash,
        context! {
            toggles => toggle_rows(&QUOTA_TOGGLES, &config, &AmpcodeSettings::default()),
            excluded_format => excluded_format,
            excluded_models => excluded.to_editor_text(),
            model_mappings => model_mappings,
        },
    )
}

#[derive(Debug, Deserialize)]
pub struct ExcludedForm {
    #[serde(default)]
    format: String,
    #[serde(default)]
    models: String,
}

fn parse_excluded(format: &str, text: &str) -> Result<ExcludedModels, DashboardError> {
    if format != "json" {
        return Ok(ExcludedModels::List(parse_lines(text)));
    }
    if text.trim().is_empty() {
        return Ok(ExcludedModels::PerProvider(BTreeMap::new()));
    }
    serde_json::from_str::<BTreeMap<String, Vec<String>>>(text)
        .map(ExcludedModels::PerProvider)
        .map_err(|e| DashboardError::validation(format!("Invalid JSON: {e}")))
}

pub async fn save_excluded(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<ExcludedForm>,
) -> Result<Response, DashboardError> {
    finish("/quota", async {
        let models = parse_excluded(&form.format, &form.models)?;
        session
            .client
            .set_oauth_excluded_models(&models)
            .await
            .map_err(failed("save excluded models"))?;
        Ok(Notice::success("Excluded models saved successfully!"))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct MappingsForm {
    #[serde(default)]
    mappings: String,
}

/// Mappings are checked locally; invalid JSON never reaches the backend
pub async fn save_mappings(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<MappingsForm>,
) -> Result<Response, DashboardError> {
    finish("/quota", async {
        let text = form.mappings.trim();
        let mappings = if text.is_empty() {
            Value::Array(Vec::new())
        } else {
            serde_json::from_str(text)
                .map_err(|e| DashboardError::validation(format!("Invalid JSON: {e}")))?
        };
        session
            .client
            .set_oauth_model_mappings(mappings)
            .await
            .map_err(failed("save model mappings"))?;
        Ok(Notice::success("Model mappings saved successfully!"))
    }
    .await)
}
