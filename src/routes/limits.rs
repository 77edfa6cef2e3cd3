use axum::{
    Extension, Form,
    extract::{Query, State},
    response::Response,
};
use minijinja::context;
use serde::Deserialize;
use std::sync::Arc;

use super::{Flash, Notice, failed, finish, limit_from_form, render_page, tolerate};
use crate::AppState;
use crate::api::types::ApiKeyLimit;
use crate::error::DashboardError;
use crate::format::{quota_lines, truncate_key};
use crate::session::Session;

#[derive(Debug, Default, Deserialize)]
pub struct LimitsQuery {
    edit: Option<String>,
    key: Option<String>,
    model: Option<String>,
}

/// Which rules of a key's limit apply to one model
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPreview {
    pub limited: bool,
    pub allowed: bool,
    pub quota: Option<(String, u64)>,
}

impl AccessPreview {
    pub fn evaluate(limit: Option<&ApiKeyLimit>, model: &str) -> Self {
        match limit {
            None => Self {
                limited: false,
                allowed: true,
                quota: None,
            },
            Some(limit) => Self {
                limited: true,
                allowed: limit.allows(model),
                quota: limit
                    .quota_for(model)
                    .map(|(pattern, count)| (pattern.to_string(), count)),
            },
        }
    }
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
    Query(query): Query<LimitsQuery>,
) -> Result<Response, DashboardError> {
    let client = &session.client;
    let (limits, keys) = tokio::join!(client.api_key_limits(), client.api_keys());
    let limits = limits?;
    let keys = tolerate("API keys", keys)?.unwrap_or_default();

    let rows: Vec<_> = limits
        .iter()
        .map(|limit| {
            context! {
                api_key => &limit.api_key,
                display => truncate_key(&limit.api_key),
                allowed_models => &limit.allowed_models,
                allowed_providers => &limit.allowed_providers,
                allowed_credentials => &limit.allowed_credentials,
                quotas => limit
                    .monthly_quotas
                    .iter()
                    .map(|(pattern, count)| context! { pattern => pattern, count => count })
                    .collect::<Vec<_>>(),
            }
        })
        .collect();

    let editing = query
        .edit
        .as_deref()
        .map(|key| limits.iter().find(|l| l.api_key == key).cloned().unwrap_or_else(|| ApiKeyLimit::new(key)));
    let form = editing.as_ref().map(|limit| {
        context! {
            api_key => &limit.api_key,
            allowed_models => limit.allowed_models.join("\n"),
            monthly_quotas => quota_lines(&limit.monthly_quotas),
        }
    });

    let preview = match (query.key.as_deref(), query.model.as_deref().map(str::trim)) {
        (Some(key), Some(model)) if !key.is_empty() && !model.is_empty() => {
            let result =
                AccessPreview::evaluate(limits.iter().find(|l| l.api_key == key), model);
            Some(context! {
                key => key,
                model => model,
                limited => result.limited,
                allowed => result.allowed,
                quota_pattern => result.quota.as_ref().map(|(p, _)| p.clone()),
                quota => result.quota.as_ref().map(|(_, c)| *c),
            })
        }
        _ => None,
    };

    render_page(
        &state,
        &session,
        "api_key_limits.html",
        "api_key_limits",
        &flash,
        context! {
            limits => rows,
            keys => keys,
            editing => editing.is_some(),
            form => form,
            preview => preview,
        },
    )
}

#[derive(Debug, Deserialize)]
pub struct LimitForm {
    api_key: String,
    #[serde(default)]
    allowed_models: String,
    #[serde(default)]
    monthly_quotas: String,
}

/// Add or update one key's limit
pub async fn save(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<LimitForm>,
) -> Result<Response, DashboardError> {
    finish("/api-key-limits", async {
        if form.api_key.trim().is_empty() {
            return Err(DashboardError::validation("Please select an API key"));
        }
        let edited = limit_from_form(&form.api_key, &form.allowed_models, &form.monthly_quotas)?;

        // The backend replaces the whole entry; keep what this form does not edit
        let client = &session.client;
        let existing = client
            .api_key_limits()
            .await
            .map_err(failed("load API key limits"))?
            .into_iter()
            .find(|l| l.api_key == edited.api_key);
        let limit = match existing {
            Some(limit) => ApiKeyLimit {
                allowed_models: edited.allowed_models,
                monthly_quotas: edited.monthly_quotas,
                ..limit
            },
            None => edited,
        };
        client
            .upsert_api_key_limit(&limit)
            .await
            .map_err(failed("save API key limit"))?;
        Ok(Notice::success("API key limit saved successfully"))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    api_key: String,
}

pub async fn delete(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<DeleteForm>,
) -> Result<Response, DashboardError> {
    finish("/api-key-limits", async {
        session
            .client
            .delete_api_key_limit(&form.api_key)
            .await
            .map_err(failed("delete API key limit"))?;
        Ok(Notice::success("API key limit deleted successfully"))
    }
    .await)
}
