use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::Response,
};
use minijinja::context;
use serde::Deserialize;
use std::sync::Arc;

use super::{Flash, Notice, failed, finish, render_page};
use crate::AppState;
use crate::api::ProviderKind;
use crate::api::types::{OpenAiCompat, ProviderKey};
use crate::error::DashboardError;
use crate::session::Session;

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
) -> Result<Response, DashboardError> {
    let client = &session.client;
    let (gemini, claude, codex, vertex, compat) = tokio::join!(
        client.provider_keys(ProviderKind::Gemini),
        client.provider_keys(ProviderKind::Claude),
        client.provider_keys(ProviderKind::Codex),
        client.provider_keys(ProviderKind::Vertex),
        client.openai_compat(),
    );

    let mut sections = Vec::new();
    for (kind, keys) in ProviderKind::ALL.into_iter().zip([gemini, claude, codex, vertex]) {
        let keys: Vec<_> = keys?
            .into_iter()
            .map(|key| {
                context! {
                    api_key => key.api_key,
                    base_url => key.base_url.unwrap_or_default(),
                    proxy_url => key.proxy_url.unwrap_or_default(),
                    prefix => key.prefix.unwrap_or_default(),
                }
            })
            .collect();
        sections.push(context! {
            slug => kind.slug(),
            label => kind.label(),
            keys => keys,
        });
    }

    let compat: Vec<_> = compat?
        .iter()
        .map(|entry| {
            context! {
                name => &entry.name,
                base_url => &entry.base_url,
                model_count => entry.models.len(),
                json => serde_json::to_string_pretty(entry).unwrap_or_default(),
            }
        })
        .collect();

    render_page(
        &state,
        &session,
        "providers.html",
        "providers",
        &flash,
        context! { sections => sections, compat => compat },
    )
}

fn provider_kind(slug: &str) -> Result<ProviderKind, DashboardError> {
    ProviderKind::from_slug(slug)
        .ok_or_else(|| DashboardError::validation(format!("Unknown provider: {slug}")))
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, Deserialize)]
pub struct KeyForm {
    api_key: String,
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    proxy_url: String,
    #[serde(default)]
    prefix: String,
    /// Present when editing an existing entry
    original_api_key: Option<String>,
}

/// Add a provider key, or update the one named by `original_api_key`
pub async fn save_key(
    Extension(session): Extension<Arc<Session>>,
    Path(slug): Path<String>,
    Form(form): Form<KeyForm>,
) -> Result<Response, DashboardError> {
    finish("/providers", async {
        let kind = provider_kind(&slug)?;
        let api_key = form.api_key.trim();
        if api_key.is_empty() {
            return Err(DashboardError::validation("Please enter an API key"));
        }

        let client = &session.client;
        let original = form.original_api_key.as_deref().and_then(optional);
        let mut entry = match &original {
            // Keep fields this form does not edit
            Some(original) => client
                .provider_keys(kind)
                .await
                .map_err(failed("load provider keys"))?
                .into_iter()
                .find(|k| k.api_key == *original)
                .unwrap_or_default(),
            None => ProviderKey::default(),
        };
        entry.api_key = api_key.to_string();
        entry.base_url = optional(&form.base_url);
        entry.proxy_url = optional(&form.proxy_url);
        entry.prefix = optional(&form.prefix);

        match original {
            Some(original) if original != entry.api_key => {
                client
                    .add_provider_key(kind, &entry)
                    .await
                    .map_err(failed("update provider key"))?;
                client
                    .delete_provider_key(kind, &original)
                    .await
                    .map_err(failed("remove the previous key"))?;
            }
            Some(_) => client
                .update_provider_key(kind, &entry)
                .await
                .map_err(failed("update provider key"))?,
            None => client
                .add_provider_key(kind, &entry)
                .await
                .map_err(failed("add provider key"))?,
        }
        Ok(Notice::success(format!("{} key saved successfully", kind.label())))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct DeleteKeyForm {
    api_key: String,
}

pub async fn delete_key(
    Extension(session): Extension<Arc<Session>>,
    Path(slug): Path<String>,
    Form(form): Form<DeleteKeyForm>,
) -> Result<Response, DashboardError> {
    finish("/providers", async {
        let kind = provider_kind(&slug)?;
        session
            .client
            .delete_provider_key(kind, &form.api_key)
            .await
            .map_err(failed("delete provider key"))?;
        Ok(Notice::success(format!("{} key deleted successfully", kind.label())))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct CompatForm {
    entry: String,
    mode: String,
}

/// Add or update an OpenAI-compatible provider from its JSON form
pub async fn save_compat(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<CompatForm>,
) -> Result<Response, DashboardError> {
    finish("/providers", async {
        let entry: OpenAiCompat = serde_json::from_str(form.entry.trim())
            .map_err(|e| DashboardError::validation(format!("Invalid provider JSON: {e}")))?;
        if entry.name.trim().is_empty() {
            return Err(DashboardError::validation("Provider name is required"));
        }

        let client = &session.client;
        if form.mode == "update" {
            client
                .update_openai_compat(&entry)
                .await
                .map_err(failed("update provider"))?;
        } else {
            client
                .add_openai_compat(&entry)
                .await
                .map_err(failed("add provider"))?;
        }
        Ok(Notice::success(format!("Provider {} saved successfully", entry.name)))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct DeleteCompatForm {
    name: String,
}

pub async fn delete_compat(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<DeleteCompatForm>,
) -> Result<Response, DashboardError> {
    finish("/providers", async {
        session
            .client
            .delete_openai_compat(&form.name)
            .await
            .map_err(failed("delete provider"))?;
        Ok(Notice::success(format!("Provider {} deleted successfully", form.name)))
    }
    .await)
}
