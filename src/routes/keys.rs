use axum::{
    Extension, Form,
    extract::{Query, State},
    response::Response,
};
use minijinja::context;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::{Flash, Level, Notice, failed, finish, limit_from_form, render_page, tolerate};
use crate::AppState;
use crate::api::LimitCleanup;
use crate::error::DashboardError;
use crate::format::truncate_key;
use crate::session::Session;

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
) -> Result<Response, DashboardError> {
    let client = &session.client;
    let (keys, limits) = tokio::join!(client.api_keys(), client.api_key_limits());
    let keys = keys?;
    let limited: HashSet<String> = tolerate("API key limits", limits)?
        .unwrap_or_default()
        .into_iter()
        .filter(|l| l.is_restrictive())
        .map(|l| l.api_key)
        .collect();

    let rows: Vec<_> = keys
        .iter()
        .map(|key| {
            context! {
                value => key,
                display => truncate_key(key),
                limited => limited.contains(key),
            }
        })
        .collect();

    render_page(
        &state,
        &session,
        "api_keys.html",
        "api_keys",
        &flash,
        context! { keys => rows },
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateForm {
    key: String,
    #[serde(default)]
    allowed_models: String,
    #[serde(default)]
    monthly_quotas: String,
}

/// Add a key, then its limit when one was given.
///
/// A failing limit call leaves the key in place; only that failure is reported.
pub async fn create(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<CreateForm>,
) -> Result<Response, DashboardError> {
    finish("/api-keys", async {
        let key = form.key.trim();
        if key.is_empty() {
            return Err(DashboardError::validation("Please enter an API key"));
        }
        let limit = limit_from_form(key, &form.allowed_models, &form.monthly_quotas)?;

        let client = &session.client;
        client.add_api_key(key).await.map_err(failed("add API key"))?;
        if !limit.is_restrictive() {
            return Ok(Notice::success("API key added successfully"));
        }

        match client.upsert_api_key_limit(&limit).await {
            Ok(()) => Ok(Notice::success("API key and limit added successfully")),
            Err(e) if e.is_unauthorized() => Err(e.into()),
            Err(e) => Ok(Notice::new(
                Level::Warning,
                format!("API key added, but failed to add API key limit: {e}"),
            )),
        }
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct RenameForm {
    old: String,
    new: String,
}

pub async fn rename(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<RenameForm>,
) -> Result<Response, DashboardError> {
    finish("/api-keys", async {
        let new = form.new.trim();
        if new.is_empty() {
            return Err(DashboardError::validation("Please enter an API key"));
        }
        session
            .client
            .rename_api_key(&form.old, new)
            .await
            .map_err(failed("update API key"))?;
        Ok(Notice::success("API key updated successfully"))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    key: String,
}

/// Delete a key and clean up its limit; a missing limit is not an error
pub async fn delete(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<DeleteForm>,
) -> Result<Response, DashboardError> {
    finish("/api-keys", async {
        let cleanup = session
            .client
            .delete_api_key(&form.key)
            .await
            .map_err(failed("delete API key"))?;

        Ok(match cleanup {
            LimitCleanup::Removed | LimitCleanup::NotPresent => {
                Notice::success("API key deleted successfully")
            }
            LimitCleanup::Failed(e) if e.is_unauthorized() => return Err(e.into()),
            LimitCleanup::Failed(e) => Notice::new(
                Level::Warning,
                format!("API key deleted, but removing its limit failed: {e}"),
            ),
        })
    }
    .await)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_delete_with_missing_limit_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v0/management/api-keys"))
            .and(query_param("value", "sk-gone"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v0/management/api-key-limits"))
            .and(query_param("api_key", "sk-gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("limit not found"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(&state, post_form("/api-keys/delete", &token, &[("key", "sk-gone")])).await;
        assert!(location(&response).contains("level=success"));
        assert_eq!(notice(&response), "API key deleted successfully");
    }

    #[tokio::test]
    async fn test_create_with_limit() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v0/management/api-keys"))
            .and(body_json(json!({"old": "", "new": "sk-new"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/v0/management/api-key-limits"))
            .and(body_json(json!({
                "api-key": "sk-new",
                "allowed-models": ["gpt-*"],
                "monthly-quotas": {"gpt-*": 1000}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(
            &state,
            post_form(
                "/api-keys",
                &token,
                &[
                    ("key", "sk-new"),
                    ("allowed_models", "gpt-*\n"),
                    ("monthly_quotas", "gpt-*=1000\nunused=0"),
                ],
            ),
        )
        .await;
        assert_eq!(notice(&response), "API key and limit added successfully");
    }

    #[tokio::test]
    async fn test_limit_failure_keeps_key() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v0/management/api-keys"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/v0/management/api-key-limits"))
            .respond_with(ResponseTemplate::new(500).set_body_string("disk full"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(
            &state,
            post_form(
                "/api-keys",
                &token,
                &[("key", "sk-new"), ("allowed_models", "gpt-4o"), ("monthly_quotas", "")],
            ),
        )
        .await;
        assert!(location(&response).contains("level=warning"));
        assert_eq!(
            notice(&response),
            "API key added, but failed to add API key limit: disk full"
        );
    }

    #[tokio::test]
    async fn test_invalid_quota_line_is_rejected_before_any_call() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(
            &state,
            post_form(
                "/api-keys",
                &token,
                &[("key", "sk-new"), ("monthly_quotas", "gpt-4o")],
            ),
        )
        .await;
        assert!(location(&response).contains("level=error"));
    }
}
