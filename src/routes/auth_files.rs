use axum::{
    Extension, Form,
    extract::{Multipart, Query, State},
    response::Response,
};
use minijinja::context;
use serde::Deserialize;
use std::sync::Arc;

use super::{
    Flash, Level, Notice, attachment, failed, finish, render_page, uploaded_files,
};
use crate::AppState;
use crate::api::types::AuthFile;
use crate::error::DashboardError;
use crate::format::{format_file_size, format_timestamp, group_models};
use crate::session::Session;

/// Template rows of the auth file table
pub(super) fn file_rows(files: &[AuthFile]) -> Vec<minijinja::Value> {
    files
        .iter()
        .map(|file| {
            context! {
                name => &file.name,
                provider => file.provider_label(),
                email => file.email.as_deref(),
                size => file.size.map(format_file_size).unwrap_or_default(),
                modified => format_timestamp(file.modified()),
            }
        })
        .collect()
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
) -> Result<Response, DashboardError> {
    let files = session.client.auth_files().await?;
    render_page(
        &state,
        &session,
        "auth_files.html",
        "auth_files",
        &flash,
        context! { files => file_rows(&files) },
    )
}

/// Upload every selected file, reporting how many made it
pub async fn upload(
    Extension(session): Extension<Arc<Session>>,
    multipart: Multipart,
) -> Result<Response, DashboardError> {
    let files = uploaded_files(multipart).await;
    finish("/auth-files", async {
        let files = files?;
        if files.is_empty() {
            return Err(DashboardError::validation("Please select a file"));
        }

        // A rejected key revokes the client; the session layer handles that
        let summary = session.client.upload_auth_files(files).await;
        let level = if summary.all_failed() {
            Level::Error
        } else if summary.failed.is_empty() {
            Level::Success
        } else {
            Level::Warning
        };
        Ok(Notice::new(level, summary.message()))
    }
    .await)
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    name: String,
}

pub async fn download(
    Extension(session): Extension<Arc<Session>>,
    Query(query): Query<NameQuery>,
) -> Result<Response, DashboardError> {
    match session.client.download_auth_file(&query.name).await {
        Ok(content) => Ok(attachment(&query.name, "application/json", content)),
        Err(e) => finish("/auth-files", Err(failed("download")(e))),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    name: String,
}

pub async fn delete(
    Extension(session): Extension<Arc<Session>>,
    Form(form): Form<DeleteForm>,
) -> Result<Response, DashboardError> {
    finish("/auth-files", async {
        session
            .client
            .delete_auth_file(&form.name)
            .await
            .map_err(failed("delete"))?;
        Ok(Notice::success("Auth file deleted successfully!"))
    }
    .await)
}

/// Models one credential exposes
pub async fn models(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Arc<Session>>,
    Query(flash): Query<Flash>,
    Query(query): Query<NameQuery>,
) -> Result<Response, DashboardError> {
    let models = session.client.auth_file_models(&query.name).await?;
    render_page(
        &state,
        &session,
        "auth_file_models.html",
        "auth_files",
        &flash,
        context! {
            name => query.name,
            model_groups => group_models(&models),
        },
    )
}

/// Import a Vertex service account JSON
pub async fn import_vertex(
    Extension(session): Extension<Arc<Session>>,
    multipart: Multipart,
) -> Result<Response, DashboardError> {
    let files = uploaded_files(multipart).await;
    finish("/auth-files", async {
        let Some((_, bytes)) = files?.into_iter().next() else {
            return Err(DashboardError::validation("Please select a file"));
        };
        let content = String::from_utf8(bytes)
            .map_err(|_| DashboardError::validation("Credential file is not valid UTF-8"))?;
        serde_json::from_str::<serde_json::Value>(&content)
            .map_err(|e| DashboardError::validation(format!("Invalid credential JSON: {e}")))?;

        session
            .client
            .import_vertex_credential(&content)
            .await
            .map_err(failed("import Vertex credential"))?;
        Ok(Notice::success("Vertex credential imported successfully!"))
    }
    .await)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use axum::http::{StatusCode, header};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upload_reports_partial_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v0/management/auth-files"))
            .and(body_string_contains("filename=\"broken.json\""))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid auth file"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v0/management/auth-files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(
            &state,
            post_files(
                "/auth-files",
                &token,
                &[
                    ("claude-a.json", r#"{"type": "claude"}"#),
                    ("broken.json", "{"),
                    ("codex-b.json", r#"{"type": "codex"}"#),
                ],
            ),
        )
        .await;
        assert!(location(&response).contains("level=warning"));
        assert_eq!(notice(&response), "Uploaded 2 file(s) successfully! (1 failed)");
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(&state, post_files("/auth-files", &token, &[])).await;
        assert!(location(&response).starts_with("/auth-files?"));
        assert!(location(&response).contains("level=error"));
    }

    #[tokio::test]
    async fn test_download_is_an_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/auth-files/download"))
            .and(query_param("name", "claude-a.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "claude"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let token = login(&state, &server).await;

        let response = send(&state, get("/auth-files/download?name=claude-a.json", &token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"claude-a.json\""
        );
        let body = body_text(response).await;
        assert_eq!(body, "{\n  \"type\": \"claude\"\n}");
    }
}
