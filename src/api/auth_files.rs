use futures_util::future::join_all;
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde_json::json;

use super::types::{AuthFile, Envelope, ModelInfo};
use super::{Body, ManagementClient};
use crate::error::ApiError;

/// Result of a multi-file upload
#[derive(Debug, Default)]
pub struct UploadSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, ApiError)>,
}

impl UploadSummary {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Uploaded {} file(s) successfully!",
            self.succeeded.len()
        );
        if !self.failed.is_empty() {
            message.push_str(&format!(" ({} failed)", self.failed.len()));
        }
        message
    }

    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }
}

/// Multipart form carrying one file under the `file` field
pub(super) fn file_form(name: &str, bytes: Vec<u8>) -> Result<Form, ApiError> {
    let part = Part::bytes(bytes)
        .file_name(name.to_string())
        .mime_str("application/json")?;
    Ok(Form::new().part("file", part))
}

impl ManagementClient {
    pub async fn auth_files(&self) -> Result<Vec<AuthFile>, ApiError> {
        let doc = self.get("/auth-files", &[]).await?.into_json();
        Envelope::AUTH_FILES.unwrap_list(doc)
    }

    pub async fn upload_auth_file(&self, name: &str, bytes: Vec<u8>) -> Result<(), ApiError> {
        let form = file_form(name, bytes)?;
        self.call(Method::POST, "/auth-files", &[], Body::Multipart(form))
            .await?;
        Ok(())
    }

    /// Upload every file; one failure does not stop the others
    pub async fn upload_auth_files(&self, files: Vec<(String, Vec<u8>)>) -> UploadSummary {
        let uploads = files.into_iter().map(|(name, bytes)| async move {
            let result = self.upload_auth_file(&name, bytes).await;
            (name, result)
        });

        let mut summary = UploadSummary::default();
        for (name, result) in join_all(uploads).await {
            match result {
                Ok(()) => summary.succeeded.push(name),
                Err(e) => summary.failed.push((name, e)),
            }
        }
        summary
    }

    /// File content, pretty-printed when it is JSON
    pub async fn download_auth_file(&self, name: &str) -> Result<String, ApiError> {
        Ok(self
            .get("/auth-files/download", &[("name", name)])
            .await?
            .into_text())
    }

    pub async fn delete_auth_file(&self, name: &str) -> Result<(), ApiError> {
        self.delete("/auth-files", &[("name", name)]).await?;
        Ok(())
    }

    pub async fn auth_file_models(&self, name: &str) -> Result<Vec<ModelInfo>, ApiError> {
        let doc = self
            .get("/auth-files/models", &[("name", name)])
            .await?
            .into_json();
        Envelope::MODELS.unwrap_list(doc)
    }

    pub async fn import_vertex_credential(&self, content: &str) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            "/vertex/import",
            &[],
            &json!({ "content": content }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::client_for;
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_summary_message() {
        let mut summary = UploadSummary {
            succeeded: vec!["a.json".into(), "b.json".into()],
            failed: Vec::new(),
        };
        assert_eq!(summary.message(), "Uploaded 2 file(s) successfully!");

        summary.failed.push((
            "c.json".into(),
            ApiError::Status {
                status: 400,
                message: "invalid auth file".into(),
            },
        ));
        assert_eq!(summary.message(), "Uploaded 2 file(s) successfully! (1 failed)");
        assert!(!summary.all_failed());
    }

    #[tokio::test]
    async fn test_upload_three_files_one_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v0/management/auth-files"))
            .and(body_string_contains("filename=\"bad.json\""))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid auth file"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v0/management/auth-files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(2)
            .mount(&server)
            .await;

        let files = vec![
            ("one.json".to_string(), b"{}".to_vec()),
            ("bad.json".to_string(), b"{".to_vec()),
            ("two.json".to_string(), b"{}".to_vec()),
        ];
        let summary = client_for(&server).upload_auth_files(files).await;

        assert_eq!(summary.succeeded, vec!["one.json", "two.json"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "bad.json");
        assert_eq!(summary.message(), "Uploaded 2 file(s) successfully! (1 failed)");
    }

    #[tokio::test]
    async fn test_download_pretty_prints_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/auth-files/download"))
            .and(query_param("name", "claude-a@b.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "claude"})))
            .mount(&server)
            .await;

        let text = client_for(&server)
            .download_auth_file("claude-a@b.json")
            .await
            .unwrap();
        assert_eq!(text, "{\n  \"type\": \"claude\"\n}");
    }
}
