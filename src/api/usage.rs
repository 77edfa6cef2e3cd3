use reqwest::Method;
use serde_json::Value;

use super::auth_files::file_form;
use super::types::{Envelope, ErrorLogFile, UsageReport};
use super::{Body, ManagementClient, Payload};
use crate::error::ApiError;

/// Application log as the backend serves it
#[derive(Debug, Clone, PartialEq)]
pub enum LogsReply {
    Text(String),
    /// Logging to file is off; the backend says so in `{"error": ...}`
    Disabled(String),
}

impl LogsReply {
    fn from_payload(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => LogsReply::Text(text),
            Payload::Json(Value::Object(map)) => {
                if let Some(message) = map.get("error").and_then(Value::as_str) {
                    return LogsReply::Disabled(message.to_string());
                }
                if let Some(lines) = map.get("lines").and_then(Value::as_array) {
                    let text = lines
                        .iter()
                        .map(|line| line.as_str().map(str::to_string).unwrap_or_else(|| line.to_string()))
                        .collect::<Vec<_>>()
                        .join("\n");
                    return LogsReply::Text(text);
                }
                LogsReply::Text(Payload::Json(Value::Object(map)).into_text())
            }
            other => LogsReply::Text(other.into_text()),
        }
    }
}

impl ManagementClient {
    pub async fn usage(&self) -> Result<UsageReport, ApiError> {
        let doc = self.get("/usage", &[]).await?.into_json();
        UsageReport::from_document(doc)
    }

    /// Export document, pretty-printed
    pub async fn export_usage(&self) -> Result<String, ApiError> {
        Ok(self.get("/usage/export", &[]).await?.into_text())
    }

    pub async fn import_usage(&self, name: &str, bytes: Vec<u8>) -> Result<Payload, ApiError> {
        let form = file_form(name, bytes)?;
        self.call(Method::POST, "/usage/import", &[], Body::Multipart(form))
            .await
    }

    pub async fn logs(&self) -> Result<LogsReply, ApiError> {
        Ok(LogsReply::from_payload(self.get("/logs", &[]).await?))
    }

    pub async fn clear_logs(&self) -> Result<(), ApiError> {
        self.delete("/logs", &[]).await?;
        Ok(())
    }

    pub async fn request_error_logs(&self) -> Result<Vec<ErrorLogFile>, ApiError> {
        let doc = self.get("/request-error-logs", &[]).await?.into_json();
        Envelope::ERROR_LOG_FILES.unwrap_list(doc)
    }

    pub async fn request_error_log(&self, name: &str) -> Result<String, ApiError> {
        let path = format!("/request-error-logs/{}", urlencoding::encode(name));
        Ok(self.get(&path, &[]).await?.into_text())
    }

    pub async fn request_log_by_id(&self, id: &str) -> Result<String, ApiError> {
        let path = format!("/request-log-by-id/{}", urlencoding::encode(id));
        Ok(self.get(&path, &[]).await?.into_text())
    }
}
