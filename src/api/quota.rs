use serde_json::Value;

use super::ManagementClient;
use super::types::{Envelope, ExcludedModels};
use crate::error::ApiError;

impl ManagementClient {
    pub async fn oauth_excluded_models(&self) -> Result<ExcludedModels, ApiError> {
        let doc = self.get("/oauth-excluded-models", &[]).await?.into_json();
        match Envelope::EXCLUDED_MODELS.unwrap_or_self(doc) {
            Value::Null => Ok(ExcludedModels::default()),
            Value::Object(map) if map.is_empty() => Ok(ExcludedModels::default()),
            inner => Ok(serde_json::from_value(inner)?),
        }
    }

    pub async fn set_oauth_excluded_models(&self, models: &ExcludedModels) -> Result<(), ApiError> {
        self.put_value("/oauth-excluded-models", serde_json::to_value(models)?)
            .await
    }

    pub async fn oauth_model_mappings(&self) -> Result<Value, ApiError> {
        let doc = self.get("/oauth-model-mappings", &[]).await?.into_json();
        Ok(match Envelope::MODEL_MAPPINGS.unwrap_or_self(doc) {
            Value::Null => Value::Array(Vec::new()),
            inner => inner,
        })
    }

    pub async fn set_oauth_model_mappings(&self, mappings: Value) -> Result<(), ApiError> {
        self.put_value("/oauth-model-mappings", mappings).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::client_for;
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_excluded_models_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/oauth-excluded-models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "oauth-excluded-models": {"gemini-cli": ["gemini-2.5-pro"]}
            })))
            .mount(&server)
            .await;

        let models = client_for(&server).oauth_excluded_models().await.unwrap();
        let ExcludedModels::PerProvider(map) = models else {
            panic!("expected per-provider map");
        };
        assert_eq!(map["gemini-cli"], vec!["gemini-2.5-pro"]);
    }

    #[tokio::test]
    async fn test_empty_documents_are_empty_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/management/oauth-excluded-models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/management/oauth-model-mappings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.oauth_excluded_models().await.unwrap(),
            ExcludedModels::default()
        );
        assert_eq!(client.oauth_model_mappings().await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_set_mappings_wraps_value() {
        let server = MockServer::start().await;
        let mappings = json!([{"from": "upstream-model", "to": "local-model"}]);
        Mock::given(method("PUT"))
            .and(path("/v0/management/oauth-model-mappings"))
            .and(body_json(json!({"value": mappings})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .set_oauth_model_mappings(mappings.clone())
            .await
            .unwrap();
    }
}
