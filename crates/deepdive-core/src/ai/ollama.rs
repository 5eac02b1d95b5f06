use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::structured::{self, SchemaDialect};
use super::{KnowledgeSource, TermDefinition, TopicAnswer};
use crate::error::CollaboratorError;

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Generate with the reply constrained to `schema`
    pub async fn query_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        schema: Value,
    ) -> Result<String, CollaboratorError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            system: system.map(str::to_string),
            format: Some(schema),
        };

        tracing::debug!(model = %self.model, "sending Ollama request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                provider: "Ollama",
                status,
                body: format!("{body} (make sure Ollama is running with: ollama serve)"),
            });
        }

        let ollama_response: OllamaResponse = response.json().await?;
        Ok(ollama_response.response)
    }

    pub async fn list_models(&self) -> Result<Vec<String>, CollaboratorError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status { provider: "Ollama", status, body });
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }

    pub async fn has_model(&self, name: &str) -> Result<bool, CollaboratorError> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m == name))
    }
}

#[async_trait]
impl KnowledgeSource for OllamaClient {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn search_topic(&self, query: &str) -> Result<TopicAnswer, CollaboratorError> {
        let raw = self
            .query_json(
                query,
                Some(structured::TOPIC_INSTRUCTION),
                structured::topic_schema(SchemaDialect::JsonSchema),
            )
            .await?;
        Ok(structured::parse_topic_answer(&raw))
    }

    async fn define_term(&self, term: &str, context: &str) -> Result<TermDefinition, CollaboratorError> {
        let prompt = structured::definition_prompt(term, context);
        let raw = self
            .query_json(&prompt, None, structured::definition_schema(SchemaDialect::JsonSchema))
            .await?;
        Ok(structured::parse_definition(&raw))
    }
}
