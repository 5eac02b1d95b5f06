use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::structured::{self, SchemaDialect};
use super::{KnowledgeSource, TermDefinition, TopicAnswer};
use crate::error::CollaboratorError;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![GeminiPart { text: text.to_string() }],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

impl GeminiResponse {
    /// Text of the first candidate, parts concatenated
    fn text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        Some(parts.into_iter().filter_map(|p| p.text).collect())
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn build_request(prompt: &str, system: Option<&str>, schema: Value) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent::text(Some("user"), prompt)],
            system_instruction: system.map(|s| GeminiContent::text(None, s)),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: schema,
            },
        }
    }

    /// Ask for JSON constrained by `schema`; returns the raw reply text.
    pub async fn query_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        schema: Value,
    ) -> Result<String, CollaboratorError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let request = Self::build_request(prompt, system, schema);

        tracing::debug!(model = %self.model, "sending Gemini request");

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status { provider: "Gemini", status, body });
        }

        let gemini_response: GeminiResponse = response.json().await?;
        gemini_response.text().ok_or(CollaboratorError::Empty("Gemini"))
    }
}

#[async_trait]
impl KnowledgeSource for GeminiClient {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn search_topic(&self, query: &str) -> Result<TopicAnswer, CollaboratorError> {
        let raw = self
            .query_json(
                query,
                Some(structured::TOPIC_INSTRUCTION),
                structured::topic_schema(SchemaDialect::Gemini),
            )
            .await?;
        Ok(structured::parse_topic_answer(&raw))
    }

    async fn define_term(&self, term: &str, context: &str) -> Result<TermDefinition, CollaboratorError> {
        let prompt = structured::definition_prompt(term, context);
        let raw = self
            .query_json(&prompt, None, structured::definition_schema(SchemaDialect::Gemini))
            .await?;
        Ok(structured::parse_definition(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::test_server::respond_once;

    #[test]
    fn test_request_shape() {
        let request = GeminiClient::build_request(
            "Explain Quantum Computing",
            Some("be helpful"),
            structured::topic_schema(SchemaDialect::Gemini),
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Explain Quantum Computing");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be helpful");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn test_request_without_system_instruction() {
        let request = GeminiClient::build_request("define", None, Value::Null);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn test_response_text_joins_parts() {
        let raw = r#"{"candidates": [{"content": {"parts": [{"text": "{\"answer\":"}, {"text": " \"hi\"}"}]}}]}"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"answer\": \"hi\"}"));
    }

    #[test]
    fn test_response_without_candidates() {
        let response: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text(), None);

        let blocked: GeminiResponse = serde_json::from_str(r#"{"candidates": [{}]}"#).unwrap();
        assert_eq!(blocked.text().as_deref(), Some(""));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = GeminiClient::new("key", "gemini-2.5-flash").with_base_url("http://localhost:9999/");
        assert_eq!(client.base_url, "http://localhost:9999");
    }

    fn client_at(base_url: &str) -> GeminiClient {
        GeminiClient::new("key", "gemini-2.5-flash").with_base_url(base_url)
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let url = respond_once(500, r#"{"error": "quota exhausted"}"#).await;
        let err = client_at(&url).search_topic("qubits").await.unwrap_err();
        match err {
            CollaboratorError::Status { provider, status, body } => {
                assert_eq!(provider, "Gemini");
                assert_eq!(status.as_u16(), 500);
                assert!(body.contains("quota exhausted"));
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty() {
        let url = respond_once(200, r#"{"candidates": []}"#).await;
        let err = client_at(&url).define_term("qubit", "").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Empty("Gemini")));
    }

    #[tokio::test]
    async fn test_non_json_text_falls_back_to_raw() {
        let url = respond_once(
            200,
            r#"{"candidates": [{"content": {"parts": [{"text": "Qubits are two-level systems."}]}}]}"#,
        )
        .await;
        let answer = client_at(&url).search_topic("qubits").await.unwrap();
        assert_eq!(answer.text, "Qubits are two-level systems.");
        assert!(answer.suggested_terms.is_empty());
    }

    #[tokio::test]
    async fn test_structured_reply_parses() {
        let url = respond_once(
            200,
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"definition\": \"A unit of quantum information.\", \"related_topics\": [\"Superposition\"]}"}]}}]}"#,
        )
        .await;
        let definition = client_at(&url).define_term("qubit", "context").await.unwrap();
        assert_eq!(definition.definition, "A unit of quantum information.");
        assert_eq!(definition.related, vec!["Superposition"]);
    }
}
