//! Prompts, response schemas, and tolerant parsing of structured replies.
//!
//! Providers are asked for JSON, but nothing guarantees they comply. Parsing
//! never fails: a reply that isn't the expected shape degrades to its raw
//! text with no terms.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{TermDefinition, TopicAnswer};

pub const TOPIC_INSTRUCTION: &str = "You are a helpful, knowledgeable AI tutor.\n\
Answer the user's question clearly and accurately using markdown.\n\
After answering, identify 3-5 specific technical terms, proper nouns, or complex concepts \
used in your answer that a beginner might want to learn more about.";

/// How much of the surrounding text is quoted back in a definition prompt
pub const CONTEXT_LIMIT: usize = 500;

const NO_ANSWER: &str = "I couldn't generate an answer.";
const UNREADABLE_ANSWER: &str = "Error processing response.";
const NO_DEFINITION: &str = "Could not define term.";
const UNREADABLE_DEFINITION: &str = "Error retrieving definition.";

#[derive(Deserialize)]
struct RawTopic {
    answer: Option<String>,
    technical_terms: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawDefinition {
    definition: Option<String>,
    related_topics: Option<Vec<String>>,
}

/// Schema dialect: Gemini wants OpenAPI-style upper-case type names,
/// Ollama takes plain JSON Schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaDialect {
    Gemini,
    JsonSchema,
}

impl SchemaDialect {
    fn ty(self, name: &str) -> String {
        match self {
            SchemaDialect::Gemini => name.to_uppercase(),
            SchemaDialect::JsonSchema => name.to_string(),
        }
    }
}

pub fn topic_schema(dialect: SchemaDialect) -> Value {
    json!({
        "type": dialect.ty("object"),
        "properties": {
            "answer": {
                "type": dialect.ty("string"),
                "description": "The main markdown response to the user's query."
            },
            "technical_terms": {
                "type": dialect.ty("array"),
                "items": { "type": dialect.ty("string") },
                "description": "A list of 3-5 complex terms or concepts found in the answer."
            }
        },
        "required": ["answer", "technical_terms"]
    })
}

pub fn definition_schema(dialect: SchemaDialect) -> Value {
    json!({
        "type": dialect.ty("object"),
        "properties": {
            "definition": { "type": dialect.ty("string") },
            "related_topics": {
                "type": dialect.ty("array"),
                "items": { "type": dialect.ty("string") }
            }
        }
    })
}

pub fn definition_prompt(term: &str, context: &str) -> String {
    let excerpt: String = context.chars().take(CONTEXT_LIMIT).collect();
    format!(
        "The user is reading the following text:\n\
         \"{excerpt}...\"\n\n\
         They have selected the term: \"{term}\".\n\n\
         Please provide:\n\
         1. A concise, easy-to-understand definition of \"{term}\" relevant to the context above. \
         Keep it under 3 sentences.\n\
         2. Two related sub-topics or questions they might ask next."
    )
}

/// An empty body is read as an empty object, so it falls back to the
/// "couldn't answer" text rather than the raw (empty) body.
fn json_body(raw: &str) -> &str {
    if raw.trim().is_empty() { "{}" } else { raw }
}

fn or_fallback(value: Option<String>, fallback: &str) -> String {
    value
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

pub fn parse_topic_answer(raw: &str) -> TopicAnswer {
    match serde_json::from_str::<RawTopic>(json_body(raw)) {
        Ok(parsed) => TopicAnswer {
            text: or_fallback(parsed.answer, NO_ANSWER),
            suggested_terms: parsed.technical_terms.unwrap_or_default(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "topic reply was not the expected JSON, using raw text");
            TopicAnswer {
                text: or_fallback(Some(raw.to_string()), UNREADABLE_ANSWER),
                suggested_terms: Vec::new(),
            }
        }
    }
}

pub fn parse_definition(raw: &str) -> TermDefinition {
    match serde_json::from_str::<RawDefinition>(json_body(raw)) {
        Ok(parsed) => TermDefinition {
            definition: or_fallback(parsed.definition, NO_DEFINITION),
            related: parsed.related_topics.unwrap_or_default(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "definition reply was not the expected JSON, using raw text");
            TermDefinition {
                definition: or_fallback(Some(raw.to_string()), UNREADABLE_DEFINITION),
                related: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic_answer() {
        let raw = r###"{"answer": "## Basics\nA qubit is...", "technical_terms": ["qubit", "superposition"]}"###;
        let parsed = parse_topic_answer(raw);
        assert_eq!(parsed.text, "## Basics\nA qubit is...");
        assert_eq!(parsed.suggested_terms, vec!["qubit", "superposition"]);
    }

    #[test]
    fn test_topic_missing_fields_use_fallbacks() {
        let parsed = parse_topic_answer(r#"{"technical_terms": ["x"]}"#);
        assert_eq!(parsed.text, "I couldn't generate an answer.");
        assert_eq!(parsed.suggested_terms, vec!["x"]);

        let parsed = parse_topic_answer("");
        assert_eq!(parsed.text, "I couldn't generate an answer.");
        assert!(parsed.suggested_terms.is_empty());
    }

    #[test]
    fn test_topic_not_json_falls_back_to_raw() {
        let parsed = parse_topic_answer("Plain prose answer");
        assert_eq!(parsed.text, "Plain prose answer");
        assert!(parsed.suggested_terms.is_empty());
    }

    #[test]
    fn test_topic_wrong_term_shape_falls_back_to_raw() {
        let raw = r#"{"answer": "hi", "technical_terms": "qubit"}"#;
        let parsed = parse_topic_answer(raw);
        assert_eq!(parsed.text, raw);
        assert!(parsed.suggested_terms.is_empty());
    }

    #[test]
    fn test_parse_definition() {
        let raw = r#"{"definition": "The basic unit of quantum information.", "related_topics": ["Superposition", "Bloch sphere"]}"#;
        let parsed = parse_definition(raw);
        assert_eq!(parsed.definition, "The basic unit of quantum information.");
        assert_eq!(parsed.related, vec!["Superposition", "Bloch sphere"]);
    }

    #[test]
    fn test_definition_fallbacks() {
        assert_eq!(parse_definition("{}").definition, "Could not define term.");
        assert_eq!(parse_definition("oops").definition, "oops");
        assert!(parse_definition("oops").related.is_empty());
    }

    #[test]
    fn test_definition_prompt_truncates_context() {
        let context = "x".repeat(800);
        let prompt = definition_prompt("qubit", &context);
        assert!(prompt.contains(&format!("\"{}...\"", "x".repeat(500))));
        assert!(!prompt.contains(&"x".repeat(501)));
        assert!(prompt.contains("They have selected the term: \"qubit\"."));
    }

    #[test]
    fn test_schema_dialects() {
        let gemini = topic_schema(SchemaDialect::Gemini);
        assert_eq!(gemini["type"], "OBJECT");
        assert_eq!(gemini["properties"]["technical_terms"]["items"]["type"], "STRING");

        let plain = definition_schema(SchemaDialect::JsonSchema);
        assert_eq!(plain["type"], "object");
        assert_eq!(plain["properties"]["related_topics"]["type"], "array");
    }
}
