//! UI-agnostic application state types
//!
//! This module contains data structures that are shared between different UIs
//! and don't depend on any specific UI framework.

use serde::{Deserialize, Serialize};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Ai,
}

/// A chat message in the conversation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Terms the AI flagged as worth defining (AI messages only)
    pub suggested_terms: Option<Vec<String>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text.into(), Sender::User, None)
    }

    pub fn ai(text: impl Into<String>, suggested_terms: Vec<String>) -> Self {
        Self::new(text.into(), Sender::Ai, Some(suggested_terms))
    }

    fn new(text: String, sender: Sender, suggested_terms: Option<Vec<String>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text,
            sender,
            timestamp: chrono::Utc::now().timestamp_millis(),
            suggested_terms,
        }
    }

    /// Suggested terms, or an empty slice for user messages
    pub fn terms(&self) -> &[String] {
        self.suggested_terms.as_deref().unwrap_or(&[])
    }
}

/// A resolved definition shown in the side panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionData {
    pub term: String,
    pub definition: String,
    /// The text the term was found in
    pub context: String,
    pub related_topics: Option<Vec<String>>,
}

impl DefinitionData {
    pub fn related(&self) -> &[String] {
        self.related_topics.as_deref().unwrap_or(&[])
    }
}

/// Where the "Explain" popup should be drawn, and what it will explain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCoords {
    pub x: i32,
    pub y: i32,
    pub text: String,
}

impl SelectionCoords {
    /// Button label, shortening long selections to their first 12 characters
    pub fn label(&self) -> String {
        if self.text.chars().count() > 15 {
            let head: String = self.text.chars().take(12).collect();
            format!("Explain \"{}...\"", head)
        } else {
            format!("Explain \"{}\"", self.text)
        }
    }
}
