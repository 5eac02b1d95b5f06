use crate::ai::{KnowledgeSource, TopicAnswer};
use crate::error::CollaboratorError;
use crate::state::Message;

pub const APOLOGY: &str = "Sorry, I encountered an error connecting to the knowledge base.";

/// Append-only message log plus the "searching" flag.
///
/// Only one query may be outstanding; `submit` refuses a second one, which
/// keeps the log strictly chronological.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    searching: bool,
    revision: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    /// Bumped on every append; views scroll to the bottom when it changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether `text` would be accepted by [`Conversation::submit`]
    pub fn can_send(&self, text: &str) -> bool {
        !self.searching && !text.trim().is_empty()
    }

    /// Record the user's message and mark a query as outstanding.
    /// Returns the query to send, or `None` if nothing should be sent.
    pub fn submit(&mut self, text: &str) -> Option<String> {
        if !self.can_send(text) {
            return None;
        }

        let message = Message::user(text);
        let query = message.text.clone();
        self.push(message);
        self.searching = true;

        tracing::info!(chars = query.chars().count(), "query submitted");
        Some(query)
    }

    /// Record the outcome of the outstanding query. Failures become an
    /// apology message; they never propagate further.
    pub fn settle(&mut self, result: Result<TopicAnswer, CollaboratorError>) {
        let message = match result {
            Ok(answer) => {
                tracing::info!(terms = answer.suggested_terms.len(), "answer received");
                Message::ai(answer.text, answer.suggested_terms)
            }
            Err(e) => {
                tracing::error!(error = %e, "topic search failed");
                Message::ai(APOLOGY, Vec::new())
            }
        };
        self.push(message);
        self.searching = false;
    }

    /// Submit, ask `source`, and settle, all in one go.
    pub async fn send<K>(&mut self, text: &str, source: &K) -> bool
    where
        K: KnowledgeSource + ?Sized,
    {
        let Some(query) = self.submit(text) else {
            return false;
        };
        let result = source.search_topic(&query).await;
        self.settle(result);
        true
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.revision += 1;
    }
}
