//! Ties the conversation, the definition panel, and the selection popup
//! together, and runs collaborator calls in the background.
//!
//! Calls are spawned on the tokio runtime; their results come back through
//! the completion channel and are applied with [`Session::apply`] on the UI
//! thread, so all state changes stay single-threaded.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::ai::{KnowledgeSource, TermDefinition, TopicAnswer};
use crate::conversation::Conversation;
use crate::error::CollaboratorError;
use crate::panel::{DefinitionPanel, DefinitionRequest, PendingDefinition, Ticket};
use crate::selection::{Region, SelectionSurface, SelectionTracker};
use crate::state::{Message, SelectionCoords};

/// A finished collaborator call
#[derive(Debug)]
pub enum Completion {
    Answer(Result<TopicAnswer, CollaboratorError>),
    Definition {
        ticket: Ticket,
        result: Result<TermDefinition, CollaboratorError>,
    },
}

pub struct Session {
    input: String,
    conversation: Conversation,
    panel: DefinitionPanel,
    selection: SelectionTracker,
    source: Arc<dyn KnowledgeSource>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Session {
    pub fn new(
        source: Arc<dyn KnowledgeSource>,
        surface: &SelectionSurface,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            input: String::new(),
            conversation: Conversation::new(),
            panel: DefinitionPanel::new(),
            selection: SelectionTracker::mount(surface, Region::Transcript),
            source,
            completions,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn panel(&self) -> &DefinitionPanel {
        &self.panel
    }

    pub fn popup(&self) -> Option<SelectionCoords> {
        self.selection.current()
    }

    /// Whether the send affordance is enabled
    pub fn can_send(&self) -> bool {
        self.conversation.can_send(&self.input)
    }

    /// Send the current input. Clears the input and any selection popup.
    pub fn send(&mut self) -> bool {
        let Some(query) = self.conversation.submit(&self.input) else {
            return false;
        };
        self.input.clear();
        self.selection.clear();

        let source = Arc::clone(&self.source);
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = source.search_topic(&query).await;
            if tx.send(Completion::Answer(result)).is_err() {
                tracing::debug!("session gone before answer arrived");
            }
        });
        true
    }

    /// Open the panel for `term`, explained against `context`.
    pub fn request_definition(&mut self, term: &str, context: &str) {
        self.selection.clear();
        let pending = self.panel.request(DefinitionRequest {
            term: term.to_string(),
            context: context.to_string(),
        });
        self.dispatch_definition(pending);
    }

    /// Explain the selected text, if a popup is showing.
    pub fn confirm_selection(&mut self) -> bool {
        let Some(request) = self.selection.confirm() else {
            return false;
        };
        let pending = self.panel.request(request);
        self.dispatch_definition(pending);
        true
    }

    pub fn retry_definition(&mut self) -> bool {
        match self.panel.retry() {
            Some(pending) => {
                self.dispatch_definition(pending);
                true
            }
            None => false,
        }
    }

    pub fn open_panel(&mut self) {
        self.panel.open();
    }

    pub fn close_panel(&mut self) {
        self.panel.close();
    }

    pub fn dismiss_popup(&mut self) {
        self.selection.clear();
    }

    /// Put `topic` in the input box and close the panel; the user still
    /// has to send it.
    pub fn explore_related(&mut self, topic: &str) {
        self.input = topic.to_string();
        self.panel.close();
    }

    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Answer(result) => self.conversation.settle(result),
            Completion::Definition { ticket, result } => {
                self.panel.resolve(ticket, result);
            }
        }
    }

    fn dispatch_definition(&self, pending: PendingDefinition) {
        let source = Arc::clone(&self.source);
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = source.define_term(&pending.term, &pending.context).await;
            let completion = Completion::Definition { ticket: pending.ticket, result };
            if tx.send(completion).is_err() {
                tracing::debug!("session gone before definition arrived");
            }
        });
    }
}
