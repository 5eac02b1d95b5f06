//! Side panel state for term definitions.
//!
//! Requests are tagged with increasing tickets and only the latest ticket may
//! change what the panel shows, so a slow early response can't overwrite a
//! faster later one.

use crate::ai::TermDefinition;
use crate::error::CollaboratorError;
use crate::state::DefinitionData;

pub type Ticket = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionRequest {
    pub term: String,
    pub context: String,
}

/// A request that has been issued and is waiting for the collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDefinition {
    pub ticket: Ticket,
    pub term: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// What the panel should draw right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelView<'a> {
    Closed,
    Loading { term: &'a str },
    Showing(&'a DefinitionData),
    Failed { term: &'a str, error: &'a str },
    /// Open but nothing requested yet
    Empty,
}

#[derive(Debug, Clone)]
pub struct DefinitionPanel {
    open: bool,
    status: Status,
    data: Option<DefinitionData>,
    latest: Ticket,
    pending: Option<PendingDefinition>,
}

impl Default for DefinitionPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionPanel {
    pub fn new() -> Self {
        Self {
            open: false,
            status: Status::Idle,
            data: None,
            latest: 0,
            pending: None,
        }
    }

    /// Open the panel in its loading state and issue a new ticket.
    pub fn request(&mut self, request: DefinitionRequest) -> PendingDefinition {
        self.latest += 1;
        let pending = PendingDefinition {
            ticket: self.latest,
            term: request.term,
            context: request.context,
        };

        tracing::debug!(ticket = pending.ticket, term = %pending.term, "definition requested");

        self.open = true;
        self.status = Status::Loading;
        self.pending = Some(pending.clone());
        pending
    }

    /// Apply a collaborator result. Returns false when the ticket is stale
    /// and the result was dropped.
    pub fn resolve(
        &mut self,
        ticket: Ticket,
        result: Result<TermDefinition, CollaboratorError>,
    ) -> bool {
        if ticket != self.latest {
            tracing::debug!(ticket, latest = self.latest, "dropping stale definition");
            return false;
        }
        let Some(pending) = self.pending.as_ref() else {
            return false;
        };

        match result {
            Ok(def) => {
                self.data = Some(DefinitionData {
                    term: pending.term.clone(),
                    definition: def.definition,
                    context: pending.context.clone(),
                    related_topics: Some(def.related),
                });
                self.status = Status::Ready;
            }
            Err(e) => {
                tracing::warn!(term = %pending.term, error = %e, "definition request failed");
                self.status = Status::Failed(e.to_string());
            }
        }
        true
    }

    /// Re-issue the last request if it failed.
    pub fn retry(&mut self) -> Option<PendingDefinition> {
        if !matches!(self.status, Status::Failed(_)) {
            return None;
        }
        let pending = self.pending.clone()?;
        Some(self.request(DefinitionRequest {
            term: pending.term,
            context: pending.context,
        }))
    }

    /// Show the panel without requesting anything: the last definition, or
    /// the placeholder if there is none.
    pub fn open(&mut self) {
        self.open = true;
    }

    /// Hide the panel. In-flight requests keep running and still land in
    /// the retained data slot.
    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_loading(&self) -> bool {
        self.status == Status::Loading
    }

    pub fn data(&self) -> Option<&DefinitionData> {
        self.data.as_ref()
    }

    pub fn view(&self) -> PanelView<'_> {
        if !self.open {
            return PanelView::Closed;
        }
        let term = self.pending.as_ref().map(|p| p.term.as_str()).unwrap_or_default();
        match (&self.status, &self.data) {
            (Status::Loading, _) => PanelView::Loading { term },
            (Status::Failed(error), _) => PanelView::Failed { term, error },
            (_, Some(data)) => PanelView::Showing(data),
            (_, None) => PanelView::Empty,
        }
    }
}
