pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod highlight;
pub mod panel;
pub mod provider;
pub mod selection;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::{GeminiClient, KnowledgeSource, OllamaClient, TermDefinition, TopicAnswer};
pub use config::Config;
pub use conversation::Conversation;
pub use error::CollaboratorError;
pub use highlight::{Block, BlockKind, Segment, TermHighlighter};
pub use panel::{DefinitionPanel, DefinitionRequest, PanelView};
pub use provider::Provider;
pub use selection::{ActiveSelection, Bounds, Region, SelectionSurface, SelectionTracker};
pub use session::{Completion, Session};
pub use state::{DefinitionData, Message, SelectionCoords, Sender};
