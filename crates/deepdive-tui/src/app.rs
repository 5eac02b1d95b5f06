use std::sync::Arc;

use deepdive_core::selection::{ActiveSelection, Bounds, Region, SelectionSurface};
use deepdive_core::{Completion, KnowledgeSource, PanelView, Session};
use ratatui::layout::Rect;
use tokio::sync::mpsc;

use crate::transcript::{layout_messages, selected_text, Action, Pos, RenderedLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Panel,
}

/// A mouse selection over the transcript, in line/column coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drag {
    pub anchor: Pos,
    pub focus: Pos,
    /// Screen region under the moving end
    pub region: Region,
}

impl Drag {
    pub fn ordered(&self) -> (Pos, Pos) {
        if self.anchor <= self.focus {
            (self.anchor, self.focus)
        } else {
            (self.focus, self.anchor)
        }
    }
}

pub struct App {
    pub should_quit: bool,
    pub focus: Focus,
    pub session: Session,
    pub surface: SelectionSurface,
    pub model: String,

    // Input box
    pub input_cursor: usize, // in chars

    pub input_area: Option<Rect>,

    // Chat pane, filled in by the renderer
    pub chat_area: Option<Rect>,
    pub chat_scroll: usize,
    pub transcript: Vec<RenderedLine>,
    layout_width: usize,
    seen_revision: u64,
    pub drag: Option<Drag>,

    // Definition panel and popup hit targets, filled in by the renderer
    pub panel_area: Option<Rect>,
    pub panel_targets: Vec<(Rect, Action)>,
    pub popup_area: Option<Rect>,
    pub related_selected: usize,

    pub animation_frame: u8,
}

impl App {
    pub fn new(source: Arc<dyn KnowledgeSource>, model: &str) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let surface = SelectionSurface::new();
        let session = Session::new(source, &surface, tx);

        let app = Self {
            should_quit: false,
            focus: Focus::Input,
            session,
            surface,
            model: model.to_string(),
            input_cursor: 0,
            input_area: None,
            chat_area: None,
            chat_scroll: 0,
            transcript: Vec::new(),
            layout_width: 0,
            seen_revision: 0,
            drag: None,
            panel_area: None,
            panel_targets: Vec::new(),
            popup_area: None,
            related_selected: 0,
            animation_frame: 0,
        };
        (app, rx)
    }

    /// Recompute the transcript for a chat pane `width` x `height` cells,
    /// following the tail whenever the conversation changed.
    pub fn relayout(&mut self, width: usize, height: usize) {
        if width != self.layout_width {
            // Columns no longer line up with the text
            self.clear_selection();
            self.layout_width = width;
        }

        let conversation = self.session.conversation();
        self.transcript = layout_messages(
            conversation.messages(),
            conversation.is_searching(),
            self.animation_frame,
            width,
        );

        let max = self.transcript.len().saturating_sub(height);
        if conversation.revision() != self.seen_revision {
            self.seen_revision = conversation.revision();
            self.chat_scroll = max;
        }
        self.chat_scroll = self.chat_scroll.min(max);
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        let height = self.chat_area.map(|r| r.height as usize).unwrap_or(0);
        let max = self.transcript.len().saturating_sub(height);
        self.chat_scroll = (self.chat_scroll + lines).min(max);
    }

    /// Transcript position under a screen cell, clamped into the chat pane.
    pub fn chat_pos(&self, x: u16, y: u16) -> Option<Pos> {
        let area = self.chat_area?;
        if area.width == 0 || area.height == 0 {
            return None;
        }
        let x = x.clamp(area.x, area.x + area.width - 1);
        let y = y.clamp(area.y, area.y + area.height - 1);
        Some(Pos {
            line: self.chat_scroll + (y - area.y) as usize,
            col: (x - area.x) as usize,
        })
    }

    /// Click action of the transcript cell at `pos`
    pub fn transcript_action(&self, pos: Pos) -> Option<Action> {
        self.transcript.get(pos.line)?.action_at(pos.col).cloned()
    }

    pub fn begin_drag(&mut self, pos: Pos) {
        self.drag = Some(Drag { anchor: pos, focus: pos, region: Region::Transcript });
        self.publish_selection();
    }

    pub fn extend_drag(&mut self, pos: Pos, region: Region) {
        if let Some(drag) = self.drag.as_mut() {
            drag.focus = pos;
            drag.region = region;
            self.publish_selection();
        }
    }

    pub fn clear_selection(&mut self) {
        self.drag = None;
        self.surface.notify(None);
    }

    /// Describe the current drag to selection subscribers.
    fn publish_selection(&self) {
        let (Some(drag), Some(area)) = (self.drag, self.chat_area) else {
            self.surface.notify(None);
            return;
        };

        let (start, end) = drag.ordered();
        let text = selected_text(&self.transcript, start, end);

        let top = area.y as i32 + start.line as i32 - self.chat_scroll as i32;
        let (left, width) = if start.line == end.line {
            (area.x as i32 + start.col as i32, (end.col - start.col + 1) as i32)
        } else {
            (area.x as i32, area.width as i32)
        };

        let selection = ActiveSelection {
            text,
            bounds: Bounds { left, top, width },
            region: drag.region,
            collapsed: drag.anchor == drag.focus,
        };
        self.surface.notify(Some(&selection));
    }

    pub fn perform(&mut self, action: Action) {
        match action {
            Action::Define { term, message } => {
                let context = self
                    .session
                    .messages()
                    .get(message)
                    .map(|m| m.text.clone())
                    .unwrap_or_default();
                self.session.request_definition(&term, &context);
                self.drag = None;
                self.related_selected = 0;
            }
            Action::ConfirmSelection => {
                if self.session.confirm_selection() {
                    self.drag = None;
                    self.related_selected = 0;
                }
            }
            Action::ExploreRelated(topic) => self.explore(&topic),
            Action::RetryDefinition => {
                self.session.retry_definition();
            }
            Action::ClosePanel => self.close_panel(),
        }
    }

    pub fn send(&mut self) -> bool {
        if !self.session.send() {
            return false;
        }
        self.input_cursor = 0;
        self.drag = None;
        true
    }

    pub fn explore(&mut self, topic: &str) {
        self.session.explore_related(topic);
        self.input_cursor = topic.chars().count();
        self.focus = Focus::Input;
    }

    pub fn toggle_panel(&mut self) {
        if self.session.panel().is_open() {
            self.close_panel();
        } else {
            self.session.open_panel();
        }
    }

    pub fn close_panel(&mut self) {
        self.session.close_panel();
        self.focus = Focus::Input;
    }

    /// Related topics of the definition on screen, if any
    pub fn related(&self) -> &[String] {
        match self.session.panel().view() {
            PanelView::Showing(data) => data.related(),
            _ => &[],
        }
    }

    pub fn related_next(&mut self) {
        let count = self.related().len();
        if count > 0 {
            self.related_selected = (self.related_selected + 1).min(count - 1);
        }
    }

    pub fn related_prev(&mut self) {
        self.related_selected = self.related_selected.saturating_sub(1);
    }

    pub fn explore_selected_related(&mut self) {
        if let Some(topic) = self.related().get(self.related_selected).cloned() {
            self.explore(&topic);
        }
    }

    pub fn apply(&mut self, completion: Completion) {
        self.session.apply(completion);
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.conversation().is_searching() || self.session.panel().is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deepdive_core::{CollaboratorError, TermDefinition, TopicAnswer};

    struct Canned;

    #[async_trait]
    impl KnowledgeSource for Canned {
        fn name(&self) -> &'static str {
            "Canned"
        }

        async fn search_topic(&self, _query: &str) -> Result<TopicAnswer, CollaboratorError> {
            Ok(TopicAnswer {
                text: "## Basics\nA qubit is...".to_string(),
                suggested_terms: vec!["qubit".to_string()],
            })
        }

        async fn define_term(&self, term: &str, _context: &str) -> Result<TermDefinition, CollaboratorError> {
            Ok(TermDefinition {
                definition: format!("{} defined", term),
                related: vec!["Superposition".to_string(), "Bloch sphere".to_string()],
            })
        }
    }

    fn app() -> (App, mpsc::UnboundedReceiver<Completion>) {
        let (mut app, rx) = App::new(Arc::new(Canned), "test-model");
        app.chat_area = Some(Rect::new(0, 1, 40, 10));
        (app, rx)
    }

    async fn ask(app: &mut App, rx: &mut mpsc::UnboundedReceiver<Completion>) {
        app.session.set_input("Explain Quantum Computing");
        app.input_cursor = 25;
        assert!(app.send());
        let completion = rx.recv().await.unwrap();
        app.apply(completion);
        app.relayout(40, 10);
    }

    #[tokio::test]
    async fn test_send_resets_cursor() {
        let (mut app, mut rx) = app();
        ask(&mut app, &mut rx).await;
        assert_eq!(app.input_cursor, 0);
        assert_eq!(app.session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_relayout_follows_tail() {
        let (mut app, _rx) = app();
        for _ in 0..8 {
            app.session.set_input("a question that is long enough to wrap around");
            assert!(app.send());
            app.apply(Completion::Answer(Ok(TopicAnswer {
                text: "short".to_string(),
                suggested_terms: Vec::new(),
            })));
        }
        app.relayout(40, 10);
        assert_eq!(app.chat_scroll, app.transcript.len() - 10);

        app.scroll_up(3);
        app.relayout(40, 10);
        assert_eq!(app.chat_scroll, app.transcript.len() - 13);
    }

    #[tokio::test]
    async fn test_drag_publishes_popup() {
        let (mut app, mut rx) = app();
        ask(&mut app, &mut rx).await;

        // "A qubit is..." is the sixth transcript line
        let line = app.transcript.iter().position(|l| l.text() == "A qubit is...").unwrap();
        app.begin_drag(Pos { line, col: 2 });
        assert_eq!(app.session.popup(), None);

        app.extend_drag(Pos { line, col: 6 }, Region::Transcript);
        let popup = app.session.popup().unwrap();
        assert_eq!(popup.text, "qubit");
        assert_eq!(popup.x, 2 + 5 / 2);
        assert_eq!(popup.y, 1 + line as i32 - 1);
    }

    #[tokio::test]
    async fn test_drag_outside_chat_clears_popup() {
        let (mut app, mut rx) = app();
        ask(&mut app, &mut rx).await;

        let line = app.transcript.iter().position(|l| l.text() == "A qubit is...").unwrap();
        app.begin_drag(Pos { line, col: 2 });
        app.extend_drag(Pos { line, col: 6 }, Region::Transcript);
        assert!(app.session.popup().is_some());

        app.extend_drag(Pos { line, col: 6 }, Region::DefinitionPanel);
        assert_eq!(app.session.popup(), None);

        app.extend_drag(Pos { line, col: 6 }, Region::Transcript);
        assert!(app.session.popup().is_some());
        app.extend_drag(Pos { line, col: 6 }, Region::Input);
        assert_eq!(app.session.popup(), None);

        app.extend_drag(Pos { line, col: 6 }, Region::Outside);
        assert_eq!(app.session.popup(), None);
    }

    #[tokio::test]
    async fn test_define_action_uses_message_context() {
        let (mut app, mut rx) = app();
        ask(&mut app, &mut rx).await;

        app.perform(Action::Define { term: "qubit".to_string(), message: 1 });
        assert!(app.session.panel().is_loading());

        let completion = rx.recv().await.unwrap();
        app.apply(completion);
        assert_eq!(app.session.panel().data().unwrap().definition, "qubit defined");
        assert_eq!(app.related().len(), 2);
    }

    #[tokio::test]
    async fn test_explore_related_fills_input() {
        let (mut app, mut rx) = app();
        ask(&mut app, &mut rx).await;
        app.perform(Action::Define { term: "qubit".to_string(), message: 1 });
        let completion = rx.recv().await.unwrap();
        app.apply(completion);

        app.focus = Focus::Panel;
        app.related_next();
        app.related_next();
        assert_eq!(app.related_selected, 1);

        app.explore_selected_related();
        assert_eq!(app.session.input(), "Bloch sphere");
        assert_eq!(app.input_cursor, 12);
        assert_eq!(app.focus, Focus::Input);
        assert!(!app.session.panel().is_open());
    }

    #[tokio::test]
    async fn test_resize_drops_selection() {
        let (mut app, mut rx) = app();
        ask(&mut app, &mut rx).await;
        let line = app.transcript.iter().position(|l| l.text() == "A qubit is...").unwrap();
        app.begin_drag(Pos { line, col: 2 });
        app.extend_drag(Pos { line, col: 6 }, Region::Transcript);

        app.relayout(30, 10);
        assert_eq!(app.drag, None);
        assert_eq!(app.session.popup(), None);
    }
}
