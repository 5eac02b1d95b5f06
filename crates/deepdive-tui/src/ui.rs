use deepdive_core::PanelView;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, Focus};
use crate::transcript::{selected_cols, wrap, Action, RenderedLine, Run};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, input, footer
    let [header_area, body_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    if app.session.panel().is_open() {
        let [chat_area, panel_area] = Layout::horizontal([
            Constraint::Percentage(60),
            Constraint::Percentage(40),
        ])
        .areas(body_area);
        render_chat(app, frame, chat_area);
        render_panel(app, frame, panel_area);
    } else {
        app.panel_area = None;
        app.panel_targets.clear();
        render_chat(app, frame, body_area);
    }

    app.input_area = Some(input_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Popup floats above everything else
    render_popup(app, frame);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" DeepDive AI ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} · {} ", app.session.source_name(), app.model),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let text = Style::default().fg(Color::DarkGray);

    let hints: &[(&str, &str)] = match app.focus {
        Focus::Input => &[
            ("Enter", "send"),
            ("drag", "select"),
            ("^E", "explain selection"),
            ("^D", "panel"),
            ("Tab", "panel focus"),
            ("Esc", "dismiss"),
            ("^C", "quit"),
        ],
        Focus::Panel => &[
            ("j/k", "related"),
            ("Enter", "explore"),
            ("r", "retry"),
            ("q", "close"),
            ("Tab", "input"),
            ("^C", "quit"),
        ],
    };

    let mut spans = vec![Span::raw(" ")];
    for (k, desc) in hints {
        spans.push(Span::styled(*k, key));
        spans.push(Span::styled(format!(" {}  ", desc), text));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    app.chat_area = Some(inner);
    app.relayout(inner.width as usize, inner.height as usize);

    let selection = app
        .drag
        .filter(|d| d.anchor != d.focus)
        .map(|d| d.ordered());

    let lines: Vec<Line> = app
        .transcript
        .iter()
        .enumerate()
        .skip(app.chat_scroll)
        .take(inner.height as usize)
        .map(|(index, line)| {
            line.to_line(selection.and_then(|(start, end)| selected_cols(index, start, end)))
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn heading(text: &str) -> RenderedLine {
    RenderedLine::new(vec![Run::plain(
        text,
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
    )])
}

fn term_line(term: &str, width: usize) -> Vec<RenderedLine> {
    wrap(
        &[Run::plain(term, Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD))],
        width,
        0,
    )
}

/// Placeholder bars shown while a definition loads
fn skeleton(width: usize, frame: u8) -> Vec<RenderedLine> {
    let shade = if frame % 2 == 0 { Color::DarkGray } else { Color::Gray };
    [100usize, 85, 92, 60]
        .iter()
        .map(|percent| {
            let n = (width * percent / 100).max(1);
            RenderedLine::new(vec![Run::plain("▒".repeat(n), Style::default().fg(shade))])
        })
        .collect()
}

fn panel_lines(app: &App, width: usize) -> (Vec<RenderedLine>, Option<usize>) {
    let mut lines = Vec::new();
    let mut selected_line = None;

    // Close button, right-aligned
    let pad = width.saturating_sub(3);
    lines.push(RenderedLine::new(vec![
        Run::plain(" ".repeat(pad), Style::default()),
        Run::action("[x]", Style::default().fg(Color::Red), Action::ClosePanel),
    ]));

    match app.session.panel().view() {
        PanelView::Closed => {}
        PanelView::Empty => {
            lines.extend(wrap(
                &[Run::plain(
                    "Select any text or click a highlighted term to see its definition.",
                    Style::default().fg(Color::DarkGray),
                )],
                width,
                0,
            ));
        }
        PanelView::Loading { term } => {
            lines.extend(term_line(term, width));
            lines.push(RenderedLine::default());
            lines.extend(skeleton(width, app.animation_frame));
        }
        PanelView::Showing(data) => {
            lines.extend(term_line(&data.term, width));
            lines.push(RenderedLine::default());
            lines.extend(wrap(&[Run::plain(data.definition.as_str(), Style::default())], width, 0));

            if !data.related().is_empty() {
                lines.push(RenderedLine::default());
                lines.push(heading("DIG DEEPER"));
                for (index, topic) in data.related().iter().enumerate() {
                    let is_selected = app.focus == Focus::Panel && index == app.related_selected;
                    let (marker, style) = if is_selected {
                        selected_line = Some(lines.len());
                        ("▶ ", Style::default().fg(Color::Cyan).add_modifier(Modifier::REVERSED))
                    } else {
                        ("→ ", Style::default().fg(Color::Cyan))
                    };
                    let runs = [
                        Run::plain(marker, Style::default().fg(Color::Cyan)),
                        Run::action(topic.as_str(), style, Action::ExploreRelated(topic.clone())),
                    ];
                    lines.extend(wrap(&runs, width, 2));
                }
            }
        }
        PanelView::Failed { term, error } => {
            lines.extend(term_line(term, width));
            lines.push(RenderedLine::default());
            lines.push(RenderedLine::new(vec![Run::plain(
                "Could not load a definition.",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )]));
            lines.extend(wrap(&[Run::plain(error, Style::default().fg(Color::Red))], width, 0));
            lines.push(RenderedLine::default());
            lines.push(RenderedLine::new(vec![Run::action(
                "[ Retry ]",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                Action::RetryDefinition,
            )]));
        }
    }

    (lines, selected_line)
}

/// Screen rectangles of every clickable run in the visible lines
fn click_targets(lines: &[RenderedLine], area: Rect, offset: usize) -> Vec<(Rect, Action)> {
    let mut targets = Vec::new();
    for (row, line) in lines.iter().skip(offset).take(area.height as usize).enumerate() {
        let mut col = 0u16;
        for run in &line.runs {
            let width = run.text.width() as u16;
            if let Some(action) = &run.action {
                let x = area.x + col;
                let visible = width.min((area.x + area.width).saturating_sub(x));
                if visible > 0 {
                    targets.push((Rect::new(x, area.y + row as u16, visible, 1), action.clone()));
                }
            }
            col = col.saturating_add(width);
        }
    }
    targets
}

fn render_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let border_color = if app.focus == Focus::Panel {
        Color::Magenta
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" DeepDive Knowledge ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let (lines, selected_line) = panel_lines(app, inner.width as usize);

    // Keep the highlighted related topic on screen
    let height = (inner.height as usize).max(1);
    let offset = selected_line
        .map(|line| line.saturating_sub(height - 1))
        .unwrap_or(0);

    app.panel_area = Some(inner);
    app.panel_targets = click_targets(&lines, inner, offset);

    let visible: Vec<Line> = lines
        .iter()
        .skip(offset)
        .take(height)
        .map(|line| line.to_line(None))
        .collect();
    frame.render_widget(Paragraph::new(visible), inner);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let searching = app.session.conversation().is_searching();
    let focused = app.focus == Focus::Input;

    let border_color = if searching {
        Color::DarkGray
    } else if focused {
        Color::Yellow
    } else {
        Color::Gray
    };
    let title = if searching { " Thinking... " } else { " Ask anything " };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let input_text = app.session.input();

    if input_text.is_empty() {
        let placeholder = Paragraph::new("Ask about a complex topic (e.g., Quantum Entanglement)...")
            .style(Style::default().fg(Color::DarkGray))
            .block(input_block);
        frame.render_widget(placeholder, area);
    } else {
        // Calculate visible portion of input with horizontal scrolling
        // Inner width = total width - 2 (for borders)
        let inner_width = area.width.saturating_sub(2) as usize;
        let cursor_col: usize = input_text
            .chars()
            .take(app.input_cursor)
            .map(|c| c.width().unwrap_or(0))
            .sum();
        let scroll_offset = (cursor_col + 1).saturating_sub(inner_width);

        let text_color = if searching { Color::DarkGray } else { Color::Cyan };
        let input = Paragraph::new(input_text)
            .style(Style::default().fg(text_color))
            .scroll((0, scroll_offset as u16))
            .block(input_block);
        frame.render_widget(input, area);
    }

    if focused {
        let cursor_col: usize = input_text
            .chars()
            .take(app.input_cursor)
            .map(|c| c.width().unwrap_or(0))
            .sum();
        let inner_width = area.width.saturating_sub(2) as usize;
        let shown = cursor_col.min(inner_width.saturating_sub(1));
        frame.set_cursor_position((area.x + 1 + shown as u16, area.y + 1));
    }
}

fn render_popup(app: &mut App, frame: &mut Frame) {
    app.popup_area = None;

    let (Some(coords), Some(chat)) = (app.session.popup(), app.chat_area) else {
        return;
    };
    if chat.width == 0 || chat.height == 0 {
        return;
    }

    let label = format!(" ✦ {} ", coords.label());
    let width = (label.width() as u16).min(chat.width);

    // Centered over the selection, kept inside the chat pane
    let left = (coords.x - width as i32 / 2)
        .clamp(chat.x as i32, (chat.x + chat.width - width) as i32) as u16;
    let top = coords
        .y
        .clamp(chat.y as i32, (chat.y + chat.height - 1) as i32) as u16;

    let rect = Rect::new(left, top, width, 1);
    frame.render_widget(Clear, rect);
    frame.render_widget(
        Paragraph::new(label).style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        ),
        rect,
    );
    app.popup_area = Some(rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn line(runs: Vec<Run>) -> RenderedLine {
        RenderedLine::new(runs)
    }

    #[test]
    fn test_click_targets_follow_columns() {
        let lines = vec![
            line(vec![Run::plain("skip", Style::default())]),
            line(vec![
                Run::plain("→ ", Style::default()),
                Run::action("Superposition", Style::default(), Action::ExploreRelated("Superposition".into())),
            ]),
        ];
        let area = Rect::new(10, 5, 30, 4);

        let targets = click_targets(&lines, area, 0);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, Rect::new(12, 6, 13, 1));

        let scrolled = click_targets(&lines, area, 1);
        assert_eq!(scrolled[0].0, Rect::new(12, 5, 13, 1));
    }

    #[test]
    fn test_click_targets_clip_to_area() {
        let lines = vec![line(vec![
            Run::plain("abcdefgh", Style::default()),
            Run::action("[ Retry ]", Style::default(), Action::RetryDefinition),
        ])];
        let targets = click_targets(&lines, Rect::new(0, 0, 12, 1), 0);
        assert_eq!(targets[0].0, Rect::new(8, 0, 4, 1));
    }

    #[test]
    fn test_skeleton_widths() {
        let bars = skeleton(20, 0);
        let widths: Vec<usize> = bars.iter().map(|l| l.text().chars().count()).collect();
        assert_eq!(widths, vec![20, 17, 18, 12]);
    }

    #[tokio::test]
    async fn test_render_registers_panel_targets() {
        use async_trait::async_trait;
        use deepdive_core::{CollaboratorError, KnowledgeSource, TermDefinition, TopicAnswer};
        use std::sync::Arc;

        struct Idle;

        #[async_trait]
        impl KnowledgeSource for Idle {
            fn name(&self) -> &'static str {
                "Idle"
            }
            async fn search_topic(&self, _query: &str) -> Result<TopicAnswer, CollaboratorError> {
                Err(CollaboratorError::Empty("Idle"))
            }
            async fn define_term(&self, _term: &str, _context: &str) -> Result<TermDefinition, CollaboratorError> {
                Err(CollaboratorError::Empty("Idle"))
            }
        }

        let (mut app, _rx) = App::new(Arc::new(Idle), "none");
        app.toggle_panel();

        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| render(&mut app, f)).unwrap();

        assert!(app.chat_area.is_some());
        assert!(app.panel_area.is_some());
        assert!(app
            .panel_targets
            .iter()
            .any(|(_, action)| *action == Action::ClosePanel));
        assert_eq!(app.popup_area, None);
    }
}
