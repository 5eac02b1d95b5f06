//! Lays messages out into wrapped, styled lines.
//!
//! The layout is computed here rather than by ratatui's `Wrap` so every cell
//! can be mapped back to its text (for selections) and to a click action
//! (for highlighted terms, key-concept chips, and panel buttons).

use std::ops::Range;

use deepdive_core::highlight::{blocks, BlockKind, Segment, TermHighlighter};
use deepdive_core::{Message, Sender};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// What a click on a cell does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Define `term` using message `message` as context
    Define { term: String, message: usize },
    ConfirmSelection,
    ExploreRelated(String),
    RetryDefinition,
    ClosePanel,
}

pub fn term_style() -> Style {
    Style::default().fg(Color::Magenta).add_modifier(Modifier::UNDERLINED)
}

pub fn chip_style() -> Style {
    Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)
}

fn user_label() -> Style {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
}

fn ai_label() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn muted() -> Style {
    Style::default().fg(Color::DarkGray)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub text: String,
    pub style: Style,
    pub action: Option<Action>,
}

impl Run {
    pub fn plain(text: impl Into<String>, style: Style) -> Self {
        Self { text: text.into(), style, action: None }
    }

    pub fn action(text: impl Into<String>, style: Style, action: Action) -> Self {
        Self { text: text.into(), style, action: Some(action) }
    }
}

/// One screen row of laid-out text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedLine {
    pub runs: Vec<Run>,
}

impl RenderedLine {
    pub fn new(runs: Vec<Run>) -> Self {
        Self { runs }
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Action of the run covering display column `col`
    pub fn action_at(&self, col: usize) -> Option<&Action> {
        let mut start = 0;
        for run in &self.runs {
            let end = start + run.text.width();
            if (start..end).contains(&col) {
                return run.action.as_ref();
            }
            start = end;
        }
        None
    }

    /// Convert to a ratatui line, reversing the cells in `selected`.
    pub fn to_line(&self, selected: Option<Range<usize>>) -> Line<'static> {
        let Some(selected) = selected else {
            return Line::from(
                self.runs
                    .iter()
                    .map(|r| Span::styled(r.text.clone(), r.style))
                    .collect::<Vec<_>>(),
            );
        };

        let mut spans = Vec::new();
        let mut col = 0;
        for run in &self.runs {
            let mut buf = String::new();
            let mut buf_selected = false;
            for ch in run.text.chars() {
                let is_selected = selected.contains(&col);
                if is_selected != buf_selected && !buf.is_empty() {
                    spans.push(selection_span(std::mem::take(&mut buf), run.style, buf_selected));
                }
                buf_selected = is_selected;
                buf.push(ch);
                col += ch.width().unwrap_or(0);
            }
            if !buf.is_empty() {
                spans.push(selection_span(buf, run.style, buf_selected));
            }
        }
        Line::from(spans)
    }
}

fn selection_span(text: String, style: Style, selected: bool) -> Span<'static> {
    if selected {
        Span::styled(text, style.add_modifier(Modifier::REVERSED))
    } else {
        Span::styled(text, style)
    }
}

struct Wrapper {
    width: usize,
    indent: usize,
    lines: Vec<RenderedLine>,
    current: RenderedLine,
    used: usize,
    /// Whitespace held back until the next word shows it isn't trailing
    pending: Option<Run>,
    /// Just wrapped: leading whitespace is dropped
    fresh: bool,
}

impl Wrapper {
    fn new(width: usize, indent: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            indent: if indent < width { indent } else { 0 },
            lines: Vec::new(),
            current: RenderedLine::default(),
            used: 0,
            pending: None,
            fresh: false,
        }
    }

    fn pending_width(&self) -> usize {
        self.pending.as_ref().map_or(0, |r| r.text.width())
    }

    fn flush_pending(&mut self) {
        if let Some(run) = self.pending.take() {
            self.push(&run.text, run.style, &run.action);
        }
    }

    fn push(&mut self, text: &str, style: Style, action: &Option<Action>) {
        self.used += text.width();
        self.fresh = false;
        if let Some(last) = self.current.runs.last_mut() {
            if last.style == style && last.action == *action {
                last.text.push_str(text);
                return;
            }
        }
        self.current.runs.push(Run { text: text.to_string(), style, action: action.clone() });
    }

    fn newline(&mut self) {
        self.pending = None;
        self.lines.push(std::mem::take(&mut self.current));
        self.used = 0;
        if self.indent > 0 {
            self.current.runs.push(Run::plain(" ".repeat(self.indent), Style::default()));
            self.used = self.indent;
        }
        self.fresh = true;
    }

    fn word(&mut self, word: &str, style: Style, action: &Option<Action>) {
        let w = word.width();
        if self.used + self.pending_width() + w <= self.width {
            self.flush_pending();
            self.push(word, style, action);
        } else if w <= self.width - self.indent {
            self.newline();
            self.push(word, style, action);
        } else {
            // Longer than a whole line: break it wherever it runs out
            if self.used + self.pending_width() < self.width {
                self.flush_pending();
            } else {
                self.pending = None;
            }
            for ch in word.chars() {
                let cw = ch.width().unwrap_or(0);
                if self.used + cw > self.width && self.used > self.indent {
                    self.newline();
                }
                let mut buf = [0u8; 4];
                self.push(ch.encode_utf8(&mut buf), style, action);
            }
        }
    }

    fn space(&mut self, space: &str, style: Style, action: &Option<Action>) {
        if self.fresh {
            return;
        }
        // Leading whitespace (list markers) is part of the layout
        if self.used == 0 {
            self.push(space, style, action);
            return;
        }
        if let Some(run) = self.pending.as_mut() {
            if run.style == style && run.action == *action {
                run.text.push_str(space);
                return;
            }
        }
        self.flush_pending();
        self.pending = Some(Run { text: space.to_string(), style, action: action.clone() });
    }

    fn finish(mut self) -> Vec<RenderedLine> {
        self.lines.push(self.current);
        self.lines
    }
}

/// Split `text` into alternating runs of whitespace and non-whitespace
fn chunks(text: &str) -> impl Iterator<Item = (&str, bool)> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let is_space = first.is_whitespace();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_whitespace() != is_space)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some((chunk, is_space))
    })
}

/// Word-wrap styled runs to `width` columns. Continuation lines are
/// indented by `indent` spaces. Always returns at least one line.
pub fn wrap(runs: &[Run], width: usize, indent: usize) -> Vec<RenderedLine> {
    let mut wrapper = Wrapper::new(width, indent);
    for run in runs {
        for (chunk, is_space) in chunks(&run.text) {
            if is_space {
                wrapper.space(chunk, run.style, &run.action);
            } else {
                wrapper.word(chunk, run.style, &run.action);
            }
        }
    }
    wrapper.finish()
}

/// Split `**bold**` spans out of a line. Unclosed markers stay literal.
fn emphasis(text: &str) -> Vec<(String, bool)> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("**") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("**") else {
            break;
        };
        if close == 0 {
            // "****" is not an empty bold span
            pieces.push((rest[..open + 4].to_string(), false));
            rest = &after[2..];
            continue;
        }
        if open > 0 {
            pieces.push((rest[..open].to_string(), false));
        }
        pieces.push((after[..close].to_string(), true));
        rest = &after[close + 2..];
    }

    if !rest.is_empty() {
        pieces.push((rest.to_string(), false));
    }
    pieces
}

/// Styled runs for one block of an answer, with terms made clickable.
///
/// Terms are matched on the line with `**` markers removed, so a term may
/// span a bold boundary; every part of it defines the whole term. The
/// markers themselves never reach the transcript.
fn highlighted_runs(text: &str, highlighter: &TermHighlighter, base: Style, message: usize) -> Vec<Run> {
    let pieces = emphasis(text);
    let plain: String = pieces.iter().map(|(piece, _)| piece.as_str()).collect();

    // End offset of each piece in `plain`
    let mut ends = Vec::with_capacity(pieces.len());
    let mut end = 0;
    for (piece, bold) in &pieces {
        end += piece.len();
        ends.push((end, *bold));
    }

    let mut runs = Vec::new();
    let mut start = 0;
    for segment in highlighter.segments(&plain) {
        let (part, action) = match segment {
            Segment::Plain(s) => (s, None),
            Segment::Term(term) => (term, Some(Action::Define { term: term.to_string(), message })),
        };
        let stop = start + part.len();

        let mut at = start;
        for &(piece_end, bold) in &ends {
            if at >= stop {
                break;
            }
            if piece_end <= at {
                continue;
            }
            let cut = piece_end.min(stop);
            let style = if bold { base.add_modifier(Modifier::BOLD) } else { base };
            let slice = &plain[at..cut];
            runs.push(match &action {
                Some(action) => Run::action(slice, style.patch(term_style()), action.clone()),
                None => Run::plain(slice, style),
            });
            at = cut;
        }
        start = stop;
    }
    runs
}

fn layout_answer(lines: &mut Vec<RenderedLine>, message: &Message, index: usize, width: usize) {
    let highlighter = TermHighlighter::new(message.terms());

    for block in blocks(&message.text) {
        let (prefix, base, indent) = match block.kind {
            BlockKind::Spacer => {
                lines.push(RenderedLine::default());
                continue;
            }
            BlockKind::Heading(2) => (None, Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED), 0),
            BlockKind::Heading(_) => (None, Style::default().add_modifier(Modifier::BOLD), 0),
            BlockKind::ListItem => (Some(Run::plain("  • ", Style::default().fg(Color::Blue))), Style::default(), 4),
            BlockKind::Paragraph => (None, Style::default(), 0),
        };

        let mut runs: Vec<Run> = prefix.into_iter().collect();
        runs.extend(highlighted_runs(block.text, &highlighter, base, index));
        lines.extend(wrap(&runs, width, indent));
    }

    if !message.terms().is_empty() {
        lines.push(RenderedLine::default());
        lines.push(RenderedLine::new(vec![Run::plain(
            "KEY CONCEPTS",
            muted().add_modifier(Modifier::BOLD),
        )]));

        let mut chips = Vec::new();
        for term in message.terms() {
            if !chips.is_empty() {
                chips.push(Run::plain(" ", Style::default()));
            }
            chips.push(Run::action(
                format!("[{}]", term),
                chip_style(),
                Action::Define { term: term.clone(), message: index },
            ));
        }
        lines.extend(wrap(&chips, width, 0));
    }
}

/// Lay out the whole conversation for a chat area `width` columns wide.
pub fn layout_messages(messages: &[Message], searching: bool, frame: u8, width: usize) -> Vec<RenderedLine> {
    let mut lines = Vec::new();

    if messages.is_empty() && !searching {
        lines.push(RenderedLine::new(vec![Run::plain(
            "Start your learning journey",
            muted().add_modifier(Modifier::BOLD),
        )]));
        lines.push(RenderedLine::default());
        lines.extend(wrap(
            &[Run::plain(
                "Ask about complex topics. I'll identify technical terms for you. \
                 Click highlighted words or select any text to get an instant definition.",
                muted(),
            )],
            width,
            0,
        ));
        return lines;
    }

    for (index, message) in messages.iter().enumerate() {
        match message.sender {
            Sender::User => {
                lines.push(RenderedLine::new(vec![Run::plain("You:", user_label())]));
                for line in message.text.split('\n') {
                    lines.extend(wrap(&[Run::plain(line, Style::default())], width, 0));
                }
            }
            Sender::Ai => {
                lines.push(RenderedLine::new(vec![Run::plain("AI:", ai_label())]));
                layout_answer(&mut lines, message, index, width);
            }
        }
        lines.push(RenderedLine::default());
    }

    if searching {
        lines.push(RenderedLine::new(vec![Run::plain("AI:", ai_label())]));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat(frame as usize % 3 + 1);
        lines.push(RenderedLine::new(vec![Run::plain(
            format!("Thinking{}", dots),
            muted().add_modifier(Modifier::ITALIC),
        )]));
    }

    lines
}

/// A cell position within laid-out lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

/// Columns of line `line` covered by the selection `start..=end`
/// (positions already in order).
pub fn selected_cols(line: usize, start: Pos, end: Pos) -> Option<Range<usize>> {
    if line < start.line || line > end.line {
        return None;
    }
    let from = if line == start.line { start.col } else { 0 };
    let to = if line == end.line { end.col + 1 } else { usize::MAX };
    Some(from..to)
}

/// Characters of `text` whose first column falls in `cols`
fn slice_cols(text: &str, cols: Range<usize>) -> String {
    let mut out = String::new();
    let mut col = 0;
    for ch in text.chars() {
        if cols.contains(&col) {
            out.push(ch);
        }
        col += ch.width().unwrap_or(0);
    }
    out
}

/// Text covered by a selection between two positions, in either order.
pub fn selected_text(lines: &[RenderedLine], a: Pos, b: Pos) -> String {
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    let last = end.line.min(lines.len().saturating_sub(1));

    let mut parts = Vec::new();
    for (index, line) in lines.iter().enumerate().take(last + 1).skip(start.line) {
        if let Some(cols) = selected_cols(index, start, end) {
            parts.push(slice_cols(&line.text(), cols));
        }
    }
    parts.join("\n")
}
