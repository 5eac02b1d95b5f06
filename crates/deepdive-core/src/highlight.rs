//! Term highlighting and the light block structure used to render answers.
//!
//! This is not a markdown parser: each line is classified on its own by its
//! leading marker, and highlighting runs over whatever text is left.

use regex::{Matches, Regex, RegexBuilder};

/// A piece of rendered text: either plain or an interactive term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'t> {
    Plain(&'t str),
    Term(&'t str),
}

/// Case-insensitive whole-word matcher over a set of terms.
#[derive(Debug, Clone)]
pub struct TermHighlighter {
    pattern: Option<Regex>,
}

impl TermHighlighter {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Self {
        let alternatives: Vec<String> = terms
            .iter()
            .map(AsRef::as_ref)
            .filter(|t| !t.trim().is_empty())
            .map(regex::escape)
            .collect();

        if alternatives.is_empty() {
            return Self { pattern: None };
        }

        let source = format!(r"\b(?:{})\b", alternatives.join("|"));
        let pattern = match RegexBuilder::new(&source).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(error = %e, "could not build term matcher, highlighting disabled");
                None
            }
        };

        Self { pattern }
    }

    /// Split `text` into plain and term segments, lazily.
    /// Concatenating the segments gives back `text` exactly.
    pub fn segments<'h, 't>(&'h self, text: &'t str) -> Segments<'h, 't> {
        Segments {
            text,
            pos: 0,
            matches: self.pattern.as_ref().map(|re| re.find_iter(text)),
            pending: None,
        }
    }
}

pub struct Segments<'h, 't> {
    text: &'t str,
    pos: usize,
    matches: Option<Matches<'h, 't>>,
    pending: Option<regex::Match<'t>>,
}

impl<'h, 't> Iterator for Segments<'h, 't> {
    type Item = Segment<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(m) = self.pending.take() {
            self.pos = m.end();
            return Some(Segment::Term(m.as_str()));
        }

        if let Some(m) = self.matches.as_mut().and_then(|matches| matches.next()) {
            if m.start() > self.pos {
                let plain = &self.text[self.pos..m.start()];
                self.pending = Some(m);
                return Some(Segment::Plain(plain));
            }
            self.pos = m.end();
            return Some(Segment::Term(m.as_str()));
        }

        if self.pos < self.text.len() {
            let rest = &self.text[self.pos..];
            self.pos = self.text.len();
            return Some(Segment::Plain(rest));
        }

        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Spacer,
    Heading(u8),
    ListItem,
    Paragraph,
}

/// One rendered line of an answer, markers already stripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'t> {
    pub kind: BlockKind,
    pub text: &'t str,
}

impl<'t> Block<'t> {
    pub fn segments<'h>(&self, highlighter: &'h TermHighlighter) -> Segments<'h, 't> {
        highlighter.segments(self.text)
    }
}

const FENCE: &str = "```";

fn classify(line: &str) -> Option<Block<'_>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Some(Block { kind: BlockKind::Spacer, text: "" });
    }
    if trimmed.starts_with(FENCE) {
        return None;
    }

    let block = if let Some(rest) = trimmed.strip_prefix("### ") {
        Block { kind: BlockKind::Heading(3), text: rest }
    } else if let Some(rest) = trimmed.strip_prefix("## ") {
        Block { kind: BlockKind::Heading(2), text: rest }
    } else if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        Block { kind: BlockKind::ListItem, text: rest }
    } else {
        Block { kind: BlockKind::Paragraph, text: trimmed }
    };
    Some(block)
}

/// Classify each line of `content`. Fence lines are dropped; the code
/// between them comes through as ordinary paragraphs.
pub fn blocks(content: &str) -> impl Iterator<Item = Block<'_>> {
    content.split('\n').filter_map(classify)
}
