//! Token replacement across run boundaries.
//!
//! Word splits visible text into runs at arbitrary points (spell checking,
//! revision marks, partial formatting), so a token such as `{{NOME}}` may
//! be spread over several runs. Matching works on the concatenated text of
//! the paragraph's direct runs; only the runs a match touches are rebuilt.

use tracing::{trace, warn};

use crate::run::{
    build_run, has_explicit_font, has_explicit_size, run_text, set_bold, set_font,
    set_size_half_points, DefaultFont, W_R, W_RPR,
};
use crate::xml::{XmlElement, XmlNode};

/// One token to replace, with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub token: String,
    pub value: String,
    pub force_bold: bool,
}

impl Substitution {
    pub fn new(token: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            value: value.into(),
            force_bold: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.force_bold = true;
        self
    }
}

/// A direct run of the paragraph and its byte range in the joined text.
#[derive(Debug, Clone, Copy)]
struct Span {
    child_index: usize,
    start: usize,
    end: usize,
}

fn collect_spans(paragraph: &XmlElement) -> (String, Vec<Span>) {
    let mut text = String::new();
    let mut spans = Vec::new();
    for (child_index, node) in paragraph.children.iter().enumerate() {
        if let XmlNode::Element(el) = node {
            if el.is(W_R) {
                let start = text.len();
                text.push_str(&run_text(el));
                spans.push(Span {
                    child_index,
                    start,
                    end: text.len(),
                });
            }
        }
    }
    (text, spans)
}

/// Upper bound on replacements in one paragraph; stops values that contain
/// their own token from expanding forever.
pub const MAX_REPLACEMENTS_PER_PARAGRAPH: usize = 256;

/// Replace every occurrence of the substitution tokens in `paragraph`.
///
/// Each pass scans the joined text left to right, trying the substitutions
/// in order at every position. After a replacement the paragraph is scanned
/// again from the start, so a value that contains another known token gets
/// that token replaced too. Returns the number of replacements made.
pub fn replace_in_paragraph(
    paragraph: &mut XmlElement,
    substitutions: &[Substitution],
    font: &DefaultFont,
) -> usize {
    let mut replaced = 0;
    loop {
        let (text, spans) = collect_spans(paragraph);
        let Some((pos, sub)) = first_match(&text, substitutions) else {
            break;
        };
        if replaced == MAX_REPLACEMENTS_PER_PARAGRAPH {
            warn!(
                "Stopped after {} replacements in one paragraph; {} keeps reappearing",
                replaced, sub.token
            );
            break;
        }
        splice_match(paragraph, &spans, pos, pos + sub.token.len(), sub, font);
        trace!("Replaced {} at byte {}", sub.token, pos);
        replaced += 1;
    }
    replaced
}

/// Leftmost position where one of the tokens starts; at a given position
/// the earlier substitution wins.
fn first_match<'s>(text: &str, substitutions: &'s [Substitution]) -> Option<(usize, &'s Substitution)> {
    if !substitutions
        .iter()
        .any(|s| !s.token.is_empty() && text.contains(&s.token))
    {
        return None;
    }
    text.char_indices().find_map(|(pos, _)| {
        substitutions
            .iter()
            .find(|s| !s.token.is_empty() && text[pos..].starts_with(&s.token))
            .map(|sub| (pos, sub))
    })
}

/// Rebuild the runs covering `[start, end)`: the text before the match keeps
/// the first run's formatting, the value gets a run derived from it, and the
/// text after the match keeps the last run's formatting.
fn splice_match(
    paragraph: &mut XmlElement,
    spans: &[Span],
    start: usize,
    end: usize,
    sub: &Substitution,
    font: &DefaultFont,
) {
    let Some(first) = spans.iter().find(|s| s.start <= start && start < s.end) else {
        return;
    };
    let Some(last) = spans.iter().find(|s| s.start < end && end <= s.end) else {
        return;
    };
    let (Some(first_run), Some(last_run)) = (
        run_at(paragraph, first.child_index),
        run_at(paragraph, last.child_index),
    ) else {
        return;
    };

    let first_text = run_text(first_run);
    let last_text = run_text(last_run);
    let before = &first_text[..start - first.start];
    let after = &last_text[end - last.start..];
    let first_props = first_run.child(W_RPR).cloned();
    let last_props = last_run.child(W_RPR).cloned();

    let mut nodes = Vec::new();
    if !before.is_empty() {
        nodes.push(XmlNode::Element(build_run(first_props.clone(), before)));
    }
    if !sub.value.is_empty() {
        let mut value_run = build_run(first_props, &sub.value);
        if !has_explicit_font(&value_run) {
            set_font(&mut value_run, &font.name);
        }
        if !has_explicit_size(&value_run) {
            set_size_half_points(&mut value_run, font.size_points * 2);
        }
        if sub.force_bold {
            set_bold(&mut value_run, true);
        }
        nodes.push(XmlNode::Element(value_run));
    }
    if !after.is_empty() {
        nodes.push(XmlNode::Element(build_run(last_props, after)));
    }

    // Siblings between the first and last run that carry no text (bookmarks,
    // proofing marks, drawing-only runs) survive after the new runs.
    let range = first.child_index..=last.child_index;
    let between = paragraph
        .children
        .get(first.child_index + 1..last.child_index)
        .unwrap_or_default();
    for node in between {
        let keep = match node {
            XmlNode::Element(el) if el.is(W_R) => run_text(el).is_empty(),
            XmlNode::Text(t) => !t.trim().is_empty(),
            _ => true,
        };
        if keep {
            nodes.push(node.clone());
        }
    }
    paragraph.children.splice(range, nodes);
}

fn run_at(paragraph: &XmlElement, child_index: usize) -> Option<&XmlElement> {
    match paragraph.children.get(child_index) {
        Some(XmlNode::Element(el)) if el.is(W_R) => Some(el),
        _ => None,
    }
}
