//! Sequential Roman-numeral titles.
//!
//! Title paragraphs are located with a chain of predicates tried in priority
//! order over the same candidates; each tier only adds paragraphs the
//! earlier tiers did not pick.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::Result;
use crate::paragraph::{clear_runs, paragraph_text, paragraph_with_run, runs, style_id};
use crate::placeholders::replace_separator_token;
use crate::roman::to_roman;
use crate::run::{is_bold, title_run, DefaultFont};
use crate::xml::{XmlElement, XmlNode};

/// Leading indent of every generated title.
pub const TITLE_INDENT: &str = "                  ";
/// Paragraphs longer than this (in characters) are not short-title candidates.
pub const SHORT_TITLE_MAX_CHARS: usize = 200;

static ROMAN_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[IVXLCDM]+\s*[\t\-\x{2013}\x{2014}]\s*").expect("valid roman prefix pattern")
});

/// What the predicates need to know about one top-level paragraph.
#[derive(Debug, Clone)]
struct Candidate {
    trimmed_chars: usize,
    style_name: Option<String>,
    has_bold: bool,
}

impl Candidate {
    fn is_empty(&self) -> bool {
        self.trimmed_chars == 0
    }
}

type Tier = fn(&[Candidate], usize) -> bool;

fn heading_style(candidates: &[Candidate], i: usize) -> bool {
    let c = &candidates[i];
    !c.is_empty()
        && c.style_name.as_deref().is_some_and(|name| {
            let name = name.to_lowercase();
            name.contains("heading") || name.contains("title")
        })
}

fn bold_run(candidates: &[Candidate], i: usize) -> bool {
    !candidates[i].is_empty() && candidates[i].has_bold
}

fn short_then_content(candidates: &[Candidate], i: usize) -> bool {
    let Some(next) = candidates.get(i + 1) else {
        return false;
    };
    let c = &candidates[i];
    !c.is_empty() && !next.is_empty() && c.trimmed_chars <= SHORT_TITLE_MAX_CHARS
}

fn non_empty(candidates: &[Candidate], i: usize) -> bool {
    !candidates[i].is_empty()
}

const TIERS: &[(&str, Tier)] = &[
    ("heading style", heading_style),
    ("bold run", bold_run),
    ("short paragraph before content", short_then_content),
    ("first non-empty", non_empty),
];

fn candidates(document: &Document) -> Vec<Candidate> {
    document
        .paragraphs()
        .map(|p| {
            let style_name = style_id(p).map(|id| document.style_name(id).unwrap_or(id).to_string());
            Candidate {
                trimmed_chars: paragraph_text(p).trim().chars().count(),
                style_name,
                has_bold: runs(p).any(is_bold),
            }
        })
        .collect()
}

/// Indices (into the top-level paragraphs) of up to `max_count` title-like
/// paragraphs, in document order.
pub fn find_title_indices(document: &Document, max_count: usize) -> Vec<usize> {
    let candidates = candidates(document);
    let mut selected: Vec<usize> = Vec::new();
    for (tier_name, tier) in TIERS {
        if selected.len() >= max_count {
            break;
        }
        for i in 0..candidates.len() {
            if selected.len() >= max_count {
                break;
            }
            if !selected.contains(&i) && tier(&candidates, i) {
                debug!("Paragraph {} selected as title by tier '{}'", i, tier_name);
                selected.push(i);
            }
        }
    }
    selected.sort_unstable();
    selected
}

/// Title text without a leading "Roman numeral + separator" prefix. Falls
/// back to the trimmed text when nothing would remain.
pub fn strip_roman_prefix(text: &str) -> String {
    let trimmed = text.trim();
    let stripped = ROMAN_PREFIX.replace(trimmed, "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        trimmed.to_string()
    } else {
        stripped.to_string()
    }
}

/// `"<indent><ROMAN> - <label>"`, with the separator token rendered.
pub fn format_title(ordinal: u32, label: &str) -> Result<String> {
    Ok(format!(
        "{TITLE_INDENT}{} - {}",
        to_roman(ordinal)?,
        replace_separator_token(label)
    ))
}

/// A one-run bold title paragraph.
pub fn title_paragraph(ordinal: u32, label: &str, font: &DefaultFont) -> Result<XmlElement> {
    Ok(paragraph_with_run(title_run(&format_title(ordinal, label)?, font)))
}

/// Number up to `count` titles of `document` starting at `start`, and
/// synthesize empty-labelled titles for the ones that could not be found.
/// Returns the next unused ordinal.
pub fn apply_sequential_titles(
    document: &mut Document,
    start: u32,
    count: usize,
    font: &DefaultFont,
) -> Result<u32> {
    let indices = find_title_indices(document, count);
    let mut ordinal = start;

    for &index in &indices {
        let Some(paragraph) = document.paragraph_mut(index) else {
            warn!("Title paragraph {} disappeared before numbering", index);
            continue;
        };
        let label = strip_roman_prefix(&paragraph_text(paragraph));
        let title = format_title(ordinal, &label)?;
        clear_runs(paragraph);
        paragraph.children.push(XmlNode::Element(title_run(&title, font)));
        ordinal += 1;
    }

    let missing = count.saturating_sub(indices.len());
    if missing > 0 {
        debug!("Synthesizing {} missing titles", missing);
    }
    let mut cursor = indices.last().copied();
    for _ in 0..missing {
        let paragraph = title_paragraph(ordinal, "", font)?;
        match cursor {
            Some(after) if document.insert_after_paragraph(after, paragraph.clone()) => {
                cursor = Some(after + 1);
            }
            _ => document.append_block(paragraph),
        }
        ordinal += 1;
    }
    Ok(ordinal)
}
