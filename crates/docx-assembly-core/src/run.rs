//! Runs: text spans with uniform character formatting.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::xml::{XmlElement, XmlNode};

pub const W_R: &str = "w:r";
pub const W_RPR: &str = "w:rPr";
pub const W_T: &str = "w:t";

/// Schema order of the `w:rPr` children this crate writes or reads.
const RPR_ORDER: &[&str] = &[
    "w:rStyle", "w:rFonts", "w:b", "w:bCs", "w:i", "w:iCs", "w:caps", "w:smallCaps", "w:strike",
    "w:dstrike", "w:outline", "w:shadow", "w:emboss", "w:imprint", "w:noProof", "w:snapToGrid",
    "w:vanish", "w:webHidden", "w:color", "w:spacing", "w:w", "w:kern", "w:position", "w:sz",
    "w:szCs", "w:highlight", "w:u", "w:effect", "w:bdr", "w:shd", "w:fitText", "w:vertAlign",
    "w:rtl", "w:cs", "w:em", "w:lang", "w:eastAsianLayout", "w:specVanish", "w:oMath",
];

/// Font applied to generated runs that carry no explicit font or size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultFont {
    pub name: String,
    pub size_points: u32,
}

impl Default for DefaultFont {
    fn default() -> Self {
        Self {
            name: "Garamond".to_string(),
            size_points: 12,
        }
    }
}

/// The character formatting attributes carried between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFormat {
    pub font_name: Option<String>,
    pub size_half_points: Option<String>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<String>,
}

impl RunFormat {
    pub fn of(run: &XmlElement) -> Self {
        let Some(rpr) = run.child(W_RPR) else {
            return Self::default();
        };
        Self {
            font_name: rpr
                .child("w:rFonts")
                .and_then(|f| f.attr("w:ascii").or_else(|| f.attr("w:hAnsi")))
                .map(str::to_string),
            size_half_points: rpr.child("w:sz").and_then(|s| s.attr("w:val")).map(str::to_string),
            bold: rpr.child("w:b").map(toggle_value),
            italic: rpr.child("w:i").map(toggle_value),
            underline: rpr.child("w:u").and_then(|u| u.attr("w:val")).map(str::to_string),
        }
    }
}

/// Which attributes `copy_run_format` managed to transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatCopyReport {
    pub font_name: bool,
    pub size: bool,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl FormatCopyReport {
    pub fn copied_count(&self) -> usize {
        [self.font_name, self.size, self.bold, self.italic, self.underline]
            .iter()
            .filter(|copied| **copied)
            .count()
    }
}

/// Best-effort copy of the five tracked attributes from `src` onto `dst`.
/// Each attribute is handled on its own; a malformed value on the source
/// leaves that attribute untouched and is reported as not copied.
pub fn copy_run_format(src: &XmlElement, dst: &mut XmlElement) -> FormatCopyReport {
    let format = RunFormat::of(src);
    let mut report = FormatCopyReport::default();

    if let Some(font) = format.font_name.as_deref().filter(|f| !f.is_empty()) {
        set_font(dst, font);
        report.font_name = true;
    }
    if let Some(size) = &format.size_half_points {
        match size.parse::<u32>() {
            Ok(half_points) => {
                set_size_half_points(dst, half_points);
                report.size = true;
            }
            Err(_) => debug!("Ignoring malformed run size {:?}", size),
        }
    }
    if let Some(bold) = format.bold {
        set_bold(dst, bold);
        report.bold = true;
    }
    if let Some(italic) = format.italic {
        set_toggle(dst, "w:i", italic);
        report.italic = true;
    }
    if let Some(underline) = format.underline.as_deref().filter(|u| !u.is_empty()) {
        run_properties_mut(dst)
            .ensure_child_ordered("w:u", RPR_ORDER)
            .set_attr("w:val", underline);
        report.underline = true;
    }
    report
}

fn toggle_value(el: &XmlElement) -> bool {
    !matches!(el.attr("w:val"), Some("0") | Some("false") | Some("off"))
}

/// Visible text of a run: `w:t` text, tabs and line breaks.
pub fn run_text(run: &XmlElement) -> String {
    let mut text = String::new();
    for child in run.elements() {
        match child.name.as_str() {
            W_T => text.push_str(&child.text()),
            "w:tab" => text.push('\t'),
            "w:br" | "w:cr" => text.push('\n'),
            _ => {}
        }
    }
    text
}

/// True when the run explicitly turns bold on.
pub fn is_bold(run: &XmlElement) -> bool {
    run.child(W_RPR)
        .and_then(|rpr| rpr.child("w:b"))
        .is_some_and(toggle_value)
}

pub fn has_explicit_font(run: &XmlElement) -> bool {
    RunFormat::of(run).font_name.is_some_and(|f| !f.is_empty())
}

pub fn has_explicit_size(run: &XmlElement) -> bool {
    RunFormat::of(run).size_half_points.is_some()
}

/// Build a run with optional properties; tabs and newlines in `text`
/// become `w:tab` and `w:br` elements.
pub fn build_run(properties: Option<XmlElement>, text: &str) -> XmlElement {
    let mut run = XmlElement::new(W_R);
    if let Some(rpr) = properties {
        run.children.push(XmlNode::Element(rpr));
    }
    let mut pending = String::new();
    let flush = |pending: &mut String, run: &mut XmlElement| {
        if !pending.is_empty() {
            run.children.push(XmlNode::Element(text_element(pending)));
            pending.clear();
        }
    };
    for ch in text.chars() {
        match ch {
            '\t' => {
                flush(&mut pending, &mut run);
                run.children.push(XmlNode::Element(XmlElement::new("w:tab")));
            }
            '\n' => {
                flush(&mut pending, &mut run);
                run.children.push(XmlNode::Element(XmlElement::new("w:br")));
            }
            other => pending.push(other),
        }
    }
    flush(&mut pending, &mut run);
    run
}

fn text_element(text: &str) -> XmlElement {
    let mut t = XmlElement::new(W_T);
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        t.set_attr("xml:space", "preserve");
    }
    t.with_text(text)
}

/// A bold run in the default font, used for numbered titles.
pub fn title_run(text: &str, font: &DefaultFont) -> XmlElement {
    let mut run = build_run(None, text);
    set_font(&mut run, &font.name);
    set_bold(&mut run, true);
    set_size_half_points(&mut run, font.size_points * 2);
    run
}

/// The run's `w:rPr`, created as first child when missing.
pub fn run_properties_mut(run: &mut XmlElement) -> &mut XmlElement {
    run.ensure_child_ordered(W_RPR, &[W_RPR])
}

pub fn set_font(run: &mut XmlElement, font: &str) {
    let fonts = run_properties_mut(run).ensure_child_ordered("w:rFonts", RPR_ORDER);
    fonts.set_attr("w:ascii", font);
    fonts.set_attr("w:hAnsi", font);
    fonts.set_attr("w:eastAsia", font);
    fonts.remove_attr("w:asciiTheme");
    fonts.remove_attr("w:hAnsiTheme");
    fonts.remove_attr("w:eastAsiaTheme");
}

pub fn set_size_half_points(run: &mut XmlElement, half_points: u32) {
    run_properties_mut(run)
        .ensure_child_ordered("w:sz", RPR_ORDER)
        .set_attr("w:val", half_points.to_string());
}

pub fn set_bold(run: &mut XmlElement, bold: bool) {
    set_toggle(run, "w:b", bold);
}

fn set_toggle(run: &mut XmlElement, name: &str, on: bool) {
    let el = run_properties_mut(run).ensure_child_ordered(name, RPR_ORDER);
    if on {
        el.remove_attr("w:val");
    } else {
        el.set_attr("w:val", "0");
    }
}
