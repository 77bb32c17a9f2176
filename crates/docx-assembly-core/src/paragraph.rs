//! Paragraph helpers over `w:p` elements.

use crate::run::{build_run, run_text, W_R};
use crate::xml::{XmlElement, XmlNode};

pub const W_P: &str = "w:p";
pub const W_PPR: &str = "w:pPr";
pub const W_TBL: &str = "w:tbl";

pub fn new_paragraph() -> XmlElement {
    XmlElement::new(W_P)
}

/// A paragraph holding a single plain run.
pub fn paragraph_with_text(text: &str) -> XmlElement {
    let mut p = new_paragraph();
    if !text.is_empty() {
        p.children.push(XmlNode::Element(build_run(None, text)));
    }
    p
}

pub fn paragraph_with_run(run: XmlElement) -> XmlElement {
    new_paragraph().with_child(run)
}

/// Direct runs of the paragraph, in order.
pub fn runs(paragraph: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    paragraph.children_named(W_R)
}

/// Visible text of the paragraph; derived from its runs, never stored.
pub fn paragraph_text(paragraph: &XmlElement) -> String {
    runs(paragraph).map(run_text).collect()
}

pub fn style_id(paragraph: &XmlElement) -> Option<&str> {
    paragraph
        .child(W_PPR)?
        .child("w:pStyle")?
        .attr("w:val")
}

pub fn set_style_id(paragraph: &mut XmlElement, style: &str) {
    paragraph
        .ensure_child_ordered(W_PPR, &[W_PPR])
        .ensure_child_ordered("w:pStyle", &["w:pStyle"])
        .set_attr("w:val", style);
}

/// Remove the direct runs, keeping properties, bookmarks and other markup.
pub fn clear_runs(paragraph: &mut XmlElement) {
    paragraph.remove_children_named(W_R);
}

/// Remove everything except the paragraph properties.
pub fn clear_content(paragraph: &mut XmlElement) {
    paragraph
        .children
        .retain(|node| matches!(node, XmlNode::Element(el) if el.is(W_PPR)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_concatenates_direct_runs() {
        let p = new_paragraph()
            .with_child(build_run(None, "Hello, "))
            .with_child(XmlElement::new("w:proofErr"))
            .with_child(build_run(None, "world"));
        assert_eq!(paragraph_text(&p), "Hello, world");
        assert_eq!(runs(&p).count(), 2);
    }

    #[test]
    fn test_clear_content_keeps_properties() {
        let mut p = paragraph_with_text("x");
        set_style_id(&mut p, "Heading1");
        clear_content(&mut p);
        assert_eq!(style_id(&p), Some("Heading1"));
        assert_eq!(paragraph_text(&p), "");
    }
}
