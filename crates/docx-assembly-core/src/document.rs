//! In-memory WordprocessingML document.
//!
//! A `Document` owns the zip package it was read from plus parsed, mutable
//! trees for the parts this crate edits: the main body, header and footer
//! stories, styles and numbering. Every other part travels untouched.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::{AssemblyError, Result};
use crate::package::{
    rels_part_name, resolve_target, ContentTypes, Package, Relationships, CONTENT_TYPES_PART,
    CT_NUMBERING, CT_STYLES, PACKAGE_RELS_PART, REL_FOOTER, REL_HEADER,
    REL_NUMBERING, REL_OFFICE_DOCUMENT, REL_STYLES,
};
use crate::paragraph::W_P;
use crate::xml::{XmlElement, XmlNode, XmlPart};

pub const W_BODY: &str = "w:body";
pub const W_SECT_PR: &str = "w:sectPr";
const DEFAULT_MAIN_PART: &str = "word/document.xml";

pub(crate) const W_NAMESPACE: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(crate) const R_NAMESPACE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const BLANK_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;
const BLANK_PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;
const BLANK_DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryKind {
    Header,
    Footer,
}

/// A header or footer part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryPart {
    pub kind: StoryKind,
    pub xml: XmlPart,
}

#[derive(Debug, Clone)]
pub struct Document {
    package: Package,
    content_types: ContentTypes,
    main_part: String,
    /// `w:document` with the body detached; it is re-inserted at
    /// `body_index` on serialization.
    shell: XmlElement,
    body_index: usize,
    body: XmlElement,
    rels: Relationships,
    stories: Vec<StoryPart>,
    styles: Option<XmlPart>,
    numbering: Option<XmlPart>,
}

impl Document {
    /// Load a document container from disk. The file handle is released
    /// before this returns.
    pub fn open(path: &Path) -> Result<Self> {
        let package = Package::open(path)?;
        let document = Self::from_package(package)?;
        debug!("Opened document {}", path.display());
        Ok(document)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    /// An empty single-section document.
    pub fn blank() -> Result<Self> {
        let mut package = Package::new();
        package.set_part(CONTENT_TYPES_PART, BLANK_CONTENT_TYPES.as_bytes().to_vec());
        package.set_part(PACKAGE_RELS_PART, BLANK_PACKAGE_RELS.as_bytes().to_vec());
        package.set_part("word/_rels/document.xml.rels", BLANK_DOCUMENT_RELS.as_bytes().to_vec());
        let root = XmlElement::new("w:document")
            .with_attr("xmlns:w", W_NAMESPACE)
            .with_attr("xmlns:r", R_NAMESPACE)
            .with_child(XmlElement::new(W_BODY).with_child(blank_section_properties()));
        let main = XmlPart {
            name: DEFAULT_MAIN_PART.to_string(),
            root,
        };
        package.set_part(DEFAULT_MAIN_PART, main.serialize());
        Self::from_package(package)
    }

    pub fn from_package(package: Package) -> Result<Self> {
        let content_types = ContentTypes::parse(&part_str(&package, CONTENT_TYPES_PART)?)?;
        let package_rels = Relationships::load_for(&package, "")?;
        let main_part = package_rels
            .of_type(REL_OFFICE_DOCUMENT)
            .next()
            .map(|rel| resolve_target("", &rel.target))
            .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string());

        let mut shell = XmlPart::parse(&main_part, package.require_part(&main_part)?)?.root;
        let body_index = shell
            .children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(el) if el.is(W_BODY)))
            .ok_or_else(|| AssemblyError::Package(format!("{main_part} has no w:body")))?;
        let XmlNode::Element(body) = shell.children.remove(body_index) else {
            return Err(AssemblyError::Package(format!("{main_part} has no w:body")));
        };

        let rels = Relationships::load_for(&package, &main_part)?;

        let mut stories = Vec::new();
        for (rel_type, kind) in [(REL_HEADER, StoryKind::Header), (REL_FOOTER, StoryKind::Footer)] {
            for rel in rels.of_type(rel_type).filter(|r| !r.is_external()) {
                let name = resolve_target(&main_part, &rel.target);
                if stories.iter().any(|s: &StoryPart| s.xml.name == name) {
                    continue;
                }
                let xml = XmlPart::parse(&name, package.require_part(&name)?)?;
                stories.push(StoryPart { kind, xml });
            }
        }
        stories.sort_by(|a, b| a.xml.name.cmp(&b.xml.name));

        let styles = load_related_part(&package, &rels, &main_part, REL_STYLES)?;
        let numbering = load_related_part(&package, &rels, &main_part, REL_NUMBERING)?;

        Ok(Self {
            package,
            content_types,
            main_part,
            shell,
            body_index,
            body,
            rels,
            stories,
            styles,
            numbering,
        })
    }

    /// Package with every parsed part written back.
    pub fn to_package(&self) -> Package {
        let mut package = self.package.clone();

        let mut root = self.shell.clone();
        let index = self.body_index.min(root.children.len());
        root.children.insert(index, XmlNode::Element(self.body.clone()));
        let main = XmlPart {
            name: self.main_part.clone(),
            root,
        };
        package.set_part(&self.main_part, main.serialize());
        package.set_part(&rels_part_name(&self.main_part), self.rels.to_xml());

        for story in &self.stories {
            package.set_part(&story.xml.name, story.xml.serialize());
        }
        if let Some(styles) = &self.styles {
            package.set_part(&styles.name, styles.serialize());
        }
        if let Some(numbering) = &self.numbering {
            package.set_part(&numbering.name, numbering.serialize());
        }
        package.set_part(CONTENT_TYPES_PART, self.content_types.to_xml());
        package
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_package().to_bytes()
    }

    /// Direct, non-atomic write. Use [`crate::save::save_document`] for the
    /// final artifact.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn body(&self) -> &XmlElement {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut XmlElement {
        &mut self.body
    }

    /// Top-level paragraphs of the body.
    pub fn paragraphs(&self) -> impl Iterator<Item = &XmlElement> {
        self.body.children_named(W_P)
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraphs().count()
    }

    pub fn paragraph_mut(&mut self, index: usize) -> Option<&mut XmlElement> {
        self.body.elements_mut().filter(|el| el.is(W_P)).nth(index)
    }

    /// Top-level block nodes, excluding the final section properties.
    pub fn body_blocks(&self) -> impl Iterator<Item = &XmlElement> {
        self.body.elements().filter(|el| !el.is(W_SECT_PR))
    }

    /// Append a block at the end of the body, before the section properties.
    pub fn append_block(&mut self, block: XmlElement) {
        let index = self.section_properties_index().unwrap_or(self.body.children.len());
        self.body.children.insert(index, XmlNode::Element(block));
    }

    pub fn append_blocks<I: IntoIterator<Item = XmlElement>>(&mut self, blocks: I) {
        let mut index = self.section_properties_index().unwrap_or(self.body.children.len());
        for block in blocks {
            self.body.children.insert(index, XmlNode::Element(block));
            index += 1;
        }
    }

    /// Insert a block right after the `paragraph_index`-th top-level
    /// paragraph. Returns false when there is no such paragraph.
    pub fn insert_after_paragraph(&mut self, paragraph_index: usize, block: XmlElement) -> bool {
        let position = self
            .body
            .children
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node, XmlNode::Element(el) if el.is(W_P)))
            .nth(paragraph_index)
            .map(|(i, _)| i);
        match position {
            Some(i) => {
                self.body.children.insert(i + 1, XmlNode::Element(block));
                true
            }
            None => false,
        }
    }

    fn section_properties_index(&self) -> Option<usize> {
        self.body
            .children
            .iter()
            .rposition(|node| matches!(node, XmlNode::Element(el) if el.is(W_SECT_PR)))
    }

    pub fn stories(&self) -> &[StoryPart] {
        &self.stories
    }

    pub fn stories_mut(&mut self) -> &mut [StoryPart] {
        &mut self.stories
    }

    /// Display name of a style id, as declared in `word/styles.xml`.
    pub fn style_name(&self, style_id: &str) -> Option<&str> {
        self.styles
            .as_ref()?
            .root
            .children_named("w:style")
            .find(|s| s.attr("w:styleId") == Some(style_id))?
            .child("w:name")?
            .attr("w:val")
    }

    pub fn has_style(&self, style_id: &str) -> bool {
        self.styles.as_ref().is_some_and(|styles| {
            styles
                .root
                .children_named("w:style")
                .any(|s| s.attr("w:styleId") == Some(style_id))
        })
    }

    /// True when the container carries embedded media parts.
    pub fn has_media(&self) -> bool {
        self.package.has_media()
    }

    pub fn main_part_name(&self) -> &str {
        &self.main_part
    }

    pub fn relationships(&self) -> &Relationships {
        &self.rels
    }

    pub(crate) fn relationships_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    pub(crate) fn package(&self) -> &Package {
        &self.package
    }

    pub(crate) fn package_mut(&mut self) -> &mut Package {
        &mut self.package
    }

    pub(crate) fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    pub(crate) fn content_types_mut(&mut self) -> &mut ContentTypes {
        &mut self.content_types
    }

    /// The `w:document` element without its body.
    pub(crate) fn shell_mut(&mut self) -> &mut XmlElement {
        &mut self.shell
    }

    pub(crate) fn shell(&self) -> &XmlElement {
        &self.shell
    }

    pub(crate) fn styles(&self) -> Option<&XmlPart> {
        self.styles.as_ref()
    }

    pub(crate) fn numbering(&self) -> Option<&XmlPart> {
        self.numbering.as_ref()
    }

    /// The styles part, created (empty) and wired up when missing.
    pub(crate) fn styles_or_create(&mut self) -> &mut XmlPart {
        let part = match self.styles.take() {
            Some(part) => part,
            None => XmlPart {
                name: self.create_related_part("styles.xml", REL_STYLES, CT_STYLES),
                root: XmlElement::new("w:styles").with_attr("xmlns:w", W_NAMESPACE),
            },
        };
        self.styles.insert(part)
    }

    /// The numbering part, created (empty) and wired up when missing.
    pub(crate) fn numbering_or_create(&mut self) -> &mut XmlPart {
        let part = match self.numbering.take() {
            Some(part) => part,
            None => XmlPart {
                name: self.create_related_part("numbering.xml", REL_NUMBERING, CT_NUMBERING),
                root: XmlElement::new("w:numbering").with_attr("xmlns:w", W_NAMESPACE),
            },
        };
        self.numbering.insert(part)
    }

    fn create_related_part(&mut self, file_name: &str, rel_type: &str, content_type: &str) -> String {
        let dir = self.main_part.rfind('/').map_or("", |slash| &self.main_part[..slash]);
        let desired = if dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{dir}/{file_name}")
        };
        let name = self.package.unique_part_name(&desired);
        let target = crate::package::relative_target(&self.main_part, &name);
        self.rels.add(rel_type, &target, None);
        self.content_types.ensure(&name, content_type);
        // reserve the name so later imports do not collide with it
        self.package.set_part(&name, Vec::new());
        name
    }
}

fn part_str(package: &Package, name: &str) -> Result<String> {
    let bytes = package.require_part(name)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| AssemblyError::xml(name, e))
}

fn load_related_part(
    package: &Package,
    rels: &Relationships,
    main_part: &str,
    rel_type: &str,
) -> Result<Option<XmlPart>> {
    let Some(rel) = rels.of_type(rel_type).find(|r| !r.is_external()) else {
        return Ok(None);
    };
    let name = resolve_target(main_part, &rel.target);
    match package.part(&name) {
        Some(bytes) => Ok(Some(XmlPart::parse(&name, bytes)?)),
        None => Ok(None),
    }
}

fn blank_section_properties() -> XmlElement {
    XmlElement::new(W_SECT_PR)
        .with_child(
            XmlElement::new("w:pgSz")
                .with_attr("w:w", "11906")
                .with_attr("w:h", "16838"),
        )
        .with_child(
            XmlElement::new("w:pgMar")
                .with_attr("w:top", "1417")
                .with_attr("w:right", "1701")
                .with_attr("w:bottom", "1417")
                .with_attr("w:left", "1701")
                .with_attr("w:header", "708")
                .with_attr("w:footer", "708")
                .with_attr("w:gutter", "0"),
        )
}
