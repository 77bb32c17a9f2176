//! Media-aware append of one document's body into another.
//!
//! Body blocks are cloned from the source and every relationship they
//! reference is carried over: external targets are re-registered, internal
//! parts (images, charts, embedded objects and whatever those parts
//! reference in turn) are copied under collision-free names. Images with the
//! same bytes are stored once. Styles and list definitions used by the
//! blocks are imported when the destination lacks them.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::document::{Document, R_NAMESPACE};
use crate::error::{AssemblyError, Result};
use crate::package::{
    rels_part_name, relative_target, resolve_target, Package, Relationship, Relationships,
    MEDIA_PREFIX,
};
use crate::xml::{XmlElement, XmlNode};

/// What an append carried over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub blocks: usize,
    pub relationships: usize,
    pub parts: usize,
    pub media_reused: usize,
    pub styles: usize,
    pub numbering: usize,
}

/// Append every body block of `source` (its final section properties
/// excluded) to the end of `destination`.
///
/// Fails on a reference to a relationship the source does not define, on
/// a referenced part missing from the source package and on a namespace
/// prefix bound differently in the two documents. `destination` may be
/// partially modified when this fails.
pub fn append_document(destination: &mut Document, source: &Document) -> Result<MergeReport> {
    let mut blocks: Vec<XmlElement> = source.body_blocks().cloned().collect();
    let mut report = MergeReport {
        blocks: blocks.len(),
        ..MergeReport::default()
    };

    merge_namespaces(destination.shell_mut(), source.shell())?;
    let prefix = relationship_prefix(source.shell());

    let mut importer = PartImporter::new(destination, source);
    let mut id_map = HashMap::new();
    for id in collect_reference_ids(&blocks, &prefix) {
        let rel = source
            .relationships()
            .get(&id)
            .cloned()
            .ok_or_else(|| AssemblyError::UnresolvedRelationship {
                part: source.main_part_name().to_string(),
                id: id.clone(),
            })?;
        let new_id = if rel.is_external() {
            register_relationship(destination, rel)
        } else {
            let source_part = resolve_target(source.main_part_name(), &rel.target);
            let imported = importer.import_part(destination, &source_part)?;
            let target = relative_target(destination.main_part_name(), &imported);
            register_relationship(destination, Relationship { target, ..rel })
        };
        id_map.insert(id, new_id);
    }
    report.relationships = id_map.len();
    report.parts = importer.imported;
    report.media_reused = importer.reused;
    rewrite_reference_ids(&mut blocks, &prefix, &id_map);

    let mut styles = styles_to_import(destination, source, &used_style_ids(&blocks));
    let mut num_ids = used_num_ids(&blocks);
    for id in used_num_ids(&styles) {
        if !num_ids.contains(&id) {
            num_ids.push(id);
        }
    }
    let num_map = import_numbering(destination, source, &num_ids);
    report.numbering = num_map.len();
    rewrite_num_ids(&mut blocks, &num_map);
    rewrite_num_ids(&mut styles, &num_map);

    report.styles = styles.len();
    if !styles.is_empty() {
        let root = &mut destination.styles_or_create().root;
        root.children.extend(styles.into_iter().map(XmlNode::Element));
    }

    renumber_drawing_ids(destination.body(), &mut blocks);
    destination.append_blocks(blocks);
    debug!(
        "Appended {} blocks ({} relationships, {} parts, {} styles)",
        report.blocks, report.relationships, report.parts, report.styles
    );
    Ok(report)
}

/// Carry over the external relationships (hyperlinks) `blocks` reference
/// and rewrite their ids. A reference to an internal part is an error; the
/// plain-copy path cannot transport parts.
pub(crate) fn copy_external_references(
    destination: &mut Document,
    source: &Document,
    blocks: &mut [XmlElement],
) -> Result<usize> {
    let prefix = relationship_prefix(source.shell());
    let mut external = Vec::new();
    for id in collect_reference_ids(blocks, &prefix) {
        let rel = source
            .relationships()
            .get(&id)
            .cloned()
            .ok_or_else(|| AssemblyError::UnresolvedRelationship {
                part: source.main_part_name().to_string(),
                id: id.clone(),
            })?;
        if !rel.is_external() {
            return Err(AssemblyError::Merge(format!(
                "relationship {id} targets internal part {}",
                rel.target
            )));
        }
        external.push((id, rel));
    }
    merge_namespaces(destination.shell_mut(), source.shell())?;

    let mut id_map = HashMap::new();
    for (id, rel) in external {
        id_map.insert(id, register_relationship(destination, rel));
    }
    rewrite_reference_ids(blocks, &prefix, &id_map);
    Ok(id_map.len())
}

/// Reuse an equivalent relationship of the destination or add a new one.
fn register_relationship(destination: &mut Document, rel: Relationship) -> String {
    if let Some(existing) = destination.relationships().find_equivalent(&rel) {
        return existing.to_string();
    }
    destination
        .relationships_mut()
        .add(&rel.rel_type, &rel.target, rel.target_mode.as_deref())
}

/// Copy the source's namespace declarations the destination lacks and
/// union the `mc:Ignorable` prefix lists.
pub(crate) fn merge_namespaces(destination: &mut XmlElement, source: &XmlElement) -> Result<()> {
    let mut missing = Vec::new();
    for (key, value) in source.attributes.iter().filter(|(k, _)| k.starts_with("xmlns:")) {
        match destination.attr(key) {
            None => missing.push((key.clone(), value.clone())),
            Some(existing) if existing == value => {}
            Some(existing) => {
                return Err(AssemblyError::Merge(format!(
                    "namespace prefix {key} is bound to {existing} in the destination and {value} in the source"
                )));
            }
        }
    }
    for (key, value) in missing {
        destination.set_attr(&key, value);
    }
    if let Some(ignorable) = source.attr("mc:Ignorable") {
        let mut prefixes: Vec<String> = destination
            .attr("mc:Ignorable")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        for prefix in ignorable.split_whitespace() {
            if !prefixes.iter().any(|p| p == prefix) {
                prefixes.push(prefix.to_string());
            }
        }
        destination.set_attr("mc:Ignorable", prefixes.join(" "));
    }
    Ok(())
}

/// Prefix bound to the relationships namespace on the document element.
fn relationship_prefix(shell: &XmlElement) -> String {
    shell
        .attributes
        .iter()
        .find(|(k, v)| k.starts_with("xmlns:") && v == R_NAMESPACE)
        .map(|(k, _)| k["xmlns:".len()..].to_string())
        .unwrap_or_else(|| "r".to_string())
}

fn is_reference_attr(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix).is_some_and(|rest| rest.starts_with(':')) || key == "o:relid"
}

/// Distinct relationship ids referenced by `blocks`, in first-use order.
pub(crate) fn collect_reference_ids(blocks: &[XmlElement], prefix: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for block in blocks {
        block.walk(&mut |el| {
            for (key, value) in &el.attributes {
                if is_reference_attr(key, prefix) && !value.is_empty() && seen.insert(value.clone()) {
                    ids.push(value.clone());
                }
            }
        });
    }
    ids
}

pub(crate) fn rewrite_reference_ids(
    blocks: &mut [XmlElement],
    prefix: &str,
    id_map: &HashMap<String, String>,
) {
    if id_map.is_empty() {
        return;
    }
    for block in blocks.iter_mut() {
        block.walk_mut(&mut |el| {
            for (key, value) in el.attributes.iter_mut() {
                if is_reference_attr(key, prefix) {
                    if let Some(new_id) = id_map.get(value.as_str()) {
                        *value = new_id.clone();
                    }
                }
            }
        });
    }
}

/// Copies parts from the source package, following their own
/// relationships.
struct PartImporter<'a> {
    source: &'a Document,
    package: Package,
    imported_names: HashMap<String, String>,
    media_by_hash: HashMap<String, String>,
    imported: usize,
    reused: usize,
}

impl<'a> PartImporter<'a> {
    fn new(destination: &Document, source: &'a Document) -> Self {
        let media_by_hash = destination
            .package()
            .parts()
            .iter()
            .filter(|p| p.name.starts_with(MEDIA_PREFIX))
            .map(|p| (content_hash(&p.data), p.name.clone()))
            .collect();
        Self {
            source,
            package: source.to_package(),
            imported_names: HashMap::new(),
            media_by_hash,
            imported: 0,
            reused: 0,
        }
    }

    /// Import `source_part` and return its name in the destination.
    fn import_part(&mut self, destination: &mut Document, source_part: &str) -> Result<String> {
        if let Some(name) = self.imported_names.get(source_part) {
            return Ok(name.clone());
        }
        let data = self.package.require_part(source_part)?.to_vec();

        let is_media = source_part.starts_with(MEDIA_PREFIX);
        let hash = is_media.then(|| content_hash(&data));
        if let Some(existing) = hash.as_ref().and_then(|h| self.media_by_hash.get(h)) {
            debug!("Reusing {} for identical media {}", existing, source_part);
            let existing = existing.clone();
            self.imported_names.insert(source_part.to_string(), existing.clone());
            self.reused += 1;
            return Ok(existing);
        }

        let name = destination.package().unique_part_name(source_part);
        self.imported_names.insert(source_part.to_string(), name.clone());
        if let Some(hash) = hash {
            self.media_by_hash.insert(hash, name.clone());
        }
        match self.source.content_types().content_type(source_part) {
            Some(content_type) => destination.content_types_mut().ensure(&name, content_type),
            None => warn!("No content type registered for {}", source_part),
        }
        destination.package_mut().set_part(&name, data);
        self.imported += 1;

        let own = Relationships::load_for(&self.package, source_part)?;
        if !own.is_empty() {
            let mut rels = Relationships::default();
            for rel in own.iter() {
                let mut copy = rel.clone();
                if !rel.is_external() {
                    let target = resolve_target(source_part, &rel.target);
                    let imported = self.import_part(destination, &target)?;
                    copy.target = relative_target(&name, &imported);
                }
                rels.push(copy);
            }
            destination
                .package_mut()
                .set_part(&rels_part_name(&name), rels.to_xml());
        }
        Ok(name)
    }
}

fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

const STYLE_REFERENCES: &[&str] = &["w:pStyle", "w:rStyle", "w:tblStyle"];
const STYLE_DEPENDENCIES: &[&str] = &["w:basedOn", "w:link"];

fn used_style_ids(blocks: &[XmlElement]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for block in blocks {
        block.walk(&mut |el| {
            if STYLE_REFERENCES.contains(&el.name.as_str()) {
                if let Some(id) = el.attr("w:val") {
                    if !ids.iter().any(|known| known == id) {
                        ids.push(id.to_string());
                    }
                }
            }
        });
    }
    ids
}

/// Source style definitions the destination lacks, dependencies first.
fn styles_to_import(destination: &Document, source: &Document, requested: &[String]) -> Vec<XmlElement> {
    let Some(source_styles) = source.styles() else {
        return Vec::new();
    };
    let definitions: HashMap<&str, &XmlElement> = source_styles
        .root
        .children_named("w:style")
        .filter_map(|s| s.attr("w:styleId").map(|id| (id, s)))
        .collect();

    fn visit<'s>(
        id: &str,
        definitions: &HashMap<&str, &'s XmlElement>,
        destination: &Document,
        seen: &mut HashSet<String>,
        ordered: &mut Vec<&'s XmlElement>,
    ) {
        if !seen.insert(id.to_string()) || destination.has_style(id) {
            return;
        }
        let Some(definition) = definitions.get(id) else {
            return;
        };
        for dependency in STYLE_DEPENDENCIES {
            if let Some(dep) = definition.child(dependency).and_then(|d| d.attr("w:val")) {
                visit(dep, definitions, destination, seen, ordered);
            }
        }
        ordered.push(*definition);
    }

    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for id in requested {
        visit(id, &definitions, destination, &mut seen, &mut ordered);
    }
    ordered.into_iter().cloned().collect()
}

fn used_num_ids(elements: &[XmlElement]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for element in elements {
        element.walk(&mut |el| {
            if el.is("w:numId") {
                if let Some(id) = el.attr("w:val").filter(|v| *v != "0") {
                    if !ids.iter().any(|known| known == id) {
                        ids.push(id.to_string());
                    }
                }
            }
        });
    }
    ids
}

/// Copy the `w:num` / `w:abstractNum` pairs behind `num_ids` under fresh
/// ids. Returns the old to new `w:numId` map.
fn import_numbering(
    destination: &mut Document,
    source: &Document,
    num_ids: &[String],
) -> HashMap<String, String> {
    let mut num_map = HashMap::new();
    let Some(source_numbering) = source.numbering() else {
        return num_map;
    };
    let source_root = &source_numbering.root;
    let mut abstract_map: HashMap<String, String> = HashMap::new();

    for id in num_ids {
        let Some(num) = source_root
            .children_named("w:num")
            .find(|n| n.attr("w:numId") == Some(id.as_str()))
        else {
            warn!("List {} is not defined in the source numbering", id);
            continue;
        };
        let Some(abstract_id) = num.child("w:abstractNumId").and_then(|a| a.attr("w:val")) else {
            continue;
        };

        let root = &mut destination.numbering_or_create().root;
        let new_abstract = match abstract_map.get(abstract_id) {
            Some(existing) => existing.clone(),
            None => {
                let Some(definition) = source_root
                    .children_named("w:abstractNum")
                    .find(|a| a.attr("w:abstractNumId") == Some(abstract_id))
                else {
                    warn!("Abstract list {} is not defined in the source numbering", abstract_id);
                    continue;
                };
                let new_id = next_numbering_id(root, "w:abstractNum", "w:abstractNumId").to_string();
                let mut copy = definition.clone();
                copy.set_attr("w:abstractNumId", new_id.clone());
                let at = root
                    .children
                    .iter()
                    .position(|n| matches!(n, XmlNode::Element(el) if el.is("w:num") || el.is("w:numIdMacAtCleanup")))
                    .unwrap_or(root.children.len());
                root.children.insert(at, XmlNode::Element(copy));
                abstract_map.insert(abstract_id.to_string(), new_id.clone());
                new_id
            }
        };

        let new_num = next_numbering_id(root, "w:num", "w:numId").to_string();
        let mut copy = num.clone();
        copy.set_attr("w:numId", new_num.clone());
        if let Some(link) = copy.child_mut("w:abstractNumId") {
            link.set_attr("w:val", new_abstract);
        }
        let at = root
            .children
            .iter()
            .position(|n| matches!(n, XmlNode::Element(el) if el.is("w:numIdMacAtCleanup")))
            .unwrap_or(root.children.len());
        root.children.insert(at, XmlNode::Element(copy));
        num_map.insert(id.clone(), new_num);
    }
    num_map
}

fn next_numbering_id(root: &XmlElement, element: &str, attribute: &str) -> u32 {
    root.children_named(element)
        .filter_map(|el| el.attr(attribute)?.parse::<u32>().ok())
        .max()
        .map_or(1, |max| max + 1)
}

fn rewrite_num_ids(elements: &mut [XmlElement], num_map: &HashMap<String, String>) {
    if num_map.is_empty() {
        return;
    }
    for element in elements.iter_mut() {
        element.walk_mut(&mut |el| {
            if el.is("w:numId") {
                if let Some(new_id) = el.attr("w:val").and_then(|v| num_map.get(v)).cloned() {
                    el.set_attr("w:val", new_id);
                }
            }
        });
    }
}

/// Drawing object ids must stay unique within the document body.
fn renumber_drawing_ids(existing: &XmlElement, blocks: &mut [XmlElement]) {
    let mut next = 0u32;
    existing.walk(&mut |el| {
        if el.local_name() == "docPr" {
            if let Some(id) = el.attr("id").and_then(|v| v.parse::<u32>().ok()) {
                next = next.max(id);
            }
        }
    });
    for block in blocks.iter_mut() {
        block.walk_mut(&mut |el| {
            if el.local_name() == "docPr" {
                next += 1;
                el.set_attr("id", next.to_string());
            }
        });
    }
}
