//! OPC package access: zip parts, content types and relationships.

use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{AssemblyError, Result};
use crate::xml::{escape_attr, XML_DECLARATION};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const PACKAGE_RELS_PART: &str = "_rels/.rels";
pub const MEDIA_PREFIX: &str = "word/media/";

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const REL_NUMBERING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";
pub const REL_HEADER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
pub const REL_FOOTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
pub const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const REL_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

pub const CT_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
pub const CT_XML: &str = "application/xml";
pub const CT_DOCUMENT: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
pub const CT_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
pub const CT_NUMBERING: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";

/// A single named part of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub data: Vec<u8>,
}

/// The zip container as an ordered list of parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    parts: Vec<Part>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every file entry of a zip container. The reader is consumed and
    /// released before returning.
    pub fn read<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut parts = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_start_matches('/').to_string();
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            parts.push(Part { name, data });
        }
        Ok(Self { parts })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::read(file)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(Cursor::new(bytes))
    }

    /// Write the container. `[Content_Types].xml` always comes first, media
    /// is stored, everything else deflated, and entry timestamps are fixed so
    /// the same parts always produce the same bytes.
    pub fn write<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);
        let base = SimpleFileOptions::default().last_modified_time(zip::DateTime::default());
        let deflated = base.compression_method(CompressionMethod::Deflated);
        let stored = base.compression_method(CompressionMethod::Stored);

        let ordered = self
            .parts
            .iter()
            .filter(|p| p.name == CONTENT_TYPES_PART)
            .chain(self.parts.iter().filter(|p| p.name != CONTENT_TYPES_PART));
        for part in ordered {
            let options = if part.name.starts_with(MEDIA_PREFIX) {
                stored
            } else {
                deflated
            };
            zip.start_file(part.name.as_str(), options)?;
            zip.write_all(&part.data)?;
        }
        zip.finish()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.data.as_slice())
    }

    pub fn require_part(&self, name: &str) -> Result<&[u8]> {
        self.part(name)
            .ok_or_else(|| AssemblyError::MissingPart(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|p| p.name == name)
    }

    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|p| p.name == name) {
            Some(part) => part.data = data,
            None => self.parts.push(Part {
                name: name.to_string(),
                data,
            }),
        }
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// True when the container carries embedded media (images, audio, ...).
    pub fn has_media(&self) -> bool {
        self.part_names().any(|name| name.starts_with(MEDIA_PREFIX))
    }

    /// A part name based on `desired` that is not yet taken, e.g.
    /// `word/media/image1.png` becomes `word/media/image1_2.png`.
    pub fn unique_part_name(&self, desired: &str) -> String {
        if !self.contains(desired) {
            return desired.to_string();
        }
        let (stem, ext) = match desired.rfind('.') {
            Some(dot) if dot > desired.rfind('/').map_or(0, |s| s + 1) => {
                (&desired[..dot], &desired[dot..])
            }
            _ => (desired, ""),
        };
        let mut counter = 2usize;
        loop {
            let candidate = format!("{stem}_{counter}{ext}");
            if !self.contains(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Location of the relationships part that belongs to `part_name`.
pub fn rels_part_name(part_name: &str) -> String {
    match part_name.rfind('/') {
        Some(slash) => format!(
            "{}/_rels/{}.rels",
            &part_name[..slash],
            &part_name[slash + 1..]
        ),
        None => format!("_rels/{part_name}.rels"),
    }
}

fn part_dir(part_name: &str) -> &str {
    part_name.rfind('/').map_or("", |slash| &part_name[..slash])
}

/// Resolve a relationship target relative to the part that owns it.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => {
            let dir = part_dir(source_part);
            if dir.is_empty() {
                target.to_string()
            } else {
                format!("{dir}/{target}")
            }
        }
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Target string for `part_name` as seen from `source_part`.
pub fn relative_target(source_part: &str, part_name: &str) -> String {
    let dir = part_dir(source_part);
    if dir.is_empty() {
        return part_name.to_string();
    }
    match part_name.strip_prefix(dir).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) => rest.to_string(),
        None => format!("/{part_name}"),
    }
}

/// `[Content_Types].xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| AssemblyError::xml(CONTENT_TYPES_PART, e))?;
        let mut types = Self::default();
        for node in doc.descendants() {
            match node.tag_name().name() {
                "Default" => {
                    if let (Some(ext), Some(ct)) =
                        (node.attribute("Extension"), node.attribute("ContentType"))
                    {
                        types.defaults.push((ext.to_ascii_lowercase(), ct.to_string()));
                    }
                }
                "Override" => {
                    if let (Some(name), Some(ct)) =
                        (node.attribute("PartName"), node.attribute("ContentType"))
                    {
                        types
                            .overrides
                            .push((name.trim_start_matches('/').to_string(), ct.to_string()));
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    pub fn content_type(&self, part_name: &str) -> Option<&str> {
        if let Some((_, ct)) = self.overrides.iter().find(|(name, _)| name == part_name) {
            return Some(ct);
        }
        let ext = extension(part_name)?.to_ascii_lowercase();
        self.defaults
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, ct)| ct.as_str())
    }

    /// Register `content_type` for `part_name`, preferring an extension
    /// default when the extension is not yet known.
    pub fn ensure(&mut self, part_name: &str, content_type: &str) {
        if self.content_type(part_name) == Some(content_type) {
            return;
        }
        if let Some(ext) = extension(part_name) {
            let ext = ext.to_ascii_lowercase();
            if !self.defaults.iter().any(|(e, _)| *e == ext) {
                self.defaults.push((ext, content_type.to_string()));
                return;
            }
        }
        self.overrides.retain(|(name, _)| name != part_name);
        self.overrides
            .push((part_name.to_string(), content_type.to_string()));
    }

    pub fn to_xml(&self) -> Vec<u8> {
        let mut out = String::from(XML_DECLARATION);
        out.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        for (ext, ct) in &self.defaults {
            out.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_attr(ext),
                escape_attr(ct)
            ));
        }
        for (name, ct) in &self.overrides {
            out.push_str(&format!(
                r#"<Override PartName="/{}" ContentType="{}"/>"#,
                escape_attr(name),
                escape_attr(ct)
            ));
        }
        out.push_str("</Types>");
        out.into_bytes()
    }
}

fn extension(part_name: &str) -> Option<&str> {
    let file = part_name.rsplit('/').next()?;
    file.rfind('.').map(|dot| &file[dot + 1..])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn is_external(&self) -> bool {
        self.target_mode.as_deref() == Some("External")
    }
}

/// Contents of one `.rels` part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    items: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(part: &str, xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| AssemblyError::xml(part, e))?;
        let mut items = Vec::new();
        for node in doc.descendants() {
            if node.tag_name().name() != "Relationship" {
                continue;
            }
            if let (Some(id), Some(rel_type), Some(target)) = (
                node.attribute("Id"),
                node.attribute("Type"),
                node.attribute("Target"),
            ) {
                items.push(Relationship {
                    id: id.to_string(),
                    rel_type: rel_type.to_string(),
                    target: target.to_string(),
                    target_mode: node.attribute("TargetMode").map(str::to_string),
                });
            }
        }
        Ok(Self { items })
    }

    /// Relationships of `part_name`, empty when the part has none.
    pub fn load_for(package: &Package, part_name: &str) -> Result<Self> {
        let rels_name = rels_part_name(part_name);
        match package.part(&rels_name) {
            Some(bytes) => {
                let xml = std::str::from_utf8(bytes).map_err(|e| AssemblyError::xml(&rels_name, e))?;
                Self::parse(&rels_name, xml)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.items.iter()
    }

    pub fn of_type<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.items.iter().filter(move |r| r.rel_type == rel_type)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Next free `rIdN`, one past the highest numeric id in use.
    pub fn next_id(&self) -> String {
        let max = self
            .items
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        let mut next = max + 1;
        loop {
            let candidate = format!("rId{next}");
            if self.get(&candidate).is_none() {
                return candidate;
            }
            next += 1;
        }
    }

    /// Add a relationship and return its new id.
    pub fn add(&mut self, rel_type: &str, target: &str, target_mode: Option<&str>) -> String {
        let id = self.next_id();
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            target_mode: target_mode.map(str::to_string),
        });
        id
    }

    /// Add a relationship keeping its id; an existing entry with that id is
    /// replaced.
    pub fn push(&mut self, rel: Relationship) {
        self.items.retain(|r| r.id != rel.id);
        self.items.push(rel);
    }

    /// Id of an existing relationship with the same type, target and mode.
    pub fn find_equivalent(&self, rel: &Relationship) -> Option<&str> {
        self.items
            .iter()
            .find(|r| {
                r.rel_type == rel.rel_type && r.target == rel.target && r.target_mode == rel.target_mode
            })
            .map(|r| r.id.as_str())
    }

    pub fn to_xml(&self) -> Vec<u8> {
        let mut out = String::from(XML_DECLARATION);
        out.push_str(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for rel in &self.items {
            out.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}""#,
                escape_attr(&rel.id),
                escape_attr(&rel.rel_type),
                escape_attr(&rel.target)
            ));
            if let Some(mode) = &rel.target_mode {
                out.push_str(&format!(r#" TargetMode="{}""#, escape_attr(mode)));
            }
            out.push_str("/>");
        }
        out.push_str("</Relationships>");
        out.into_bytes()
    }
}
