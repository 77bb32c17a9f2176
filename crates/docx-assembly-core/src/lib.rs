//! Legal document assembly over WordprocessingML (`.docx`) containers.
//!
//! The pipeline fills `{{TOKEN}}` placeholders in a base template without
//! disturbing character formatting, appends user-ordered attachments each
//! preceded by a Roman-numbered title, appends an optional trailer whose
//! titles continue the numbering, and saves the result atomically.
//!
//! ```no_run
//! use std::path::Path;
//! use docx_assembly_core::{save_document, AttachmentRequest, Composer, FieldValues};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fields = FieldValues::new().with("Nome reclamante", "Maria Silva");
//! let attachments = vec![AttachmentRequest::from_path("modelos/Horas extras.docx")];
//! let composition = Composer::default().compose(
//!     Path::new("templates/modelo_base.docx"),
//!     &fields,
//!     &attachments,
//!     6,
//! )?;
//! save_document(&composition.document, Path::new("out/peticao.docx"))?;
//! # Ok(())
//! # }
//! ```

pub mod attachments;
pub mod compose;
pub mod document;
pub mod error;
pub mod merge;
pub mod package;
pub mod paragraph;
pub mod placeholders;
pub mod roman;
pub mod run;
pub mod save;
pub mod spans;
pub mod titles;
pub mod xml;

pub use attachments::{list_attachments, AttachmentRequest};
pub use compose::{
    AttachmentOutcome, Composer, ComposerOptions, Composition, MergeStrategy, OutcomeEntry,
    DEFAULT_INITIAL_ORDINAL, TRAILER_FILE_NAME,
};
pub use document::Document;
pub use error::{AssemblyError, Result, SaveError};
pub use merge::{append_document, MergeReport};
pub use placeholders::{substitute_document, FieldValues, Placeholder, PLACEHOLDERS};
pub use roman::{from_roman, to_roman};
pub use run::{copy_run_format, DefaultFont, FormatCopyReport, RunFormat};
pub use save::save_document;
pub use spans::{replace_in_paragraph, Substitution};
pub use titles::apply_sequential_titles;

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory `.docx` fixtures.

    use crate::package::{
        Package, REL_FOOTER, REL_HEADER, REL_HYPERLINK, REL_NUMBERING, REL_STYLES,
    };

    const NAMESPACES: &str = concat!(
        r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
        r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
        r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
        r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
        r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#,
    );

    #[derive(Default)]
    pub struct DocxFixture {
        body: String,
        raw_document: Option<String>,
        styles: Vec<String>,
        numbering: Option<String>,
        headers: Vec<(String, String)>,
        footers: Vec<(String, String)>,
        relationships: Vec<(String, String, String, bool)>,
        media: Vec<(String, Vec<u8>)>,
        parts: Vec<(String, Vec<u8>)>,
    }

    impl DocxFixture {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn body(mut self, xml: &str) -> Self {
            self.body = xml.to_string();
            self
        }

        pub fn raw_document(mut self, xml: &str) -> Self {
            self.raw_document = Some(xml.to_string());
            self
        }

        pub fn style(mut self, kind: &str, id: &str, name: &str) -> Self {
            self.styles.push(format!(
                r#"<w:style w:type="{kind}" w:styleId="{id}"><w:name w:val="{name}"/></w:style>"#
            ));
            self
        }

        pub fn style_based_on(mut self, kind: &str, id: &str, name: &str, base: &str) -> Self {
            self.styles.push(format!(
                r#"<w:style w:type="{kind}" w:styleId="{id}"><w:name w:val="{name}"/><w:basedOn w:val="{base}"/></w:style>"#
            ));
            self
        }

        pub fn numbering(mut self, inner_xml: &str) -> Self {
            self.numbering = Some(inner_xml.to_string());
            self
        }

        pub fn header(mut self, file_name: &str, body: &str) -> Self {
            self.headers.push((file_name.to_string(), body.to_string()));
            self
        }

        pub fn footer(mut self, file_name: &str, body: &str) -> Self {
            self.footers.push((file_name.to_string(), body.to_string()));
            self
        }

        pub fn relationship(mut self, id: &str, rel_type: &str, target: &str) -> Self {
            self.relationships
                .push((id.to_string(), rel_type.to_string(), target.to_string(), false));
            self
        }

        pub fn external_link(mut self, id: &str, url: &str) -> Self {
            self.relationships
                .push((id.to_string(), REL_HYPERLINK.to_string(), url.to_string(), true));
            self
        }

        /// Adds `word/media/<file_name>`; reference it with `relationship`.
        pub fn image(mut self, file_name: &str, bytes: &[u8]) -> Self {
            self.media.push((file_name.to_string(), bytes.to_vec()));
            self
        }

        pub fn part(mut self, name: &str, bytes: &[u8]) -> Self {
            self.parts.push((name.to_string(), bytes.to_vec()));
            self
        }

        pub fn build(self) -> Vec<u8> {
            let mut package = Package::new();
            let mut overrides = vec![(
                "word/document.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
            )];
            let mut rels = self.relationships.clone();

            if !self.styles.is_empty() {
                package.set_part(
                    "word/styles.xml",
                    format!(r#"<w:styles {NAMESPACES}>{}</w:styles>"#, self.styles.concat()).into_bytes(),
                );
                overrides.push((
                    "word/styles.xml".to_string(),
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml",
                ));
                rels.push(("rIdStyles".into(), REL_STYLES.into(), "styles.xml".into(), false));
            }
            if let Some(numbering) = &self.numbering {
                package.set_part(
                    "word/numbering.xml",
                    format!(r#"<w:numbering {NAMESPACES}>{numbering}</w:numbering>"#).into_bytes(),
                );
                overrides.push((
                    "word/numbering.xml".to_string(),
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml",
                ));
                rels.push(("rIdNumbering".into(), REL_NUMBERING.into(), "numbering.xml".into(), false));
            }
            for (i, (name, body)) in self.headers.iter().enumerate() {
                package.set_part(
                    &format!("word/{name}"),
                    format!(r#"<w:hdr {NAMESPACES}>{body}</w:hdr>"#).into_bytes(),
                );
                overrides.push((
                    format!("word/{name}"),
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml",
                ));
                rels.push((format!("rIdHeader{i}"), REL_HEADER.into(), name.clone(), false));
            }
            for (i, (name, body)) in self.footers.iter().enumerate() {
                package.set_part(
                    &format!("word/{name}"),
                    format!(r#"<w:ftr {NAMESPACES}>{body}</w:ftr>"#).into_bytes(),
                );
                overrides.push((
                    format!("word/{name}"),
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml",
                ));
                rels.push((format!("rIdFooter{i}"), REL_FOOTER.into(), name.clone(), false));
            }
            for (name, bytes) in &self.media {
                package.set_part(&format!("word/media/{name}"), bytes.clone());
            }
            for (name, bytes) in &self.parts {
                package.set_part(name, bytes.clone());
            }

            let document = self.raw_document.clone().unwrap_or_else(|| {
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {NAMESPACES}><w:body>{}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#,
                    self.body
                )
            });
            package.set_part("word/document.xml", document.into_bytes());

            let mut rels_xml = String::from(
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            );
            for (id, rel_type, target, external) in &rels {
                let mode = if *external { r#" TargetMode="External""# } else { "" };
                rels_xml.push_str(&format!(
                    r#"<Relationship Id="{id}" Type="{rel_type}" Target="{target}"{mode}/>"#
                ));
            }
            rels_xml.push_str("</Relationships>");
            package.set_part("word/_rels/document.xml.rels", rels_xml.into_bytes());

            package.set_part(
                "_rels/.rels",
                br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#.to_vec(),
            );

            let mut types = String::from(
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Default Extension="bin" ContentType="application/octet-stream"/>"#,
            );
            for (name, content_type) in &overrides {
                types.push_str(&format!(
                    r#"<Override PartName="/{name}" ContentType="{content_type}"/>"#
                ));
            }
            types.push_str("</Types>");
            package.set_part("[Content_Types].xml", types.into_bytes());

            match package.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => panic!("fixture package failed to serialize: {e}"),
            }
        }
    }

    /// A document whose body is `body_xml`.
    pub fn docx_bytes(body_xml: &str) -> Vec<u8> {
        DocxFixture::new().body(body_xml).build()
    }

    /// A paragraph with one inline picture referencing `rel_id`.
    pub fn drawing_paragraph(rel_id: &str, drawing_id: u32) -> String {
        format!(
            r#"<w:p><w:r><w:drawing><wp:inline><wp:extent cx="914400" cy="914400"/><wp:docPr id="{drawing_id}" name="Picture {drawing_id}"/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic><pic:blipFill><a:blip r:embed="{rel_id}"/></pic:blipFill></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        )
    }
}
