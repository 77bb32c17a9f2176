//! Assembly of the final document: substituted base template, numbered
//! attachments and the renumbered trailer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::attachments::AttachmentRequest;
use crate::document::Document;
use crate::error::{AssemblyError, Result};
use crate::merge::{append_document, copy_external_references};
use crate::package::Package;
use crate::paragraph::{new_paragraph, paragraph_with_text, runs, set_style_id, style_id};
use crate::placeholders::{substitute_document, FieldValues};
use crate::roman::to_roman;
use crate::run::{build_run, copy_run_format, run_text, DefaultFont};
use crate::titles::{apply_sequential_titles, title_paragraph};
use crate::xml::{XmlElement, XmlNode};

pub const DEFAULT_INITIAL_ORDINAL: u32 = 6;
pub const TRAILER_FILE_NAME: &str = "modelo_base_final.docx";
pub const TRAILER_TITLE_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposerOptions {
    /// Prefer the relationship-preserving merge.
    pub media_aware: bool,
    /// Trailer looked up next to the base template.
    pub trailer_file_name: String,
    pub trailer_title_count: usize,
    pub default_font: DefaultFont,
}

impl Default for ComposerOptions {
    fn default() -> Self {
        Self {
            media_aware: true,
            trailer_file_name: TRAILER_FILE_NAME.to_string(),
            trailer_title_count: TRAILER_TITLE_COUNT,
            default_font: DefaultFont::default(),
        }
    }
}

/// How the attachments ended up in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStrategy {
    /// No usable attachment; the result is the substituted base.
    BaseOnly,
    MediaAware,
    PlainCopy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentOutcome {
    /// Path empty or not an existing file; excluded from numbering.
    Missing,
    Merged,
    CopiedStructurally,
    CopiedAsText,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEntry {
    pub label: String,
    pub path: PathBuf,
    /// First ordinal used by this fragment, `None` when it was excluded.
    pub ordinal: Option<u32>,
    pub outcome: AttachmentOutcome,
}

#[derive(Debug, Clone)]
pub struct Composition {
    pub document: Document,
    pub strategy: MergeStrategy,
    pub replacements: usize,
    /// One entry per requested attachment, in request order.
    pub attachments: Vec<OutcomeEntry>,
    /// `None` when no trailer file exists.
    pub trailer: Option<OutcomeEntry>,
}

/// A valid attachment with its position in the request list.
struct Numbered<'a> {
    index: usize,
    ordinal: u32,
    request: &'a AttachmentRequest,
}

struct Assembled {
    document: Document,
    outcomes: Vec<(usize, AttachmentOutcome)>,
    trailer: Option<AttachmentOutcome>,
}

#[derive(Debug, Clone, Default)]
pub struct Composer {
    options: ComposerOptions,
}

impl Composer {
    pub fn new(options: ComposerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ComposerOptions {
        &self.options
    }

    /// Build the composite document.
    ///
    /// Fails when the base template cannot be loaded, when the plain-copy
    /// path would drop embedded media, and on an ordinal outside the Roman
    /// numeral range. Missing attachments are excluded and reported.
    #[instrument(skip_all, fields(template = %template.display(), attachments = attachments.len()))]
    pub fn compose(
        &self,
        template: &Path,
        fields: &FieldValues,
        attachments: &[AttachmentRequest],
        initial_ordinal: u32,
    ) -> Result<Composition> {
        info!("Opening base template");
        let mut base = Document::open(template).map_err(|e| {
            error!("Failed to load template {}: {}", template.display(), e);
            AssemblyError::TemplateLoad {
                path: template.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        let font = &self.options.default_font;
        let replacements = substitute_document(&mut base, &fields.substitutions(), font);
        info!("Substituted {} placeholders", replacements);

        let mut entries: Vec<OutcomeEntry> = attachments
            .iter()
            .map(|request| OutcomeEntry {
                label: request.label.clone(),
                path: request.path.clone(),
                ordinal: None,
                outcome: AttachmentOutcome::Missing,
            })
            .collect();
        let mut valid = Vec::new();
        for (index, request) in attachments.iter().enumerate() {
            if request.is_available() {
                let ordinal = ordinal_after(initial_ordinal, valid.len())?;
                entries[index].ordinal = Some(ordinal);
                valid.push(Numbered {
                    index,
                    ordinal,
                    request,
                });
            } else {
                warn!(
                    "Skipping attachment '{}': {} not found",
                    request.label,
                    request.path.display()
                );
            }
        }

        if valid.is_empty() {
            info!("No attachments to add, returning the base document");
            return Ok(Composition {
                document: base,
                strategy: MergeStrategy::BaseOnly,
                replacements,
                attachments: entries,
                trailer: None,
            });
        }

        let trailer_path = template
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.options.trailer_file_name);
        let trailer = trailer_path.is_file().then_some(trailer_path.as_path());
        let trailer_ordinal = ordinal_after(initial_ordinal, valid.len())?;
        let title_count = match trailer {
            Some(_) => valid.len() + self.options.trailer_title_count,
            None => valid.len(),
        };
        check_title_range(initial_ordinal, title_count)?;
        match trailer {
            Some(path) => debug!("Trailer {} starts at ordinal {}", path.display(), trailer_ordinal),
            None => debug!("No trailer at {}", trailer_path.display()),
        }

        let mut strategy = MergeStrategy::PlainCopy;
        let mut assembled = None;
        if self.options.media_aware {
            match self.assemble_media_aware(&base, &valid, trailer, trailer_ordinal) {
                Ok(result) => {
                    strategy = MergeStrategy::MediaAware;
                    assembled = Some(result);
                }
                Err(e) => warn!("Media-aware merge failed, falling back to plain copy: {}", e),
            }
        }
        let assembled = match assembled {
            Some(result) => result,
            None => self.assemble_plain(base, &valid, trailer, trailer_ordinal)?,
        };

        for (index, outcome) in assembled.outcomes {
            entries[index].outcome = outcome;
        }
        let trailer = trailer.zip(assembled.trailer).map(|(path, outcome)| OutcomeEntry {
            label: self.options.trailer_file_name.clone(),
            path: path.to_path_buf(),
            ordinal: Some(trailer_ordinal),
            outcome,
        });
        info!("Composition finished using {:?}", strategy);
        Ok(Composition {
            document: assembled.document,
            strategy,
            replacements,
            attachments: entries,
            trailer,
        })
    }

    /// All-or-nothing: works on a clone of `base` and fails on the first
    /// step that goes wrong.
    fn assemble_media_aware(
        &self,
        base: &Document,
        valid: &[Numbered<'_>],
        trailer: Option<&Path>,
        trailer_ordinal: u32,
    ) -> Result<Assembled> {
        let font = &self.options.default_font;
        let mut document = base.clone();
        let mut outcomes = Vec::with_capacity(valid.len());

        for item in valid {
            document.append_block(title_paragraph(item.ordinal, &item.request.label, font)?);
            let source = Document::open(&item.request.path)?;
            let report = append_document(&mut document, &source)?;
            debug!(
                "Merged '{}' ({} blocks, {} parts)",
                item.request.label, report.blocks, report.parts
            );
            outcomes.push((item.index, AttachmentOutcome::Merged));
        }

        let mut trailer_outcome = None;
        if let Some(path) = trailer {
            let mut source = Document::open(path)?;
            apply_sequential_titles(
                &mut source,
                trailer_ordinal,
                self.options.trailer_title_count,
                font,
            )?;
            append_document(&mut document, &source)?;
            trailer_outcome = Some(AttachmentOutcome::Merged);
        }

        Ok(Assembled {
            document: round_trip(&document)?,
            outcomes,
            trailer: trailer_outcome,
        })
    }

    fn assemble_plain(
        &self,
        base: Document,
        valid: &[Numbered<'_>],
        trailer: Option<&Path>,
        trailer_ordinal: u32,
    ) -> Result<Assembled> {
        let mut with_media: Vec<PathBuf> = valid
            .iter()
            .map(|item| item.request.path.as_path())
            .chain(trailer)
            .filter(|path| container_has_media(path))
            .map(Path::to_path_buf)
            .collect();
        with_media.dedup();
        if !with_media.is_empty() {
            let err = AssemblyError::MediaLossRisk { sources: with_media };
            error!("{}", err);
            return Err(err);
        }

        let font = &self.options.default_font;
        let mut document = base;
        let mut outcomes = Vec::with_capacity(valid.len());
        for item in valid {
            document.append_block(title_paragraph(item.ordinal, &item.request.label, font)?);
            let outcome = match Document::open(&item.request.path) {
                Ok(source) => copy_with_fallback(&mut document, &source, &item.request.label),
                Err(e) => {
                    warn!("Skipping attachment '{}': {}", item.request.label, e);
                    AttachmentOutcome::Skipped
                }
            };
            document.append_block(paragraph_with_text(""));
            outcomes.push((item.index, outcome));
        }

        let mut trailer_outcome = None;
        if let Some(path) = trailer {
            let outcome = match Document::open(path) {
                Ok(mut source) => {
                    apply_sequential_titles(
                        &mut source,
                        trailer_ordinal,
                        self.options.trailer_title_count,
                        font,
                    )?;
                    let outcome =
                        copy_with_fallback(&mut document, &source, &self.options.trailer_file_name);
                    document.append_block(paragraph_with_text(""));
                    outcome
                }
                Err(e) => {
                    warn!("Skipping trailer {}: {}", path.display(), e);
                    AttachmentOutcome::Skipped
                }
            };
            trailer_outcome = Some(outcome);
        }

        Ok(Assembled {
            document,
            outcomes,
            trailer: trailer_outcome,
        })
    }
}

/// Structural copy, then run-level text copy, then skip.
fn copy_with_fallback(destination: &mut Document, source: &Document, label: &str) -> AttachmentOutcome {
    match copy_structural(destination, source) {
        Ok(blocks) => {
            debug!("Copied {} blocks from '{}'", blocks, label);
            return AttachmentOutcome::CopiedStructurally;
        }
        Err(e) => warn!("Structural copy of '{}' failed, copying text only: {}", label, e),
    }
    match copy_as_text(destination, source) {
        Ok(paragraphs) => {
            debug!("Copied {} paragraphs of text from '{}'", paragraphs, label);
            AttachmentOutcome::CopiedAsText
        }
        Err(e) => {
            warn!("Text copy of '{}' failed, skipping it: {}", label, e);
            AttachmentOutcome::Skipped
        }
    }
}

/// `first + offset`, failing instead of wrapping around.
fn ordinal_after(first: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|n| first.checked_add(n))
        .ok_or(AssemblyError::OrdinalOutOfRange(u32::MAX))
}

/// Every one of `count` titles numbered from `first` must have a Roman
/// numeral; checked before anything is assembled.
fn check_title_range(first: u32, count: usize) -> Result<()> {
    to_roman(first)?;
    if count > 1 {
        to_roman(ordinal_after(first, count - 1)?)?;
    }
    Ok(())
}

/// Deep-copy every top-level block; only external relationships travel.
fn copy_structural(destination: &mut Document, source: &Document) -> Result<usize> {
    let mut blocks: Vec<XmlElement> = source.body_blocks().cloned().collect();
    copy_external_references(destination, source, &mut blocks)?;
    let count = blocks.len();
    destination.append_blocks(blocks);
    Ok(count)
}

/// Rebuild each top-level paragraph from its runs' text and character
/// formatting. Tables and drawings are lost.
fn copy_as_text(destination: &mut Document, source: &Document) -> Result<usize> {
    let mut paragraphs = Vec::new();
    for paragraph in source.paragraphs() {
        let mut copy = new_paragraph();
        if let Some(style) = style_id(paragraph).filter(|id| destination.has_style(id)) {
            set_style_id(&mut copy, style);
        }
        for run in runs(paragraph) {
            let text = run_text(run);
            if text.is_empty() {
                continue;
            }
            let mut new_run = build_run(None, &text);
            let report = copy_run_format(run, &mut new_run);
            if report.copied_count() > 0 {
                debug!("Copied {} format attributes", report.copied_count());
            }
            copy.children.push(XmlNode::Element(new_run));
        }
        paragraphs.push(copy);
    }
    if paragraphs.is_empty() && source.body_blocks().next().is_some() {
        return Err(AssemblyError::Merge(
            "source has content but no top-level paragraphs".to_string(),
        ));
    }
    let count = paragraphs.len();
    destination.append_blocks(paragraphs);
    Ok(count)
}

/// An unreadable container counts as having no media; it will be skipped
/// later anyway.
fn container_has_media(path: &Path) -> bool {
    match Package::open(path) {
        Ok(package) => package.has_media(),
        Err(e) => {
            debug!("Could not inspect {} for media: {}", path.display(), e);
            false
        }
    }
}

/// Write the document to a temporary file and load it back, so the result
/// is exactly what a reader of the saved file will see. The temporary file
/// is removed on every path.
fn round_trip(document: &Document) -> Result<Document> {
    let temp = tempfile::Builder::new()
        .prefix("docx-assembly-")
        .suffix(".docx")
        .tempfile()?;
    document.save_to(temp.path())?;
    Document::open(temp.path())
}
