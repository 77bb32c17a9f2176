//! Error types for document assembly.

use std::path::PathBuf;

/// Errors raised while loading, rewriting or composing documents.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("Failed to load template {}: {reason}", .path.display())]
    TemplateLoad { path: PathBuf, reason: String },

    #[error("Invalid document package: {0}")]
    Package(String),

    #[error("Missing package part: {0}")]
    MissingPart(String),

    #[error("XML error in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Some request models contain images or other embedded media ({}). \
         Plain-copy merging would drop them; enable media-aware merging to preserve images.",
        format_paths(.sources)
    )]
    MediaLossRisk { sources: Vec<PathBuf> },

    #[error("Ordinal {0} cannot be written as a Roman numeral (supported range is 1-3999)")]
    OrdinalOutOfRange(u32),

    #[error("Relationship {id} referenced by {part} is not defined")]
    UnresolvedRelationship { part: String, id: String },

    #[error("Merge failed: {0}")]
    Merge(String),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl AssemblyError {
    pub(crate) fn xml(part: &str, message: impl std::fmt::Display) -> Self {
        Self::Xml {
            part: part.to_string(),
            message: message.to_string(),
        }
    }
}

/// Errors raised by the durable save step. Every variant leaves the
/// destination either untouched or fully written.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Destination path is empty")]
    EmptyDestination,

    #[error("Could not create directory {}: {source}", .dir.display())]
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not write temporary file in {}: {source}", .dir.display())]
    TempWrite {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not serialize document: {0}")]
    Serialize(#[from] AssemblyError),

    #[error("Permission denied replacing {}: {source}", .dest.display())]
    PermissionDenied {
        dest: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not move temporary file to {}: {source}", .dest.display())]
    Replace {
        dest: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
