//! Attachment requests and the on-disk catalogue of request models.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::placeholders::replace_separator_token;

/// One user-selected attachment: its title label and source container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRequest {
    pub label: String,
    pub path: PathBuf,
}

impl AttachmentRequest {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }

    /// Label derived from the file stem, `{{BARRA}}` kept verbatim.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { label, path }
    }

    /// Label as shown to the operator.
    pub fn display_label(&self) -> String {
        replace_separator_token(&self.label)
    }

    /// Usable when the path is non-empty and names an existing file.
    pub fn is_available(&self) -> bool {
        !self.path.as_os_str().is_empty() && self.path.is_file()
    }
}

/// Every `.docx` file in `dir`, sorted by file name. Lock files left by
/// Word (`~$name.docx`) are skipped.
pub fn list_attachments(dir: &Path) -> Result<Vec<AttachmentRequest>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_docx = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"));
        let is_lock = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("~$"));
        if is_docx && !is_lock {
            found.push(AttachmentRequest::from_path(path));
        }
    }
    found.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    debug!("Found {} request models in {}", found.len(), dir.display());
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_list_attachments_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["b.docx", "A{{BARRA}}B.DOCX", "notes.txt", "~$b.docx"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.docx")).unwrap();

        let found = list_attachments(dir.path()).unwrap();
        let labels: Vec<&str> = found.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["A{{BARRA}}B", "b"]);
        assert_eq!(found[0].display_label(), "A/B");
        assert!(found.iter().all(AttachmentRequest::is_available));
    }

    #[test]
    fn test_missing_path_is_unavailable() {
        assert!(!AttachmentRequest::new("x", "").is_available());
        assert!(!AttachmentRequest::new("x", "/definitely/not/here.docx").is_available());
    }
}
