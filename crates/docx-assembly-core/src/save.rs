//! Durable, atomic save of the final document.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::Builder;
use tracing::{debug, error, info, instrument};

use crate::document::Document;
use crate::error::SaveError;

/// Write `document` to `destination` through a temporary file in the same
/// directory, then atomically replace the destination with it.
///
/// A permission failure on the replace is retried once after removing the
/// existing destination. On every failure the temporary file is removed
/// and the destination keeps its previous content.
#[instrument(skip_all, fields(destination = %destination.display()))]
pub fn save_document(document: &Document, destination: &Path) -> Result<(), SaveError> {
    if destination.as_os_str().is_empty() {
        error!("Empty destination path");
        return Err(SaveError::EmptyDestination);
    }
    info!("Saving document to {}", destination.display());

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        fs::create_dir_all(dir).map_err(|source| SaveError::CreateDir {
            dir: dir.to_path_buf(),
            source,
        })?;
    }

    let bytes = document.to_bytes()?;

    let temp_write = |source: std::io::Error| SaveError::TempWrite {
        dir: dir.to_path_buf(),
        source,
    };
    let mut temp = Builder::new()
        .prefix(".docx-assembly-")
        .suffix(".docx")
        .tempfile_in(dir)
        .map_err(temp_write)?;
    temp.write_all(&bytes).map_err(temp_write)?;
    temp.as_file().sync_all().map_err(temp_write)?;
    debug!("Wrote {} bytes to {}", bytes.len(), temp.path().display());

    match temp.persist(destination) {
        Ok(_) => {}
        Err(failed) if failed.error.kind() == ErrorKind::PermissionDenied => {
            debug!("Replace denied, removing {} and retrying", destination.display());
            if destination.exists() {
                if let Err(source) = fs::remove_file(destination) {
                    error!("Permission denied replacing {}: {}", destination.display(), source);
                    return Err(SaveError::PermissionDenied {
                        dest: destination.to_path_buf(),
                        source,
                    });
                }
            }
            failed.file.persist(destination).map_err(|e| {
                error!("Permission denied replacing {}: {}", destination.display(), e.error);
                SaveError::PermissionDenied {
                    dest: destination.to_path_buf(),
                    source: e.error,
                }
            })?;
        }
        Err(failed) => {
            error!("Could not replace {}: {}", destination.display(), failed.error);
            return Err(SaveError::Replace {
                dest: destination.to_path_buf(),
                source: failed.error,
            });
        }
    }

    info!("Saved {}", destination.display());
    Ok(())
}
