use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use docx_assembly_core::{AttachmentRequest, DEFAULT_INITIAL_ORDINAL};

/// Configuration for the docx-assembly command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "docx-assembly")]
#[command(about = "Fill a petition template and append numbered request models")]
pub struct Config {
    /// Also append logs (without colors) to this file
    #[arg(long, global = true, env = "DOCX_ASSEMBLY_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build the final petition
    Generate(GenerateArgs),
    /// List the request models available in a directory
    List {
        /// Directory holding the request model documents
        #[arg(env = "DOCX_ASSEMBLY_MODELS_DIR")]
        dir: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Base template with {{TOKEN}} placeholders
    #[arg(long, env = "DOCX_ASSEMBLY_TEMPLATE")]
    pub template: PathBuf,

    /// JSON object mapping field labels to values (or null)
    #[arg(long)]
    pub fields: Option<PathBuf>,

    /// Field value as LABEL=VALUE, applied after --fields
    #[arg(long = "field", value_parser = parse_field)]
    pub field: Vec<(String, String)>,

    /// Attachment as [LABEL=]PATH; the label defaults to the file name
    #[arg(long = "attachment", value_parser = parse_attachment)]
    pub attachments: Vec<AttachmentRequest>,

    /// Destination of the assembled document
    #[arg(long, short)]
    pub output: PathBuf,

    /// Ordinal of the first attachment title
    #[arg(long, default_value_t = DEFAULT_INITIAL_ORDINAL)]
    pub initial_ordinal: u32,

    /// Skip the media-aware merge and copy attachment content directly
    #[arg(long)]
    pub plain_copy: bool,

    /// Confirm saving the filled template when no attachment is given
    #[arg(long)]
    pub base_only: bool,

    /// Font for generated text without explicit formatting
    #[arg(long, default_value = "Garamond", env = "DOCX_ASSEMBLY_FONT")]
    pub font: String,

    /// Size in points for generated text without explicit formatting
    #[arg(long, default_value_t = 12)]
    pub font_size: u32,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((label, value)) if !label.trim().is_empty() => {
            Ok((label.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected LABEL=VALUE, got '{raw}'")),
    }
}

/// An existing file path wins over a `LABEL=PATH` reading of the argument.
fn parse_attachment(raw: &str) -> Result<AttachmentRequest, String> {
    if raw.is_empty() {
        return Err("attachment path is empty".to_string());
    }
    if Path::new(raw).is_file() {
        return Ok(AttachmentRequest::from_path(raw));
    }
    match raw.split_once('=') {
        Some((label, path)) if !label.is_empty() && !path.is_empty() => {
            Ok(AttachmentRequest::new(label, path))
        }
        _ => Ok(AttachmentRequest::from_path(raw)),
    }
}
