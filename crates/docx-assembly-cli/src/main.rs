mod config;

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use docx_assembly_core::{
    list_attachments, save_document, AttachmentOutcome, Composer, ComposerOptions, DefaultFont,
    FieldValues, OutcomeEntry,
};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use config::{Command, Config, GenerateArgs};

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(config.log_file.as_deref())?;

    match config.command {
        Command::Generate(args) => generate(args),
        Command::List { dir } => list(&dir),
    }
}

/// Console logging filtered by `RUST_LOG` (default `info`), plus an
/// optional ANSI-free copy appended to `log_file`.
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    if args.attachments.is_empty() && !args.base_only {
        bail!("no attachments given; pass --base-only to save the filled template alone");
    }

    let mut fields = match &args.fields {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading field values from {}", path.display()))?;
            serde_json::from_str::<FieldValues>(&raw)
                .with_context(|| format!("parsing field values in {}", path.display()))?
        }
        None => FieldValues::new(),
    };
    for (label, value) in args.field {
        fields.set(label, Some(value));
    }
    info!("Loaded {} field values", fields.len());

    let composer = Composer::new(ComposerOptions {
        media_aware: !args.plain_copy,
        default_font: DefaultFont {
            name: args.font,
            size_points: args.font_size,
        },
        ..ComposerOptions::default()
    });
    let composition = composer
        .compose(&args.template, &fields, &args.attachments, args.initial_ordinal)
        .with_context(|| format!("assembling {}", args.template.display()))?;

    save_document(&composition.document, &args.output)
        .with_context(|| format!("saving {}", args.output.display()))?;

    println!("{} placeholders replaced", composition.replacements);
    println!("strategy: {:?}", composition.strategy);
    for entry in composition.attachments.iter().chain(composition.trailer.as_ref()) {
        print_outcome(entry);
    }
    println!("saved {}", args.output.display());
    Ok(())
}

fn print_outcome(entry: &OutcomeEntry) {
    let ordinal = entry
        .ordinal
        .and_then(|n| docx_assembly_core::to_roman(n).ok())
        .unwrap_or_else(|| "-".to_string());
    if matches!(entry.outcome, AttachmentOutcome::Missing | AttachmentOutcome::Skipped) {
        warn!("'{}' was not included ({:?})", entry.label, entry.outcome);
    }
    println!(
        "  {:>6}  {:<20} {} ({})",
        ordinal,
        format!("{:?}", entry.outcome),
        entry.label,
        entry.path.display()
    );
}

fn list(dir: &Path) -> anyhow::Result<()> {
    let models =
        list_attachments(dir).with_context(|| format!("listing models in {}", dir.display()))?;
    if models.is_empty() {
        println!("no request models in {}", dir.display());
    }
    for model in models {
        println!("{}\t{}", model.display_label(), model.path.display());
    }
    Ok(())
}
