mod common;

use std::fs;

use anyhow::Result;
use docx_assembly_core::paragraph::{paragraph_text, runs};
use docx_assembly_core::run::{is_bold, run_text};
use docx_assembly_core::{
    save_document, AssemblyError, AttachmentOutcome, AttachmentRequest, Composer,
    ComposerOptions, Document, FieldValues, MergeStrategy,
};
use pretty_assertions::assert_eq;
use rstest::*;
use tempfile::TempDir;

use common::{docx, image_paragraph, text_paragraph, write_docx};

const INDENT: &str = "                  ";

fn texts(document: &Document) -> Vec<String> {
    document.paragraphs().map(paragraph_text).collect()
}

fn titles(document: &Document) -> Vec<String> {
    texts(document)
        .into_iter()
        .filter(|t| t.starts_with(INDENT))
        .map(|t| t.trim_start().to_string())
        .collect()
}

#[fixture]
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_docx(
        dir.path(),
        "modelo_base.docx",
        &docx(
            concat!(
                r#"<w:p><w:r><w:t xml:space="preserve">Reclamante: {{NOME_</w:t></w:r>"#,
                r#"<w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve">RECLAMANTE}}, contra {{NOME_RECLAMADA}}.</w:t></w:r></w:p>"#,
            ),
            None,
        ),
    );
    dir
}

#[rstest]
fn test_split_placeholder_is_bold_in_default_font(workspace: TempDir) -> Result<()> {
    let fields = FieldValues::new()
        .with("Nome reclamante", "Maria Silva")
        .with("Nome da reclamada", "ACME Ltda");

    let composition = Composer::default().compose(
        &workspace.path().join("modelo_base.docx"),
        &fields,
        &[],
        6,
    )?;

    assert_eq!(composition.strategy, MergeStrategy::BaseOnly);
    assert_eq!(composition.replacements, 2);
    let paragraph = composition.document.paragraphs().next().unwrap();
    assert_eq!(
        paragraph_text(paragraph),
        "Reclamante: Maria Silva, contra ACME Ltda."
    );

    let name_run = runs(paragraph)
        .find(|r| run_text(r) == "Maria Silva")
        .expect("value run");
    assert!(is_bold(name_run));
    let rpr = name_run.child("w:rPr").unwrap();
    assert_eq!(rpr.child("w:rFonts").unwrap().attr("w:ascii"), Some("Garamond"));
    assert_eq!(rpr.child("w:sz").unwrap().attr("w:val"), Some("24"));

    // the reclamada name is not forced bold
    let company_run = runs(paragraph)
        .find(|r| run_text(r) == "ACME Ltda")
        .expect("company run");
    assert!(!is_bold(company_run));
    Ok(())
}

#[rstest]
fn test_attachments_numbered_in_order_skipping_missing(workspace: TempDir) -> Result<()> {
    let dir = workspace.path();
    let first = write_docx(dir, "Horas extras.docx", &docx(&text_paragraph("first body"), None));
    let second = write_docx(dir, "Danos morais.docx", &docx(&text_paragraph("second body"), None));
    let requests = vec![
        AttachmentRequest::from_path(&first),
        AttachmentRequest::new("Ausente", dir.join("missing.docx")),
        AttachmentRequest::new("Dano{{BARRA}}moral", &second),
    ];

    let composition =
        Composer::default().compose(&dir.join("modelo_base.docx"), &FieldValues::new(), &requests, 6)?;

    assert_eq!(composition.strategy, MergeStrategy::MediaAware);
    assert_eq!(
        titles(&composition.document),
        vec!["VI - Horas extras", "VII - Dano/moral"]
    );
    let outcomes: Vec<_> = composition.attachments.iter().map(|e| (e.ordinal, e.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            (Some(6), AttachmentOutcome::Merged),
            (None, AttachmentOutcome::Missing),
            (Some(7), AttachmentOutcome::Merged),
        ]
    );
    let all = texts(&composition.document);
    let first_at = all.iter().position(|t| t == "first body").unwrap();
    let second_at = all.iter().position(|t| t == "second body").unwrap();
    assert!(first_at < second_at);
    assert!(composition.trailer.is_none());
    Ok(())
}

#[rstest]
fn test_trailer_titles_continue_numbering(workspace: TempDir) -> Result<()> {
    let dir = workspace.path();
    let only = write_docx(dir, "Ferias.docx", &docx(&text_paragraph("ferias"), None));
    write_docx(
        dir,
        "modelo_base_final.docx",
        &docx(
            concat!(
                r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>II - DOS PEDIDOS</w:t></w:r></w:p>"#,
                r#"<w:p><w:r><w:t>Pede deferimento.</w:t></w:r></w:p>"#,
                r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>III - DO VALOR</w:t></w:r></w:p>"#,
                r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>IV - DAS PROVAS</w:t></w:r></w:p>"#,
            ),
            None,
        ),
    );

    let composition = Composer::default().compose(
        &dir.join("modelo_base.docx"),
        &FieldValues::new(),
        &[AttachmentRequest::from_path(&only)],
        6,
    )?;

    assert_eq!(
        titles(&composition.document),
        vec!["VI - Ferias", "VII - DOS PEDIDOS", "VIII - DO VALOR", "IX - DAS PROVAS"]
    );
    let trailer = composition.trailer.expect("trailer entry");
    assert_eq!(trailer.ordinal, Some(7));
    Ok(())
}

#[rstest]
fn test_plain_copy_refuses_to_drop_images(workspace: TempDir) -> Result<()> {
    let dir = workspace.path();
    let pictured = write_docx(dir, "Laudo.docx", &docx(&image_paragraph(1), Some(b"\x89PNG fake")));
    let composer = Composer::new(ComposerOptions {
        media_aware: false,
        ..ComposerOptions::default()
    });

    let err = composer
        .compose(
            &dir.join("modelo_base.docx"),
            &FieldValues::new(),
            &[AttachmentRequest::from_path(&pictured)],
            6,
        )
        .unwrap_err();

    match err {
        AssemblyError::MediaLossRisk { sources } => assert_eq!(sources, vec![pictured]),
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[rstest]
fn test_media_survives_save_and_reopen(workspace: TempDir) -> Result<()> {
    let dir = workspace.path();
    let pictured = write_docx(dir, "Laudo.docx", &docx(&image_paragraph(1), Some(b"\x89PNG fake")));

    let composition = Composer::default().compose(
        &dir.join("modelo_base.docx"),
        &FieldValues::new(),
        &[AttachmentRequest::from_path(&pictured)],
        6,
    )?;
    let out = dir.join("saida").join("peticao.docx");
    save_document(&composition.document, &out)?;

    assert_eq!(fs::read(&out)?, composition.document.to_bytes()?);
    let reopened = Document::open(&out)?;
    assert!(reopened.has_media());
    assert_eq!(titles(&reopened), vec!["VI - Laudo"]);
    Ok(())
}

#[rstest]
fn test_missing_template_fails(workspace: TempDir) {
    let err = Composer::default()
        .compose(&workspace.path().join("nope.docx"), &FieldValues::new(), &[], 6)
        .unwrap_err();
    assert!(matches!(err, AssemblyError::TemplateLoad { .. }));
}
