//! The fixed placeholder table and document-wide substitution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, W_SECT_PR};
use crate::paragraph::W_P;
use crate::run::DefaultFont;
use crate::spans::{replace_in_paragraph, Substitution};
use crate::xml::XmlElement;

/// Display-only token rendered as `/` in titles and labels.
pub const SEPARATOR_TOKEN: &str = "{{BARRA}}";
pub const SEPARATOR_DISPLAY: &str = "/";

/// A token bound to the field label whose value replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub token: &'static str,
    pub label: &'static str,
    pub force_bold: bool,
}

const fn placeholder(token: &'static str, label: &'static str, force_bold: bool) -> Placeholder {
    Placeholder {
        token,
        label,
        force_bold,
    }
}

/// Known placeholders, in matching order.
pub const PLACEHOLDERS: &[Placeholder] = &[
    placeholder("{{NOME_RECLAMANTE}}", "Nome reclamante", true),
    placeholder("{{PROFISSAO_RECLAMANTE}}", "Profissao / Cargo", true),
    placeholder("{{DATA_NASCIMENTO_RECLAMANTE}}", "Data de nascimento", false),
    placeholder("{{NOME_MAE_RECLAMANTE}}", "Nome da mae", true),
    placeholder("{{NUMERO_PIS_RECLAMANTE}}", "Número do pis", false),
    placeholder("{{NUMERO_CTPS_RECLAMANTE}}", "Número da ctps", false),
    placeholder("{{NUMERO_RG_RECLAMANTE}}", "Número rg", false),
    placeholder("{{NUMERO_CPF_RECLAMANTE}}", "Número do cpf", false),
    placeholder("{{RUA_DO_RECLAMANTE}}", "Rua do reclamante", false),
    placeholder(
        "{{NUMERO_CASA_RECLAMANTE_E_COMPLEMENTO}}",
        "Número da casa do reclamante e complemento",
        false,
    ),
    placeholder("{{BAIRRO_RECLAMANTE}}", "Bairro reclamante", false),
    placeholder("{{CEP_RECLAMANTE}}", "Cep reclamante", false),
    placeholder("{{NOME_RECLAMADA}}", "Nome da reclamada", false),
    placeholder("{{EMPRESA_PROCESSADA}}", "Empresa processada", false),
    placeholder("{{NUMERO_CNPJ_RECLAMADA}}", "Numero de cnpj da reclamada", false),
    placeholder("{{ENDERECO_RECLAMADA}}", "Endereço reclamada", false),
    placeholder("{{COMPLEMENTO_RECLAMADA}}", "Complemento reclamada", false),
    placeholder("{{BAIRRO_RECLAMADA}}", "Bairro reclamada", false),
    placeholder("{{CEP_RECLAMADA}}", "Cep reclamada", false),
];

pub fn replace_separator_token(text: &str) -> String {
    text.replace(SEPARATOR_TOKEN, SEPARATOR_DISPLAY)
}

/// Field values keyed by label. A missing label or a `null` value stands for
/// the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValues(HashMap<String, Option<String>>);

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, label: impl Into<String>, value: Option<String>) {
        self.0.insert(label.into(), value);
    }

    pub fn with(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(label, Some(value.into()));
        self
    }

    pub fn get(&self, label: &str) -> &str {
        self.0.get(label).and_then(|v| v.as_deref()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substitutions for every known placeholder, in matching order.
    pub fn substitutions(&self) -> Vec<Substitution> {
        PLACEHOLDERS
            .iter()
            .map(|p| Substitution {
                token: p.token.to_string(),
                value: self.get(p.label).to_string(),
                force_bold: p.force_bold,
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

/// Apply `substitutions` to every paragraph of the document: the body,
/// tables at any depth, content controls, then header and footer parts in
/// part-name order. Returns the number of replacements.
pub fn substitute_document(
    document: &mut Document,
    substitutions: &[Substitution],
    font: &DefaultFont,
) -> usize {
    let mut total = substitute_blocks(document.body_mut(), substitutions, font);
    for story in document.stories_mut() {
        let count = substitute_blocks(&mut story.xml.root, substitutions, font);
        if count > 0 {
            debug!("Replaced {} tokens in {}", count, story.xml.name);
        }
        total += count;
    }
    total
}

/// Recurse through block containers; paragraphs are the leaves.
fn substitute_blocks(
    container: &mut XmlElement,
    substitutions: &[Substitution],
    font: &DefaultFont,
) -> usize {
    let mut total = 0;
    for child in container.elements_mut() {
        if child.is(W_P) {
            total += replace_in_paragraph(child, substitutions, font);
        } else if !child.is(W_SECT_PR) {
            total += substitute_blocks(child, substitutions, font);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paragraph::paragraph_text;
    use crate::run::is_bold;
    use crate::test_support::DocxFixture;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_has_nineteen_unique_tokens() {
        assert_eq!(PLACEHOLDERS.len(), 19);
        let mut tokens: Vec<&str> = PLACEHOLDERS.iter().map(|p| p.token).collect();
        tokens.sort_unstable();
        tokens.dedup();
        assert_eq!(tokens.len(), 19);
        let bold: Vec<&str> = PLACEHOLDERS
            .iter()
            .filter(|p| p.force_bold)
            .map(|p| p.token)
            .collect();
        assert_eq!(
            bold,
            vec!["{{NOME_RECLAMANTE}}", "{{PROFISSAO_RECLAMANTE}}", "{{NOME_MAE_RECLAMANTE}}"]
        );
    }

    #[test]
    fn test_missing_and_null_values_are_empty() {
        let mut fields = FieldValues::new().with("Cep reclamante", "01000-000");
        fields.set("Bairro reclamante", None);
        assert_eq!(fields.get("Cep reclamante"), "01000-000");
        assert_eq!(fields.get("Bairro reclamante"), "");
        assert_eq!(fields.get("Nome reclamante"), "");
    }

    #[test]
    fn test_fields_deserialize_from_json() {
        let fields: FieldValues =
            serde_json::from_str(r#"{"Nome reclamante": "Maria", "Nome da mae": null}"#).unwrap();
        assert_eq!(fields.get("Nome reclamante"), "Maria");
        assert_eq!(fields.get("Nome da mae"), "");
    }

    #[test]
    fn test_separator_token() {
        assert_eq!(replace_separator_token("Horas extras {{BARRA}} adicional"), "Horas extras / adicional");
    }

    #[test]
    fn test_substitution_reaches_nested_tables_and_headers() {
        let bytes = DocxFixture::new()
            .body(
                r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{{CEP_RECLAMANTE}}</w:t></w:r></w:p>
                <w:tbl><w:tr><w:tc><w:p><w:r><w:t>{{NOME_RECLAMANTE}}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
                </w:tc></w:tr></w:tbl><w:p><w:r><w:t>{{UNKNOWN}}</w:t></w:r></w:p>"#,
            )
            .header("header1.xml", r#"<w:p><w:r><w:t>{{NOME_RECLAMADA}}</w:t></w:r></w:p>"#)
            .build();
        let mut doc = Document::from_bytes(&bytes).unwrap();
        let fields = FieldValues::new()
            .with("Cep reclamante", "12345")
            .with("Nome reclamante", "Maria")
            .with("Nome da reclamada", "ACME");

        let count = substitute_document(&mut doc, &fields.substitutions(), &DefaultFont::default());
        assert_eq!(count, 3);

        let mut texts = Vec::new();
        let mut bold_maria = false;
        doc.body().walk(&mut |el| {
            if el.is(W_P) {
                texts.push(paragraph_text(el));
                if paragraph_text(el) == "Maria" {
                    bold_maria = crate::paragraph::runs(el).any(is_bold);
                }
            }
        });
        assert_eq!(texts, vec!["12345", "Maria", "{{UNKNOWN}}"]);
        assert!(bold_maria);
        let header = doc.stories()[0].xml.root.child(W_P).unwrap();
        assert_eq!(paragraph_text(header), "ACME");
    }

    #[test]
    fn test_bold_token_in_header_table_gets_default_font() {
        let bytes = DocxFixture::new()
            .body("<w:p/>")
            .header(
                "header1.xml",
                r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t xml:space="preserve">Reclamante: {{NOME_RECLAMANTE}}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
            )
            .build();
        let mut doc = Document::from_bytes(&bytes).unwrap();
        let fields = FieldValues::new().with("Nome reclamante", "Maria Silva");

        let count = substitute_document(&mut doc, &fields.substitutions(), &DefaultFont::default());
        assert_eq!(count, 1);

        let reopened = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        let mut value_runs = Vec::new();
        reopened.stories()[0].xml.root.walk(&mut |el| {
            if el.is(crate::run::W_R) && crate::run::run_text(el) == "Maria Silva" {
                value_runs.push(crate::run::RunFormat::of(el));
            }
        });
        assert_eq!(value_runs.len(), 1);
        let format = &value_runs[0];
        assert_eq!(format.font_name.as_deref(), Some("Garamond"));
        assert_eq!(format.size_half_points.as_deref(), Some("24"));
        assert_eq!(format.bold, Some(true));
    }
}
