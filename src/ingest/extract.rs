//! Per-page PDF text extraction.
//!
//! Pages are extracted independently so one unreadable page never costs the rest of the
//! document. Only a document that fails to parse at all aborts the operation.

use thiserror::Error;
use tracing::warn;

/// Errors produced while extracting text from a document.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The byte stream could not be parsed as a document at all.
    #[error("failed to load document: {0}")]
    DocumentLoad(String),
}

/// Normalized text for a single page, 1-indexed in page order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page number within the source document.
    pub page_number: u32,
    /// Page text with whitespace runs collapsed to single spaces.
    pub text: String,
}

/// Turns raw document bytes into per-page normalized text.
pub trait TextExtractor: Send + Sync {
    /// Extract every readable page. Pages that fail individually are skipped;
    /// the error is a whole-document parse failure.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractError>;
}

/// [`TextExtractor`] backed by `lopdf`.
#[derive(Debug, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
        let document = lopdf::Document::load_mem(bytes)
            .map_err(|e| ExtractError::DocumentLoad(e.to_string()))?;

        let mut pages = Vec::new();
        for (page_number, _) in document.get_pages() {
            match document.extract_text(&[page_number]) {
                Ok(text) => pages.push(PageText {
                    page_number,
                    text: normalize_page_text(&text),
                }),
                Err(e) => {
                    warn!(page_number, error = %e, "skipping unreadable page");
                }
            }
        }
        Ok(pages)
    }
}

/// Collapse newlines and runs of whitespace to single spaces.
pub fn normalize_page_text(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut in_whitespace = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                normalized.push(' ');
            }
            in_whitespace = true;
        } else {
            normalized.push(c);
            in_whitespace = false;
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_newlines_and_runs() {
        let raw = "first line\nsecond  line\t\tthird\r\n\r\nfourth";
        assert_eq!(
            normalize_page_text(raw),
            "first line second line third fourth"
        );
    }

    #[test]
    fn normalize_leaves_single_spaces_alone() {
        let raw = "already normal text.";
        assert_eq!(normalize_page_text(raw), raw);
    }

    #[test]
    fn normalize_keeps_leading_run_as_one_space() {
        assert_eq!(normalize_page_text("   padded   "), " padded ");
    }

    #[test]
    fn garbage_bytes_fail_as_document_load() {
        let extractor = PdfTextExtractor;
        let result = extractor.extract_pages(b"not a pdf at all");
        assert!(matches!(result, Err(ExtractError::DocumentLoad(_))));
    }

    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    fn text_page_content(text: &str) -> Vec<u8> {
        Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        }
        .encode()
        .expect("encode content")
    }

    /// Three pages, the middle one carrying a content stream that fails to parse.
    fn pdf_with_broken_middle_page() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let first_content =
            doc.add_object(Stream::new(dictionary! {}, text_page_content("first page words")));
        let first_page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => first_content,
        });
        let broken_content = doc.add_object(Stream::new(
            dictionary! {},
            b"BI /W garbage that is not a valid inline image".to_vec(),
        ));
        let broken_page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => broken_content,
        });
        let last_content =
            doc.add_object(Stream::new(dictionary! {}, text_page_content("last page words")));
        let last_page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => last_content,
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![first_page.into(), broken_page.into(), last_page.into()],
                "Count" => 3,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut cursor = std::io::Cursor::new(Vec::new());
        doc.save_to(&mut cursor).expect("serialize document");
        cursor.into_inner()
    }

    #[test]
    fn broken_page_is_skipped_and_siblings_survive() {
        let extractor = PdfTextExtractor;
        let pages = extractor
            .extract_pages(&pdf_with_broken_middle_page())
            .expect("document still loads");

        let numbers: Vec<u32> = pages.iter().map(|page| page.page_number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert!(pages[0].text.contains("first page words"));
        assert!(pages[1].text.contains("last page words"));
    }
}
