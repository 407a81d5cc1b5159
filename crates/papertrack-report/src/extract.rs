//! PDF text extraction (extraction collaborator)

use std::panic::{self, AssertUnwindSafe};

use lopdf::Document;
use papertrack_core::{ErrorKind, Extractor, StageError};

/// Pages to read from a document of `total` pages (1-based).
///
/// Documents longer than `max_pages` keep only the first `head` and the last
/// `tail` pages.
pub fn select_pages(total: u32, max_pages: u32, head: u32, tail: u32) -> Vec<u32> {
    if total <= max_pages {
        return (1..=total).collect();
    }
    let head_end = head.min(total);
    let tail_start = total.saturating_sub(tail).max(head_end) + 1;
    (1..=head_end).chain(tail_start..=total).collect()
}

/// Normalize extracted page text: rejoin hyphenated line breaks, collapse
/// runs of spaces, trim lines and squeeze blank-line runs to one.
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;
    let mut carry = String::new();

    for line in raw.lines() {
        let mut line: String = collapse_spaces(line.trim());
        if !carry.is_empty() {
            line = format!("{carry}{line}");
            carry.clear();
        }
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        // "exam-\nple" -> "example"
        if line.ends_with('-') && line.len() > 1 {
            let prev = line[..line.len() - 1].chars().last();
            if prev.is_some_and(char::is_alphanumeric) {
                line.pop();
                carry = line;
                continue;
            }
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(&line);
    }
    if !carry.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&carry);
        out.push('-');
    }
    out
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.chars() {
        if c == ' ' || c == '\t' {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

/// Reads PDF text with lopdf, page by page.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    pub max_pages: u32,
    pub head_pages: u32,
    pub tail_pages: u32,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self {
            max_pages: 50,
            head_pages: 10,
            tail_pages: 5,
        }
    }
}

impl PdfExtractor {
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages,
            ..Self::default()
        }
    }

    pub fn extract_document(&self, doc: &Document) -> Result<String, StageError> {
        let pages = doc.get_pages();
        let total = pages.len() as u32;
        let wanted = select_pages(total, self.max_pages, self.head_pages, self.tail_pages);
        if wanted.len() < total as usize {
            log::warn!(
                "PDF has {total} pages (> {}), reading first {} and last {}",
                self.max_pages,
                self.head_pages,
                self.tail_pages
            );
        }

        let mut parts = Vec::with_capacity(wanted.len());
        for page in wanted {
            match doc.extract_text(&[page]) {
                Ok(text) => {
                    let cleaned = clean_text(&text);
                    if cleaned.is_empty() {
                        log::debug!("No text on page {page}");
                    } else {
                        parts.push(cleaned);
                    }
                }
                Err(e) => log::warn!("Page {page}: text extraction failed: {e}"),
            }
        }

        let text = parts.join("\n\n");
        if text.trim().is_empty() {
            return Err(StageError::new(
                ErrorKind::ExtractionFailed,
                format!("no extractable text in {total} page(s)"),
            ));
        }
        log::debug!("Extracted {} chars from {} page(s)", text.len(), parts.len());
        Ok(text)
    }
}

impl Extractor for PdfExtractor {
    fn extract(&self, raw: &[u8]) -> Result<String, StageError> {
        // lopdf panics on some malformed documents
        panic::catch_unwind(AssertUnwindSafe(|| {
            let doc = Document::load_mem(raw).map_err(|e| {
                StageError::new(ErrorKind::ExtractionFailed, format!("Cannot parse PDF: {e}"))
            })?;
            self.extract_document(&doc)
        }))
        .unwrap_or_else(|payload| {
            Err(StageError::from_panic(
                ErrorKind::ExtractionFailed,
                "PDF parser",
                payload.as_ref(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        pdf_with_font(doc, Object::from(font_id), texts)
    }

    /// Pages sharing one resources dictionary whose `F1` entry is `font`.
    fn pdf_with_font(mut doc: Document, font: Object, texts: &[&str]) -> Vec<u8> {
        let pages_id = doc.new_object_id();
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font },
        });

        let mut kids = Vec::new();
        for text in texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn short_documents_read_every_page() {
        assert_eq!(select_pages(3, 50, 10, 5), vec![1, 2, 3]);
        assert_eq!(select_pages(50, 50, 10, 5).len(), 50);
        assert!(select_pages(0, 50, 10, 5).is_empty());
    }

    #[test]
    fn long_documents_keep_head_and_tail() {
        let pages = select_pages(60, 50, 10, 5);
        assert_eq!(pages.len(), 15);
        assert_eq!(&pages[..10], &(1..=10).collect::<Vec<_>>()[..]);
        assert_eq!(&pages[10..], &[56, 57, 58, 59, 60]);
    }

    #[test]
    fn head_and_tail_never_overlap() {
        let pages = select_pages(12, 8, 10, 5);
        assert_eq!(pages, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn cleaning_normalizes_whitespace() {
        let raw = "  Deep   learn-\ning   works \n\n\n\n  second\tpara  ";
        assert_eq!(clean_text(raw), "Deep learning works\n\nsecond para");
        assert_eq!(clean_text("   \n \n"), "");
        assert_eq!(clean_text("a -\nb"), "a -\nb");
    }

    #[test]
    fn extracts_text_from_generated_pdf() {
        let raw = pdf_with_pages(&["Hello World", "Second page"]);
        let text = PdfExtractor::default().extract(&raw).unwrap();
        assert!(text.contains("Hello World"), "{text}");
        assert!(text.contains("Second page"), "{text}");
    }

    #[test]
    fn garbage_bytes_fail_extraction() {
        let err = PdfExtractor::default().extract(b"not a pdf at all").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExtractionFailed);
    }

    #[test]
    fn pages_without_text_fail_extraction() {
        let raw = pdf_with_pages(&[""]);
        let err = PdfExtractor::default().extract(&raw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExtractionFailed);
    }

    fn assert_contained(result: Result<String, StageError>) {
        if let Err(err) = result {
            assert_eq!(err.kind, ErrorKind::ExtractionFailed, "{err}");
        }
    }

    #[test]
    fn font_entry_of_wrong_type_is_contained() {
        let raw = pdf_with_font(
            Document::with_version("1.5"),
            Object::Integer(7),
            &["Hello World"],
        );
        assert_contained(PdfExtractor::default().extract(&raw));
    }

    #[test]
    fn damaged_documents_never_escape_as_panics() {
        let raw = pdf_with_pages(&["Hello World", "Second page"]);
        let extractor = PdfExtractor::default();
        for cut in (0..raw.len()).step_by(7) {
            assert_contained(extractor.extract(&raw[..cut]));
        }
        for at in (0..raw.len()).step_by(11) {
            let mut damaged = raw.clone();
            damaged[at] ^= 0x5a;
            assert_contained(extractor.extract(&damaged));
        }
    }
}
