//! PDF download (retrieval collaborator)

use std::time::Duration;

use papertrack_core::http::{download, STALL_TIMEOUT};
use papertrack_core::{ErrorKind, Paper, Retriever, StageError};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Fetches a paper's PDF from its locator with stall detection.
#[derive(Debug, Clone)]
pub struct PdfRetriever {
    stall: Duration,
}

impl PdfRetriever {
    pub fn new(stall: Duration) -> Self {
        Self { stall }
    }
}

impl Default for PdfRetriever {
    fn default() -> Self {
        Self::new(STALL_TIMEOUT)
    }
}

/// Reject bodies that are not PDFs (arXiv serves HTML for withdrawn papers)
pub fn check_pdf(paper_id: &str, body: &[u8]) -> Result<(), StageError> {
    if body.is_empty() {
        return Err(StageError::new(
            ErrorKind::NotFound,
            format!("{paper_id}: empty PDF body"),
        ));
    }
    let head = &body[..body.len().min(1024)];
    if !head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return Err(StageError::malformed(format!(
            "{paper_id}: response is not a PDF"
        )));
    }
    Ok(())
}

impl Retriever for PdfRetriever {
    fn fetch(&self, paper: &Paper) -> Result<Vec<u8>, StageError> {
        if paper.locator.trim().is_empty() {
            return Err(StageError::not_found(format!("{}: no PDF locator", paper.id)));
        }
        log::debug!("{}: downloading {}", paper.id, paper.locator);
        let body = download(&paper.locator, self.stall)?;
        check_pdf(&paper.id, &body)?;
        Ok(body)
    }
}
