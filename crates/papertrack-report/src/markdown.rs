//! Per-paper Markdown reports (report-writing collaborator)

use std::fs;
use std::path::PathBuf;

use chrono::Local;
use papertrack_core::{Paper, ReportWriter, StageError};

/// Lowercase, spaces to `_`, drop anything outside `[A-Za-z0-9_-]`,
/// squeeze `_` runs, clip to `max_len` chars and strip trailing `_`.
pub fn sanitize_filename(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        let c = if c == ' ' { '_' } else { c };
        if !(c.is_alphanumeric() || c == '_' || c == '-') {
            continue;
        }
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let mut out: String = out.chars().take(max_len).collect();
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// `<id with / as _>_<sanitized title>.md`
pub fn report_file_name(paper: &Paper) -> String {
    format!(
        "{}_{}.md",
        paper.id.replace('/', "_"),
        sanitize_filename(&paper.title, 50)
    )
}

fn render(paper: &Paper, analysis: &str, generated: &str) -> String {
    let mut doc = format!(
        "# {title}\n\n\
         ## Paper Information\n\n\
         - **arXiv ID**: {id}\n\
         - **Authors**: {authors}\n\
         - **Published**: {published}\n\
         - **Categories**: {categories}\n\
         - **PDF**: {locator}\n",
        title = paper.title,
        id = paper.id,
        authors = paper.authors.join(", "),
        published = paper.published.format("%Y-%m-%d"),
        categories = paper.categories.join(", "),
        locator = paper.locator,
    );
    if let Some(journal) = &paper.journal_ref {
        doc.push_str(&format!("- **Journal reference**: {journal}\n"));
    }
    if let Some(comment) = &paper.comment {
        doc.push_str(&format!("- **Comment**: {comment}\n"));
    }
    doc.push_str(&format!(
        "\n## Abstract\n\n{summary}\n\n---\n\n## Analysis\n\n{analysis}\n\n---\n\n\
         *Report generated at {generated}*\n",
        summary = paper.summary,
    ));
    doc
}

/// Writes one `.md` file per paper into `dir`.
#[derive(Debug, Clone)]
pub struct MarkdownReporter {
    dir: PathBuf,
}

impl MarkdownReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, paper: &Paper) -> PathBuf {
        self.dir.join(report_file_name(paper))
    }
}

impl ReportWriter for MarkdownReporter {
    fn write(&self, paper: &Paper, analysis: &str) -> Result<PathBuf, StageError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| StageError::from_io(&format!("create {}", self.dir.display()), &e))?;
        let path = self.path_for(paper);
        let generated = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        fs::write(&path, render(paper, analysis, &generated))
            .map_err(|e| StageError::from_io(&format!("write {}", path.display()), &e))?;
        log::debug!("Report written: {}", path.display());
        Ok(path)
    }
}
