//! `index.md` linking every report written in a run

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use papertrack_core::{Paper, StageError};

pub const INDEX_FILE: &str = "index.md";

/// A paper that made it through the pipeline and its report file.
#[derive(Debug, Clone, Copy)]
pub struct IndexEntry<'a> {
    pub paper: &'a Paper,
    pub report: &'a Path,
}

/// Search parameters echoed at the top of the index
#[derive(Debug, Clone)]
pub struct SearchSummary {
    pub category: String,
    /// Human-readable window, e.g. "last 7 days"
    pub window: String,
    pub max_results: usize,
    pub mode: String,
}

fn render(entries: &[IndexEntry<'_>], search: Option<&SearchSummary>, generated: &str) -> String {
    let mut doc = format!("# Paper Reading Reports\n\n**Generated**: {generated}\n");
    if let Some(s) = search {
        doc.push_str(&format!(
            "\n## Search Parameters\n\n\
             - **Category**: {}\n\
             - **Window**: {}\n\
             - **Max results**: {}\n\
             - **Mode**: {}\n",
            s.category, s.window, s.max_results, s.mode
        ));
    }
    doc.push_str(&format!(
        "\n## Reports\n\n{} paper(s) processed:\n\n",
        entries.len()
    ));
    for (i, entry) in entries.iter().enumerate() {
        let file = entry
            .report
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        doc.push_str(&format!(
            "{}. [{}](./{}) - {} ({})\n",
            i + 1,
            entry.paper.title,
            file,
            entry.paper.short_authors(),
            entry.paper.published.format("%Y-%m-%d"),
        ));
    }
    doc.push_str(&format!("\n---\n\n*Index generated at {generated}*\n"));
    doc
}

/// Write `dir/index.md` for `entries` (in the given order).
pub fn write_index(
    dir: &Path,
    entries: &[IndexEntry<'_>],
    search: Option<&SearchSummary>,
) -> Result<PathBuf, StageError> {
    fs::create_dir_all(dir)
        .map_err(|e| StageError::from_io(&format!("create {}", dir.display()), &e))?;
    let path = dir.join(INDEX_FILE);
    let generated = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    fs::write(&path, render(entries, search, &generated))
        .map_err(|e| StageError::from_io(&format!("write {}", path.display()), &e))?;
    log::info!("Index written: {} ({} report(s))", path.display(), entries.len());
    Ok(path)
}
