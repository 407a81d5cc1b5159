//! Interfaces to the external services the pipeline drives.
//!
//! Implementations live in the source crates (arXiv, Semantic Scholar, LLM,
//! report writer); tests substitute in-memory stubs. All methods block.

use std::path::PathBuf;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::error::StageError;
use crate::model::{CitationSignal, Paper};

/// Result ordering requested from the paper index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    SubmittedDate,
    LastUpdatedDate,
    Relevance,
}

impl SortOrder {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "submittedDate" | "submitted" => Some(Self::SubmittedDate),
            "lastUpdatedDate" | "updated" => Some(Self::LastUpdatedDate),
            "relevance" => Some(Self::Relevance),
            _ => None,
        }
    }
}

/// Inclusive publication-time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window ending at `end` and reaching `days` back
    pub fn last_days(end: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: end - ChronoDuration::days(i64::from(days)),
            end,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

/// One query against the discovery collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub category: String,
    pub window: TimeWindow,
    /// Empty for recent-paper mode
    pub keywords: Vec<String>,
    pub sort: SortOrder,
    /// Upper bound on papers returned
    pub limit: usize,
}

/// Paper index (search). An empty result is not an error.
pub trait PaperSource: Send + Sync {
    fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, StageError>;
}

/// Citation-data service. `Ok(None)` means the title matched nothing.
pub trait CitationLookup: Send + Sync {
    fn lookup(&self, title: &str) -> Result<Option<CitationSignal>, StageError>;
}

/// Fetches the raw source document of a paper.
pub trait Retriever: Send + Sync {
    fn fetch(&self, paper: &Paper) -> Result<Vec<u8>, StageError>;
}

/// Turns a raw source document into plain text. Never retried.
pub trait Extractor: Send + Sync {
    fn extract(&self, raw: &[u8]) -> Result<String, StageError>;
}

/// Language-model completion service.
pub trait Summarizer: Send + Sync {
    /// Assemble the request text for a paper
    fn prompt(&self, paper: &Paper, text: &str) -> String;

    fn complete(&self, prompt: &str) -> Result<String, StageError>;
}

/// Persists the analysis of one paper, returning the artifact path.
pub trait ReportWriter: Send + Sync {
    fn write(&self, paper: &Paper, analysis: &str) -> Result<PathBuf, StageError>;
}
