//! arXiv query API client (discovery collaborator)

use std::time::Duration;

use papertrack_core::http::{fetch_text, http_client};
use papertrack_core::{Paper, PaperSource, SearchQuery, SortOrder, StageError};

use crate::atom::parse_feed;

pub const DEFAULT_BASE_URL: &str = "https://export.arxiv.org/api/query";

/// Hard ceiling of the query API per request
const MAX_PAGE: usize = 2000;

/// Build the `search_query` expression.
///
/// `cat:<category>`, or `cat:<category> AND (all:<kw> OR ...)` with keywords.
pub fn search_expression(query: &SearchQuery) -> String {
    let keywords: Vec<String> = query
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| {
            if k.contains(char::is_whitespace) {
                format!("all:\"{k}\"")
            } else {
                format!("all:{k}")
            }
        })
        .collect();
    if keywords.is_empty() {
        format!("cat:{}", query.category)
    } else {
        format!("cat:{} AND ({})", query.category, keywords.join(" OR "))
    }
}

fn sort_by(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::SubmittedDate => "submittedDate",
        SortOrder::LastUpdatedDate => "lastUpdatedDate",
        SortOrder::Relevance => "relevance",
    }
}

/// Paper index backed by the arXiv Atom API.
#[derive(Debug, Clone)]
pub struct ArxivSource {
    base_url: String,
    timeout: Duration,
}

impl ArxivSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Query-string parameters for one request
    pub fn params(query: &SearchQuery) -> Vec<(&'static str, String)> {
        vec![
            ("search_query", search_expression(query)),
            ("start", "0".to_string()),
            ("max_results", query.limit.clamp(1, MAX_PAGE).to_string()),
            ("sortBy", sort_by(query.sort).to_string()),
            ("sortOrder", "descending".to_string()),
        ]
    }
}

impl Default for ArxivSource {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, Duration::from_secs(60))
    }
}

impl PaperSource for ArxivSource {
    fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, StageError> {
        let params = Self::params(query);
        log::debug!("arXiv query: {}", params[0].1);
        let request = http_client()
            .get(&self.base_url)
            .query(&params)
            .timeout(self.timeout);
        let body = fetch_text(request)?;
        let mut papers = parse_feed(&body)?;
        papers.truncate(query.limit);
        log::debug!("arXiv returned {} entries", papers.len());
        Ok(papers)
    }
}
