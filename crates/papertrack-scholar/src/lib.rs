//! Semantic Scholar citation lookup (citation-data collaborator)
//!
//! Searches the graph API by title and takes the top hit's citation counts.
//! Spacing between requests is the caller's job (see `RateGate` in core).

use std::time::Duration;

use papertrack_core::http::{fetch_text, http_client};
use papertrack_core::{CitationLookup, CitationSignal, StageError};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

const FIELDS: &str = "title,citationCount,influentialCitationCount,year";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<PaperHit>,
}

/// Top search hit
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub citation_count: Option<u64>,
    #[serde(default)]
    pub influential_citation_count: Option<u64>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl PaperHit {
    /// Missing counts read as zero; influential is clamped to total
    pub fn signal(&self) -> CitationSignal {
        CitationSignal::new(
            self.citation_count.unwrap_or(0),
            self.influential_citation_count.unwrap_or(0),
        )
    }
}

/// Decode a `/paper/search` body. `Ok(None)` when nothing matched.
pub fn parse_search(body: &str) -> Result<Option<PaperHit>, StageError> {
    let resp: SearchResponse = serde_json::from_str(body)
        .map_err(|e| StageError::malformed(format!("Invalid search JSON: {e}")))?;
    Ok(resp.data.into_iter().next())
}

#[derive(Debug, Clone)]
pub struct ScholarClient {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ScholarClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
        }
    }

    pub fn search_url(&self) -> String {
        format!("{}/paper/search", self.base_url.trim_end_matches('/'))
    }

    /// Best match for `title`, if any
    pub fn search_title(&self, title: &str) -> Result<Option<PaperHit>, StageError> {
        let mut request = http_client()
            .get(self.search_url())
            .query(&[("query", title), ("fields", FIELDS), ("limit", "1")])
            .timeout(self.timeout);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let body = fetch_text(request)?;
        parse_search(&body)
    }
}

impl Default for ScholarClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, None, Duration::from_secs(30))
    }
}

impl CitationLookup for ScholarClient {
    fn lookup(&self, title: &str) -> Result<Option<CitationSignal>, StageError> {
        let clipped: String = title.chars().take(50).collect();
        log::debug!("Semantic Scholar lookup: {clipped}");
        let hit = self.search_title(title)?;
        match &hit {
            Some(h) => log::debug!(
                "Found '{}': {} citations",
                h.title.as_deref().unwrap_or("N/A"),
                h.citation_count.unwrap_or(0)
            ),
            None => log::debug!("No results for: {clipped}"),
        }
        Ok(hit.map(|h| h.signal()))
    }
}
