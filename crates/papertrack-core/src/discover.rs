//! Discover stage: query the paper index and pick the batch.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::classify::CitationClassifier;
use crate::collab::{PaperSource, SearchQuery, SortOrder, TimeWindow};
use crate::error::StageError;
use crate::model::{Paper, Stage};
use crate::pipeline::StageRunner;
use crate::retry::{RetryPolicy, Retrier};

/// Candidates requested per wanted paper in recent mode
const RECENT_OVERSAMPLE: usize = 2;
/// Candidates requested per wanted paper in classic mode
const CLASSIC_OVERSAMPLE: usize = 5;

/// What to search for.
pub enum DiscoveryPlan {
    /// Newest submissions in a category within the last `days`
    Recent {
        category: String,
        days: u32,
        max_results: usize,
    },
    /// Influential papers from the last `years_back` years
    Classic {
        category: String,
        keywords: Vec<String>,
        sort: SortOrder,
        years_back: u32,
        max_results: usize,
        classifier: CitationClassifier,
    },
}

impl DiscoveryPlan {
    pub fn max_results(&self) -> usize {
        match self {
            Self::Recent { max_results, .. } | Self::Classic { max_results, .. } => *max_results,
        }
    }

    pub fn is_classic(&self) -> bool {
        matches!(self, Self::Classic { .. })
    }

    /// Index query for this plan, ending at `now`
    pub fn query(&self, now: DateTime<Utc>) -> SearchQuery {
        match self {
            Self::Recent {
                category,
                days,
                max_results,
            } => SearchQuery {
                category: category.clone(),
                window: TimeWindow::last_days(now, *days),
                keywords: Vec::new(),
                sort: SortOrder::SubmittedDate,
                limit: max_results.saturating_mul(RECENT_OVERSAMPLE),
            },
            Self::Classic {
                category,
                keywords,
                sort,
                years_back,
                max_results,
                ..
            } => SearchQuery {
                category: category.clone(),
                window: TimeWindow::last_days(now, years_back.saturating_mul(365)),
                keywords: keywords.clone(),
                sort: *sort,
                limit: max_results.saturating_mul(CLASSIC_OVERSAMPLE),
            },
        }
    }
}

/// Papers picked for one batch.
#[derive(Debug, Default)]
pub struct Discovered {
    pub papers: Vec<Paper>,
    /// Papers returned by the index inside the time window, ids de-duplicated
    pub candidates: usize,
    pub lookup_failures: Vec<(String, StageError)>,
    pub interrupted: bool,
}

pub struct Discoverer {
    source: Arc<dyn PaperSource>,
    runner: StageRunner,
}

impl Discoverer {
    pub fn new(source: Arc<dyn PaperSource>, policy: RetryPolicy, retrier: Retrier) -> Self {
        Self {
            source,
            runner: StageRunner::new(Stage::Discover, policy, retrier),
        }
    }

    /// Run the search and narrow the result to the plan's batch.
    ///
    /// An empty result is `Ok`; only a failed search is an error.
    pub fn discover(&self, plan: &DiscoveryPlan, now: DateTime<Utc>) -> Result<Discovered, StageError> {
        let query = plan.query(now);
        log::info!(
            "Searching {} ({} mode, window {} .. {}, up to {} candidates)",
            query.category,
            if plan.is_classic() { "classic" } else { "recent" },
            query.window.start.format("%Y-%m-%d"),
            query.window.end.format("%Y-%m-%d"),
            query.limit
        );

        let (_, found) = self.runner.run(&query.category, || self.source.search(&query));
        let candidates = narrow(found?, &query.window);
        log::info!("Index returned {} candidate papers", candidates.len());

        let discovered = match plan {
            DiscoveryPlan::Recent { max_results, .. } => {
                let count = candidates.len();
                let mut papers = candidates;
                papers.truncate(*max_results);
                Discovered {
                    papers,
                    candidates: count,
                    ..Default::default()
                }
            }
            DiscoveryPlan::Classic {
                max_results,
                classifier,
                ..
            } => {
                let count = candidates.len();
                let selection = classifier.select(candidates, *max_results);
                Discovered {
                    papers: selection.papers,
                    candidates: count,
                    lookup_failures: selection.lookup_failures,
                    interrupted: selection.interrupted,
                }
            }
        };
        Ok(discovered)
    }
}

/// Keep papers published inside `window`, dropping repeated ids (first wins).
fn narrow(found: Vec<Paper>, window: &TimeWindow) -> Vec<Paper> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|p| window.contains(p.published))
        .filter(|p| {
            let fresh = seen.insert(p.id.clone());
            if !fresh {
                log::debug!("Dropping duplicate id {}", p.id);
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::classify::ClassicStrategy;
    use crate::error::ErrorKind;
    use crate::model::tests::paper;
    use crate::retry::RecordingSleeper;
    use crate::shutdown::Shutdown;

    struct StubSource {
        papers: Vec<Paper>,
        error: Option<StageError>,
        queries: Mutex<Vec<SearchQuery>>,
    }

    impl StubSource {
        fn returning(papers: Vec<Paper>) -> Self {
            Self {
                papers,
                error: None,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl PaperSource for StubSource {
        fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, StageError> {
            self.queries.lock().unwrap().push(query.clone());
            match &self.error {
                Some(e) => Err(e.clone()),
                None => Ok(self.papers.clone()),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-05T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn retrier() -> Retrier {
        Retrier::new(Arc::new(RecordingSleeper::new()), Shutdown::new())
    }

    fn discoverer(source: Arc<StubSource>) -> Discoverer {
        let policy = RetryPolicy::new(2, Duration::from_millis(1), 2.0, [ErrorKind::ServiceUnavailable]);
        Discoverer::new(source, policy, retrier())
    }

    fn recent(max_results: usize) -> DiscoveryPlan {
        DiscoveryPlan::Recent {
            category: "cs.AI".to_string(),
            days: 7,
            max_results,
        }
    }

    #[test]
    fn recent_query_shape() {
        let q = recent(10).query(now());
        assert_eq!(q.limit, 20);
        assert_eq!(q.sort, SortOrder::SubmittedDate);
        assert!(q.keywords.is_empty());
        assert_eq!(q.window.end - q.window.start, ChronoDuration::days(7));
    }

    #[test]
    fn classic_query_shape() {
        let plan = DiscoveryPlan::Classic {
            category: "cs.LG".to_string(),
            keywords: vec!["transformer".to_string()],
            sort: SortOrder::Relevance,
            years_back: 2,
            max_results: 4,
            classifier: CitationClassifier::new(
                ClassicStrategy::Relevance { keywords: vec![] },
                retrier(),
            ),
        };
        let q = plan.query(now());
        assert_eq!(q.limit, 20);
        assert_eq!(q.sort, SortOrder::Relevance);
        assert_eq!(q.window.end - q.window.start, ChronoDuration::days(730));
    }

    #[test]
    fn drops_duplicates_and_out_of_window() {
        let mut old = paper("old", "Old");
        old.published = now() - ChronoDuration::days(30);
        let source = Arc::new(StubSource::returning(vec![
            paper("a", "A"),
            paper("a", "A again"),
            old,
            paper("b", "B"),
        ]));
        let found = discoverer(source).discover(&recent(10), now()).unwrap();
        let ids: Vec<_> = found.papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(found.papers[0].title, "A");
    }

    #[test]
    fn recent_caps_at_max_results() {
        let papers = (0..6).map(|i| paper(&i.to_string(), "t")).collect();
        let found = discoverer(Arc::new(StubSource::returning(papers)))
            .discover(&recent(4), now())
            .unwrap();
        assert_eq!(found.papers.len(), 4);
        assert_eq!(found.candidates, 6);
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let found = discoverer(Arc::new(StubSource::returning(vec![])))
            .discover(&recent(4), now())
            .unwrap();
        assert!(found.papers.is_empty());
    }

    #[test]
    fn unavailable_index_is_retried_then_reported() {
        let source = Arc::new(StubSource {
            papers: vec![],
            error: Some(StageError::new(ErrorKind::ServiceUnavailable, "503")),
            queries: Mutex::new(Vec::new()),
        });
        let err = discoverer(source.clone())
            .discover(&recent(4), now())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
        assert_eq!(source.queries.lock().unwrap().len(), 2);
    }

    #[test]
    fn classic_applies_classifier_then_cap() {
        let mut hit = paper("1", "Graph networks");
        hit.summary = "graphs".to_string();
        let source = Arc::new(StubSource::returning(vec![
            paper("0", "Unrelated"),
            hit,
            paper("2", "More graph work"),
            paper("3", "Graph again"),
        ]));
        let plan = DiscoveryPlan::Classic {
            category: "cs.LG".to_string(),
            keywords: vec!["graph".to_string()],
            sort: SortOrder::Relevance,
            years_back: 1,
            max_results: 2,
            classifier: CitationClassifier::new(
                ClassicStrategy::Relevance {
                    keywords: vec!["graph".to_string()],
                },
                retrier(),
            ),
        };
        let found = discoverer(source).discover(&plan, now()).unwrap();
        let ids: Vec<_> = found.papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(found.candidates, 4);
    }
}
