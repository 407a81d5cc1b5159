//! Classic-paper classification.
//!
//! Two strategies, fixed at configuration time:
//! - relevance: keyword match against title/abstract, no external calls
//! - citation: citation counts from the citation-data service, looked up
//!   one at a time through a shared [`RateGate`]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::collab::CitationLookup;
use crate::error::{ErrorKind, StageError};
use crate::model::{CitationSignal, Paper, StageResult};
use crate::retry::{RetryPolicy, Retrier, Sleeper};
use crate::shutdown::Shutdown;

/// Minimum spacing between calls to a rate-limited service.
///
/// Holds its lock for the duration of the guarded call, so calls from
/// concurrent pipelines are serialized as well as spaced out.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Wait out the remaining interval, then run `call` while holding the gate.
    ///
    /// A shutdown requested while waiting skips the call.
    pub fn pass<T>(
        &self,
        sleeper: &dyn Sleeper,
        shutdown: &Shutdown,
        call: impl FnOnce() -> Result<T, StageError>,
    ) -> Result<T, StageError> {
        let mut last = self.last.lock().expect("rate gate poisoned");
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.interval {
                let wait = self.interval - since;
                log::debug!("rate gate: waiting {:.2}s", wait.as_secs_f64());
                sleeper.sleep(wait);
            }
        }
        if shutdown.is_requested() {
            return Err(StageError::interrupted());
        }
        *last = Some(Instant::now());
        call()
    }
}

/// Thresholds and services for the citation strategy.
pub struct CitationCriteria {
    pub min_citations: u64,
    pub min_influential: u64,
    pub lookup: Arc<dyn CitationLookup>,
    pub gate: Arc<RateGate>,
    pub policy: RetryPolicy,
}

impl CitationCriteria {
    /// Both thresholds must hold at once
    pub fn accepts(&self, signal: &CitationSignal) -> bool {
        signal.total() >= self.min_citations && signal.influential() >= self.min_influential
    }
}

/// How classic papers are recognized.
pub enum ClassicStrategy {
    Relevance { keywords: Vec<String> },
    Citation(CitationCriteria),
}

impl ClassicStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Relevance { .. } => "relevance",
            Self::Citation(_) => "citation",
        }
    }
}

/// Decision for one candidate paper.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub classic: bool,
    pub signal: Option<CitationSignal>,
    /// Set when the citation lookup failed after retries
    pub lookup_error: Option<StageError>,
}

impl Verdict {
    fn plain(classic: bool) -> Self {
        Self {
            classic,
            signal: None,
            lookup_error: None,
        }
    }
}

/// Papers selected as classic from a candidate window.
#[derive(Debug, Default)]
pub struct Selection {
    pub papers: Vec<Paper>,
    /// Candidates examined (after title de-duplication)
    pub examined: usize,
    /// Lookups that failed; those papers were excluded
    pub lookup_failures: Vec<(String, StageError)>,
    pub interrupted: bool,
}

pub struct CitationClassifier {
    strategy: ClassicStrategy,
    retrier: Retrier,
}

impl CitationClassifier {
    pub fn new(strategy: ClassicStrategy, retrier: Retrier) -> Self {
        Self { strategy, retrier }
    }

    pub fn strategy(&self) -> &ClassicStrategy {
        &self.strategy
    }

    pub fn classify(&self, paper: &Paper) -> Verdict {
        match &self.strategy {
            ClassicStrategy::Relevance { keywords } => {
                Verdict::plain(matches_keywords(paper, keywords))
            }
            ClassicStrategy::Citation(criteria) => self.classify_by_citations(paper, criteria),
        }
    }

    fn classify_by_citations(&self, paper: &Paper, criteria: &CitationCriteria) -> Verdict {
        let label = format!("citations {}", paper.id);
        let exec = self.retrier.execute(&label, &criteria.policy, || {
            criteria
                .gate
                .pass(self.retrier.sleeper(), self.retrier.shutdown(), || {
                    criteria.lookup.lookup(&paper.title)
                })
        });
        match exec.result {
            StageResult::Success(Some(signal)) => {
                let classic = criteria.accepts(&signal);
                if classic {
                    log::info!(
                        "Classic paper: '{}' (citations: {}, influential: {})",
                        paper.short_title(50),
                        signal.total(),
                        signal.influential()
                    );
                } else {
                    log::debug!(
                        "Below thresholds: '{}' ({}/{})",
                        paper.short_title(50),
                        signal.total(),
                        signal.influential()
                    );
                }
                Verdict {
                    classic,
                    signal: Some(signal),
                    lookup_error: None,
                }
            }
            StageResult::Success(None) => {
                log::debug!("No citation record for '{}'", paper.short_title(50));
                Verdict::plain(false)
            }
            StageResult::RecoverableFailure { error, .. }
            | StageResult::FatalFailure { error, .. } => {
                if error.kind != ErrorKind::Interrupted {
                    log::warn!(
                        "{}: citation lookup failed after {} attempt(s): {error}",
                        paper.id,
                        exec.attempts
                    );
                }
                Verdict {
                    classic: false,
                    signal: None,
                    lookup_error: Some(error),
                }
            }
        }
    }

    /// Filter `candidates` down to at most `limit` classic papers.
    ///
    /// Duplicate titles (case-insensitive) are skipped; the cap is applied
    /// after filtering so rejected candidates do not use up slots.
    pub fn select(&self, candidates: Vec<Paper>, limit: usize) -> Selection {
        let mut selection = Selection::default();
        let mut seen_titles: HashSet<String> = HashSet::new();

        for paper in candidates {
            if selection.papers.len() >= limit {
                break;
            }
            if self.retrier.shutdown().is_requested() {
                selection.interrupted = true;
                break;
            }
            if !seen_titles.insert(normalize_title(&paper.title)) {
                continue;
            }
            selection.examined += 1;

            let verdict = self.classify(&paper);
            if let Some(error) = verdict.lookup_error {
                if error.kind == ErrorKind::Interrupted {
                    selection.interrupted = true;
                    break;
                }
                selection.lookup_failures.push((paper.id.clone(), error));
                continue;
            }
            if verdict.classic {
                selection.papers.push(paper);
            } else {
                log::debug!("Filtered out: {}", paper.short_title(50));
            }
        }

        log::info!(
            "{} classic papers from {} candidates ({} strategy)",
            selection.papers.len(),
            selection.examined,
            self.strategy.name()
        );
        selection
    }
}

fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Case-insensitive substring match of any keyword in title or abstract.
/// An empty keyword list accepts every paper.
pub fn matches_keywords(paper: &Paper, keywords: &[String]) -> bool {
    let needles: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if needles.is_empty() {
        return true;
    }
    let title = paper.title.to_lowercase();
    let summary = paper.summary.to_lowercase();
    needles
        .iter()
        .any(|k| title.contains(k.as_str()) || summary.contains(k.as_str()))
}
