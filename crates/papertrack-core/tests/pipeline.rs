//! End-to-end batch behaviour against in-memory collaborators.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use papertrack_core::{
    BatchCoordinator, CitationClassifier, CitationCriteria, CitationLookup, CitationSignal,
    ClassicStrategy, Collaborators, Discoverer, DiscoveryPlan, ErrorKind, ExitStatus, Extractor,
    Paper, PaperPipeline, PaperSource, PaperStatus, PipelinePolicies, RateGate, RecordingSleeper,
    ReportWriter, Retrier, Retriever, RetryPolicy, SearchQuery, Shutdown, SortOrder, Stage,
    StageError, StageResult, Summarizer,
};

fn ts() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-02T09:30:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn paper(n: usize) -> Paper {
    Paper {
        id: format!("2405.{n:05}"),
        title: format!("Paper number {n}"),
        authors: vec!["Grace Hopper".to_string(), "Alan Turing".to_string()],
        published: ts(),
        updated: ts(),
        summary: format!("Abstract {n}"),
        categories: vec!["cs.CL".to_string()],
        locator: format!("https://arxiv.org/pdf/2405.{n:05}"),
        comment: None,
        journal_ref: None,
    }
}

/// Every collaborator in one struct; failures keyed by paper id.
#[derive(Default)]
struct World {
    fetch_errors: HashMap<String, StageError>,
    /// Extraction panics on this exact source text
    panic_on: Option<String>,
    fetches: AtomicUsize,
    reports: Mutex<Vec<String>>,
}

impl Retriever for World {
    fn fetch(&self, paper: &Paper) -> Result<Vec<u8>, StageError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.fetch_errors.get(&paper.id) {
            Some(e) => Err(e.clone()),
            None => Ok(paper.summary.clone().into_bytes()),
        }
    }
}

impl Extractor for World {
    fn extract(&self, raw: &[u8]) -> Result<String, StageError> {
        let text = String::from_utf8_lossy(raw).into_owned();
        if self.panic_on.as_deref() == Some(text.as_str()) {
            panic!("unexpected object in content stream");
        }
        Ok(text)
    }
}

impl Summarizer for World {
    fn prompt(&self, paper: &Paper, text: &str) -> String {
        format!("Summarize '{}': {text}", paper.title)
    }

    fn complete(&self, prompt: &str) -> Result<String, StageError> {
        Ok(format!("## Analysis\n{prompt}"))
    }
}

impl ReportWriter for World {
    fn write(&self, paper: &Paper, _analysis: &str) -> Result<PathBuf, StageError> {
        self.reports.lock().unwrap().push(paper.id.clone());
        Ok(PathBuf::from(format!("{}.md", paper.id)))
    }
}

impl PaperSource for World {
    fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, StageError> {
        Ok((1..=query.limit.min(8)).map(paper).collect())
    }
}

fn policies() -> PipelinePolicies {
    let retry = RetryPolicy::new(
        3,
        Duration::from_millis(5),
        2.0,
        [ErrorKind::NetworkUnreachable, ErrorKind::RateLimited, ErrorKind::Timeout],
    );
    PipelinePolicies {
        retrieval: retry.clone(),
        summarize: retry,
        report: RetryPolicy::no_retry(),
    }
}

fn coordinator(world: Arc<World>, workers: usize) -> BatchCoordinator {
    let shutdown = Shutdown::new();
    let retrier = Retrier::new(Arc::new(RecordingSleeper::new()), shutdown.clone());
    let collab = Collaborators {
        retriever: world.clone(),
        extractor: world.clone(),
        summarizer: world.clone(),
        reporter: world,
    };
    BatchCoordinator::new(PaperPipeline::new(collab, policies(), retrier), workers, shutdown)
}

#[test]
fn five_papers_one_not_found() {
    let papers: Vec<Paper> = (1..=5).map(paper).collect();
    let mut world = World::default();
    world
        .fetch_errors
        .insert(papers[2].id.clone(), StageError::not_found("HTTP 404"));
    let world = Arc::new(world);

    let report = coordinator(world.clone(), 2).run(&papers);

    assert_eq!(report.succeeded(), 4);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.exit_status(), ExitStatus::PartialFailure);
    assert_eq!(report.exit_status().code(), 2);

    let third = &report.outcomes()[2];
    assert_eq!(third.status(), PaperStatus::Failed(Stage::Retrieve));
    assert_eq!(third.stages().len(), 1);
    assert_eq!(third.stages()[0].attempts, 1);
    assert!(!world.reports.lock().unwrap().contains(&papers[2].id));
    assert_eq!(report.failures_by_stage(), vec![(Stage::Retrieve, 1)]);
}

#[test]
fn panicking_extractor_fails_only_its_paper() {
    let papers: Vec<Paper> = (1..=5).map(paper).collect();
    let world = Arc::new(World {
        panic_on: Some(papers[2].summary.clone()),
        ..Default::default()
    });

    let report = coordinator(world.clone(), 2).run(&papers);

    assert_eq!(report.succeeded(), 4);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.exit_status().code(), 2);
    let third = &report.outcomes()[2];
    assert_eq!(third.status(), PaperStatus::Failed(Stage::Summarize));
    let error = third.failure().unwrap();
    assert_eq!(error.kind, ErrorKind::ExtractionFailed);
    assert!(error.message.contains("unexpected object"), "{error}");
    assert_eq!(world.reports.lock().unwrap().len(), 4);
}

#[test]
fn zero_papers_is_total_failure() {
    let report = coordinator(Arc::new(World::default()), 4).run(&[]);
    assert_eq!(report.succeeded(), 0);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.exit_status().code(), 1);
}

#[test]
fn rerun_with_healthy_collaborators_is_stable() {
    let papers: Vec<Paper> = (1..=6).map(paper).collect();
    let c = coordinator(Arc::new(World::default()), 3);
    let first = c.run(&papers);
    for _ in 0..3 {
        let again = c.run(&papers);
        assert_eq!(again.succeeded(), first.succeeded());
        assert_eq!(again.failed(), first.failed());
        assert_eq!(again.exit_status(), ExitStatus::Success);
    }
}

#[test]
fn counts_always_cover_every_paper() {
    for failing in 0..=4usize {
        let papers: Vec<Paper> = (1..=4).map(paper).collect();
        let mut world = World::default();
        for p in papers.iter().take(failing) {
            world
                .fetch_errors
                .insert(p.id.clone(), StageError::network("unreachable"));
        }
        let world = Arc::new(world);
        let report = coordinator(world.clone(), 2).run(&papers);
        assert_eq!(report.succeeded() + report.failed(), papers.len());
        let expected = match failing {
            0 => 0,
            4 => 1,
            _ => 2,
        };
        assert_eq!(report.exit_status().code(), expected);
        // network errors exhaust the 3-attempt budget
        assert_eq!(world.fetches.load(Ordering::SeqCst), 4 - failing + failing * 3);
    }
}

#[test]
fn retry_delays_follow_backoff() {
    let sleeper = Arc::new(RecordingSleeper::new());
    let retrier = Retrier::new(sleeper.clone(), Shutdown::new());
    let policy = RetryPolicy::new(3, Duration::from_secs(1), 2.0, [ErrorKind::Timeout]);
    let mut calls = 0;
    let exec = retrier.execute("flaky", &policy, || {
        calls += 1;
        if calls <= 2 {
            Err(StageError::timeout("slow"))
        } else {
            Ok(calls)
        }
    });
    assert_eq!(exec.result, StageResult::Success(3));
    assert_eq!(exec.attempts, 3);
    assert_eq!(
        sleeper.slept(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

/// Citation service that tracks concurrent callers
struct CountingLookup {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CitationLookup for CountingLookup {
    fn lookup(&self, title: &str) -> Result<Option<CitationSignal>, StageError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let n: u64 = title.rsplit(' ').next().and_then(|s| s.parse().ok()).unwrap_or(0);
        // even-numbered papers are well cited
        Ok(Some(if n % 2 == 0 {
            CitationSignal::new(100, 20)
        } else {
            CitationSignal::new(3, 0)
        }))
    }
}

#[test]
fn classic_citation_discovery_then_run() {
    let world = Arc::new(World::default());
    let lookup = Arc::new(CountingLookup {
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let gate = Arc::new(RateGate::new(Duration::ZERO));
    let retrier = Retrier::new(Arc::new(RecordingSleeper::new()), Shutdown::new());

    let classifier = CitationClassifier::new(
        ClassicStrategy::Citation(CitationCriteria {
            min_citations: 10,
            min_influential: 5,
            lookup: lookup.clone(),
            gate,
            policy: RetryPolicy::default(),
        }),
        retrier.clone(),
    );
    let plan = DiscoveryPlan::Classic {
        category: "cs.CL".to_string(),
        keywords: vec![],
        sort: SortOrder::Relevance,
        years_back: 5,
        max_results: 3,
        classifier,
    };
    let discoverer = Discoverer::new(world.clone(), RetryPolicy::default(), retrier);
    let now = ts() + chrono::Duration::days(1);

    let run = coordinator(world, 2).discover_and_run(&discoverer, &plan, now);

    let ids: Vec<_> = run.papers.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["2405.00002", "2405.00004", "2405.00006"]);
    assert!(run.lookup_failures.is_empty());
    assert_eq!(run.report.succeeded(), 3);
    assert_eq!(run.report.exit_status(), ExitStatus::Success);
    assert_eq!(lookup.max_in_flight.load(Ordering::SeqCst), 1);
}

struct DownIndex;

impl PaperSource for DownIndex {
    fn search(&self, _query: &SearchQuery) -> Result<Vec<Paper>, StageError> {
        Err(StageError::new(ErrorKind::ServiceUnavailable, "HTTP 503"))
    }
}

#[test]
fn discovery_failure_reports_total_failure() {
    let retrier = Retrier::new(Arc::new(RecordingSleeper::new()), Shutdown::new());
    let discoverer = Discoverer::new(Arc::new(DownIndex), RetryPolicy::default(), retrier);
    let plan = DiscoveryPlan::Recent {
        category: "cs.CL".to_string(),
        days: 3,
        max_results: 5,
    };
    let run = coordinator(Arc::new(World::default()), 1).discover_and_run(&discoverer, &plan, ts());
    assert!(run.papers.is_empty());
    assert_eq!(
        run.report.discovery_error().map(|e| e.kind),
        Some(ErrorKind::ServiceUnavailable)
    );
    assert_eq!(run.report.exit_status().code(), 1);
}

#[test]
fn discovery_cut_short_by_shutdown_reports_interrupted() {
    let world = Arc::new(World::default());
    let stopped = Shutdown::new();
    stopped.request();
    let classifier = CitationClassifier::new(
        ClassicStrategy::Relevance { keywords: vec![] },
        Retrier::new(Arc::new(RecordingSleeper::new()), stopped),
    );
    let plan = DiscoveryPlan::Classic {
        category: "cs.CL".to_string(),
        keywords: vec![],
        sort: SortOrder::Relevance,
        years_back: 5,
        max_results: 3,
        classifier,
    };
    let retrier = Retrier::new(Arc::new(RecordingSleeper::new()), Shutdown::new());
    let discoverer = Discoverer::new(world.clone(), RetryPolicy::default(), retrier);
    let now = ts() + chrono::Duration::days(1);

    let run = coordinator(world.clone(), 2).discover_and_run(&discoverer, &plan, now);

    assert!(run.papers.is_empty());
    assert_eq!(run.report.exit_status(), ExitStatus::Interrupted);
    assert_eq!(run.report.exit_status().code(), 130);
    assert_eq!(world.fetches.load(Ordering::SeqCst), 0);
}
