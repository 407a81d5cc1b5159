//! Records flowing through the pipeline: papers, stage results, outcomes, batch report

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, StageError};

/// Paper metadata as returned by the discovery collaborator.
///
/// `id` is stable across runs and unique within one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub summary: String,
    pub categories: Vec<String>,
    /// Where the source document can be fetched from (PDF URL)
    pub locator: String,
    pub comment: Option<String>,
    pub journal_ref: Option<String>,
}

impl Paper {
    /// Up to three authors, "et al." appended when truncated
    pub fn short_authors(&self) -> String {
        let mut s = self.authors.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
        if self.authors.len() > 3 {
            s.push_str(" et al.");
        }
        s
    }

    /// Title clipped to `max` chars for log lines
    pub fn short_title(&self, max: usize) -> String {
        if self.title.chars().count() > max {
            let clipped: String = self.title.chars().take(max).collect();
            format!("{clipped}...")
        } else {
            self.title.clone()
        }
    }
}

/// Citation counts for one paper from the citation-data collaborator.
///
/// Invariant: `influential <= total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitationSignal {
    total: u64,
    influential: u64,
}

impl CitationSignal {
    /// Build a signal, clamping `influential` to `total`
    pub fn new(total: u64, influential: u64) -> Self {
        Self {
            total,
            influential: influential.min(total),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn influential(&self) -> u64 {
        self.influential
    }
}

/// Pipeline stage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Discover,
    Retrieve,
    Summarize,
    Report,
}

impl Stage {
    pub const PAPER_STAGES: [Stage; 3] = [Stage::Retrieve, Stage::Summarize, Stage::Report];

    pub fn name(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Retrieve => "retrieve",
            Self::Summarize => "summarize",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tagged outcome of one stage (or one attempt within a stage).
///
/// `RecoverableFailure` is only produced while `attempt < max_attempts`;
/// past that the failure is promoted to `FatalFailure`.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult<T> {
    Success(T),
    RecoverableFailure { error: StageError, attempt: u32 },
    FatalFailure { error: StageError, attempts: u32 },
}

impl<T> StageResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn error(&self) -> Option<&StageError> {
        match self {
            Self::Success(_) => None,
            Self::RecoverableFailure { error, .. } | Self::FatalFailure { error, .. } => {
                Some(error)
            }
        }
    }

    /// Drop the payload, keeping only the status
    pub fn status(&self) -> StageResult<()> {
        match self {
            Self::Success(_) => StageResult::Success(()),
            Self::RecoverableFailure { error, attempt } => StageResult::RecoverableFailure {
                error: error.clone(),
                attempt: *attempt,
            },
            Self::FatalFailure { error, attempts } => StageResult::FatalFailure {
                error: error.clone(),
                attempts: *attempts,
            },
        }
    }
}

/// One stage's entry in a paper's history.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub stage: Stage,
    pub result: StageResult<()>,
    /// Attempts made, including the final one
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Terminal state of one paper.
///
/// `PartiallyFailed` is reserved for stages producing several artifacts;
/// no current stage emits it and it counts as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperStatus {
    Completed,
    PartiallyFailed(Stage),
    Failed(Stage),
}

impl PaperStatus {
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Completed)
    }

    pub fn failed_stage(self) -> Option<Stage> {
        match self {
            Self::Completed => None,
            Self::PartiallyFailed(s) | Self::Failed(s) => Some(s),
        }
    }
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::PartiallyFailed(s) => write!(f, "partially failed at {s}"),
            Self::Failed(s) => write!(f, "failed at {s}"),
        }
    }
}

/// Files produced for a paper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifacts {
    pub source: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// Frozen record of one paper's run through the pipeline.
///
/// Only [`PaperPipeline`](crate::PaperPipeline) builds these; fields are
/// read-only once handed back to the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperOutcome {
    paper_id: String,
    status: PaperStatus,
    stages: Vec<StageRecord>,
    elapsed: Duration,
    artifacts: Artifacts,
}

impl PaperOutcome {
    pub(crate) fn new(
        paper: &Paper,
        status: PaperStatus,
        stages: Vec<StageRecord>,
        elapsed: Duration,
        artifacts: Artifacts,
    ) -> Self {
        Self {
            paper_id: paper.id.clone(),
            status,
            stages,
            elapsed,
            artifacts,
        }
    }

    /// Outcome for a paper that never entered the pipeline because of shutdown
    pub(crate) fn not_started(paper: &Paper) -> Self {
        let record = StageRecord {
            stage: Stage::Retrieve,
            result: StageResult::FatalFailure {
                error: StageError::interrupted(),
                attempts: 0,
            },
            attempts: 0,
            elapsed: Duration::ZERO,
        };
        Self::new(
            paper,
            PaperStatus::Failed(Stage::Retrieve),
            vec![record],
            Duration::ZERO,
            Artifacts::default(),
        )
    }

    pub fn paper_id(&self) -> &str {
        &self.paper_id
    }

    pub fn status(&self) -> PaperStatus {
        self.status
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// The error that ended the pipeline, if any
    pub fn failure(&self) -> Option<&StageError> {
        if !self.status.is_failure() {
            return None;
        }
        self.stages.last().and_then(|r| r.result.error())
    }

    pub fn was_interrupted(&self) -> bool {
        self.failure()
            .is_some_and(|e| e.kind == ErrorKind::Interrupted)
    }
}

/// Process exit status derived from a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    TotalFailure,
    PartialFailure,
    Interrupted,
}

impl ExitStatus {
    /// Pure mapping from batch counts.
    ///
    /// `0` when nothing failed and something succeeded, `1` when nothing
    /// succeeded (including an empty batch), `2` otherwise.
    pub fn from_counts(succeeded: usize, failed: usize, total: usize) -> Self {
        if succeeded == 0 {
            Self::TotalFailure
        } else if failed == 0 {
            Self::Success
        } else if failed < total {
            Self::PartialFailure
        } else {
            Self::TotalFailure
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::TotalFailure => 1,
            Self::PartialFailure => 2,
            Self::Interrupted => 130,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::TotalFailure => "total failure",
            Self::PartialFailure => "partial failure",
            Self::Interrupted => "interrupted",
        };
        write!(f, "{label} ({})", self.code())
    }
}

/// Aggregate over every paper in one invocation.
#[derive(Debug, Clone)]
pub struct BatchReport {
    outcomes: Vec<PaperOutcome>,
    succeeded: usize,
    failed: usize,
    elapsed: Duration,
    interrupted: bool,
    discovery_error: Option<StageError>,
}

impl BatchReport {
    pub(crate) fn new(outcomes: Vec<PaperOutcome>, elapsed: Duration, interrupted: bool) -> Self {
        let succeeded = outcomes
            .iter()
            .filter(|o| o.status() == PaperStatus::Completed)
            .count();
        let failed = outcomes.len() - succeeded;
        let interrupted = interrupted || outcomes.iter().any(PaperOutcome::was_interrupted);
        Self {
            outcomes,
            succeeded,
            failed,
            elapsed,
            interrupted,
            discovery_error: None,
        }
    }

    pub(crate) fn discovery_failed(error: StageError, elapsed: Duration) -> Self {
        let interrupted = error.kind == ErrorKind::Interrupted;
        let mut report = Self::new(Vec::new(), elapsed, interrupted);
        report.discovery_error = Some(error);
        report
    }

    pub fn outcomes(&self) -> &[PaperOutcome] {
        &self.outcomes
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn discovery_error(&self) -> Option<&StageError> {
        self.discovery_error.as_ref()
    }

    /// Count of failed papers per failing stage
    pub fn failures_by_stage(&self) -> Vec<(Stage, usize)> {
        let mut counts: Vec<(Stage, usize)> = Vec::new();
        for stage in self.outcomes.iter().filter_map(|o| o.status().failed_stage()) {
            match counts.iter_mut().find(|(s, _)| *s == stage) {
                Some((_, n)) => *n += 1,
                None => counts.push((stage, 1)),
            }
        }
        counts.sort();
        counts
    }

    pub fn completed(&self) -> impl Iterator<Item = &PaperOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status() == PaperStatus::Completed)
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.interrupted {
            return ExitStatus::Interrupted;
        }
        ExitStatus::from_counts(self.succeeded, self.failed, self.total())
    }
}
