//! Per-paper state machine: Retrieve -> Summarize -> Report.
//!
//! Each stage runs its collaborator call under that stage's retry policy.
//! The first stage that fails fatally ends the paper; later stages never run.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;

use crate::collab::{Extractor, ReportWriter, Retriever, Summarizer};
use crate::error::{ErrorKind, StageError};
use crate::model::{Artifacts, Paper, PaperOutcome, PaperStatus, Stage, StageRecord, StageResult};
use crate::retry::{RetryPolicy, Retrier};

/// One logical stage: a retry policy plus uniform failure logging.
#[derive(Debug, Clone)]
pub struct StageRunner {
    stage: Stage,
    policy: RetryPolicy,
    retrier: Retrier,
}

impl StageRunner {
    pub fn new(stage: Stage, policy: RetryPolicy, retrier: Retrier) -> Self {
        Self {
            stage,
            policy,
            retrier,
        }
    }

    /// Run `op` for `subject` (a paper id or search label).
    ///
    /// Returns the stage record alongside the payload or the final error.
    pub fn run<T>(
        &self,
        subject: &str,
        op: impl FnMut() -> Result<T, StageError>,
    ) -> (StageRecord, Result<T, StageError>) {
        let start = Instant::now();
        let label = format!("{subject} [{}]", self.stage);
        let exec = self.retrier.execute(&label, &self.policy, op);

        let (result, payload) = match exec.result {
            StageResult::Success(v) => (StageResult::Success(()), Ok(v)),
            StageResult::RecoverableFailure { error, .. }
            | StageResult::FatalFailure { error, .. } => {
                log_stage_failure(subject, self.stage, &error, exec.attempts);
                let result = StageResult::FatalFailure {
                    error: error.clone(),
                    attempts: exec.attempts,
                };
                (result, Err(error))
            }
        };
        let record = StageRecord {
            stage: self.stage,
            result,
            attempts: exec.attempts,
            elapsed: start.elapsed(),
        };
        (record, payload)
    }
}

fn log_stage_failure(subject: &str, stage: Stage, error: &StageError, attempts: u32) {
    if error.kind == ErrorKind::Interrupted {
        log::warn!("{subject}: {stage} interrupted");
    } else {
        log::error!(
            "{subject}: {stage} failed [{}] after {attempts} attempt(s): {}",
            error.kind,
            error.message
        );
    }
}

/// Retry policies for the per-paper stages.
#[derive(Debug, Clone, Default)]
pub struct PipelinePolicies {
    pub retrieval: RetryPolicy,
    pub summarize: RetryPolicy,
    pub report: RetryPolicy,
}

/// External services a pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub retriever: Arc<dyn Retriever>,
    pub extractor: Arc<dyn Extractor>,
    pub summarizer: Arc<dyn Summarizer>,
    pub reporter: Arc<dyn ReportWriter>,
}

/// File name for a saved source document: `<id>_<title>.pdf`.
///
/// `/` in old-style ids becomes `_`; title characters other than
/// alphanumerics, space, `-` and `_` become `_`; title clipped to 100 chars.
pub fn source_file_name(paper: &Paper) -> String {
    let safe_title: String = paper
        .title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    format!("{}_{safe_title}.pdf", paper.id.replace('/', "_"))
}

/// Drives one paper through the stages.
pub struct PaperPipeline {
    collab: Collaborators,
    retrieve: StageRunner,
    summarize: StageRunner,
    report: StageRunner,
    source_dir: Option<PathBuf>,
}

impl PaperPipeline {
    pub fn new(collab: Collaborators, policies: PipelinePolicies, retrier: Retrier) -> Self {
        Self {
            collab,
            retrieve: StageRunner::new(Stage::Retrieve, policies.retrieval, retrier.clone()),
            summarize: StageRunner::new(Stage::Summarize, policies.summarize, retrier.clone()),
            report: StageRunner::new(Stage::Report, policies.report, retrier),
            source_dir: None,
        }
    }

    /// Save retrieved source documents under `dir`
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    pub fn run(&self, paper: &Paper) -> PaperOutcome {
        self.run_with_progress(paper, &ProgressBar::hidden())
    }

    pub fn run_with_progress(&self, paper: &Paper, pb: &ProgressBar) -> PaperOutcome {
        let start = Instant::now();
        let mut stages = Vec::with_capacity(Stage::PAPER_STAGES.len());
        let mut artifacts = Artifacts::default();

        let finish = |status, stages, artifacts| {
            PaperOutcome::new(paper, status, stages, start.elapsed(), artifacts)
        };

        // Retrieve
        pb.set_message("retrieving...");
        let (record, fetched) = self.retrieve.run(&paper.id, || self.fetch_source(paper));
        stages.push(record);
        let Ok((raw, source)) = fetched else {
            return finish(PaperStatus::Failed(Stage::Retrieve), stages, artifacts);
        };
        artifacts.source = source;

        // Summarize (extraction runs once, outside the retry loop)
        pb.set_message("extracting text...");
        let extract_start = Instant::now();
        let extracted =
            panic::catch_unwind(AssertUnwindSafe(|| self.collab.extractor.extract(&raw)))
                .unwrap_or_else(|payload| {
                    Err(StageError::from_panic(
                        ErrorKind::ExtractionFailed,
                        "text extraction",
                        payload.as_ref(),
                    ))
                });
        let text = match extracted {
            Ok(text) => text,
            Err(error) => {
                log_stage_failure(&paper.id, Stage::Summarize, &error, 1);
                stages.push(StageRecord {
                    stage: Stage::Summarize,
                    result: StageResult::FatalFailure { error, attempts: 1 },
                    attempts: 1,
                    elapsed: extract_start.elapsed(),
                });
                return finish(PaperStatus::Failed(Stage::Summarize), stages, artifacts);
            }
        };
        drop(raw);
        log::debug!("{}: extracted {} chars", paper.id, text.len());

        pb.set_message("summarizing...");
        let prompt = self.collab.summarizer.prompt(paper, &text);
        let (mut record, analysis) = self
            .summarize
            .run(&paper.id, || self.collab.summarizer.complete(&prompt));
        record.elapsed = extract_start.elapsed();
        stages.push(record);
        let Ok(analysis) = analysis else {
            return finish(PaperStatus::Failed(Stage::Summarize), stages, artifacts);
        };

        // Report
        pb.set_message("writing report...");
        let (record, written) = self
            .report
            .run(&paper.id, || self.collab.reporter.write(paper, &analysis));
        stages.push(record);
        let Ok(path) = written else {
            return finish(PaperStatus::Failed(Stage::Report), stages, artifacts);
        };
        artifacts.report = Some(path);

        finish(PaperStatus::Completed, stages, artifacts)
    }

    fn fetch_source(&self, paper: &Paper) -> Result<(Vec<u8>, Option<PathBuf>), StageError> {
        let raw = self.collab.retriever.fetch(paper)?;
        let Some(dir) = &self.source_dir else {
            return Ok((raw, None));
        };
        std::fs::create_dir_all(dir)
            .map_err(|e| StageError::from_io(&format!("create {}", dir.display()), &e))?;
        let path = dir.join(source_file_name(paper));
        std::fs::write(&path, &raw)
            .map_err(|e| StageError::from_io(&format!("save {}", path.display()), &e))?;
        log::debug!("{}: saved {} bytes to {}", paper.id, raw.len(), path.display());
        Ok((raw, Some(path)))
    }
}
