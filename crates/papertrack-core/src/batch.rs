//! Batch coordination: run every paper, aggregate outcomes.
//!
//! Workers pull papers from a [`WorkQueue`] inside a rayon scope. One paper
//! failing never stops the batch; shutdown stops claiming new papers and
//! records the rest as interrupted.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::discover::{DiscoveryPlan, Discoverer};
use crate::error::StageError;
use crate::model::{BatchReport, Paper, PaperOutcome, PaperStatus};
use crate::pipeline::PaperPipeline;
use crate::progress::{ProgressContext, SharedProgress};
use crate::shutdown::Shutdown;
use crate::work_queue::WorkQueue;

/// Discovery plus processing of one invocation.
#[derive(Debug)]
pub struct BatchRun {
    /// Papers handed to the pipeline, in discovery order
    pub papers: Vec<Paper>,
    pub lookup_failures: Vec<(String, StageError)>,
    pub report: BatchReport,
}

pub struct BatchCoordinator {
    pipeline: PaperPipeline,
    workers: usize,
    shutdown: Shutdown,
    progress: SharedProgress,
}

impl BatchCoordinator {
    pub fn new(pipeline: PaperPipeline, workers: usize, shutdown: Shutdown) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
            shutdown,
            progress: Arc::new(ProgressContext::hidden()),
        }
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run the pipeline once per paper and aggregate.
    ///
    /// Outcomes come back in input order regardless of completion order.
    pub fn run(&self, papers: &[Paper]) -> BatchReport {
        self.process(papers, false)
    }

    /// `cut_short` marks a batch whose discovery already stopped on shutdown.
    fn process(&self, papers: &[Paper], cut_short: bool) -> BatchReport {
        let start = Instant::now();
        let interrupted = || cut_short || self.shutdown.is_requested();
        if papers.is_empty() {
            log::warn!("No papers to process");
            return BatchReport::new(Vec::new(), start.elapsed(), interrupted());
        }

        let workers = self.workers.min(papers.len());
        log::info!("Processing {} papers with {} workers", papers.len(), workers);

        let queue = WorkQueue::new(papers.iter().collect::<Vec<_>>());
        let done: Mutex<Vec<(usize, PaperOutcome)>> = Mutex::new(Vec::with_capacity(papers.len()));
        let overall = self.progress.batch_bar(papers.len());

        rayon::scope(|s| {
            for _ in 0..workers {
                s.spawn(|_| {
                    while let Some((idx, paper)) = queue.next() {
                        if self.shutdown.is_requested() {
                            let outcome = PaperOutcome::not_started(paper);
                            done.lock().expect("outcome mutex poisoned").push((idx, outcome));
                            break;
                        }

                        let pb = self.progress.paper_line(&paper.id);
                        let outcome = self.pipeline.run_with_progress(paper, &pb);
                        pb.finish_and_clear();
                        overall.inc(1);

                        if outcome.status() == PaperStatus::Completed {
                            log::info!(
                                "{}: completed in {:.1}s",
                                paper.id,
                                outcome.elapsed().as_secs_f64()
                            );
                        }
                        done.lock().expect("outcome mutex poisoned").push((idx, outcome));
                    }
                });
            }
        });
        overall.finish_and_clear();

        let mut outcomes = done.into_inner().expect("outcome mutex poisoned");
        let skipped = queue.unclaimed().count();
        if skipped > 0 {
            log::warn!("Shutdown: {skipped} papers not started");
        }
        outcomes.extend(
            queue
                .unclaimed()
                .map(|(idx, paper)| (idx, PaperOutcome::not_started(paper))),
        );
        outcomes.sort_by_key(|(idx, _)| *idx);

        let outcomes = outcomes.into_iter().map(|(_, o)| o).collect();
        BatchReport::new(outcomes, start.elapsed(), interrupted())
    }

    /// Discover the batch, then run it.
    ///
    /// A failed search yields an empty report carrying the discovery error.
    pub fn discover_and_run(
        &self,
        discoverer: &Discoverer,
        plan: &DiscoveryPlan,
        now: DateTime<Utc>,
    ) -> BatchRun {
        let start = Instant::now();
        match discoverer.discover(plan, now) {
            Ok(found) => {
                if found.interrupted {
                    log::warn!(
                        "Discovery interrupted with {} papers selected",
                        found.papers.len()
                    );
                } else if found.papers.is_empty() {
                    log::warn!("No papers found ({} candidates examined)", found.candidates);
                } else {
                    log::info!("Selected {} papers", found.papers.len());
                }
                let report = self.process(&found.papers, found.interrupted);
                BatchRun {
                    papers: found.papers,
                    lookup_failures: found.lookup_failures,
                    report,
                }
            }
            Err(error) => {
                log::error!("Discovery failed: {error}");
                BatchRun {
                    papers: Vec::new(),
                    lookup_failures: Vec::new(),
                    report: BatchReport::discovery_failed(error, start.elapsed()),
                }
            }
        }
    }
}
