//! `papertrack run` - discover papers, then retrieve, summarize and report each

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use papertrack_arxiv::{ArxivSource, PdfRetriever};
use papertrack_core::{
    fmt_duration, BatchCoordinator, BatchReport, BatchRun, CitationClassifier, CitationCriteria,
    ClassicStrategy, Collaborators, Discoverer, DiscoveryPlan, ExitStatus, Paper, PaperPipeline,
    PipelinePolicies, RateGate, Retrier, SharedProgress, Shutdown,
};
use papertrack_llm::{ChatClient, ChatSettings};
use papertrack_report::{write_index, IndexEntry, MarkdownReporter, PdfExtractor, SearchSummary};
use papertrack_scholar::ScholarClient;

use crate::config::{Config, StrategyName};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// arXiv category (e.g. cs.AI, cs.LG, cs.CV)
    #[arg(long)]
    pub category: Option<String>,

    /// Search papers submitted in the last N days
    #[arg(long)]
    pub days: Option<u32>,

    /// Maximum number of papers to process
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Directory for reports, the index and downloaded PDFs
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Look for influential papers from past years instead of new submissions
    #[arg(long)]
    pub classic: bool,

    /// Classic-paper selection strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyName>,

    /// How many years back classic mode searches
    #[arg(long)]
    pub years_back: Option<u32>,

    /// Comma-separated keywords (classic mode)
    #[arg(long, value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Number of papers processed in parallel
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// File config with command-line values layered on top
fn apply_overrides(config: &Config, args: &RunArgs) -> Config {
    let mut config = config.clone();
    if let Some(category) = &args.category {
        config.search.category = category.clone();
    }
    if let Some(days) = args.days {
        config.search.days = days;
    }
    if let Some(n) = args.max_results {
        config.search.max_results = n;
    }
    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }
    if let Some(strategy) = args.strategy {
        config.classic.strategy = strategy;
    }
    if let Some(years) = args.years_back {
        config.classic.years_back = years;
    }
    if let Some(workers) = args.workers {
        config.workers.concurrency = workers;
    }
    config
}

fn clean_keywords(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn build_plan(
    config: &Config,
    classic: bool,
    keywords: Vec<String>,
    retrier: &Retrier,
) -> Result<DiscoveryPlan> {
    let search = &config.search;
    if !classic {
        if !keywords.is_empty() {
            log::warn!("--keywords only applies to classic mode, ignoring");
        }
        return Ok(DiscoveryPlan::Recent {
            category: search.category.clone(),
            days: search.days,
            max_results: search.max_results,
        });
    }

    let classic_cfg = &config.classic;
    let strategy = match classic_cfg.strategy {
        StrategyName::Relevance => ClassicStrategy::Relevance {
            keywords: keywords.clone(),
        },
        StrategyName::Citation => {
            let scholar = ScholarClient::new(
                config.scholar.base_url.clone(),
                config.scholar.api_key.clone(),
                Duration::from_secs(config.scholar.timeout_secs),
            );
            ClassicStrategy::Citation(CitationCriteria {
                min_citations: classic_cfg.min_citations,
                min_influential: classic_cfg.min_influential_citations,
                lookup: Arc::new(scholar),
                gate: Arc::new(RateGate::new(Duration::from_millis(
                    classic_cfg.request_delay_ms,
                ))),
                policy: config.retry.citation.policy(),
            })
        }
    };

    Ok(DiscoveryPlan::Classic {
        category: search.category.clone(),
        keywords,
        sort: classic_cfg.sort_order()?,
        years_back: classic_cfg.years_back,
        max_results: search.max_results,
        classifier: CitationClassifier::new(strategy, retrier.clone()),
    })
}

fn build_pipeline(config: &Config, retrier: Retrier) -> PaperPipeline {
    let llm = &config.llm;
    let collab = Collaborators {
        retriever: Arc::new(PdfRetriever::new(Duration::from_secs(
            config.arxiv.stall_timeout_secs,
        ))),
        extractor: Arc::new(PdfExtractor::default()),
        summarizer: Arc::new(ChatClient::new(ChatSettings {
            endpoint: llm.endpoint.clone(),
            api_key: llm.api_key.clone().unwrap_or_default(),
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            timeout: Duration::from_secs(llm.timeout_secs),
            max_content_length: llm.content_limit(),
        })),
        reporter: Arc::new(MarkdownReporter::new(config.output.directory.clone())),
    };
    let policies = PipelinePolicies {
        retrieval: config.retry.retrieval.policy(),
        summarize: config.retry.summarize.policy(),
        report: config.retry.report.policy(),
    };
    PaperPipeline::new(collab, policies, retrier)
        .with_source_dir(config.output.directory.join("pdfs"))
}

fn search_summary(config: &Config, plan: &DiscoveryPlan) -> SearchSummary {
    let (window, mode) = match plan {
        DiscoveryPlan::Recent { days, .. } => (format!("last {days} days"), "recent".to_string()),
        DiscoveryPlan::Classic {
            years_back,
            classifier,
            ..
        } => (
            format!("last {years_back} years"),
            format!("classic ({})", classifier.strategy().name()),
        ),
    };
    SearchSummary {
        category: config.search.category.clone(),
        window,
        max_results: plan.max_results(),
        mode,
    }
}

/// Completed papers paired with their report files, in discovery order
fn index_entries<'a>(papers: &'a [Paper], report: &'a BatchReport) -> Vec<IndexEntry<'a>> {
    report
        .completed()
        .filter_map(|outcome| {
            let path = outcome.artifacts().report.as_deref()?;
            let paper = papers.iter().find(|p| p.id == outcome.paper_id())?;
            Some(IndexEntry {
                paper,
                report: path,
            })
        })
        .collect()
}

/// Index failures are logged only; they never change the exit status.
fn write_run_index(dir: &Path, run: &BatchRun, search: &SearchSummary) -> Option<PathBuf> {
    let entries = index_entries(&run.papers, &run.report);
    if entries.is_empty() {
        return None;
    }
    match write_index(dir, &entries, Some(search)) {
        Ok(path) => Some(path),
        Err(e) => {
            log::error!("Failed to write index: {e}");
            None
        }
    }
}

pub fn run(args: RunArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let config = apply_overrides(config, &args);
    config.validate()?;

    let shutdown = Shutdown::global();
    let retrier = Retrier::threaded(shutdown.clone());
    let keywords = clean_keywords(&args.keywords);
    let plan = build_plan(&config, args.classic, keywords, &retrier)?;
    let output_dir = config.output.directory.clone();

    match &plan {
        DiscoveryPlan::Recent { days, .. } => log::info!(
            "Searching {} for papers from the last {days} days (max {})",
            config.search.category,
            plan.max_results()
        ),
        DiscoveryPlan::Classic {
            keywords,
            years_back,
            classifier,
            ..
        } => log::info!(
            "Searching {} for classic papers from the last {years_back} years \
             (strategy: {}, keywords: [{}], max {})",
            config.search.category,
            classifier.strategy().name(),
            keywords.join(", "),
            plan.max_results()
        ),
    }

    let source = ArxivSource::new(
        config.arxiv.base_url.clone(),
        Duration::from_secs(config.arxiv.timeout_secs),
    );
    let discoverer = Discoverer::new(
        Arc::new(source),
        config.retry.discovery.policy(),
        retrier.clone(),
    );
    let coordinator = BatchCoordinator::new(
        build_pipeline(&config, retrier),
        config.workers.concurrency,
        shutdown,
    )
    .with_progress(Arc::clone(progress));

    let run = coordinator.discover_and_run(&discoverer, &plan, Utc::now());

    for (id, e) in &run.lookup_failures {
        log::warn!("{id}: excluded, citation lookup failed: {e}");
    }

    let index = write_run_index(&output_dir, &run, &search_summary(&config, &plan));
    print_summary(&run.report, &output_dir, index.as_deref(), progress.is_tty());

    Ok(ExitCode::from(run.report.exit_status().code()))
}

fn summary_rows(report: &BatchReport, output_dir: &Path, index: Option<&Path>) -> Vec<(String, String)> {
    let mut rows = vec![
        ("Papers".to_string(), report.total().to_string()),
        ("Succeeded".to_string(), report.succeeded().to_string()),
        ("Failed".to_string(), report.failed().to_string()),
    ];
    for (stage, n) in report.failures_by_stage() {
        rows.push((format!("  failed at {stage}"), n.to_string()));
    }
    if let Some(e) = report.discovery_error() {
        rows.push(("Discovery error".to_string(), e.to_string()));
    }
    rows.push(("Elapsed".to_string(), fmt_duration(report.elapsed())));
    rows.push(("Output directory".to_string(), output_dir.display().to_string()));
    rows.push((
        "Index".to_string(),
        index.map_or("-".to_string(), |p| p.display().to_string()),
    ));
    let status = report.exit_status();
    rows.push((
        "Exit status".to_string(),
        format!("{} ({status})", status.code()),
    ));
    rows
}

/// Summary table on stderr (TTY) or log lines (piped)
fn print_summary(report: &BatchReport, output_dir: &Path, index: Option<&Path>, is_tty: bool) {
    let rows = summary_rows(report, output_dir, index);
    if !is_tty {
        for (label, value) in &rows {
            log::info!("{}: {value}", label.trim());
        }
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Run summary").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    let status = report.exit_status();
    for (label, value) in rows {
        let cell = Cell::new(&value);
        let cell = match (label.as_str(), status) {
            ("Exit status", ExitStatus::Success) => cell.fg(Color::Green),
            ("Exit status", _) => cell.fg(Color::Red),
            _ => cell,
        };
        table.add_row(vec![Cell::new(label), cell]);
    }
    eprintln!("\n{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrier() -> Retrier {
        Retrier::threaded(Shutdown::new())
    }

    #[test]
    fn overrides_layer_on_file_values() {
        let mut file = Config::default();
        file.search.category = "cs.CV".to_string();
        file.search.days = 14;

        let args = RunArgs {
            category: Some("cs.CL".to_string()),
            max_results: Some(12),
            output_dir: Some(PathBuf::from("/tmp/out")),
            strategy: Some(StrategyName::Citation),
            workers: Some(6),
            ..RunArgs::default()
        };
        let merged = apply_overrides(&file, &args);
        assert_eq!(merged.search.category, "cs.CL");
        assert_eq!(merged.search.days, 14);
        assert_eq!(merged.search.max_results, 12);
        assert_eq!(merged.output.directory, PathBuf::from("/tmp/out"));
        assert_eq!(merged.classic.strategy, StrategyName::Citation);
        assert_eq!(merged.workers.concurrency, 6);
    }

    #[test]
    fn keywords_are_trimmed() {
        let raw = vec![" transformer ".to_string(), String::new(), "rlhf".to_string()];
        assert_eq!(clean_keywords(&raw), vec!["transformer", "rlhf"]);
    }

    #[test]
    fn recent_plan_by_default() {
        let config = Config::default();
        let plan = build_plan(&config, false, vec![], &retrier()).unwrap();
        assert!(matches!(
            plan,
            DiscoveryPlan::Recent { days: 7, max_results: 5, .. }
        ));
        let summary = search_summary(&config, &plan);
        assert_eq!(summary.window, "last 7 days");
        assert_eq!(summary.mode, "recent");
    }

    #[test]
    fn classic_plan_uses_configured_strategy() {
        let mut config = Config::default();
        let plan = build_plan(&config, true, vec!["graph".to_string()], &retrier()).unwrap();
        match &plan {
            DiscoveryPlan::Classic {
                keywords,
                years_back,
                classifier,
                ..
            } => {
                assert_eq!(keywords, &vec!["graph".to_string()]);
                assert_eq!(*years_back, 3);
                assert_eq!(classifier.strategy().name(), "relevance");
            }
            DiscoveryPlan::Recent { .. } => panic!("expected classic plan"),
        }

        config.classic.strategy = StrategyName::Citation;
        config.classic.years_back = 5;
        let plan = build_plan(&config, true, vec![], &retrier()).unwrap();
        let summary = search_summary(&config, &plan);
        assert_eq!(summary.window, "last 5 years");
        assert_eq!(summary.mode, "classic (citation)");
    }

    #[test]
    fn bad_sort_order_fails_plan() {
        let mut config = Config::default();
        config.classic.sort_by = "stars".to_string();
        assert!(build_plan(&config, true, vec![], &retrier()).is_err());
    }
}
