//! papertrack - track new and classic arXiv papers
//!
//! Searches arXiv, downloads each paper, has an LLM write a reading report
//! and collects the reports under one output directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use papertrack_core::{ExitStatus, Shutdown};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "papertrack")]
#[command(about = "Track arXiv papers and write LLM reading reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Config file path (default: ./papertrack.toml or ~/.config/papertrack/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Search, download, summarize and report
    Run(cmd::run::RunArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(papertrack_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress lines show activity
    //   non-TTY: info unless --quiet or --debug
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    papertrack_core::init_logging(quiet, cli.debug, multi);

    setup_signal_handler();

    match try_main(cli, &progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(ExitStatus::TotalFailure.code())
        }
    }
}

fn try_main(cli: Cli, progress: &papertrack_core::SharedProgress) -> Result<ExitCode> {
    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, progress),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// First SIGINT/SIGTERM requests a graceful stop, the second exits at once.
fn setup_signal_handler() {
    let shutdown = Shutdown::global();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        let flag = shutdown.clone();
        // SAFETY: the handler only swaps an AtomicBool and calls process::exit
        let registered = unsafe {
            signal_hook::low_level::register(signal, move || {
                if flag.request() {
                    std::process::exit(i32::from(ExitStatus::Interrupted.code()));
                }
            })
        };
        if let Err(e) = registered {
            log::warn!("Cannot install handler for signal {signal}: {e}");
        }
    }
}

fn print_config(config: &Config) {
    use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let configured = |key: &Option<String>| {
        if key.as_deref().is_some_and(|k| !k.is_empty()) {
            "configured"
        } else {
            "not set"
        }
    };

    table.add_row(vec![
        "Output directory",
        &config.output.directory.display().to_string(),
    ]);
    table.add_row(vec!["Category", &config.search.category]);
    table.add_row(vec!["Days", &config.search.days.to_string()]);
    table.add_row(vec!["Max results", &config.search.max_results.to_string()]);
    table.add_row(vec!["Workers", &config.workers.concurrency.to_string()]);
    table.add_row(vec!["LLM endpoint", &config.llm.endpoint]);
    table.add_row(vec!["LLM model", &config.llm.model]);
    table.add_row(vec!["LLM API key", configured(&config.llm.api_key)]);
    table.add_row(vec![
        "Max content length",
        &config
            .llm
            .content_limit()
            .map_or("unlimited".to_string(), |n| n.to_string()),
    ]);
    table.add_row(vec!["arXiv API", &config.arxiv.base_url]);
    table.add_row(vec!["S2 API", &config.scholar.base_url]);
    table.add_row(vec!["S2 API key", configured(&config.scholar.api_key)]);
    table.add_row(vec![
        "Classic strategy",
        &config.classic.strategy.to_string(),
    ]);
    table.add_row(vec![
        "Citation thresholds",
        &format!(
            "{} total, {} influential",
            config.classic.min_citations, config.classic.min_influential_citations
        ),
    ]);
    table.add_row(vec![
        "Lookup delay",
        &format!("{}ms", config.classic.request_delay_ms),
    ]);
    for (name, policy) in [
        ("Retry discovery", &config.retry.discovery),
        ("Retry citation", &config.retry.citation),
        ("Retry retrieval", &config.retry.retrieval),
        ("Retry summarize", &config.retry.summarize),
        ("Retry report", &config.retry.report),
    ] {
        let kinds: Vec<&str> = policy.retryable.iter().map(|k| k.as_str()).collect();
        table.add_row(vec![
            name,
            &format!(
                "{}x, {}ms x{} [{}]",
                policy.max_attempts,
                policy.base_delay_ms,
                policy.backoff_multiplier,
                kinds.join(", ")
            ),
        ]);
    }

    eprintln!("\n{table}");
}
