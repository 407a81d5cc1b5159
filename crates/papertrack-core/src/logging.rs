//! Logging through `env_logger`, routed around indicatif progress lines in TTY mode

use std::fmt;

use indicatif::MultiProgress;

/// HTTP stack crates that are noisy at info/debug
const QUIET_DEPS: &str = "hyper=warn,hyper_util=warn,reqwest=warn,native_tls=warn";

/// `[LEVEL]` tag, optionally colored.
struct LevelTag {
    level: log::Level,
    color: bool,
}

impl fmt::Display for LevelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ansi, label) = match self.level {
            log::Level::Error => ("\x1b[31m", "ERROR"),
            log::Level::Warn => ("\x1b[33m", "WARN "),
            log::Level::Info => ("\x1b[32m", "INFO "),
            log::Level::Debug => ("\x1b[36m", "DEBUG"),
            log::Level::Trace => ("\x1b[35m", "TRACE"),
        };
        if self.color {
            write!(f, "[{ansi}{label}\x1b[0m]")
        } else {
            write!(f, "[{label}]")
        }
    }
}

/// Records from outside this workspace carry their target so a stray
/// dependency line is attributable.
fn origin<'a>(record: &'a log::Record<'a>) -> Option<&'a str> {
    let target = record.target();
    (!target.starts_with("papertrack")).then_some(target)
}

fn render(record: &log::Record, color: bool) -> String {
    let tag = LevelTag {
        level: record.level(),
        color,
    };
    match origin(record) {
        Some(target) => format!("{tag} {target}: {}", record.args()),
        None => format!("{tag} {}", record.args()),
    }
}

/// Default filter when `RUST_LOG` is unset
fn default_filter(quiet: bool, debug: bool) -> String {
    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    format!("{level},{QUIET_DEPS}")
}

/// Logger that prints through indicatif MultiProgress so paper spinners stay intact.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        // Only installed in TTY mode, so always colored
        let line = render(record, true);
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize logging; pass the progress `MultiProgress` in TTY mode.
///
/// `RUST_LOG` replaces the default filter entirely.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let filter = default_filter(quiet, debug);
    let env = env_logger::Env::default().default_filter_or(filter);

    match multi {
        Some(multi) => {
            let logger = env_logger::Builder::from_env(env).build();
            let max_level = logger.filter();
            log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone())))
                .expect("failed to init logger");
            log::set_max_level(max_level);
        }
        None => {
            env_logger::Builder::from_env(env)
                .format(|buf, record| writeln!(buf, "{}", render(record, false)))
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_line(target: &str, level: log::Level, color: bool) -> String {
        render(
            &log::Record::builder()
                .args(format_args!("hello"))
                .level(level)
                .target(target)
                .build(),
            color,
        )
    }

    #[test]
    fn filter_precedence() {
        assert!(default_filter(true, true).starts_with("debug,"));
        assert!(default_filter(true, false).starts_with("warn,"));
        assert!(default_filter(false, false).starts_with("info,"));
        assert!(default_filter(false, false).contains("reqwest=warn"));
    }

    #[test]
    fn own_records_are_bare() {
        assert_eq!(
            record_line("papertrack_core::pipeline", log::Level::Warn, false),
            "[WARN ] hello"
        );
    }

    #[test]
    fn foreign_records_carry_target() {
        assert_eq!(
            record_line("hyper::proto", log::Level::Error, false),
            "[ERROR] hyper::proto: hello"
        );
    }

    #[test]
    fn colored_tag_resets() {
        let line = record_line("papertrack_cli", log::Level::Info, true);
        assert!(line.starts_with("[\x1b[32mINFO \x1b[0m]"));
    }
}
