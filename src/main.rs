mod chain;
mod checksum;
mod cli;
mod config;
mod dir_list;
mod error;
mod fingerprint;
mod index;
mod index_file;
mod progress;
mod prune;
mod relocate;
mod resolve;

use chain::{BackupSummary, run_backup};
use cli::Cli;
use error::{BackupError, ExitStatus};
use progress::{NoProgress, ProgressReporter, TerminalProgress};
use relocate::Outcome;
use std::fmt as stdfmt;
use std::io::{IsTerminal, stderr};
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber, error, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.explicit_log_level());

    match run(&cli) {
        Ok(summary) => {
            report_summary(&summary);
            ExitStatus::Success.into()
        }
        Err(err) => {
            error!("{err}");
            exit_status_of(&err).into()
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<BackupSummary> {
    let progress: Box<dyn ProgressReporter> = if cli.no_progress || !stderr().is_terminal() {
        Box::new(NoProgress)
    } else {
        Box::new(TerminalProgress::new())
    };

    let summary = run_backup(&cli.target, &cli.settings(), progress.as_ref())?;
    Ok(summary)
}

fn exit_status_of(err: &anyhow::Error) -> ExitStatus {
    err.downcast_ref::<BackupError>()
        .map(BackupError::exit_status)
        .unwrap_or(ExitStatus::Configuration)
}

fn report_summary(summary: &BackupSummary) {
    if summary.initial {
        info!("Initial backup created in {}", summary.generation.display());
    } else if summary.resumed {
        info!("Backup continued in {}", summary.generation.display());
    } else {
        info!("Backup created in {}", summary.generation.display());
    }

    let report = &summary.report;
    info!(
        "Relocated {} files, copied {} files, skipped {} files",
        report.count(Outcome::Relocated),
        report.count(Outcome::Copied),
        report.count(Outcome::Skipped)
    );

    if summary.pruned_directories > 0 {
        info!(
            "Removed {} empty directories from the previous backup",
            summary.pruned_directories
        );
    }

    if !report.failures.is_empty() {
        warn!("{} files could not be backed up", report.failures.len());
    }
}

/// Installs the stderr logger. An explicit level from the command line wins
/// over `RUST_LOG`; without one `RUST_LOG` applies, defaulting to warnings.
fn init_tracing(explicit_level: Option<Level>) {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = EmojiFormatter { stderr_is_terminal };

    let filter = match explicit_level {
        Some(level) => EnvFilter::default().add_directive(LevelFilter::from_level(level).into()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

struct EmojiFormatter {
    stderr_is_terminal: bool,
}

impl<S, N> FormatEvent<S, N> for EmojiFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        if self.stderr_is_terminal {
            match *event.metadata().level() {
                Level::DEBUG => write!(writer, "🔍 ")?,
                Level::INFO => write!(writer, "ℹ️ ")?,
                Level::WARN => write!(writer, "⚠️  ")?,
                Level::ERROR => write!(writer, "❌️ ")?,
                _ => write!(writer, "🔬 ")?,
            }
        } else {
            match *event.metadata().level() {
                Level::DEBUG => writer.write_str("DEBUG: ")?,
                Level::INFO => writer.write_str("INFO: ")?,
                Level::WARN => writer.write_str("WARN: ")?,
                Level::ERROR => writer.write_str("ERROR: ")?,
                _ => writer.write_str("TRACE: ")?,
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
