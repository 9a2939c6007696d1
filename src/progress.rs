//! Per-file progress notifications.
//!
//! Reporters observe a run; they never influence it. Every method has an
//! empty default so a reporter only implements what it renders.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

pub trait ProgressReporter {
    /// Called once before the first file with the number of files to process.
    fn start(&self, _total: u64) {}

    /// Called once per index entry, after its outcome has been decided.
    fn file_processed(&self, _path: &str) {}

    fn finish(&self) {}
}

/// Reporter that ignores everything.
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Progress bar drawn on stderr. Draws nothing when stderr is not a terminal.
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    const TEMPLATE: &'static str = "[{bar:40}] {percent:>3}% {pos}/{len} {wide_msg}";

    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(Self::TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        TerminalProgress { bar }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for TerminalProgress {
    fn start(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn file_processed(&self, path: &str) {
        self.bar.set_message(path.to_string());
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
