//! Terminal progress reporting with indicatif.

use std::time::Duration;

use adapt_core::{FileEntry, FileStatus, FinalizedCourse, LoadingStep, Phase, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};

/// CLI progress reporter using an indicatif spinner.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    pub(crate) fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: &Phase) {
        match phase {
            Phase::Loading { step, regenerating } => {
                let message = match step {
                    LoadingStep::Uploading => "Uploading files…",
                    LoadingStep::Parsing => "Extracting text…",
                    LoadingStep::Generating if *regenerating => "Regenerating questions…",
                    LoadingStep::Generating => "Generating questions…",
                    LoadingStep::Ready => "Questions ready",
                };
                self.spinner
                    .set_message(format!("[{}/3] {message}", (step.index() + 1).min(3)));
            }
            Phase::Saving => self.spinner.set_message("Saving course…"),
            Phase::Form | Phase::Editing | Phase::Done => self.finish(),
        }
    }

    fn file_started(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[1/3] Uploading {current} of {total}: {name}"));
    }

    fn file_finished(&self, entry: &FileEntry) {
        match entry.status() {
            FileStatus::Done { .. } => self.spinner.println(format!("  ✓ {}", entry.name())),
            FileStatus::Error { message } => {
                self.spinner
                    .println(format!("  ✗ {}: {message}", entry.name()));
            }
            FileStatus::Pending | FileStatus::Uploading => {}
        }
    }

    fn done(&self, _course: &FinalizedCourse) {
        self.finish();
    }
}
