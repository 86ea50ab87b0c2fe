//! Progress indicators for choro CLI.
//!
//! Spinners come from pintui; the apply run drives an indicatif bar through
//! the engine's [`ProgressCallback`].

use colored::Colorize;
use declarative::{Outcome, OutcomeStatus, ProgressCallback, RunSummary};
use indicatif::{ProgressBar, ProgressStyle};

pub use pintui::progress::{finish_error, finish_success, spinner};

use crate::ui;

/// Progress bar for an apply run
///
/// Outcomes are printed above the bar as they are recorded. Satisfied ones
/// only show when `verbose`; failures always show.
pub struct ApplyProgress {
    pb: ProgressBar,
    verbose: bool,
    quiet: bool,
    visible: bool,
}

impl ApplyProgress {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            pb: ProgressBar::hidden(),
            verbose,
            quiet,
            visible: !quiet && console::user_attended(),
        }
    }

    fn line(&self, outcome: &Outcome) -> String {
        let detail = outcome
            .detail
            .as_deref()
            .map(|d| format!(" ({})", ui::truncate(d, 120)))
            .unwrap_or_default();
        format!(
            "  {} {:<28} {}{}",
            ui::status_symbol(outcome.status),
            outcome.resource_id,
            outcome.status.to_string().dimmed(),
            detail.dimmed()
        )
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_run_start(&mut self, total: usize) {
        if !self.visible {
            return;
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        self.pb = pb;
    }

    fn on_layer_start(&mut self, index: usize, size: usize) {
        log::debug!("layer {index}: {size} resources");
        self.pb.set_message(format!("layer {} ({size} in parallel)", index + 1));
    }

    fn on_resource_start(&mut self, id: &str, description: &str) {
        log::debug!("{id}: {description}");
        self.pb.set_message(id.to_string());
    }

    fn on_outcome(&mut self, outcome: &Outcome) {
        let show = match outcome.status {
            OutcomeStatus::Failed => true,
            OutcomeStatus::AlreadySatisfied => self.verbose,
            OutcomeStatus::Applied | OutcomeStatus::Skipped => !self.quiet,
        };
        if show {
            let line = self.line(outcome);
            if self.visible {
                self.pb.println(line);
            } else {
                println!("{line}");
            }
        }
        self.pb.inc(1);
    }

    fn on_run_complete(&mut self, _summary: &RunSummary) {
        self.pb.finish_and_clear();
    }
}
