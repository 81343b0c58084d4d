//! Terminal progress bar for analysis runs.

use anyhow::Result;
use hindsight_core::analysis::{BatchStatus, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// Draws one tick per collaborator call on stderr.
pub struct BarProgress {
    pb: ProgressBar,
    failed: usize,
    log_dir: PathBuf,
}

impl BarProgress {
    pub fn new(log_dir: PathBuf) -> Result<Self> {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self {
            pb,
            failed: 0,
            log_dir,
        })
    }
}

impl ProgressReporter for BarProgress {
    fn on_start(&mut self, total_batches: usize) {
        self.pb.set_length(total_batches as u64);
        self.pb.set_position(0);
    }

    fn on_batch_start(&mut self, index: usize, total_batches: usize, estimated_tokens: usize) {
        self.pb.set_message(format!(
            "batch {}/{} (~{} tokens)",
            index + 1,
            total_batches,
            estimated_tokens
        ));
    }

    fn on_batch_done(&mut self, _index: usize, status: &BatchStatus) {
        if !status.is_analyzed() {
            self.failed += 1;
        }
        self.pb.inc(1);
    }

    fn on_finish(&mut self) {
        self.pb.finish_and_clear();
        if self.failed > 0 {
            eprintln!(
                "{} batch(es) produced no analysis (see {})",
                self.failed,
                self.log_dir.display()
            );
        }
    }
}
