//! Terminal progress for a running analysis

use crate::report::Reporter;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use markheat_cv::pipeline::{RunObserver, RunPlan, RunStats};
use opencv::core::Mat;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Drives a progress bar over the sampled frames and saves previews
pub struct ProgressReporter<'a> {
    bar: ProgressBar,
    reporter: &'a Reporter,
    detections: AtomicUsize,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(reporter: &'a Reporter, visible: bool) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new(0);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} frames {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            bar,
            reporter,
            detections: AtomicUsize::new(0),
        }
    }

    fn start(&self, plan: &RunPlan) {
        self.bar.set_length(plan.frames.len());
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn frame(&self, accepted: usize) {
        let total = self.detections.fetch_add(accepted, Ordering::Relaxed) + accepted;
        self.bar.inc(1);
        self.bar.set_message(format!("{} detections", total));
    }

    fn finish(&self, stats: &RunStats) {
        let message = if stats.interrupted {
            format!("interrupted, {} detections", stats.detections())
        } else {
            format!("{} detections", stats.detections())
        };
        self.bar.finish_with_message(message);
    }
}

impl RunObserver for ProgressReporter<'_> {
    fn on_start(&mut self, plan: &RunPlan) {
        self.start(plan);
    }

    fn on_frame(&mut self, _frame_index: u64, accepted: usize) {
        self.frame(accepted);
    }

    fn on_preview(&mut self, sequence: usize, _frame_index: u64, image: &Mat) -> Result<()> {
        self.reporter.save_preview(sequence, image)?;
        Ok(())
    }

    fn on_finish(&mut self, stats: &RunStats) {
        self.finish(stats);
    }
}

#[cfg(feature = "parallel")]
impl markheat_cv::pipeline::parallel::ParallelObserver for ProgressReporter<'_> {
    fn on_start(&self, plan: &RunPlan) {
        self.start(plan);
    }

    fn on_frame(&self, _frame_index: u64, accepted: usize) {
        self.frame(accepted);
    }

    fn on_finish(&self, stats: &RunStats) {
        self.finish(stats);
    }
}
