//! Multi-threaded runner
//!
//! The sampled frame indices are split into contiguous chunks; every chunk
//! gets its own frame source and heatmaps, and the partial heatmaps are
//! summed at the end. Concatenating the chunk logs in chunk order keeps the
//! detection log in frame order. Previews are not rendered here.

use super::{FrameAnalyzer, FrameStep, MarkerAnalyzer, NoopObserver, RunOutcome, RunPlan, RunStats};
use crate::Result;
use crate::heatmap::HeatmapAccumulator;
use crate::traits::FrameSource;
use anyhow::Context;
use markheat_core::Detection;
use rayon::prelude::*;

/// Progress hooks callable from worker threads
pub trait ParallelObserver: Sync {
    fn on_start(&self, _plan: &RunPlan) {}
    fn on_frame(&self, _frame_index: u64, _accepted: usize) {}
    fn on_finish(&self, _stats: &RunStats) {}
}

impl ParallelObserver for NoopObserver {}

struct ChunkResult {
    accumulator: HeatmapAccumulator,
    detections: Vec<Detection>,
    stats: RunStats,
}

impl MarkerAnalyzer {
    /// Analyze the sampled frames with `workers` threads.
    ///
    /// `open` is called once for the reference frame and once per chunk,
    /// so each worker decodes from an independent source.
    pub fn run_parallel<S, F>(
        &self,
        open: F,
        workers: usize,
        observer: &dyn ParallelObserver,
    ) -> Result<RunOutcome>
    where
        S: FrameSource,
        F: Fn() -> Result<S> + Sync,
    {
        let (plan, reference) = {
            let mut source = open()?;
            self.plan(&mut source)?
        };
        observer.on_start(&plan);
        if self.config.preview_every > 0 {
            log::warn!("Previews are not rendered by the parallel runner");
        }

        let workers = workers.max(1);
        let analyzer = FrameAnalyzer::new(&self.config, &plan.thresholds);
        let chunks = plan.frames.chunks(workers);
        log::info!(
            "Splitting {} sampled frames into {} chunks",
            plan.frames.len(),
            chunks.len()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("Failed to build worker thread pool")?;
        let partials: Vec<ChunkResult> = pool.install(|| {
            chunks
                .par_iter()
                .map(|indices| self.run_chunk(&open, &analyzer, &plan, indices, observer))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut accumulator = HeatmapAccumulator::new(plan.width, plan.height)?;
        let mut detections = Vec::new();
        let mut stats = RunStats::default();
        for partial in partials {
            accumulator.merge(&partial.accumulator)?;
            detections.extend(partial.detections);
            stats.merge(&partial.stats);
        }

        observer.on_finish(&stats);
        Ok(Self::finish(plan, reference, accumulator, detections, stats))
    }

    fn run_chunk<S, F>(
        &self,
        open: &F,
        analyzer: &FrameAnalyzer,
        plan: &RunPlan,
        indices: &[u64],
        observer: &dyn ParallelObserver,
    ) -> Result<ChunkResult>
    where
        S: FrameSource,
        F: Fn() -> Result<S> + Sync,
    {
        let mut source = open().context("Failed to open frame source for worker")?;
        let step = FrameStep {
            analyzer,
            fps: plan.fps,
        };
        let mut accumulator = HeatmapAccumulator::new(plan.width, plan.height)?;
        let mut detections = Vec::new();
        let mut stats = RunStats::default();

        for &frame_index in indices {
            if self.cancelled() {
                stats.interrupted = true;
                break;
            }
            let before = detections.len();
            step.run(
                &mut source,
                frame_index,
                &mut accumulator,
                &mut detections,
                &mut stats,
            )?;
            observer.on_frame(frame_index, detections.len() - before);
        }

        Ok(ChunkResult {
            accumulator,
            detections,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use markheat_core::AnalysisConfig;
    use opencv::core::{CV_8UC3, Mat, Point, Scalar};
    use opencv::imgproc;

    fn frames() -> Result<Vec<Mat>> {
        (0..9)
            .map(|i| {
                let mut frame =
                    Mat::new_rows_cols_with_default(100, 160, CV_8UC3, Scalar::all(0.0))?;
                imgproc::circle(
                    &mut frame,
                    Point::new(20 + i * 15, 50),
                    8,
                    Scalar::new(255.0, 0.0, 0.0, 0.0),
                    -1,
                    imgproc::LINE_8,
                    0,
                )?;
                Ok(frame)
            })
            .collect()
    }

    #[test]
    fn test_parallel_matches_sequential() -> Result<()> {
        let mut config = AnalysisConfig::default();
        config.circle.max_radius_ratio = 0.2;
        let analyzer = MarkerAnalyzer::new(config)?;

        let frames = frames()?;
        let open = || -> Result<MemorySource> {
            let copies = frames.iter().map(|f| Ok(f.try_clone()?)).collect::<Result<Vec<_>>>()?;
            Ok(MemorySource::new(copies, 30.0))
        };

        let sequential = analyzer.run(&mut open()?, &mut NoopObserver)?;
        let parallel = analyzer.run_parallel(open, 3, &NoopObserver)?;

        let (RunOutcome::Completed(seq), RunOutcome::Completed(par)) = (sequential, parallel) else {
            panic!("both runs should detect markers");
        };
        assert_eq!(seq.detections, par.detections);
        assert_eq!(par.detections.len(), 9);
        assert_eq!(par.accumulator.combined().mass()?, 9.0);
        assert_eq!(par.stats.frames_processed, 9);
        Ok(())
    }
}
