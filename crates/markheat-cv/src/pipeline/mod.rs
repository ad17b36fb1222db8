//! Whole-video marker analysis
//!
//! [`MarkerAnalyzer`] drives the per-frame stages over the sampled frame
//! range, owns the heatmaps and the detection log, and hands both back in
//! an [`AnalysisReport`] once the range is exhausted or the run is
//! cancelled. Each sampled frame goes through
//!
//! ```text
//! SEGMENT -> DETECT(circle) -> DETECT(square) -> DEDUP(per class)
//!         -> POOL -> DEDUP(cross class) -> ACCUMULATE -> [PREVIEW]
//! ```

#[cfg(feature = "parallel")]
pub mod parallel;
pub mod preview;

pub use preview::render_preview;

use crate::Result;
use crate::heatmap::HeatmapAccumulator;
use crate::nms::Deduplicator;
use crate::postprocess::{Artifacts, PostProcessor};
use crate::segment::ColorSegmenter;
use crate::shapes::{CircleDetector, SquareDetector};
use crate::source::{SourceError, VideoProperties};
use crate::traits::{FrameSource, ShapeDetector};
use anyhow::Context;
use markheat_core::config::effective_fps;
use markheat_core::{AnalysisConfig, Candidate, Detection, FrameRange, PixelThresholds, ShapeClass};
use opencv::{core::Mat, prelude::*};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-frame processing stages, named in error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Segment(ShapeClass),
    Detect(ShapeClass),
    Accumulate,
    Preview,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Segment(class) => write!(f, "{} segmentation", class),
            Stage::Detect(class) => write!(f, "{} detection", class),
            Stage::Accumulate => f.write_str("heatmap accumulation"),
            Stage::Preview => f.write_str("preview rendering"),
        }
    }
}

/// Candidates surviving one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    /// Per-class NMS survivors, in acceptance order
    pub circles: Vec<Candidate>,
    pub squares: Vec<Candidate>,
    /// Cross-class survivors: circles first, then squares
    pub accepted: Vec<Candidate>,
}

impl FrameOutcome {
    pub fn accepted_count(&self, class: ShapeClass) -> usize {
        self.accepted.iter().filter(|c| c.class == class).count()
    }
}

/// Stateless per-frame pipeline for a fixed frame size
#[derive(Debug, Clone)]
pub struct FrameAnalyzer {
    circle_colors: ColorSegmenter,
    square_colors: ColorSegmenter,
    circles: CircleDetector,
    squares: SquareDetector,
    dedup: Deduplicator,
}

impl FrameAnalyzer {
    pub fn new(config: &AnalysisConfig, thresholds: &PixelThresholds) -> Self {
        let segmentation = &config.segmentation;
        Self {
            circle_colors: ColorSegmenter::new(
                segmentation.circle_colors.clone(),
                segmentation.blur_ksize,
                config.roi,
            ),
            square_colors: ColorSegmenter::new(
                segmentation.square_colors.clone(),
                segmentation.blur_ksize,
                config.roi,
            ),
            circles: CircleDetector::from_config(config, thresholds),
            squares: SquareDetector::from_config(config, thresholds),
            dedup: Deduplicator::new(thresholds.merge_distance),
        }
    }

    fn detect_class(
        &self,
        frame: &Mat,
        segmenter: &ColorSegmenter,
        detector: &dyn ShapeDetector,
    ) -> Result<Vec<Candidate>> {
        let class = detector.shape_class();
        let segmented = segmenter
            .segment(frame)
            .with_context(|| Stage::Segment(class))?;
        let candidates = detector
            .detect(&segmented.mask, segmented.offset)
            .with_context(|| Stage::Detect(class))?;
        Ok(self.dedup.suppress(&candidates))
    }

    pub fn analyze(&self, frame: &Mat) -> Result<FrameOutcome> {
        let circles = self.detect_class(frame, &self.circle_colors, &self.circles)?;
        let squares = self.detect_class(frame, &self.square_colors, &self.squares)?;

        let pooled: Vec<Candidate> = circles.iter().chain(&squares).copied().collect();
        let accepted = self.dedup.filter(&pooled);

        log::debug!(
            "circles {} squares {} pooled {} accepted {}",
            circles.len(),
            squares.len(),
            pooled.len(),
            accepted.len()
        );
        Ok(FrameOutcome {
            circles,
            squares,
            accepted,
        })
    }
}

/// What a run is about to do, reported before the first frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    pub properties: VideoProperties,
    /// Frame rate used for timestamps, after the zero-fps fallback
    pub fps: f64,
    pub frames: FrameRange,
    pub thresholds: PixelThresholds,
    pub width: i32,
    pub height: i32,
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub circles: u64,
    pub squares: u64,
    pub previews: usize,
    pub interrupted: bool,
}

impl RunStats {
    pub fn detections(&self) -> u64 {
        self.circles + self.squares
    }

    pub fn merge(&mut self, other: &RunStats) {
        self.frames_processed += other.frames_processed;
        self.frames_skipped += other.frames_skipped;
        self.circles += other.circles;
        self.squares += other.squares;
        self.previews += other.previews;
        self.interrupted |= other.interrupted;
    }

    fn record(&mut self, detection: &Detection) {
        match detection.class {
            ShapeClass::Circle => self.circles += 1,
            ShapeClass::Square => self.squares += 1,
        }
    }
}

/// Progress hooks called from the run loop.
///
/// All methods default to doing nothing so callers implement only what
/// they display.
pub trait RunObserver {
    fn on_start(&mut self, _plan: &RunPlan) {}

    /// After every sampled frame, including skipped ones
    fn on_frame(&mut self, _frame_index: u64, _accepted: usize) {}

    /// `sequence` counts previews from 0
    fn on_preview(&mut self, _sequence: usize, _frame_index: u64, _image: &Mat) -> Result<()> {
        Ok(())
    }

    fn on_finish(&mut self, _stats: &RunStats) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Everything a completed run with detections hands back
#[derive(Debug)]
pub struct AnalysisReport {
    pub plan: RunPlan,
    /// Detection log in frame order
    pub detections: Vec<Detection>,
    pub accumulator: HeatmapAccumulator,
    /// First sampled frame, the canvas for overlays
    pub reference: Mat,
    pub stats: RunStats,
}

impl AnalysisReport {
    pub fn post_process(&self, processor: &PostProcessor) -> Result<Artifacts> {
        processor.process(&self.accumulator, &self.reference, self.detections.len())
    }
}

/// Result of a run that did not fail
#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing was accepted; no artifacts should be produced
    NoDetections { plan: RunPlan, stats: RunStats },
    Completed(Box<AnalysisReport>),
}

/// Frame reading and per-frame analysis shared by the sequential and
/// parallel runners
pub(crate) struct FrameStep<'a> {
    pub analyzer: &'a FrameAnalyzer,
    pub fps: f64,
}

impl FrameStep<'_> {
    /// Process one frame index. Unreadable frames are skipped and return
    /// `Ok(None)`; analysis failures are fatal.
    pub fn run<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        frame_index: u64,
        accumulator: &mut HeatmapAccumulator,
        detections: &mut Vec<Detection>,
        stats: &mut RunStats,
    ) -> Result<Option<(Mat, FrameOutcome)>> {
        let frame = match source.read_frame(frame_index) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::warn!("Frame {} could not be read, skipping", frame_index);
                stats.frames_skipped += 1;
                return Ok(None);
            }
            Err(e) => {
                log::warn!("Frame {} failed to decode ({:#}), skipping", frame_index, e);
                stats.frames_skipped += 1;
                return Ok(None);
            }
        };

        let outcome = self
            .analyzer
            .analyze(&frame)
            .with_context(|| format!("Analysis of frame {} failed", frame_index))?;

        for candidate in &outcome.accepted {
            let detection = Detection::from_candidate(candidate, frame_index, self.fps);
            accumulator
                .add(&detection)
                .with_context(|| Stage::Accumulate)?;
            stats.record(&detection);
            detections.push(detection);
        }
        stats.frames_processed += 1;
        Ok(Some((frame, outcome)))
    }
}

/// Runs the whole analysis over a frame source
pub struct MarkerAnalyzer {
    config: AnalysisConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl MarkerAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate().context("Invalid analysis configuration")?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    /// Stop between frames once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Resolve the frame range and read the reference frame.
    ///
    /// Fails before any heatmap state exists when the reference frame is
    /// unreadable.
    pub(crate) fn plan<S: FrameSource + ?Sized>(&self, source: &mut S) -> Result<(RunPlan, Mat)> {
        let properties = source.properties();
        let fps = effective_fps(properties.fps);
        let frames = self.config.frame_range(fps, properties.frame_count);

        let reference = match source.read_frame(frames.start) {
            Ok(Some(frame)) if !frame.empty() => frame,
            Ok(_) => return Err(SourceError::ReferenceFrame { index: frames.start }.into()),
            Err(e) => {
                return Err(e.context(SourceError::ReferenceFrame { index: frames.start }));
            }
        };

        let (width, height) = (reference.cols(), reference.rows());
        let thresholds = self.config.pixel_thresholds(width, height);
        let plan = RunPlan {
            properties,
            fps,
            frames,
            thresholds,
            width,
            height,
        };

        log::info!(
            "Video {}x{} @ {:.2} fps, {} frames; analyzing {} sampled frames from {}",
            width,
            height,
            fps,
            properties.frame_count,
            frames.len(),
            frames.start
        );
        log::info!(
            "Circle radius {:.1}..{:.1} px, square side {:.1}..{:.1} px, merge distance {:.1} px",
            thresholds.circle_min_radius,
            thresholds.circle_max_radius,
            thresholds.square_min_side,
            thresholds.square_max_side,
            thresholds.merge_distance
        );
        Ok((plan, reference))
    }

    pub(crate) fn finish(
        plan: RunPlan,
        reference: Mat,
        accumulator: HeatmapAccumulator,
        detections: Vec<Detection>,
        stats: RunStats,
    ) -> RunOutcome {
        log::info!(
            "Processed {} frames ({} skipped), {} detections ({} circles, {} squares)",
            stats.frames_processed,
            stats.frames_skipped,
            detections.len(),
            stats.circles,
            stats.squares
        );

        if detections.is_empty() || accumulator.total() == 0 {
            return RunOutcome::NoDetections { plan, stats };
        }
        RunOutcome::Completed(Box::new(AnalysisReport {
            plan,
            detections,
            accumulator,
            reference,
            stats,
        }))
    }

    /// Analyze every sampled frame in order
    pub fn run<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        observer: &mut dyn RunObserver,
    ) -> Result<RunOutcome> {
        let (plan, reference) = self.plan(source)?;
        observer.on_start(&plan);

        let analyzer = FrameAnalyzer::new(&self.config, &plan.thresholds);
        let step = FrameStep {
            analyzer: &analyzer,
            fps: plan.fps,
        };
        let mut accumulator = HeatmapAccumulator::new(plan.width, plan.height)?;
        let mut detections = Vec::new();
        let mut stats = RunStats::default();
        let preview_every = self.config.preview_every as u64;

        for frame_index in plan.frames.iter() {
            if self.cancelled() {
                log::warn!("Interrupted before frame {}, keeping partial results", frame_index);
                stats.interrupted = true;
                break;
            }

            let before = detections.len();
            let processed = step.run(
                source,
                frame_index,
                &mut accumulator,
                &mut detections,
                &mut stats,
            )?;

            let due = preview_every > 0 && (frame_index - plan.frames.start) % preview_every == 0;
            if let (true, Some((frame, outcome))) = (due, processed) {
                let image = render_preview(&frame, &outcome, self.config.roi.as_ref())
                    .with_context(|| Stage::Preview)?;
                observer.on_preview(stats.previews, frame_index, &image)?;
                stats.previews += 1;
            }
            observer.on_frame(frame_index, detections.len() - before);
        }

        observer.on_finish(&stats);
        Ok(Self::finish(plan, reference, accumulator, detections, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use markheat_core::Roi;
    use opencv::core::{CV_8UC3, Point, Scalar};
    use opencv::imgproc;

    // BGR colors inside the default HSV ranges
    const BLUE: (f64, f64, f64) = (255.0, 0.0, 0.0);
    const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);

    fn blank(width: i32, height: i32) -> Result<Mat> {
        Ok(Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0))?)
    }

    fn with_disk(
        mut frame: Mat,
        center: (i32, i32),
        radius: i32,
        bgr: (f64, f64, f64),
    ) -> Result<Mat> {
        imgproc::circle(
            &mut frame,
            Point::new(center.0, center.1),
            radius,
            Scalar::new(bgr.0, bgr.1, bgr.2, 0.0),
            -1,
            imgproc::LINE_8,
            0,
        )?;
        Ok(frame)
    }

    fn wide_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.circle.max_radius_ratio = 0.2;
        config.square.max_side_ratio = 0.3;
        config
    }

    #[derive(Default)]
    struct Recorder {
        started: bool,
        frames: Vec<(u64, usize)>,
        previews: Vec<(usize, u64)>,
        finished: Option<RunStats>,
    }

    impl RunObserver for Recorder {
        fn on_start(&mut self, _plan: &RunPlan) {
            self.started = true;
        }

        fn on_frame(&mut self, frame_index: u64, accepted: usize) {
            self.frames.push((frame_index, accepted));
        }

        fn on_preview(&mut self, sequence: usize, frame_index: u64, _image: &Mat) -> Result<()> {
            self.previews.push((sequence, frame_index));
            Ok(())
        }

        fn on_finish(&mut self, stats: &RunStats) {
            self.finished = Some(stats.clone());
        }
    }

    #[test]
    fn test_cross_class_dedup_keeps_circles_first() -> Result<()> {
        let config = wide_config();
        let frame = with_disk(blank(200, 200)?, (50, 50), 10, BLUE)?;
        let frame = with_disk(frame, (150, 150), 10, BLUE)?;
        let analyzer = FrameAnalyzer::new(&config, &config.pixel_thresholds(200, 200));

        let outcome = analyzer.analyze(&frame)?;
        assert_eq!(outcome.circles.len(), 2);
        assert!(outcome.squares.is_empty());
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.accepted_count(ShapeClass::Circle), 2);
        Ok(())
    }

    #[test]
    fn test_run_accumulates_every_sampled_frame() -> Result<()> {
        let frames = (0..6)
            .map(|i| with_disk(blank(120, 100)?, (30 + i * 10, 50), 8, BLUE))
            .collect::<Result<Vec<_>>>()?;
        let mut source = MemorySource::new(frames, 10.0);

        let mut config = wide_config();
        config.frames.sample_step = 2;
        config.preview_every = 4;
        let mut recorder = Recorder::default();

        let outcome = MarkerAnalyzer::new(config)?.run(&mut source, &mut recorder)?;
        let RunOutcome::Completed(report) = outcome else {
            panic!("expected detections");
        };

        assert!(recorder.started);
        assert_eq!(recorder.frames, vec![(0, 1), (2, 1), (4, 1)]);
        assert_eq!(recorder.previews, vec![(0, 0), (1, 4)]);
        assert_eq!(recorder.finished.as_ref().map(|s| s.frames_processed), Some(3));

        let frames: Vec<u64> = report.detections.iter().map(|d| d.frame_index).collect();
        assert_eq!(frames, vec![0, 2, 4]);
        assert!((report.detections[1].timestamp_secs - 0.2).abs() < 1e-9);
        assert_eq!(report.accumulator.combined().mass()?, 3.0);
        assert_eq!(report.accumulator.class(ShapeClass::Square).mass()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_green_and_blue_markers_both_logged() -> Result<()> {
        let mut frame = with_disk(blank(200, 200)?, (50, 50), 10, BLUE)?;
        imgproc::rectangle(
            &mut frame,
            opencv::core::Rect::new(130, 130, 20, 20),
            Scalar::new(GREEN.0, GREEN.1, GREEN.2, 0.0),
            -1,
            imgproc::LINE_8,
            0,
        )?;
        let mut source = MemorySource::new(vec![frame], 30.0);

        let outcome = MarkerAnalyzer::new(wide_config())?.run(&mut source, &mut NoopObserver)?;
        let RunOutcome::Completed(report) = outcome else {
            panic!("expected detections");
        };
        let classes: Vec<ShapeClass> = report.detections.iter().map(|d| d.class).collect();
        assert_eq!(classes, vec![ShapeClass::Circle, ShapeClass::Square]);
        assert_eq!(report.stats.detections(), 2);
        Ok(())
    }

    #[test]
    fn test_unreadable_reference_frame_is_fatal() -> Result<()> {
        let mut source = MemorySource::new(Vec::new(), 30.0);
        let result =
            MarkerAnalyzer::new(AnalysisConfig::default())?.run(&mut source, &mut NoopObserver);

        let err = result.expect_err("empty source must fail");
        assert!(err.downcast_ref::<SourceError>().is_some());
        Ok(())
    }

    #[test]
    fn test_cancelled_run_keeps_partial_state() -> Result<()> {
        let frames = (0..4)
            .map(|_| with_disk(blank(100, 100)?, (50, 50), 10, BLUE))
            .collect::<Result<Vec<_>>>()?;
        let mut source = MemorySource::new(frames, 30.0);
        let flag = Arc::new(AtomicBool::new(true));

        let analyzer = MarkerAnalyzer::new(wide_config())?.with_cancel_flag(flag);
        match analyzer.run(&mut source, &mut NoopObserver)? {
            RunOutcome::NoDetections { stats, .. } => {
                assert!(stats.interrupted);
                assert_eq!(stats.frames_processed, 0);
            }
            RunOutcome::Completed(_) => panic!("cancelled before the first frame"),
        }
        Ok(())
    }

    #[test]
    fn test_roi_outside_frame_yields_no_detections() -> Result<()> {
        let frames = (0..3)
            .map(|_| with_disk(blank(100, 100)?, (50, 50), 10, BLUE))
            .collect::<Result<Vec<_>>>()?;
        let mut source = MemorySource::new(frames, 30.0);

        let mut config = wide_config();
        config.roi = Some(Roi::new(500, 500, 600, 600));

        match MarkerAnalyzer::new(config)?.run(&mut source, &mut NoopObserver)? {
            RunOutcome::NoDetections { stats, .. } => {
                assert_eq!(stats.frames_processed, 3);
                assert_eq!(stats.frames_skipped, 0);
                assert_eq!(stats.detections(), 0);
            }
            RunOutcome::Completed(_) => panic!("nothing lies inside the ROI"),
        }
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AnalysisConfig::default();
        config.frames.sample_step = 0;
        assert!(MarkerAnalyzer::new(config).is_err());
    }
}
