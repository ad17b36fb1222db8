//! Marker Heatmap Computer Vision Library
//!
//! Offline, whole-video analysis of small colored markers using OpenCV:
//! HSV segmentation, contour based circle/square detection, point NMS,
//! cumulative heatmaps, and the post-run mask and boundary rendering.

pub mod heatmap;
pub mod nms;
pub mod pipeline;
pub mod postprocess;
pub mod segment;
pub mod shapes;
pub mod source;
pub mod utils;

// Re-export commonly used types
pub use heatmap::{Heatmap, HeatmapAccumulator};
pub use nms::Deduplicator;
pub use pipeline::{AnalysisReport, FrameAnalyzer, MarkerAnalyzer, RunObserver, RunOutcome};
pub use postprocess::{Artifacts, PostProcessor};
pub use segment::{ColorSegmenter, SegmentedMask};
pub use shapes::{CircleDetector, SquareDetector};
pub use source::{MemorySource, SourceError, VideoFileSource, VideoProperties};

pub use markheat_core as core;

// Error handling
pub type Result<T> = anyhow::Result<T>;

/// Core traits for the CV system
pub mod traits {
    use super::*;
    use markheat_core::{Candidate, ShapeClass};
    use opencv::core::{Mat, Point};

    /// Extracts geometrically plausible marker candidates from a binary mask
    pub trait ShapeDetector {
        fn shape_class(&self) -> ShapeClass;

        /// `offset` maps mask coordinates back to full-frame coordinates
        fn detect(&self, mask: &Mat, offset: Point) -> Result<Vec<Candidate>>;
    }

    /// Index-addressable sequential frame provider
    pub trait FrameSource {
        fn properties(&self) -> VideoProperties;

        /// `Ok(None)` signals end of stream or an undecodable frame
        fn read_frame(&mut self, index: u64) -> Result<Option<Mat>>;
    }
}
