//! Marker heatmap core data model
//!
//! Plain data shared by the detection pipeline and its callers: marker
//! classes, candidates and detections, HSV color ranges, the optional ROI,
//! and the validated analysis configuration.

pub mod color;
pub mod config;
pub mod detection;
pub mod roi;

pub use color::{ColorRange, ColorRangeSet};
pub use config::{AnalysisConfig, ConfigError, FrameRange, PixelThresholds};
pub use detection::{Candidate, Detection, ShapeClass};
pub use roi::Roi;
