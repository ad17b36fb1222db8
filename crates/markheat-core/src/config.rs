//! Analysis configuration
//!
//! One validated record built at startup and passed down the pipeline.
//! Size and distance thresholds are ratios of the shorter frame side so the
//! same configuration works across video resolutions; [`PixelThresholds`]
//! resolves them for a concrete frame size.

use crate::color::ColorRangeSet;
use crate::roi::Roi;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration values that cannot drive a meaningful run
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sample step must be at least 1")]
    ZeroSampleStep,
    #[error("{name} must be a finite non-negative number, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("{name}: minimum {min} exceeds maximum {max}")]
    InvertedBounds {
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("mask percentile must lie in [0, 100], got {0}")]
    Percentile(f64),
    #[error("end time {end}s is before start time {start}s")]
    TimeRange { start: f64, end: f64 },
}

/// Main analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub frames: FrameSampling,
    pub roi: Option<Roi>,
    pub segmentation: SegmentationConfig,
    pub circle: CircleConfig,
    pub square: SquareConfig,
    pub morphology: MorphologyConfig,
    /// Deduplication distance as a ratio of the shorter frame side
    pub merge_dist_ratio: f64,
    pub heatmap: HeatmapConfig,
    pub mask: MaskConfig,
    pub boundary: BoundaryConfig,
    /// Render a preview every N sampled-range frames, 0 disables previews
    pub preview_every: u32,
}

/// Which frames of the video are analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSampling {
    pub start_secs: f64,
    /// `None` runs to the end of the video
    pub end_secs: Option<f64>,
    /// Process every Nth frame
    pub sample_step: u32,
}

/// Color segmentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub circle_colors: ColorRangeSet,
    pub square_colors: ColorRangeSet,
    /// Gaussian kernel applied before HSV conversion, skipped unless odd and >= 3
    pub blur_ksize: u32,
}

/// Circle marker geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleConfig {
    /// Lower bound on 4*pi*A/P^2
    pub min_circularity: f64,
    pub min_radius_ratio: f64,
    pub max_radius_ratio: f64,
    /// Absolute contour area floor in px^2
    pub min_area: f64,
}

/// Square marker geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SquareConfig {
    /// Accept when long/short side ratio <= 1 + tolerance
    pub aspect_tolerance: f64,
    pub min_side_ratio: f64,
    pub max_side_ratio: f64,
    /// Absolute contour area floor in px^2
    pub min_area: f64,
}

/// Mask cleanup applied before contour extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologyConfig {
    pub kernel: u32,
    pub circle_open: u32,
    pub circle_close: u32,
    pub square_open: u32,
    pub square_close: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Gaussian kernel turning the occurrence histogram into a density field
    pub blur_ksize: u32,
    /// Weight of the colorized heatmap when blended over the reference frame
    pub overlay_alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Percentile over nonzero smoothed cells
    pub percentile: f64,
    /// Absolute threshold, takes priority over the percentile when >= 0
    pub min_count: Option<f64>,
    pub kernel: u32,
    pub open_iter: u32,
    pub close_iter: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub top_regions: usize,
    /// Regions must be strictly larger than this (px^2) to be highlighted
    pub min_region_area: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frames: FrameSampling::default(),
            roi: None,
            segmentation: SegmentationConfig::default(),
            circle: CircleConfig::default(),
            square: SquareConfig::default(),
            morphology: MorphologyConfig::default(),
            merge_dist_ratio: 0.02,
            heatmap: HeatmapConfig::default(),
            mask: MaskConfig::default(),
            boundary: BoundaryConfig::default(),
            preview_every: 0,
        }
    }
}

impl Default for FrameSampling {
    fn default() -> Self {
        Self {
            start_secs: 0.0,
            end_secs: None,
            sample_step: 1,
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            circle_colors: ColorRangeSet::parse_lenient("80,80,80-130,255,255"),
            square_colors: ColorRangeSet::parse_lenient("35,60,60-85,255,255"),
            blur_ksize: 3,
        }
    }
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self {
            min_circularity: 0.65,
            min_radius_ratio: 0.006,
            max_radius_ratio: 0.06,
            min_area: 10.0,
        }
    }
}

impl Default for SquareConfig {
    fn default() -> Self {
        Self {
            aspect_tolerance: 0.35,
            min_side_ratio: 0.01,
            max_side_ratio: 0.12,
            min_area: 20.0,
        }
    }
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            kernel: 5,
            circle_open: 1,
            circle_close: 1,
            square_open: 1,
            square_close: 1,
        }
    }
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            blur_ksize: 15,
            overlay_alpha: 0.6,
        }
    }
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            percentile: 85.0,
            min_count: None,
            kernel: 7,
            open_iter: 0,
            close_iter: 1,
        }
    }
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            top_regions: 5,
            min_region_area: 50.0,
        }
    }
}

impl AnalysisConfig {
    /// Looser geometry for occluded or motion-blurred markers
    pub fn lenient() -> Self {
        let mut config = Self::default();
        config.circle.min_circularity = 0.5;
        config.circle.min_radius_ratio = 0.004;
        config.circle.max_radius_ratio = 0.08;
        config.square.aspect_tolerance = 0.5;
        config.square.min_side_ratio = 0.006;
        config.square.max_side_ratio = 0.16;
        config
    }

    /// Tighter geometry for clean, unoccluded footage
    pub fn strict() -> Self {
        let mut config = Self::default();
        config.circle.min_circularity = 0.8;
        config.square.aspect_tolerance = 0.2;
        config
    }

    /// Load a JSON configuration; missing fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.frames.sample_step == 0 {
            return Err(ConfigError::ZeroSampleStep);
        }
        if let Some(end) = self.frames.end_secs {
            let start = self.frames.start_secs.max(0.0);
            if end < start {
                return Err(ConfigError::TimeRange { start, end });
            }
        }

        non_negative("circle.min_circularity", self.circle.min_circularity)?;
        non_negative("square.aspect_tolerance", self.square.aspect_tolerance)?;
        non_negative("merge_dist_ratio", self.merge_dist_ratio)?;
        non_negative("heatmap.overlay_alpha", self.heatmap.overlay_alpha)?;
        ordered(
            "circle radius ratio",
            self.circle.min_radius_ratio,
            self.circle.max_radius_ratio,
        )?;
        ordered(
            "square side ratio",
            self.square.min_side_ratio,
            self.square.max_side_ratio,
        )?;

        if !(0.0..=100.0).contains(&self.mask.percentile) {
            return Err(ConfigError::Percentile(self.mask.percentile));
        }
        Ok(())
    }

    /// Resolve ratio thresholds for a frame size
    pub fn pixel_thresholds(&self, width: i32, height: i32) -> PixelThresholds {
        let short_side = width.min(height).max(0) as f64;

        let circle_min_radius = (self.circle.min_radius_ratio * short_side).max(2.5);
        let circle_max_radius =
            (self.circle.max_radius_ratio * short_side).max(circle_min_radius + 1.0);
        let square_min_side = (self.square.min_side_ratio * short_side).max(3.0);
        let square_max_side = (self.square.max_side_ratio * short_side).max(square_min_side + 1.0);
        let merge_distance = (self.merge_dist_ratio * short_side).max(2.0);

        PixelThresholds {
            circle_min_radius,
            circle_max_radius,
            square_min_side,
            square_max_side,
            merge_distance,
        }
    }

    /// Sampled frame indices for a video with `total_frames` frames
    pub fn frame_range(&self, fps: f64, total_frames: u64) -> FrameRange {
        let fps = effective_fps(fps);
        let start = (self.frames.start_secs.max(0.0) * fps).floor() as u64;
        let last = total_frames.checked_sub(1);
        let end = match (last, self.frames.end_secs) {
            (None, _) => None,
            (Some(last), None) => Some(last),
            (Some(last), Some(end_secs)) => {
                Some(((end_secs * fps).floor().max(0.0) as u64).min(last))
            }
        };

        FrameRange {
            start,
            end,
            step: self.frames.sample_step.max(1) as u64,
        }
    }
}

fn non_negative(name: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

fn ordered(name: &'static str, min: f64, max: f64) -> std::result::Result<(), ConfigError> {
    non_negative(name, min)?;
    non_negative(name, max)?;
    if min > max {
        return Err(ConfigError::InvertedBounds { name, min, max });
    }
    Ok(())
}

impl MaskConfig {
    /// Absolute threshold if one is configured
    pub fn absolute_floor(&self) -> Option<f64> {
        self.min_count.filter(|count| *count >= 0.0)
    }
}

/// Frame rate used when a source reports none
pub const FALLBACK_FPS: f64 = 30.0;

pub fn effective_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        FALLBACK_FPS
    }
}

/// Normalize a kernel size to odd and at least 3
pub fn odd_kernel(ksize: u32) -> i32 {
    let k = if ksize % 2 == 0 { ksize + 1 } else { ksize };
    k.max(3) as i32
}

/// Ratio thresholds resolved to pixels for one frame size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelThresholds {
    pub circle_min_radius: f64,
    pub circle_max_radius: f64,
    pub square_min_side: f64,
    pub square_max_side: f64,
    pub merge_distance: f64,
}

/// Inclusive range of frame indices visited with a fixed stride
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: u64,
    /// Last frame to consider, `None` when the video reports no frames
    pub end: Option<u64>,
    pub step: u64,
}

impl FrameRange {
    pub fn iter(&self) -> impl Iterator<Item = u64> + use<> {
        let (start, step) = (self.start, self.step as usize);
        let end = self.end;
        let upper = match end {
            Some(end) if end >= start => end + 1,
            _ => start,
        };
        (start..upper).step_by(step)
    }

    pub fn len(&self) -> u64 {
        match self.end {
            Some(end) if end >= self.start => (end - self.start) / self.step + 1,
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into at most `parts` contiguous chunks of sampled indices
    pub fn chunks(&self, parts: usize) -> Vec<Vec<u64>> {
        let indices: Vec<u64> = self.iter().collect();
        if indices.is_empty() {
            return Vec::new();
        }
        let chunk_len = indices.len().div_ceil(parts.max(1));
        indices.chunks(chunk_len).map(|c| c.to_vec()).collect()
    }
}
