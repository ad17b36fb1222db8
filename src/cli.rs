//! Command line surface
//!
//! Every analysis setting has an optional flag. A `--config` JSON file (or a
//! named preset) supplies the base configuration and explicitly passed
//! flags override it.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use markheat_core::{AnalysisConfig, ColorRangeSet, Roi};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Default,
    Lenient,
    Strict,
}

impl Preset {
    pub fn config(self) -> AnalysisConfig {
        match self {
            Preset::Default => AnalysisConfig::default(),
            Preset::Lenient => AnalysisConfig::lenient(),
            Preset::Strict => AnalysisConfig::strict(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Input video file.
    #[arg(long)]
    pub video: PathBuf,
    /// Output directory for the detection log and images.
    #[arg(long, default_value = "heatmap_out")]
    pub out: PathBuf,
    /// JSON configuration file used as the base settings.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Built-in base settings, ignored when --config is given.
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    pub preset: Preset,

    /// Start time in seconds.
    #[arg(long)]
    pub start: Option<f64>,
    /// End time in seconds, negative for the end of the video.
    #[arg(long, allow_hyphen_values = true)]
    pub end: Option<f64>,
    /// Process every Nth frame.
    #[arg(long)]
    pub sample_step: Option<u32>,
    /// Detection region "x0,y0,x1,y1" in pixels, empty for the full frame.
    #[arg(long)]
    pub roi: Option<String>,

    /// Circle marker HSV ranges, "h,s,v-h,s,v;..." (OpenCV scale).
    #[arg(long)]
    pub hsv_circle: Option<String>,
    /// Square marker HSV ranges, "h,s,v-h,s,v;...".
    #[arg(long)]
    pub hsv_square: Option<String>,
    /// Gaussian blur before HSV conversion, odd size or 0 to disable.
    #[arg(long)]
    pub hsv_blur: Option<u32>,

    #[arg(long)]
    pub circle_circularity: Option<f64>,
    /// Minimum circle radius as a ratio of the shorter frame side.
    #[arg(long)]
    pub circle_min_r_ratio: Option<f64>,
    /// Maximum circle radius as a ratio of the shorter frame side.
    #[arg(long)]
    pub circle_max_r_ratio: Option<f64>,
    /// Allowed long/short side ratio above 1 for squares.
    #[arg(long)]
    pub square_ar_tol: Option<f64>,
    #[arg(long)]
    pub square_min_side_ratio: Option<f64>,
    #[arg(long)]
    pub square_max_side_ratio: Option<f64>,

    /// Elliptical kernel size for mask cleanup.
    #[arg(long)]
    pub morph_kernel: Option<u32>,
    #[arg(long)]
    pub circle_open: Option<u32>,
    #[arg(long)]
    pub circle_close: Option<u32>,
    #[arg(long)]
    pub square_open: Option<u32>,
    #[arg(long)]
    pub square_close: Option<u32>,
    /// Detections closer than this ratio of the shorter side are merged.
    #[arg(long)]
    pub merge_dist_ratio: Option<f64>,

    /// Gaussian kernel for heatmap smoothing.
    #[arg(long)]
    pub heatmap_blur: Option<u32>,
    #[arg(long)]
    pub overlay_alpha: Option<f64>,
    /// Percentile of nonzero heatmap cells used as the mask threshold.
    #[arg(long)]
    pub mask_percentile: Option<f64>,
    /// Absolute mask threshold, overrides the percentile when >= 0.
    #[arg(long, allow_hyphen_values = true)]
    pub mask_min_count: Option<f64>,
    #[arg(long)]
    pub mask_kernel: Option<u32>,
    #[arg(long)]
    pub mask_open: Option<u32>,
    #[arg(long)]
    pub mask_close: Option<u32>,
    /// Number of largest regions highlighted in the boundary image.
    #[arg(long)]
    pub top_regions: Option<usize>,
    #[arg(long)]
    pub min_region_area: Option<f64>,

    /// Save a detection preview every N frames, 0 disables.
    #[arg(long)]
    pub save_preview_every: Option<u32>,
    /// Hide the progress bar.
    #[arg(long)]
    pub no_progress: bool,
    /// Worker threads, 1 runs sequentially.
    #[cfg(feature = "parallel")]
    #[arg(long, default_value_t = 1)]
    pub workers: usize,
}

fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl Args {
    /// Base configuration with every passed flag applied on top
    pub fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?,
            None => self.preset.config(),
        };

        apply(&mut config.frames.start_secs, self.start);
        if let Some(end) = self.end {
            config.frames.end_secs = (end >= 0.0).then_some(end);
        }
        apply(&mut config.frames.sample_step, self.sample_step);
        if let Some(roi) = &self.roi {
            config.roi = Roi::parse_lenient(roi);
        }

        let seg = &mut config.segmentation;
        apply(&mut seg.circle_colors, self.hsv_circle.as_deref().map(ColorRangeSet::parse_lenient));
        apply(&mut seg.square_colors, self.hsv_square.as_deref().map(ColorRangeSet::parse_lenient));
        apply(&mut seg.blur_ksize, self.hsv_blur);

        apply(&mut config.circle.min_circularity, self.circle_circularity);
        apply(&mut config.circle.min_radius_ratio, self.circle_min_r_ratio);
        apply(&mut config.circle.max_radius_ratio, self.circle_max_r_ratio);
        apply(&mut config.square.aspect_tolerance, self.square_ar_tol);
        apply(&mut config.square.min_side_ratio, self.square_min_side_ratio);
        apply(&mut config.square.max_side_ratio, self.square_max_side_ratio);

        let morph = &mut config.morphology;
        apply(&mut morph.kernel, self.morph_kernel);
        apply(&mut morph.circle_open, self.circle_open);
        apply(&mut morph.circle_close, self.circle_close);
        apply(&mut morph.square_open, self.square_open);
        apply(&mut morph.square_close, self.square_close);
        apply(&mut config.merge_dist_ratio, self.merge_dist_ratio);

        apply(&mut config.heatmap.blur_ksize, self.heatmap_blur);
        apply(&mut config.heatmap.overlay_alpha, self.overlay_alpha);
        apply(&mut config.mask.percentile, self.mask_percentile);
        if self.mask_min_count.is_some() {
            config.mask.min_count = self.mask_min_count;
        }
        apply(&mut config.mask.kernel, self.mask_kernel);
        apply(&mut config.mask.open_iter, self.mask_open);
        apply(&mut config.mask.close_iter, self.mask_close);
        apply(&mut config.boundary.top_regions, self.top_regions);
        apply(&mut config.boundary.min_region_area, self.min_region_area);
        apply(&mut config.preview_every, self.save_preview_every);

        Ok(config)
    }
}
