//! Persisting run results: detection log, images and the JSON summary

use anyhow::{Context, Result};
use markheat_core::{AnalysisConfig, Detection, FrameRange, PixelThresholds, ShapeClass};
use markheat_cv::pipeline::{AnalysisReport, RunStats};
use markheat_cv::postprocess::{MaskThreshold, Region};
use markheat_cv::utils::ImageUtils;
use markheat_cv::{Artifacts, VideoProperties};
use opencv::core::Mat;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DETECTIONS_FILE: &str = "detections.csv";
pub const SUMMARY_FILE: &str = "summary.json";

/// Machine readable record of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub video: VideoProperties,
    pub fps: f64,
    pub frames: FrameRange,
    pub thresholds: PixelThresholds,
    pub stats: &'a RunStats,
    pub detections: usize,
    pub mask_threshold: MaskThreshold,
    pub regions: &'a [Region],
    pub config: &'a AnalysisConfig,
}

/// Writes everything a run produces into one output directory
#[derive(Debug, Clone)]
pub struct Reporter {
    out_dir: PathBuf,
}

impl Reporter {
    pub fn create<P: AsRef<Path>>(out_dir: P) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;
        Ok(Self { out_dir })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.out_dir.join(name)
    }

    /// Detection log as CSV, one row per detection in frame order
    pub fn write_detections(&self, detections: &[Detection]) -> Result<PathBuf> {
        let path = self.path(DETECTIONS_FILE);
        let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{}", Detection::LOG_HEADER.join(","))?;
        for detection in detections {
            writeln!(writer, "{}", detection.log_fields().join(","))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write {:?}", path))?;

        log::info!("Saved {} detections: {:?}", detections.len(), path);
        Ok(path)
    }

    pub fn save_preview(&self, sequence: usize, image: &Mat) -> Result<PathBuf> {
        self.save(&format!("preview_{:05}.png", sequence), image)
    }

    fn save(&self, name: &str, image: &Mat) -> Result<PathBuf> {
        let path = self.path(name);
        ImageUtils::save_image(image, &path)?;
        Ok(path)
    }

    /// Every post-processing image plus the raw combined grid
    pub fn write_artifacts(&self, artifacts: &Artifacts) -> Result<Vec<PathBuf>> {
        let mut written = vec![
            self.save("heatmap_overlay.png", &artifacts.combined.overlay)?,
            self.save("heatmap_color.png", &artifacts.combined.color)?,
        ];
        for (class, rendered) in &artifacts.per_class {
            written.push(self.save(&format!("heatmap_{}_color.png", class), &rendered.color)?);
            written.push(self.save(&format!("heatmap_{}_overlay.png", class), &rendered.overlay)?);
        }

        let raw = self.path("heatmap_raw.tiff");
        ImageUtils::save_float_grid(&artifacts.raw, &raw)?;
        written.push(raw);

        written.push(self.save("mask.png", &artifacts.mask)?);
        written.push(self.save("marker_regions.png", &artifacts.boundary)?);

        for path in &written {
            log::info!("Saved {:?}", path);
        }
        Ok(written)
    }

    pub fn write_summary(&self, summary: &RunSummary<'_>) -> Result<PathBuf> {
        let path = self.path(SUMMARY_FILE);
        let json =
            serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write JSON to: {:?}", path))?;
        Ok(path)
    }

    /// Persist a completed run: log, images and summary
    pub fn write_report(
        &self,
        report: &AnalysisReport,
        artifacts: &Artifacts,
        config: &AnalysisConfig,
    ) -> Result<()> {
        self.write_detections(&report.detections)?;
        self.write_artifacts(artifacts)?;

        let summary = RunSummary {
            video: report.plan.properties,
            fps: report.plan.fps,
            frames: report.plan.frames,
            thresholds: report.plan.thresholds,
            stats: &report.stats,
            detections: report.detections.len(),
            mask_threshold: artifacts.threshold,
            regions: &artifacts.regions,
            config,
        };
        let path = self.write_summary(&summary)?;
        log::info!("Saved run summary: {:?}", path);

        for class in ShapeClass::ALL {
            let count = report.accumulator.class(class).count();
            log::info!("{} detections: {}", class, count);
        }
        Ok(())
    }
}
