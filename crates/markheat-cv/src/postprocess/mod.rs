//! End-of-run post-processing
//!
//! Pure in-memory computations over the accumulated heatmaps: smoothing,
//! color overlays, mask extraction and the boundary summary image. Writing
//! the results anywhere is left to the caller.

pub mod boundary;
pub mod mask;
pub mod overlay;

pub use boundary::{Region, render_boundary};
pub use mask::{MaskThreshold, extract_mask, nonzero_percentile, percentile};
pub use overlay::{blend, colorize, smooth};

use crate::Result;
use crate::heatmap::{Heatmap, HeatmapAccumulator};
use anyhow::Context;
use markheat_core::{AnalysisConfig, Roi, ShapeClass};
use markheat_core::config::{BoundaryConfig, HeatmapConfig, MaskConfig};
use opencv::{core::Mat, prelude::*};

/// Smoothed grid with its colorized and blended renderings
#[derive(Debug)]
pub struct RenderedHeatmap {
    pub smoothed: Mat,
    pub color: Mat,
    pub overlay: Mat,
}

/// Everything produced after a run with at least one detection
#[derive(Debug)]
pub struct Artifacts {
    /// Unsmoothed combined grid, `CV_32FC1`
    pub raw: Mat,
    pub combined: RenderedHeatmap,
    pub per_class: Vec<(ShapeClass, RenderedHeatmap)>,
    pub mask: Mat,
    pub threshold: MaskThreshold,
    pub boundary: Mat,
    pub regions: Vec<Region>,
}

/// Turns accumulated heatmaps into the final images
#[derive(Debug, Clone)]
pub struct PostProcessor {
    heatmap: HeatmapConfig,
    mask: MaskConfig,
    boundary: BoundaryConfig,
    roi: Option<Roi>,
}

impl PostProcessor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            heatmap: config.heatmap.clone(),
            mask: config.mask.clone(),
            boundary: config.boundary.clone(),
            roi: config.roi,
        }
    }

    pub fn render(&self, heatmap: &Heatmap, reference: &Mat) -> Result<RenderedHeatmap> {
        let smoothed = smooth(heatmap.grid(), self.heatmap.blur_ksize)?;
        let color = colorize(&smoothed)?;
        let overlay = blend(reference, &color, self.heatmap.overlay_alpha)?;
        Ok(RenderedHeatmap {
            smoothed,
            color,
            overlay,
        })
    }

    pub fn process(
        &self,
        accumulator: &HeatmapAccumulator,
        reference: &Mat,
        total_detections: usize,
    ) -> Result<Artifacts> {
        let combined = self
            .render(accumulator.combined(), reference)
            .context("Failed to render combined heatmap")?;

        let mut per_class = Vec::with_capacity(ShapeClass::ALL.len());
        for class in ShapeClass::ALL {
            let rendered = self
                .render(accumulator.class(class), reference)
                .with_context(|| format!("Failed to render {} heatmap", class))?;
            per_class.push((class, rendered));
        }

        let (mask, threshold) = extract_mask(&combined.smoothed, &self.mask)?;
        log::info!("Mask threshold: {}", threshold);

        let (boundary, regions) = render_boundary(
            reference,
            &mask,
            self.roi.as_ref(),
            total_detections,
            &self.boundary,
        )?;
        log::info!("Highlighted {} marker regions", regions.len());

        Ok(Artifacts {
            raw: accumulator.combined().grid().try_clone()?,
            combined,
            per_class,
            mask,
            threshold,
            boundary,
            regions,
        })
    }
}
