//! Binary mask extraction from the smoothed combined heatmap

use crate::Result;
use crate::shapes::{MorphologyParams, clean_mask};
use anyhow::Context;
use markheat_core::config::MaskConfig;
use opencv::{
    core::{self, Mat, Scalar},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the mask threshold was chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum MaskThreshold {
    Absolute { value: f64 },
    Percentile { percentile: f64, value: f64 },
}

impl MaskThreshold {
    pub fn value(&self) -> f64 {
        match self {
            MaskThreshold::Absolute { value } => *value,
            MaskThreshold::Percentile { value, .. } => *value,
        }
    }
}

impl fmt::Display for MaskThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskThreshold::Absolute { value } => write!(f, "absolute ({:.3})", value),
            MaskThreshold::Percentile { percentile, value } => {
                write!(f, "P{:.1} -> {:.3}", percentile, value)
            }
        }
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// Returns `None` for an empty slice.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Percentile over the strictly positive cells of a float grid, 0 when
/// there are none
pub fn nonzero_percentile(grid: &Mat, pct: f64) -> Result<f64> {
    let continuous = if grid.is_continuous() {
        None
    } else {
        Some(grid.try_clone()?)
    };
    let cells = continuous.as_ref().unwrap_or(grid).data_typed::<f32>()?;

    let nonzero: Vec<f64> = cells
        .iter()
        .filter(|v| **v > 0.0)
        .map(|v| *v as f64)
        .collect();
    Ok(percentile(&nonzero, pct).unwrap_or(0.0))
}

/// Resolve the threshold for a smoothed grid
pub fn resolve_threshold(smoothed: &Mat, config: &MaskConfig) -> Result<MaskThreshold> {
    match config.absolute_floor() {
        Some(value) => Ok(MaskThreshold::Absolute { value }),
        None => Ok(MaskThreshold::Percentile {
            percentile: config.percentile,
            value: nonzero_percentile(smoothed, config.percentile)?,
        }),
    }
}

/// Threshold a smoothed grid (`cell >= threshold`) and clean the result
/// with the configured opening and closing
pub fn extract_mask(smoothed: &Mat, config: &MaskConfig) -> Result<(Mat, MaskThreshold)> {
    let threshold = resolve_threshold(smoothed, config)?;

    let mut raw = Mat::default();
    core::compare(
        smoothed,
        &Scalar::all(threshold.value()),
        &mut raw,
        core::CMP_GE,
    )
    .context("Failed to threshold heatmap")?;

    let params = MorphologyParams::new(config.kernel, config.open_iter, config.close_iter);
    let mask = clean_mask(&raw, params).context("Mask cleanup failed")?;
    Ok((mask, threshold))
}
