//! Heatmap smoothing and color overlays

use crate::Result;
use anyhow::{Context, bail};
use markheat_core::config::odd_kernel;
use opencv::{
    core::{self, CV_8U, CV_8UC1, Mat, Scalar, Size},
    imgproc,
    prelude::*,
};

/// Gaussian blur turning an occurrence histogram into a density field.
/// The kernel is normalized to odd and at least 3.
pub fn smooth(grid: &Mat, ksize: u32) -> Result<Mat> {
    let k = odd_kernel(ksize);
    let mut smoothed = Mat::default();
    imgproc::gaussian_blur_def(grid, &mut smoothed, Size::new(k, k), 0.0)
        .with_context(|| format!("Heatmap smoothing with a {}x{} kernel failed", k, k))?;
    Ok(smoothed)
}

/// Map a float grid through the JET palette after normalizing by its own
/// maximum. An all-zero grid maps to the bottom of the palette.
pub fn colorize(grid: &Mat) -> Result<Mat> {
    let mut max = 0.0;
    core::min_max_loc(grid, None, Some(&mut max), None, None, &core::no_array())?;

    let mut scaled = Mat::default();
    if max > 0.0 {
        grid.convert_to(&mut scaled, CV_8U, 255.0 / (max + 1e-9), 0.0)?;
    } else {
        scaled =
            Mat::new_rows_cols_with_default(grid.rows(), grid.cols(), CV_8UC1, Scalar::all(0.0))?;
    }

    let mut color = Mat::default();
    imgproc::apply_color_map(&scaled, &mut color, imgproc::COLORMAP_JET)
        .context("Failed to apply heatmap color map")?;
    Ok(color)
}

/// `base + alpha * color`, saturating
pub fn blend(base: &Mat, color: &Mat, alpha: f64) -> Result<Mat> {
    if base.size()? != color.size()? {
        bail!(
            "Overlay size {:?} does not match reference frame {:?}",
            color.size()?,
            base.size()?
        );
    }
    let mut out = Mat::default();
    core::add_weighted(base, 1.0, color, alpha, 0.0, &mut out, -1)
        .context("Failed to blend heatmap over reference frame")?;
    Ok(out)
}
