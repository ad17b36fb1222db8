//! Square marker detection

use super::{MorphologyParams, clean_mask, external_contours};
use crate::Result;
use crate::traits::ShapeDetector;
use markheat_core::{AnalysisConfig, Candidate, PixelThresholds, ShapeClass};
use opencv::{
    core::{Mat, Point, RotatedRect, Vector},
    imgproc,
};

/// Polygon approximation tolerance as a share of the contour perimeter
const APPROX_EPSILON: f64 = 0.04;

/// Fit a square-like rotated rectangle to a contour.
///
/// Returns `None` when the polygon approximation has fewer than four
/// vertices or the long/short side ratio exceeds `1 + aspect_tolerance`.
/// The fit is the rotated minimum-area rectangle, so diamonds are accepted too.
pub fn square_fit(
    contour: &Vector<Point>,
    aspect_tolerance: f64,
) -> Result<Option<RotatedRect>> {
    let perimeter = imgproc::arc_length(contour, true)?;
    let mut approx = Vector::<Point>::new();
    imgproc::approx_poly_dp(contour, &mut approx, APPROX_EPSILON * perimeter, true)?;
    if approx.len() < 4 {
        return Ok(None);
    }

    let rect = imgproc::min_area_rect(contour)?;
    let w = (rect.size.width as f64).max(1e-3);
    let h = (rect.size.height as f64).max(1e-3);
    if w.max(h) / w.min(h) > 1.0 + aspect_tolerance {
        return Ok(None);
    }
    Ok(Some(rect))
}

/// Detects square-ish blobs with a short side inside the configured bounds
#[derive(Debug, Clone)]
pub struct SquareDetector {
    pub aspect_tolerance: f64,
    pub min_side: f64,
    pub max_side: f64,
    pub min_area: f64,
    pub morphology: MorphologyParams,
}

impl SquareDetector {
    pub fn from_config(config: &AnalysisConfig, thresholds: &PixelThresholds) -> Self {
        Self {
            aspect_tolerance: config.square.aspect_tolerance,
            min_side: thresholds.square_min_side,
            max_side: thresholds.square_max_side,
            min_area: config.square.min_area,
            morphology: MorphologyParams::new(
                config.morphology.kernel,
                config.morphology.square_open,
                config.morphology.square_close,
            ),
        }
    }
}

impl ShapeDetector for SquareDetector {
    fn shape_class(&self) -> ShapeClass {
        ShapeClass::Square
    }

    fn detect(&self, mask: &Mat, offset: Point) -> Result<Vec<Candidate>> {
        let cleaned = clean_mask(mask, self.morphology)?;
        let contours = external_contours(&cleaned)?;

        let mut candidates = Vec::new();
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if area < self.min_area {
                continue;
            }

            let Some(rect) = square_fit(&contour, self.aspect_tolerance)? else {
                continue;
            };
            let side = (rect.size.width.min(rect.size.height) as f64).max(1e-3);
            if side < self.min_side || side > self.max_side {
                continue;
            }

            candidates.push(Candidate::new(
                ShapeClass::Square,
                rect.center.x as f64 + offset.x as f64,
                rect.center.y as f64 + offset.y as f64,
                side,
                area,
            ));
        }

        log::debug!(
            "Square detector: {} contours, {} candidates",
            contours.len(),
            candidates.len()
        );
        Ok(candidates)
    }
}
