//! Circle marker detection

use super::{MorphologyParams, clean_mask, external_contours};
use crate::Result;
use crate::traits::ShapeDetector;
use markheat_core::{AnalysisConfig, Candidate, PixelThresholds, ShapeClass};
use opencv::{
    core::{Mat, Point, Point2f, Vector},
    imgproc,
};
use std::f64::consts::PI;

/// Share of the minimum circle area a contour must reach, low enough to
/// keep partially occluded markers
const AREA_FLOOR_FRACTION: f64 = 0.3;

/// Roundness of a closed contour, `4*pi*A / P^2`, 1.0 for a perfect circle
pub fn contour_circularity(contour: &Vector<Point>) -> Result<f64> {
    let area = imgproc::contour_area(contour, false)?;
    let perimeter = imgproc::arc_length(contour, true)?;
    Ok(circularity(area, perimeter))
}

fn circularity(area: f64, perimeter: f64) -> f64 {
    4.0 * PI * area / perimeter.max(1.0).powi(2)
}

/// Detects round blobs with a radius inside the configured pixel bounds
#[derive(Debug, Clone)]
pub struct CircleDetector {
    pub min_circularity: f64,
    pub min_radius: f64,
    pub max_radius: f64,
    pub min_area: f64,
    pub morphology: MorphologyParams,
}

impl CircleDetector {
    pub fn from_config(config: &AnalysisConfig, thresholds: &PixelThresholds) -> Self {
        Self {
            min_circularity: config.circle.min_circularity,
            min_radius: thresholds.circle_min_radius,
            max_radius: thresholds.circle_max_radius,
            min_area: config.circle.min_area,
            morphology: MorphologyParams::new(
                config.morphology.kernel,
                config.morphology.circle_open,
                config.morphology.circle_close,
            ),
        }
    }

    /// Smallest contour area considered at all
    pub fn area_floor(&self) -> f64 {
        self.min_area
            .max(AREA_FLOOR_FRACTION * PI * self.min_radius * self.min_radius)
    }
}

impl ShapeDetector for CircleDetector {
    fn shape_class(&self) -> ShapeClass {
        ShapeClass::Circle
    }

    fn detect(&self, mask: &Mat, offset: Point) -> Result<Vec<Candidate>> {
        let cleaned = clean_mask(mask, self.morphology)?;
        let contours = external_contours(&cleaned)?;
        let area_floor = self.area_floor();

        let mut candidates = Vec::new();
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if area < area_floor {
                continue;
            }

            let perimeter = imgproc::arc_length(&contour, true)?;
            let roundness = circularity(area, perimeter);
            if roundness < self.min_circularity {
                continue;
            }

            let mut center = Point2f::default();
            let mut radius = 0.0f32;
            imgproc::min_enclosing_circle(&contour, &mut center, &mut radius)?;
            let radius = radius as f64;
            if radius < self.min_radius || radius > self.max_radius {
                continue;
            }

            candidates.push(Candidate::new(
                ShapeClass::Circle,
                center.x as f64 + offset.x as f64,
                center.y as f64 + offset.y as f64,
                radius,
                roundness * area,
            ));
        }

        log::debug!(
            "Circle detector: {} contours, {} candidates",
            contours.len(),
            candidates.len()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn detector_for(width: i32, height: i32) -> CircleDetector {
        let config = AnalysisConfig::default();
        CircleDetector::from_config(&config, &config.pixel_thresholds(width, height))
    }

    #[test]
    fn test_perfect_circle_contour_is_round() -> Result<()> {
        let contour = circle_contour((100.0, 100.0), 50.0, 72);
        let roundness = contour_circularity(&contour)?;
        assert!((roundness - 1.0).abs() < 0.02, "circularity {}", roundness);
        assert!(roundness >= AnalysisConfig::default().circle.min_circularity);
        Ok(())
    }

    #[test]
    fn test_thin_rectangle_of_equal_area_is_rejected() -> Result<()> {
        // area close to pi * 50^2 at a 10:1 aspect
        let contour = polygon(&[(0, 0), (280, 0), (280, 28), (0, 28)]);
        let roundness = contour_circularity(&contour)?;
        assert!(roundness < AnalysisConfig::default().circle.min_circularity);
        Ok(())
    }

    #[test]
    fn test_detects_disk_with_offset() -> Result<()> {
        let mask = disk_mask(100, 100, Point::new(50, 50), 5)?;
        let candidates = detector_for(100, 100).detect(&mask, Point::new(10, 20))?;

        assert_eq!(candidates.len(), 1);
        let c = candidates[0];
        assert_eq!(c.class, ShapeClass::Circle);
        assert!((c.x - 60.0).abs() <= 1.0);
        assert!((c.y - 70.0).abs() <= 1.0);
        assert!((c.size - 5.0).abs() <= 1.0);
        assert!(c.score > 0.0);
        Ok(())
    }

    #[test]
    fn test_radius_bounds_reject_large_blob() -> Result<()> {
        // 100x100 frame allows radii up to 6 px with the default ratios
        let mask = disk_mask(100, 100, Point::new(50, 50), 20)?;
        assert!(detector_for(100, 100).detect(&mask, Point::new(0, 0))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_detection_is_scale_invariant() -> Result<()> {
        let small = disk_mask(100, 100, Point::new(40, 60), 5)?;
        let large = disk_mask(200, 200, Point::new(80, 120), 10)?;

        let a = detector_for(100, 100).detect(&small, Point::new(0, 0))?;
        let b = detector_for(200, 200).detect(&large, Point::new(0, 0))?;

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert!((b[0].x - 2.0 * a[0].x).abs() <= 2.0);
        assert!((b[0].y - 2.0 * a[0].y).abs() <= 2.0);
        assert!((b[0].size - 2.0 * a[0].size).abs() <= 2.0);
        Ok(())
    }

    #[test]
    fn test_empty_mask_yields_nothing() -> Result<()> {
        let mask = blank_mask(40, 40)?;
        assert!(detector_for(40, 40).detect(&mask, Point::new(0, 0))?.is_empty());
        Ok(())
    }
}
