//! Region ranking and the boundary summary image

use crate::Result;
use crate::shapes::external_contours;
use markheat_core::Roi;
use markheat_core::config::BoundaryConfig;
use opencv::{
    core::{self, Mat, Point, Rect, Scalar, Vector},
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8},
    prelude::*,
};
use serde::{Deserialize, Serialize};

/// BGR colors for the highlighted regions, by rank
const REGION_PALETTE: [(f64, f64, f64); 5] = [
    (255.0, 0.0, 0.0),
    (255.0, 165.0, 0.0),
    (255.0, 255.0, 0.0),
    (0.0, 255.0, 255.0),
    (255.0, 0.0, 255.0),
];

const ROI_COLOR: (f64, f64, f64) = (0.0, 255.0, 0.0);
const CONTOUR_COLOR: (f64, f64, f64) = (0.0, 0.0, 255.0);
const TEXT_COLOR: (f64, f64, f64) = (255.0, 255.0, 255.0);

fn bgr((b, g, r): (f64, f64, f64)) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

/// A highlighted high-density region of the final mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// 1-based, by descending area
    pub rank: usize,
    pub area: f64,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn bounding_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Mask contours sorted by descending area; equal areas keep contour order
fn contours_by_area(mask: &Mat) -> Result<Vec<(f64, Vector<Point>)>> {
    let mut ranked = Vec::new();
    for contour in external_contours(mask)?.iter() {
        let area = imgproc::contour_area(&contour, false)?;
        ranked.push((area, contour));
    }
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    Ok(ranked)
}

/// The largest `top_regions` mask contours whose area exceeds the floor
fn select_regions(ranked: &[(f64, Vector<Point>)], config: &BoundaryConfig) -> Result<Vec<Region>> {
    let mut regions = Vec::new();
    for (i, (area, contour)) in ranked.iter().take(config.top_regions).enumerate() {
        if *area <= config.min_region_area {
            continue;
        }
        let rect = imgproc::bounding_rect(contour)?;
        regions.push(Region {
            rank: i + 1,
            area: *area,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        });
    }
    Ok(regions)
}

/// Draw mask contours, the top regions, the ROI and run totals over a
/// copy of the reference frame
pub fn render_boundary(
    reference: &Mat,
    mask: &Mat,
    roi: Option<&Roi>,
    total_detections: usize,
    config: &BoundaryConfig,
) -> Result<(Mat, Vec<Region>)> {
    let mut canvas = reference.try_clone()?;

    if let Some(roi) = roi {
        let color = bgr(ROI_COLOR);
        imgproc::rectangle_points(
            &mut canvas,
            Point::new(roi.x0, roi.y0),
            Point::new(roi.x1, roi.y1),
            color,
            3,
            LINE_8,
            0,
        )?;
        put_label(&mut canvas, "ROI", Point::new(roi.x0, roi.y0 - 10), 0.8, color)?;
    }

    let ranked = contours_by_area(mask)?;
    let all: Vector<Vector<Point>> = ranked.iter().map(|(_, c)| c.clone()).collect();
    draw_contours(&mut canvas, &all, -1, bgr(CONTOUR_COLOR), 2)?;

    let regions = select_regions(&ranked, config)?;
    for region in &regions {
        let color = bgr(REGION_PALETTE[(region.rank - 1) % REGION_PALETTE.len()]);
        let contour = &ranked[region.rank - 1].1;
        let single: Vector<Vector<Point>> = std::iter::once(contour.clone()).collect();
        draw_contours(&mut canvas, &single, 0, color, 3)?;

        imgproc::rectangle(&mut canvas, region.bounding_rect(), color, 2, LINE_8, 0)?;
        put_label(
            &mut canvas,
            &format!("Region {} area:{}", region.rank, region.area as i64),
            Point::new(region.x, region.y - 5),
            0.6,
            color,
        )?;
    }

    let text = bgr(TEXT_COLOR);
    put_label(
        &mut canvas,
        &format!("Detections: {}", total_detections),
        Point::new(10, 30),
        1.0,
        text,
    )?;
    put_label(&mut canvas, "Marker regions", Point::new(10, 70), 1.0, text)?;

    Ok((canvas, regions))
}

fn draw_contours(
    canvas: &mut Mat,
    contours: &Vector<Vector<Point>>,
    index: i32,
    color: Scalar,
    thickness: i32,
) -> Result<()> {
    if contours.is_empty() {
        return Ok(());
    }
    imgproc::draw_contours(
        canvas,
        contours,
        index,
        color,
        thickness,
        LINE_8,
        &core::no_array(),
        i32::MAX,
        Point::default(),
    )?;
    Ok(())
}

fn put_label(canvas: &mut Mat, text: &str, origin: Point, scale: f64, color: Scalar) -> Result<()> {
    imgproc::put_text(
        canvas,
        text,
        origin,
        FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        2,
        LINE_8,
        false,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{CV_8UC1, CV_8UC3, Vec3b};

    fn mask_with_blobs() -> Result<Mat> {
        let mut mask = Mat::new_rows_cols_with_default(120, 160, CV_8UC1, Scalar::all(0.0))?;
        let white = Scalar::all(255.0);
        // areas after contour tracing: 39*39, 19*19, 4*4
        imgproc::rectangle(&mut mask, Rect::new(100, 60, 40, 40), white, -1, LINE_8, 0)?;
        imgproc::rectangle(&mut mask, Rect::new(10, 90, 20, 20), white, -1, LINE_8, 0)?;
        imgproc::rectangle(&mut mask, Rect::new(60, 10, 5, 5), white, -1, LINE_8, 0)?;
        Ok(mask)
    }

    #[test]
    fn test_regions_ranked_and_floored() -> Result<()> {
        let ranked = contours_by_area(&mask_with_blobs()?)?;
        let regions = select_regions(&ranked, &BoundaryConfig::default())?;

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].rank, 1);
        assert_eq!(regions[0].area, 39.0 * 39.0);
        assert_eq!((regions[0].x, regions[0].y), (100, 60));
        assert_eq!(regions[1].rank, 2);
        assert_eq!(regions[1].area, 19.0 * 19.0);
        Ok(())
    }

    #[test]
    fn test_top_regions_limit() -> Result<()> {
        let config = BoundaryConfig {
            top_regions: 1,
            ..BoundaryConfig::default()
        };
        let ranked = contours_by_area(&mask_with_blobs()?)?;
        assert_eq!(select_regions(&ranked, &config)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_render_draws_on_copy() -> Result<()> {
        let reference = Mat::new_rows_cols_with_default(120, 160, CV_8UC3, Scalar::all(0.0))?;
        let mask = mask_with_blobs()?;
        let roi = Roi::new(5, 5, 150, 115);

        let (image, regions) =
            render_boundary(&reference, &mask, Some(&roi), 7, &BoundaryConfig::default())?;
        assert_eq!(regions.len(), 2);
        assert_eq!(image.size()?, reference.size()?);
        // the reference frame is left untouched
        assert_eq!(*reference.at_2d::<Vec3b>(99, 120)?, Vec3b::all(0));
        // bottom edge of the top region in the first palette color
        assert_eq!(*image.at_2d::<Vec3b>(99, 120)?, Vec3b::from([255, 0, 0]));
        Ok(())
    }
}
