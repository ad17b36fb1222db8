//! HSV color segmentation

use crate::Result;
use anyhow::Context;
use markheat_core::{ColorRange, ColorRangeSet, Roi};
use opencv::{
    core::{self, CV_8UC1, Mat, Point, Rect, Scalar, Size},
    imgproc,
    prelude::*,
};

/// Binary mask of one marker class plus the ROI origin it was cut from
#[derive(Debug)]
pub struct SegmentedMask {
    pub mask: Mat,
    pub offset: Point,
}

/// Turns BGR frames into per-class foreground masks
#[derive(Debug, Clone)]
pub struct ColorSegmenter {
    colors: ColorRangeSet,
    blur_ksize: i32,
    roi: Option<Roi>,
}

impl ColorSegmenter {
    pub fn new(colors: ColorRangeSet, blur_ksize: u32, roi: Option<Roi>) -> Self {
        Self {
            colors,
            blur_ksize: blur_ksize as i32,
            roi,
        }
    }

    /// Segment a BGR frame.
    ///
    /// A pixel is foreground when it lies in any configured range. No
    /// ranges, or an ROI that misses the frame, give an all-background mask.
    pub fn segment(&self, frame: &Mat) -> Result<SegmentedMask> {
        let size = frame.size()?;
        let region = match self.roi {
            Some(roi) => roi.clamp(size.width, size.height),
            None => Roi::full(size.width, size.height),
        };
        let offset = Point::new(region.x0.max(0), region.y0.max(0));

        if region.is_empty() {
            return Ok(SegmentedMask {
                mask: Mat::default(),
                offset,
            });
        }

        let crop = if region.covers(size.width, size.height) {
            frame.try_clone()?
        } else {
            let rect = Rect::new(region.x0, region.y0, region.width(), region.height());
            Mat::roi(frame, rect)
                .with_context(|| format!("Failed to crop frame to ROI {}", region))?
                .try_clone()?
        };

        let mut mask = Mat::new_rows_cols_with_default(
            region.height(),
            region.width(),
            CV_8UC1,
            Scalar::all(0.0),
        )?;
        if self.colors.is_empty() {
            return Ok(SegmentedMask { mask, offset });
        }

        let smoothed = if self.blur_ksize >= 3 && self.blur_ksize % 2 == 1 {
            let mut blurred = Mat::default();
            imgproc::gaussian_blur_def(
                &crop,
                &mut blurred,
                Size::new(self.blur_ksize, self.blur_ksize),
                0.0,
            )
            .context("Pre-segmentation blur failed")?;
            blurred
        } else {
            crop
        };

        let mut hsv = Mat::default();
        imgproc::cvt_color_def(&smoothed, &mut hsv, imgproc::COLOR_BGR2HSV)
            .context("BGR to HSV conversion failed")?;

        for range in self.colors.ranges() {
            let matched = in_range(&hsv, range)?;
            let mut merged = Mat::default();
            core::bitwise_or(&mask, &matched, &mut merged, &core::no_array())?;
            mask = merged;
        }

        Ok(SegmentedMask { mask, offset })
    }
}

fn in_range(hsv: &Mat, range: &ColorRange) -> Result<Mat> {
    let [lh, ls, lv] = range.lower;
    let [uh, us, uv] = range.upper;
    let lower = Scalar::new(lh as f64, ls as f64, lv as f64, 0.0);
    let upper = Scalar::new(uh as f64, us as f64, uv as f64, 0.0);

    let mut matched = Mat::default();
    core::in_range(hsv, &lower, &upper, &mut matched)
        .with_context(|| format!("inRange failed for {}", range))?;
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::CV_8UC3;

    /// Pure blue in BGR is hue 120 in OpenCV HSV
    fn blue_square_frame() -> Result<Mat> {
        let mut frame = Mat::new_rows_cols_with_default(60, 80, CV_8UC3, Scalar::all(0.0))?;
        imgproc::rectangle(
            &mut frame,
            Rect::new(20, 10, 20, 20),
            Scalar::new(255.0, 0.0, 0.0, 0.0),
            -1,
            imgproc::LINE_8,
            0,
        )?;
        Ok(frame)
    }

    #[test]
    fn test_segment_matches_configured_color() -> Result<()> {
        let frame = blue_square_frame()?;
        let segmenter = ColorSegmenter::new(
            ColorRangeSet::parse_lenient("100,100,100-130,255,255"),
            0,
            None,
        );

        let segmented = segmenter.segment(&frame)?;
        assert_eq!(segmented.offset, Point::new(0, 0));
        assert_eq!(core::count_non_zero(&segmented.mask)?, 400);
        assert_eq!(*segmented.mask.at_2d::<u8>(20, 30)?, 255);
        assert_eq!(*segmented.mask.at_2d::<u8>(0, 0)?, 0);
        Ok(())
    }

    #[test]
    fn test_no_ranges_gives_background_mask() -> Result<()> {
        let frame = blue_square_frame()?;
        let segmenter = ColorSegmenter::new(ColorRangeSet::default(), 3, None);

        let segmented = segmenter.segment(&frame)?;
        assert_eq!(segmented.mask.rows(), 60);
        assert_eq!(segmented.mask.cols(), 80);
        assert_eq!(core::count_non_zero(&segmented.mask)?, 0);
        Ok(())
    }

    #[test]
    fn test_ranges_are_unioned() -> Result<()> {
        let frame = blue_square_frame()?;
        let only_green = ColorSegmenter::new(
            ColorRangeSet::parse_lenient("35,60,60-85,255,255"),
            0,
            None,
        );
        assert_eq!(core::count_non_zero(&only_green.segment(&frame)?.mask)?, 0);

        let green_or_blue = ColorSegmenter::new(
            ColorRangeSet::parse_lenient("35,60,60-85,255,255;100,100,100-130,255,255"),
            0,
            None,
        );
        assert_eq!(
            core::count_non_zero(&green_or_blue.segment(&frame)?.mask)?,
            400
        );
        Ok(())
    }

    #[test]
    fn test_roi_crops_and_reports_offset() -> Result<()> {
        let frame = blue_square_frame()?;
        let segmenter = ColorSegmenter::new(
            ColorRangeSet::parse_lenient("100,100,100-130,255,255"),
            0,
            Some(Roi::new(30, 5, 200, 40)),
        );

        let segmented = segmenter.segment(&frame)?;
        assert_eq!(segmented.offset, Point::new(30, 5));
        assert_eq!(segmented.mask.cols(), 50);
        assert_eq!(segmented.mask.rows(), 35);
        // only the right half of the square lies inside the ROI
        assert_eq!(core::count_non_zero(&segmented.mask)?, 200);
        Ok(())
    }

    #[test]
    fn test_roi_outside_frame_is_empty() -> Result<()> {
        let frame = blue_square_frame()?;
        let segmenter = ColorSegmenter::new(
            ColorRangeSet::parse_lenient("100,100,100-130,255,255"),
            0,
            Some(Roi::new(500, 500, 600, 600)),
        );

        assert!(segmenter.segment(&frame)?.mask.empty());
        Ok(())
    }
}
