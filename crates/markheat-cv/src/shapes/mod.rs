//! Contour based shape detection on binary masks
//!
//! Both detectors share the same cleanup: an elliptical opening to remove
//! speckle followed by a closing to fill small gaps, then external contour
//! extraction.

pub mod circle;
pub mod square;

pub use circle::{CircleDetector, contour_circularity};
pub use square::{SquareDetector, square_fit};

use crate::Result;
use anyhow::Context;
use markheat_core::config::odd_kernel;
use opencv::{
    core::{self, Mat, Point, Size, Vector},
    imgproc,
    prelude::*,
};

/// Morphological cleanup settings for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphologyParams {
    /// Normalized to odd and at least 3 when the element is built
    pub kernel: u32,
    pub open_iter: u32,
    pub close_iter: u32,
}

impl MorphologyParams {
    pub fn new(kernel: u32, open_iter: u32, close_iter: u32) -> Self {
        Self {
            kernel,
            open_iter,
            close_iter,
        }
    }
}

pub(crate) fn structuring_element(ksize: u32) -> Result<Mat> {
    let k = odd_kernel(ksize);
    imgproc::get_structuring_element(
        imgproc::MORPH_ELLIPSE,
        Size::new(k, k),
        Point::new(-1, -1),
    )
    .with_context(|| format!("Failed to build {}x{} elliptical kernel", k, k))
}

pub(crate) fn morph(src: &Mat, op: i32, kernel: &Mat, iterations: u32) -> Result<Mat> {
    let mut dst = Mat::default();
    imgproc::morphology_ex(
        src,
        &mut dst,
        op,
        kernel,
        Point::new(-1, -1),
        iterations as i32,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    Ok(dst)
}

/// Open then close a binary mask; zero iterations skip the operation.
///
/// An empty mask (an ROI that misses the frame) is returned unchanged.
pub fn clean_mask(mask: &Mat, params: MorphologyParams) -> Result<Mat> {
    if mask.empty() || (params.open_iter == 0 && params.close_iter == 0) {
        return Ok(mask.try_clone()?);
    }

    let kernel = structuring_element(params.kernel)?;
    let mut cleaned = if params.open_iter > 0 {
        morph(mask, imgproc::MORPH_OPEN, &kernel, params.open_iter)
            .context("Morphological opening failed")?
    } else {
        mask.try_clone()?
    };
    if params.close_iter > 0 {
        cleaned = morph(&cleaned, imgproc::MORPH_CLOSE, &kernel, params.close_iter)
            .context("Morphological closing failed")?;
    }
    Ok(cleaned)
}

/// Outer contours of a binary mask, inner holes are ignored
pub fn external_contours(mask: &Mat) -> Result<Vector<Vector<Point>>> {
    let mut contours = Vector::<Vector<Point>>::new();
    if mask.empty() {
        return Ok(contours);
    }
    imgproc::find_contours_def(
        mask,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
    )
    .context("Contour extraction failed")?;
    Ok(contours)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use opencv::core::Rect;

    #[test]
    fn test_opening_removes_speckle() -> Result<()> {
        let mut mask = rect_mask(60, 60, Rect::new(10, 10, 20, 20))?;
        // isolated single pixel noise
        *mask.at_2d_mut::<u8>(50, 50)? = 255;

        let cleaned = clean_mask(&mask, MorphologyParams::new(5, 1, 1))?;
        assert_eq!(*cleaned.at_2d::<u8>(50, 50)?, 0);
        assert_eq!(*cleaned.at_2d::<u8>(20, 20)?, 255);
        assert_eq!(external_contours(&cleaned)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_zero_iterations_is_identity() -> Result<()> {
        let mut mask = blank_mask(20, 20)?;
        *mask.at_2d_mut::<u8>(5, 5)? = 255;

        let cleaned = clean_mask(&mask, MorphologyParams::new(5, 0, 0))?;
        assert_eq!(core::count_non_zero(&cleaned)?, 1);
        Ok(())
    }

    #[test]
    fn test_empty_mask_passes_through() -> Result<()> {
        let cleaned = clean_mask(&Mat::default(), MorphologyParams::new(5, 1, 1))?;
        assert!(cleaned.empty());
        assert!(external_contours(&cleaned)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_external_contours_skip_holes() -> Result<()> {
        let mut mask = rect_mask(50, 50, Rect::new(5, 5, 40, 40))?;
        imgproc::rectangle(
            &mut mask,
            Rect::new(15, 15, 10, 10),
            opencv::core::Scalar::all(0.0),
            -1,
            imgproc::LINE_8,
            0,
        )?;

        assert_eq!(external_contours(&mask)?.len(), 1);
        assert!(external_contours(&Mat::default())?.is_empty());
        Ok(())
    }
}
