//! Conversions between OpenCV matrices and the `image` crate, and saving

use crate::Result;
use anyhow::{Context, bail};
use opencv::{
    core::{CV_8U, CV_8UC3, CV_32F, Mat, Scalar, Vector},
    imgcodecs,
    imgproc,
    prelude::*,
};
use std::path::Path;

/// Image utility functions
pub struct ImageUtils;

impl ImageUtils {
    /// Convert an 8-bit BGR, BGRA or grayscale Mat to an RGB image
    pub fn mat_to_rgb(mat: &Mat) -> Result<image::RgbImage> {
        if mat.depth() != CV_8U {
            bail!("Expected an 8-bit Mat, got depth {}", mat.depth());
        }
        let code = match mat.channels() {
            1 => imgproc::COLOR_GRAY2RGB,
            3 => imgproc::COLOR_BGR2RGB,
            4 => imgproc::COLOR_BGRA2RGB,
            n => bail!("Unsupported channel count {}", n),
        };

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(mat, &mut rgb, code).context("Failed to convert Mat to RGB")?;
        let bytes = rgb.data_bytes()?.to_vec();
        image::RgbImage::from_raw(rgb.cols() as u32, rgb.rows() as u32, bytes)
            .context("Mat buffer does not match its dimensions")
    }

    /// Convert an 8-bit single channel Mat to a grayscale image
    pub fn mat_to_luma(mat: &Mat) -> Result<image::GrayImage> {
        if mat.typ() != opencv::core::CV_8UC1 {
            bail!("Expected a CV_8UC1 Mat, got type {}", mat.typ());
        }
        // deep copy, always continuous
        let continuous = mat.try_clone()?;
        let bytes = continuous.data_bytes()?.to_vec();
        image::GrayImage::from_raw(mat.cols() as u32, mat.rows() as u32, bytes)
            .context("Mat buffer does not match its dimensions")
    }

    /// Convert an RGB image to a BGR Mat
    pub fn rgb_to_mat(rgb_image: &image::RgbImage) -> Result<Mat> {
        let (width, height) = rgb_image.dimensions();
        let mut rgb = Mat::new_rows_cols_with_default(
            height as i32,
            width as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )?;
        rgb.data_bytes_mut()?.copy_from_slice(rgb_image.as_raw());

        let mut bgr = Mat::default();
        imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)
            .context("Failed to convert RGB image to OpenCV Mat")?;
        Ok(bgr)
    }

    /// Save an 8-bit Mat, through the `image` crate when it can represent
    /// the Mat and with OpenCV otherwise
    pub fn save_image<P: AsRef<Path>>(mat: &Mat, path: P) -> Result<()> {
        let path = path.as_ref();

        let saved = match mat.channels() {
            1 => Self::mat_to_luma(mat).and_then(|img| Ok(img.save(path)?)),
            _ => Self::mat_to_rgb(mat).and_then(|img| Ok(img.save(path)?)),
        };

        if let Err(e) = saved {
            log::debug!("image crate could not save {:?} ({:#}), using OpenCV", path, e);
            Self::imwrite(mat, path)?;
        }
        Ok(())
    }

    /// Save a single channel float grid losslessly as a 32-bit TIFF
    pub fn save_float_grid<P: AsRef<Path>>(grid: &Mat, path: P) -> Result<()> {
        if grid.depth() != CV_32F || grid.channels() != 1 {
            bail!("Expected a CV_32FC1 grid, got type {}", grid.typ());
        }
        Self::imwrite(grid, path.as_ref())
    }

    fn imwrite(mat: &Mat, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        let written = imgcodecs::imwrite(&path_str, mat, &Vector::new())
            .with_context(|| format!("Failed to save image: {}", path_str))?;
        if !written {
            bail!("OpenCV refused to write {}", path_str);
        }
        Ok(())
    }
}
