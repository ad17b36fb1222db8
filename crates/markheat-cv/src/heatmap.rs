//! Cumulative detection heatmaps
//!
//! Whole-run 2D histograms of detection centers: one grid per marker class
//! and one combined grid, all allocated once at the frame size. Cells only
//! ever grow, so the mass of a grid is the number of detections routed
//! into it.

use crate::Result;
use anyhow::{Context, bail};
use markheat_core::{Detection, ShapeClass};
use opencv::{
    core::{self, CV_32FC1, Mat, Scalar},
    prelude::*,
};

/// A single float occurrence grid
#[derive(Debug)]
pub struct Heatmap {
    grid: Mat,
    count: u64,
}

impl Heatmap {
    pub fn new(width: i32, height: i32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            bail!("Heatmap dimensions must be positive, got {}x{}", width, height);
        }
        let grid = Mat::new_rows_cols_with_default(height, width, CV_32FC1, Scalar::all(0.0))
            .context("Failed to allocate heatmap grid")?;
        Ok(Self { grid, count: 0 })
    }

    pub fn width(&self) -> i32 {
        self.grid.cols()
    }

    pub fn height(&self) -> i32 {
        self.grid.rows()
    }

    /// Increment the cell nearest to `(x, y)`.
    ///
    /// Coordinates round half to even; points outside the grid are ignored
    /// and reported as `false`.
    pub fn add(&mut self, x: f64, y: f64) -> Result<bool> {
        if !x.is_finite() || !y.is_finite() {
            return Ok(false);
        }
        let col = x.round_ties_even();
        let row = y.round_ties_even();
        if col < 0.0 || row < 0.0 || col >= self.width() as f64 || row >= self.height() as f64 {
            return Ok(false);
        }

        *self.grid.at_2d_mut::<f32>(row as i32, col as i32)? += 1.0;
        self.count += 1;
        Ok(true)
    }

    /// Number of points that landed in the grid
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all cells
    pub fn mass(&self) -> Result<f64> {
        Ok(core::sum_elems(&self.grid)?[0])
    }

    /// Elementwise addition of a grid of the same size
    pub fn merge(&mut self, other: &Heatmap) -> Result<()> {
        if self.grid.size()? != other.grid.size()? {
            bail!(
                "Cannot merge a {}x{} heatmap into a {}x{} one",
                other.width(),
                other.height(),
                self.width(),
                self.height()
            );
        }
        let mut sum = Mat::default();
        core::add(&self.grid, &other.grid, &mut sum, &core::no_array(), -1)?;
        self.grid = sum;
        self.count += other.count;
        Ok(())
    }

    /// The raw `CV_32FC1` grid
    pub fn grid(&self) -> &Mat {
        &self.grid
    }
}

/// Per-class and combined heatmaps for one run
#[derive(Debug)]
pub struct HeatmapAccumulator {
    combined: Heatmap,
    classes: Vec<Heatmap>,
}

impl HeatmapAccumulator {
    pub fn new(width: i32, height: i32) -> Result<Self> {
        let classes = ShapeClass::ALL
            .iter()
            .map(|_| Heatmap::new(width, height))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            combined: Heatmap::new(width, height)?,
            classes,
        })
    }

    /// Route a detection into its class grid and the combined grid
    pub fn add(&mut self, detection: &Detection) -> Result<()> {
        let (x, y) = (detection.x, detection.y);
        if self.classes[detection.class.index()].add(x, y)? {
            self.combined.add(x, y)?;
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &HeatmapAccumulator) -> Result<()> {
        self.combined.merge(&other.combined)?;
        for (mine, theirs) in self.classes.iter_mut().zip(&other.classes) {
            mine.merge(theirs)?;
        }
        Ok(())
    }

    pub fn combined(&self) -> &Heatmap {
        &self.combined
    }

    pub fn class(&self, class: ShapeClass) -> &Heatmap {
        &self.classes[class.index()]
    }

    /// Detections accumulated into the combined grid
    pub fn total(&self) -> u64 {
        self.combined.count()
    }

    pub fn width(&self) -> i32 {
        self.combined.width()
    }

    pub fn height(&self) -> i32 {
        self.combined.height()
    }
}
