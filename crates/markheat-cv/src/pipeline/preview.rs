//! Per-frame detection previews

use super::FrameOutcome;
use crate::Result;
use markheat_core::{Roi, ShapeClass};
use opencv::{
    core::{Mat, Point, Scalar},
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8},
    prelude::*,
};

fn circle_color() -> Scalar {
    Scalar::new(0.0, 255.0, 255.0, 0.0)
}

fn square_color() -> Scalar {
    Scalar::new(0.0, 165.0, 255.0, 0.0)
}

fn roi_color() -> Scalar {
    Scalar::new(255.0, 0.0, 0.0, 0.0)
}

fn label_color() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

fn pixel(x: f64, y: f64) -> Point {
    Point::new(x.round_ties_even() as i32, y.round_ties_even() as i32)
}

/// Draw the per-class survivors of one frame over a copy of it.
///
/// Circles are drawn at their radius, squares as a ring of half their side
/// (at least 3 px). The label counts detections that survived the
/// cross-class pass.
pub fn render_preview(frame: &Mat, outcome: &FrameOutcome, roi: Option<&Roi>) -> Result<Mat> {
    let mut canvas = frame.try_clone()?;

    for c in &outcome.circles {
        imgproc::circle(
            &mut canvas,
            pixel(c.x, c.y),
            c.size.round_ties_even() as i32,
            circle_color(),
            2,
            LINE_8,
            0,
        )?;
    }
    for s in &outcome.squares {
        let radius = (s.size / 2.0).round_ties_even().max(3.0) as i32;
        imgproc::circle(&mut canvas, pixel(s.x, s.y), radius, square_color(), 2, LINE_8, 0)?;
    }

    if let Some(roi) = roi {
        imgproc::rectangle_points(
            &mut canvas,
            Point::new(roi.x0, roi.y0),
            Point::new(roi.x1, roi.y1),
            roi_color(),
            2,
            LINE_8,
            0,
        )?;
    }

    let label = format!(
        "C:{} S:{}",
        outcome.accepted_count(ShapeClass::Circle),
        outcome.accepted_count(ShapeClass::Square)
    );
    imgproc::put_text(
        &mut canvas,
        &label,
        Point::new(10, 30),
        FONT_HERSHEY_SIMPLEX,
        1.0,
        label_color(),
        2,
        LINE_8,
        false,
    )?;
    Ok(canvas)
}
