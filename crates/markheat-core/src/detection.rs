//! Marker candidates and accepted detections

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker shape kinds tracked by the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeClass {
    Circle,
    Square,
}

impl ShapeClass {
    pub const ALL: [ShapeClass; 2] = [ShapeClass::Circle, ShapeClass::Square];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeClass::Circle => "circle",
            ShapeClass::Square => "square",
        }
    }

    /// Dense index for per-class storage
    pub fn index(&self) -> usize {
        match self {
            ShapeClass::Circle => 0,
            ShapeClass::Square => 1,
        }
    }

    /// Prefix of the size column in the detection log
    pub fn size_label(&self) -> &'static str {
        match self {
            ShapeClass::Circle => "r",
            ShapeClass::Square => "side",
        }
    }
}

impl fmt::Display for ShapeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shape that passed geometric checks in one frame, before deduplication.
///
/// Positions are full-frame sub-pixel coordinates; `size` is the radius for
/// circles and the short side for squares.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub score: f64,
    pub class: ShapeClass,
}

impl Candidate {
    pub fn new(class: ShapeClass, x: f64, y: f64, size: f64, score: f64) -> Self {
        Self {
            x,
            y,
            size,
            score,
            class,
        }
    }

    pub fn distance_to(&self, other: &Candidate) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Accepted marker occurrence, one row of the detection log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub frame_index: u64,
    pub timestamp_secs: f64,
    pub x: f64,
    pub y: f64,
    pub class: ShapeClass,
    pub size: f64,
    pub score: f64,
}

impl Detection {
    pub fn from_candidate(candidate: &Candidate, frame_index: u64, fps: f64) -> Self {
        Self {
            frame_index,
            timestamp_secs: frame_timestamp(frame_index, fps),
            x: candidate.x,
            y: candidate.y,
            class: candidate.class,
            size: candidate.size,
            score: candidate.score,
        }
    }

    /// `r=10.0` or `side=12.0`
    pub fn size_descriptor(&self) -> String {
        format!("{}={:.1}", self.class.size_label(), self.size)
    }

    pub const LOG_HEADER: [&'static str; 7] =
        ["frame_idx", "time_sec", "x", "y", "type", "size", "score"];

    /// Formatted detection log fields, in `LOG_HEADER` order
    pub fn log_fields(&self) -> [String; 7] {
        [
            self.frame_index.to_string(),
            format!("{:.3}", self.timestamp_secs),
            format!("{:.1}", self.x),
            format!("{:.1}", self.y),
            self.class.to_string(),
            self.size_descriptor(),
            format!("{:.1}", self.score),
        ]
    }
}

/// Seconds since the start of the video for a frame index
pub fn frame_timestamp(frame_index: u64, fps: f64) -> f64 {
    frame_index as f64 / fps.max(1e-6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_distance() {
        let a = Candidate::new(ShapeClass::Circle, 0.0, 0.0, 5.0, 1.0);
        let b = Candidate::new(ShapeClass::Square, 3.0, 4.0, 5.0, 1.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_fields_formatting() {
        let candidate = Candidate::new(ShapeClass::Circle, 50.04, 49.96, 10.02, 314.159);
        let detection = Detection::from_candidate(&candidate, 45, 30.0);
        assert_eq!(
            detection.log_fields(),
            ["45", "1.500", "50.0", "50.0", "circle", "r=10.0", "314.2"].map(String::from)
        );

        let square = Candidate::new(ShapeClass::Square, 1.0, 2.0, 12.0, 144.0);
        let detection = Detection::from_candidate(&square, 0, 25.0);
        assert_eq!(detection.size_descriptor(), "side=12.0");
    }

    #[test]
    fn test_zero_fps_timestamp_is_finite() {
        assert!(frame_timestamp(10, 0.0).is_finite());
    }
}
