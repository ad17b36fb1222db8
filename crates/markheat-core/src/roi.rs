//! Region of interest in absolute frame pixels

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rectangle `[x0, x1) x [y0, y1)` in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Roi {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// The whole frame
    pub fn full(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Parse an optional ROI string.
    ///
    /// Empty input means "no ROI"; anything unparsable is ignored with a
    /// warning so the run falls back to the full frame.
    pub fn parse_lenient(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        match text.parse::<Roi>() {
            Ok(roi) => Some(roi),
            Err(e) => {
                log::warn!("Ignoring ROI '{}' ({:#}), using the full frame", text, e);
                None
            }
        }
    }

    /// Intersect with a `width` x `height` frame
    pub fn clamp(&self, width: i32, height: i32) -> Self {
        Self {
            x0: self.x0.max(0),
            y0: self.y0.max(0),
            x1: self.x1.min(width),
            y1: self.y1.min(height),
        }
    }

    pub fn width(&self) -> i32 {
        (self.x1 - self.x0).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y1 - self.y0).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn covers(&self, width: i32, height: i32) -> bool {
        self.x0 <= 0 && self.y0 <= 0 && self.x1 >= width && self.y1 >= height
    }
}

impl FromStr for Roi {
    type Err = anyhow::Error;

    /// Parse `"x0,y0,x1,y1"`
    fn from_str(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(',').map(|s| s.trim()).collect();
        if parts.len() != 4 {
            bail!("expected x0,y0,x1,y1 but got {} values", parts.len());
        }

        let mut coords = [0i32; 4];
        for (slot, part) in coords.iter_mut().zip(&parts) {
            *slot = part
                .parse::<i32>()
                .with_context(|| format!("invalid ROI coordinate '{}'", part))?;
        }

        Ok(Self::new(coords[0], coords[1], coords[2], coords[3]))
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x0, self.y0, self.x1, self.y1)
    }
}
