//! HSV color ranges used for marker segmentation
//!
//! Ranges use the OpenCV 8-bit HSV convention: hue in `[0, 179]`,
//! saturation and value in `[0, 255]`. A marker class is matched by the
//! union of an ordered list of ranges, which lets a hue that wraps around
//! 0/180 (red) be expressed as two ranges.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const HUE_MAX: u8 = 179;
pub const CHANNEL_MAX: u8 = 255;

/// Inclusive lower/upper HSV bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    /// Create a range, clamping every channel into the valid HSV domain
    pub fn new(lower: [i32; 3], upper: [i32; 3]) -> Self {
        Self {
            lower: clamp_hsv(lower),
            upper: clamp_hsv(upper),
        }
    }
}

fn clamp_hsv(values: [i32; 3]) -> [u8; 3] {
    [
        values[0].clamp(0, HUE_MAX as i32) as u8,
        values[1].clamp(0, CHANNEL_MAX as i32) as u8,
        values[2].clamp(0, CHANNEL_MAX as i32) as u8,
    ]
}

fn parse_triple(part: &str) -> Result<[i32; 3]> {
    let values: Vec<&str> = part.split(',').map(|s| s.trim()).collect();
    if values.len() != 3 {
        bail!("expected 3 comma separated values, got {}", values.len());
    }

    let mut triple = [0i32; 3];
    for (slot, value) in triple.iter_mut().zip(&values) {
        *slot = value
            .parse::<i32>()
            .with_context(|| format!("invalid channel value '{}'", value))?;
    }
    Ok(triple)
}

impl FromStr for ColorRange {
    type Err = anyhow::Error;

    /// Parse `"h,s,v-h,s,v"`
    fn from_str(entry: &str) -> Result<Self> {
        let (lower, upper) = entry
            .split_once('-')
            .with_context(|| format!("missing '-' separator in '{}'", entry))?;
        let lower = parse_triple(lower).with_context(|| format!("bad lower bound in '{}'", entry))?;
        let upper = parse_triple(upper).with_context(|| format!("bad upper bound in '{}'", entry))?;
        Ok(Self::new(lower, upper))
    }
}

impl fmt::Display for ColorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [lh, ls, lv] = self.lower;
        let [uh, us, uv] = self.upper;
        write!(f, "{},{},{}-{},{},{}", lh, ls, lv, uh, us, uv)
    }
}

/// Ordered union of color ranges describing one marker class.
///
/// Stored in configuration files in the same `"h,s,v-h,s,v;..."` form the
/// command line takes, so both paths go through [`ColorRangeSet::parse_lenient`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ColorRangeSet {
    ranges: Vec<ColorRange>,
}

impl ColorRangeSet {
    /// Parse a `;` separated list of ranges.
    ///
    /// Malformed entries are dropped one by one with a warning; an empty or
    /// fully malformed string yields an empty set, which matches nothing.
    pub fn parse_lenient(text: &str) -> Self {
        let mut ranges = Vec::new();

        for (index, entry) in text.split(';').map(|s| s.trim()).enumerate() {
            if entry.is_empty() {
                continue;
            }

            match entry.parse::<ColorRange>() {
                Ok(range) => ranges.push(range),
                Err(e) => {
                    log::warn!("Dropping color range #{} '{}': {:#}", index + 1, entry, e);
                }
            }
        }

        Self { ranges }
    }

    pub fn ranges(&self) -> &[ColorRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }
}

impl From<String> for ColorRangeSet {
    fn from(text: String) -> Self {
        Self::parse_lenient(&text)
    }
}

impl From<ColorRangeSet> for String {
    fn from(set: ColorRangeSet) -> Self {
        set.to_string()
    }
}

impl fmt::Display for ColorRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}
