//! Frame sources: video files through OpenCV and in-memory frame lists

use crate::Result;
use crate::traits::FrameSource;
use crate::utils::ImageUtils;
use anyhow::Context;
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Conditions that end a run before any heatmap state exists
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open video {path:?}")]
    Open { path: PathBuf },
    #[error("cannot read reference frame {index}")]
    ReferenceFrame { index: u64 },
}

/// Container level properties reported by a frame source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoProperties {
    pub fps: f64,
    pub frame_count: u64,
    pub width: i32,
    pub height: i32,
}

/// Seekable video file decoded with OpenCV
pub struct VideoFileSource {
    capture: VideoCapture,
    properties: VideoProperties,
    /// Index the decoder will return on the next plain read
    next_index: Option<u64>,
}

impl VideoFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy();

        let capture = VideoCapture::from_file(&path_str, videoio::CAP_ANY)
            .with_context(|| format!("OpenCV failed to open {}", path_str))?;
        if !capture.is_opened()? {
            return Err(SourceError::Open {
                path: path.to_path_buf(),
            }
            .into());
        }

        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
        let properties = VideoProperties {
            fps: capture.get(videoio::CAP_PROP_FPS)?,
            frame_count: if frame_count.is_finite() && frame_count > 0.0 {
                frame_count as u64
            } else {
                0
            },
            width: capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32,
            height: capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32,
        };
        log::debug!("Opened {}: {:?}", path_str, properties);

        Ok(Self {
            capture,
            properties,
            next_index: Some(0),
        })
    }
}

impl FrameSource for VideoFileSource {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn read_frame(&mut self, index: u64) -> Result<Option<Mat>> {
        // seeking is slow for most codecs, skip it for consecutive reads
        if self.next_index != Some(index) {
            self.capture
                .set(videoio::CAP_PROP_POS_FRAMES, index as f64)
                .with_context(|| format!("Failed to seek to frame {}", index))?;
        }

        let mut frame = Mat::default();
        let ok = self
            .capture
            .read(&mut frame)
            .with_context(|| format!("Failed to decode frame {}", index))?;
        if !ok || frame.empty() {
            self.next_index = None;
            return Ok(None);
        }
        self.next_index = Some(index + 1);
        Ok(Some(frame))
    }
}

/// Frames held in memory, used for synthetic input and tests
pub struct MemorySource {
    frames: Vec<Mat>,
    fps: f64,
}

impl MemorySource {
    pub fn new(frames: Vec<Mat>, fps: f64) -> Self {
        Self { frames, fps }
    }

    pub fn from_rgb_images(images: &[image::RgbImage], fps: f64) -> Result<Self> {
        let frames = images
            .iter()
            .map(ImageUtils::rgb_to_mat)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(frames, fps))
    }
}

impl FrameSource for MemorySource {
    fn properties(&self) -> VideoProperties {
        let (width, height) = self
            .frames
            .first()
            .map(|f| (f.cols(), f.rows()))
            .unwrap_or((0, 0));
        VideoProperties {
            fps: self.fps,
            frame_count: self.frames.len() as u64,
            width,
            height,
        }
    }

    fn read_frame(&mut self, index: u64) -> Result<Option<Mat>> {
        match usize::try_from(index).ok().and_then(|i| self.frames.get(i)) {
            Some(frame) => Ok(Some(frame.try_clone()?)),
            None => Ok(None),
        }
    }
}
