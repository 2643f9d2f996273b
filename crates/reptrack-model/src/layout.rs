//! Raw output tensor layouts of the supported pose exports.
//!
//! * **A** – channel-major `[56, N]` (YOLOv8-pose style, usually N = 8400):
//!   `cx, cy, w, h, conf, 17 × (x, y, conf)`.
//! * **B** – detection-major `[N, 57]` (end-to-end exports, usually N = 300):
//!   `cx, cy, w, h, conf, class, 17 × (x, y, conf)`.
//!
//! A leading batch axis of length 1 is accepted and ignored.

use crate::{ModelError, Result};

/// Number of keypoints in the COCO body scheme.
pub const NUM_KEYPOINTS: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[56, detections]`
    ChannelMajor { detections: usize },
    /// `[detections, 57]`
    DetectionMajor { detections: usize },
}

impl OutputLayout {
    pub const CHANNEL_MAJOR_FIELDS: usize = 5 + NUM_KEYPOINTS * 3;
    pub const DETECTION_MAJOR_FIELDS: usize = 6 + NUM_KEYPOINTS * 3;

    /// Resolve the layout from a raw output shape.
    pub fn from_shape(shape: &[usize]) -> Result<Self> {
        let dims = match shape {
            [1, a, b] | [a, b] => (*a, *b),
            _ => return Err(ModelError::UnsupportedOutputShape(shape.to_vec())),
        };
        match dims {
            (Self::CHANNEL_MAJOR_FIELDS, n) if n > 0 => Ok(Self::ChannelMajor { detections: n }),
            (n, Self::DETECTION_MAJOR_FIELDS) if n > 0 => Ok(Self::DetectionMajor { detections: n }),
            _ => Err(ModelError::UnsupportedOutputShape(shape.to_vec())),
        }
    }

    /// Candidate rows per frame.
    pub fn detections(&self) -> usize {
        match *self {
            Self::ChannelMajor { detections } | Self::DetectionMajor { detections } => detections,
        }
    }

    /// Fields per candidate.
    pub fn fields(&self) -> usize {
        match self {
            Self::ChannelMajor { .. } => Self::CHANNEL_MAJOR_FIELDS,
            Self::DetectionMajor { .. } => Self::DETECTION_MAJOR_FIELDS,
        }
    }

    /// Index of the first keypoint field within a candidate.
    pub fn keypoint_offset(&self) -> usize {
        match self {
            Self::ChannelMajor { .. } => 5,
            Self::DetectionMajor { .. } => 6,
        }
    }

    /// Shape without the batch axis.
    pub fn shape(&self) -> [usize; 2] {
        match *self {
            Self::ChannelMajor { detections } => [Self::CHANNEL_MAJOR_FIELDS, detections],
            Self::DetectionMajor { detections } => [detections, Self::DETECTION_MAJOR_FIELDS],
        }
    }
}
