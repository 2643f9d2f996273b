// reptrack-detect/src/lib.rs
// ============================================================
// reptrack-detect  –  pose detection post-processing
// Turns the raw pose-network tensor into a clean, frame-space
// list of people with 17 keypoints each.
// ------------------------------------------------------------
// Pipeline: RawOutput → candidates → remap/clamp → NMS
// ------------------------------------------------------------
// Public API
//   * Postprocessor::new(layout, cfg) – layout resolved once
//   * Postprocessor::run(raw, geom)   – returns Vec<Detection>
//   * parse_channel_major / parse_detection_major / nms / iou
// ============================================================

//! reptrack – detection layer
//!
//! The output layout is resolved once, from the model's probed output shape,
//! and the matching pure parser is used for every frame. Both parsers
//! produce the same [`Detection`] candidates, which then go through greedy
//! NMS. Results are ordered by score, highest first.

use log::trace;
use ndarray::{ArrayViewD, Axis, Ix2};
use reptrack_model::OutputLayout;
use reptrack_preprocess::RemapDescriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod keypoint;
mod nms;
mod parse;

pub use keypoint::{Keypoint, KeypointIndex, SKELETON};
pub use nms::{iou, non_max_suppression};
pub use parse::{parse_channel_major, parse_detection_major};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Output shape {actual:?} does not match resolved layout {expected:?}")]
    ShapeMismatch { expected: OutputLayout, actual: Vec<usize> },
}

pub type Result<T> = std::result::Result<T, DetectError>;

/// One person: box `[x1, y1, x2, y2]` normalised to the original frame,
/// score and the 17 COCO keypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub score: f32,
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Detection {
    pub fn keypoint(&self, idx: KeypointIndex) -> Keypoint {
        self.keypoints[idx.index()]
    }

    /// Number of keypoints with confidence strictly above `threshold`.
    pub fn confident_keypoints(&self, threshold: f32) -> usize {
        self.keypoints.iter().filter(|k| k.confidence > threshold).count()
    }
}

/// Original frame size plus the remap recorded by the preprocessor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub remap: RemapDescriptor,
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    /// Model-space point → clamped, normalised frame-space point.
    pub fn map(&self, x: f32, y: f32) -> (f32, f32) {
        let (nx, ny) = self.remap.to_normalized(x, y, self.width, self.height);
        (nx.clamp(0.0, 1.0), ny.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    /// Candidates below this score are discarded.
    pub conf_threshold: f32,
    /// Overlap above which the lower-scored box is suppressed.
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.15,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

/// Layout-bound postprocessor.
#[derive(Debug, Clone)]
pub struct Postprocessor {
    layout: OutputLayout,
    config: PostprocessConfig,
}

impl Postprocessor {
    pub fn new(layout: OutputLayout, config: PostprocessConfig) -> Self {
        Self { layout, config }
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn config(&self) -> &PostprocessConfig {
        &self.config
    }

    /// Parse, remap and de-duplicate one raw output tensor.
    pub fn run(&self, raw: ArrayViewD<'_, f32>, geometry: &FrameGeometry) -> Result<Vec<Detection>> {
        let mismatch = || DetectError::ShapeMismatch { expected: self.layout, actual: raw.shape().to_vec() };

        let view = if raw.ndim() == 3 && raw.shape()[0] == 1 {
            raw.index_axis(Axis(0), 0)
        } else {
            raw.view()
        };
        let view = view.into_dimensionality::<Ix2>().map_err(|_| mismatch())?;
        if view.shape() != self.layout.shape() {
            return Err(mismatch());
        }

        let thr = self.config.conf_threshold;
        let candidates = match self.layout {
            OutputLayout::ChannelMajor { .. } => parse_channel_major(view, geometry, thr),
            OutputLayout::DetectionMajor { .. } => parse_detection_major(view, geometry, thr),
        };
        let n = candidates.len();
        let kept = non_max_suppression(candidates, self.config.iou_threshold, self.config.max_detections);
        trace!("{} candidates → {} after NMS", n, kept.len());
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, ArrayD, IxDyn};

    fn geometry() -> FrameGeometry {
        FrameGeometry {
            remap: RemapDescriptor::Letterbox { scale: 0.5, pad_x: 0.0, pad_y: 140.0 },
            width: 1280,
            height: 720,
        }
    }

    #[test]
    fn letterbox_geometry_maps_center() {
        assert_eq!(geometry().map(320.0, 320.0), (0.5, 0.5));
        // inside the top pad → clamped to the frame edge
        assert_eq!(geometry().map(320.0, 10.0).1, 0.0);
    }

    #[test]
    fn batch_axis_is_optional() {
        let layout = OutputLayout::DetectionMajor { detections: 4 };
        let pp = Postprocessor::new(layout, PostprocessConfig::default());
        let batched = Array3::<f32>::zeros((1, 4, 57)).into_dyn();
        let flat = ArrayD::<f32>::zeros(IxDyn(&[4, 57]));
        assert!(pp.run(batched.view(), &geometry()).unwrap().is_empty());
        assert!(pp.run(flat.view(), &geometry()).unwrap().is_empty());
    }

    #[test]
    fn wrong_shape_is_reported() {
        let pp = Postprocessor::new(OutputLayout::ChannelMajor { detections: 8400 }, PostprocessConfig::default());
        let raw = ArrayD::<f32>::zeros(IxDyn(&[1, 56, 100]));
        assert!(matches!(pp.run(raw.view(), &geometry()), Err(DetectError::ShapeMismatch { .. })));
    }
}
