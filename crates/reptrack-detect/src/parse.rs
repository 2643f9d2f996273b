//! Pure parsers for the two raw output layouts.
//!
//! Both walk every candidate row, drop rows under the confidence threshold,
//! decode `cx, cy, w, h` into corners, remap boxes and keypoints to
//! original-frame normalised coordinates and clamp them to `[0, 1]`.

use ndarray::ArrayView2;
use reptrack_model::OutputLayout;

use crate::{Detection, FrameGeometry, Keypoint, KeypointIndex};

const CONF_FIELD: usize = 4;

/// Layout A, `[56, N]`: field `c` of candidate `d` lives at `view[[c, d]]`.
pub fn parse_channel_major(view: ArrayView2<'_, f32>, geometry: &FrameGeometry, conf_threshold: f32) -> Vec<Detection> {
    let n = view.ncols();
    let kp_offset = OutputLayout::ChannelMajor { detections: n }.keypoint_offset();
    (0..n)
        .filter_map(|d| decode(|c| view[[c, d]], kp_offset, geometry, conf_threshold))
        .collect()
}

/// Layout B, `[N, 57]`: field `c` of candidate `d` lives at `view[[d, c]]`.
/// Field 5 holds the class id, which a single-class pose model ignores.
pub fn parse_detection_major(view: ArrayView2<'_, f32>, geometry: &FrameGeometry, conf_threshold: f32) -> Vec<Detection> {
    let kp_offset = OutputLayout::DetectionMajor { detections: view.nrows() }.keypoint_offset();
    view.rows()
        .into_iter()
        .filter_map(|row| decode(|c| row[c], kp_offset, geometry, conf_threshold))
        .collect()
}

#[inline]
fn decode(field: impl Fn(usize) -> f32, kp_offset: usize, geometry: &FrameGeometry, conf_threshold: f32) -> Option<Detection> {
    let score = field(CONF_FIELD);
    // NaN never passes
    if !(score >= conf_threshold) || !score.is_finite() {
        return None;
    }

    let (cx, cy, w, h) = (field(0), field(1), field(2), field(3));
    if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (x1, y1) = geometry.map(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = geometry.map(cx + w / 2.0, cy + h / 2.0);

    let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
    for (k, kp) in keypoints.iter_mut().enumerate() {
        let base = kp_offset + k * 3;
        let (x, y, conf) = (field(base), field(base + 1), field(base + 2));
        // a joint with a broken position stays at the origin, unseen
        if !(x.is_finite() && y.is_finite()) {
            continue;
        }
        let (x, y) = geometry.map(x, y);
        let conf = if conf.is_finite() { conf.clamp(0.0, 1.0) } else { 0.0 };
        *kp = Keypoint::new(x, y, conf);
    }

    Some(Detection {
        bbox: [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)],
        score,
        keypoints,
    })
}
