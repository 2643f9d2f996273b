//! Joint geometry: which triple to measure, which side to trust, and the angle.

use reptrack_detect::{Keypoint, KeypointIndex};
use serde::{Deserialize, Serialize};

use crate::Exercise;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// `(first, vertex, last)` for the exercise on the given side.
pub fn joint_triple(exercise: Exercise, side: Side) -> [KeypointIndex; 3] {
    use KeypointIndex::*;
    match (exercise, side) {
        (Exercise::PushUp, Side::Left) => [LeftShoulder, LeftElbow, LeftWrist],
        (Exercise::PushUp, Side::Right) => [RightShoulder, RightElbow, RightWrist],
        (Exercise::SitUp, Side::Left) => [LeftShoulder, LeftHip, LeftKnee],
        (Exercise::SitUp, Side::Right) => [RightShoulder, RightHip, RightKnee],
    }
}

fn mean_confidence(keypoints: &[Keypoint; KeypointIndex::COUNT], triple: [KeypointIndex; 3]) -> f32 {
    triple.iter().map(|k| keypoints[k.index()].confidence).sum::<f32>() / 3.0
}

/// Pick the side whose joint triple has the higher mean confidence, provided
/// it reaches `min_confidence`. Ties go to the left side.
pub fn select_side(exercise: Exercise, keypoints: &[Keypoint; KeypointIndex::COUNT], min_confidence: f32) -> Option<Side> {
    let left = mean_confidence(keypoints, joint_triple(exercise, Side::Left));
    let right = mean_confidence(keypoints, joint_triple(exercise, Side::Right));
    let (side, best) = if right > left { (Side::Right, right) } else { (Side::Left, left) };
    (best >= min_confidence).then_some(side)
}

/// Angle at vertex `b` between rays `b→a` and `b→c`, in degrees within `[0, 180]`.
pub fn angle_between(a: Keypoint, b: Keypoint, c: Keypoint) -> f32 {
    let ray_c = (c.y - b.y).atan2(c.x - b.x);
    let ray_a = (a.y - b.y).atan2(a.x - b.x);
    let angle = (ray_c - ray_a).to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}
