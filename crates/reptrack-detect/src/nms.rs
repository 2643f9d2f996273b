// ------------------------------------------------------------
// helpers: IoU • NMS
// ------------------------------------------------------------
use crate::Detection;

/// Intersection-over-union of two `[x1, y1, x2, y2]` boxes.
/// Zero-area unions yield 0.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Greedy NMS. Output is sorted by score, descending, and holds at most
/// `max_keep` detections, no two of which overlap beyond `iou_thr`.
pub fn non_max_suppression(mut dets: Vec<Detection>, iou_thr: f32, max_keep: usize) -> Vec<Detection> {
    dets.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(dets.len().min(max_keep));

    'outer: for d in dets {
        if keep.len() >= max_keep {
            break;
        }
        for k in &keep {
            if iou(&d.bbox, &k.bbox) > iou_thr {
                continue 'outer;
            }
        }
        keep.push(d);
    }
    keep
}
