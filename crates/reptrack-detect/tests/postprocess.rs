use ndarray::{Array2, Array3};
use reptrack_detect::{iou, non_max_suppression, FrameGeometry, PostprocessConfig, Postprocessor};
use reptrack_model::OutputLayout;
use reptrack_preprocess::{Placement, ResizeMode};

/// One candidate in layout-A field order: box, conf, 17 keypoints.
fn candidate(cx: f32, cy: f32, w: f32, h: f32, conf: f32) -> Vec<f32> {
    let mut r = vec![cx, cy, w, h, conf];
    for _ in 0..17 {
        r.extend_from_slice(&[cx, cy, 0.9]);
    }
    r
}

fn channel_major(cands: &[Vec<f32>]) -> Array3<f32> {
    let mut a = Array3::<f32>::zeros((1, 56, cands.len()));
    for (d, r) in cands.iter().enumerate() {
        for (c, v) in r.iter().enumerate() {
            a[[0, c, d]] = *v;
        }
    }
    a
}

fn detection_major(cands: &[Vec<f32>]) -> Array2<f32> {
    let mut b = Array2::<f32>::zeros((cands.len(), 57));
    for (d, r) in cands.iter().enumerate() {
        let mut row = r.clone();
        row.insert(5, 0.0);
        for (c, v) in row.iter().enumerate() {
            b[[d, c]] = *v;
        }
    }
    b
}

fn geometry(mode: ResizeMode, w: u32, h: u32) -> FrameGeometry {
    FrameGeometry { remap: Placement::compute(mode, 640, w, h).remap, width: w, height: h }
}

fn crowd() -> Vec<Vec<f32>> {
    vec![
        candidate(320.0, 320.0, 100.0, 200.0, 0.90),
        candidate(325.0, 318.0, 100.0, 200.0, 0.85), // duplicate of the first
        candidate(100.0, 300.0, 80.0, 160.0, 0.60),
        candidate(500.0, 300.0, 80.0, 160.0, 0.14), // below threshold
        candidate(102.0, 302.0, 80.0, 160.0, 0.30), // duplicate of the third
        candidate(560.0, 200.0, 40.0, 40.0, 0.15),
    ]
}

#[test]
fn low_confidence_candidates_never_survive() {
    let pp = Postprocessor::new(OutputLayout::ChannelMajor { detections: 6 }, PostprocessConfig::default());
    let dets = pp.run(channel_major(&crowd()).into_dyn().view(), &geometry(ResizeMode::Letterbox, 1280, 720)).unwrap();
    assert!(dets.iter().all(|d| d.score >= 0.15));
    assert!(!dets.iter().any(|d| d.score == 0.14));
}

#[test]
fn survivors_do_not_overlap_and_are_sorted() {
    let cfg = PostprocessConfig::default();
    let pp = Postprocessor::new(OutputLayout::ChannelMajor { detections: 6 }, cfg.clone());
    let dets = pp.run(channel_major(&crowd()).into_dyn().view(), &geometry(ResizeMode::Letterbox, 1280, 720)).unwrap();

    let scores: Vec<f32> = dets.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.90, 0.60, 0.15]);
    for (i, a) in dets.iter().enumerate() {
        for b in &dets[i + 1..] {
            assert!(iou(&a.bbox, &b.bbox) <= cfg.iou_threshold);
        }
    }
}

#[test]
fn nms_is_idempotent() {
    let pp = Postprocessor::new(OutputLayout::ChannelMajor { detections: 6 }, PostprocessConfig::default());
    let once = pp.run(channel_major(&crowd()).into_dyn().view(), &geometry(ResizeMode::Stretch, 640, 480)).unwrap();
    let twice = non_max_suppression(once.clone(), 0.45, 300);
    assert_eq!(once, twice);
}

#[test]
fn both_layouts_agree() {
    let g = geometry(ResizeMode::Letterbox, 1280, 720);
    let a = Postprocessor::new(OutputLayout::ChannelMajor { detections: 6 }, PostprocessConfig::default())
        .run(channel_major(&crowd()).into_dyn().view(), &g)
        .unwrap();
    let b = Postprocessor::new(OutputLayout::DetectionMajor { detections: 6 }, PostprocessConfig::default())
        .run(detection_major(&crowd()).into_dyn().view(), &g)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn stretch_round_trip_hits_center() {
    let g = geometry(ResizeMode::Stretch, 640, 640);
    assert_eq!(g.map(320.0, 320.0), (0.5, 0.5));
}

#[test]
fn letterbox_round_trip_hits_center() {
    let placement = Placement::compute(ResizeMode::Letterbox, 640, 1280, 720);
    assert_eq!((placement.new_width, placement.new_height), (640, 360));
    assert_eq!((placement.pad_x, placement.pad_y), (0, 140));

    let pp = Postprocessor::new(OutputLayout::DetectionMajor { detections: 1 }, PostprocessConfig::default());
    let raw = detection_major(&[candidate(320.0, 320.0, 64.0, 64.0, 0.8)]);
    let dets = pp.run(raw.into_dyn().view(), &geometry(ResizeMode::Letterbox, 1280, 720)).unwrap();
    let nose = dets[0].keypoints[0];
    assert_eq!((nose.x, nose.y), (0.5, 0.5));
}

#[test]
fn max_detections_caps_output() {
    let cfg = PostprocessConfig { max_detections: 1, ..Default::default() };
    let pp = Postprocessor::new(OutputLayout::ChannelMajor { detections: 6 }, cfg);
    let dets = pp.run(channel_major(&crowd()).into_dyn().view(), &geometry(ResizeMode::Letterbox, 1280, 720)).unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].score, 0.90);
}
