use reptrack_detect::{Keypoint, KeypointIndex};
use reptrack_reps::{
    joint_triple, Exercise, FrameOutcome, Phase, RepConfig, RepCounter, Side, FEEDBACK_NOT_VISIBLE,
    FEEDBACK_NO_PERSON, FEEDBACK_READY,
};

type Pose = [Keypoint; KeypointIndex::COUNT];

/// A pose whose joint triple on `side` bends by `angle_deg` at the vertex.
fn pose(exercise: Exercise, side: Side, angle_deg: f32, confidence: f32) -> Pose {
    let mut kps = [Keypoint::default(); KeypointIndex::COUNT];
    let [a, b, c] = joint_triple(exercise, side);
    let t = angle_deg.to_radians();
    kps[a.index()] = Keypoint::new(0.5, 0.3, confidence);
    kps[b.index()] = Keypoint::new(0.5, 0.5, confidence);
    kps[c.index()] = Keypoint::new(0.5 + 0.2 * t.sin(), 0.5 - 0.2 * t.cos(), confidence);
    kps
}

fn push_up(angle: f32) -> Pose {
    pose(Exercise::PushUp, Side::Left, angle, 0.9)
}

#[test]
fn push_up_counts_one_rep() {
    let mut c = RepCounter::new(Exercise::PushUp, RepConfig::default());

    c.process(Some(&push_up(180.0)));
    assert_eq!(c.state().phase, Phase::Up);
    assert_eq!(c.state().feedback, "Go Lower");

    c.process(Some(&push_up(80.0)));
    assert_eq!(c.state().phase, Phase::Down);
    assert_eq!(c.state().feedback, "Push Up!");
    assert_eq!(c.rep_count(), 0);

    c.process(Some(&push_up(120.0)));
    assert_eq!(c.state().feedback, "Push harder");

    let outcome = c.process(Some(&push_up(180.0)));
    assert!(outcome.completed_rep());
    assert_eq!(c.state().phase, Phase::Up);
    assert_eq!(c.rep_count(), 1);
    assert_eq!(c.state().feedback, "Good Job!");
}

#[test]
fn push_up_dead_zone_never_changes_state() {
    let mut c = RepCounter::new(Exercise::PushUp, RepConfig::default());
    for _ in 0..50 {
        let outcome = c.process(Some(&push_up(120.0)));
        assert!(matches!(outcome, FrameOutcome::Hold { .. }));
        assert_eq!(c.state().phase, Phase::Up);
        assert_eq!(c.rep_count(), 0);
    }
}

#[test]
fn sit_up_counts_on_the_way_up() {
    let mut c = RepCounter::new(Exercise::SitUp, RepConfig::default());
    let lying = pose(Exercise::SitUp, Side::Right, 175.0, 0.8);
    let sitting = pose(Exercise::SitUp, Side::Right, 40.0, 0.8);

    c.process(Some(&lying));
    assert_eq!(c.state().phase, Phase::Down);
    assert_eq!(c.state().feedback, "Sit Up!");

    c.process(Some(&pose(Exercise::SitUp, Side::Right, 90.0, 0.8)));
    assert_eq!(c.state().feedback, "Keep going");

    c.process(Some(&sitting));
    assert_eq!(c.rep_count(), 1);
    assert_eq!(c.state().feedback, "Down we go");

    for _ in 0..3 {
        c.process(Some(&lying));
        c.process(Some(&sitting));
    }
    assert_eq!(c.rep_count(), 4);
}

#[test]
fn weak_left_side_falls_back_to_right() {
    let mut kps = pose(Exercise::PushUp, Side::Right, 80.0, 0.6);
    for k in joint_triple(Exercise::PushUp, Side::Left) {
        // a misleading straight arm at low confidence
        kps[k.index()] = Keypoint::new(0.1, 0.1, 0.05);
    }
    let mut c = RepCounter::new(Exercise::PushUp, RepConfig::default());
    let outcome = c.process(Some(&kps));
    assert!(matches!(outcome, FrameOutcome::Entered { side: Side::Right, phase: Phase::Down, .. }));
}

#[test]
fn invisible_joints_skip_the_frame() {
    let mut c = RepCounter::new(Exercise::PushUp, RepConfig::default());
    c.process(Some(&push_up(80.0)));

    let faint = pose(Exercise::PushUp, Side::Left, 180.0, 0.1);
    assert_eq!(c.process(Some(&faint)), FrameOutcome::NotVisible);
    assert_eq!(c.state().phase, Phase::Down);
    assert_eq!(c.rep_count(), 0);
    assert_eq!(c.state().feedback, FEEDBACK_NOT_VISIBLE);

    assert_eq!(c.process(None), FrameOutcome::NoPerson);
    assert_eq!(c.state().feedback, FEEDBACK_NO_PERSON);
    assert_eq!(c.state().phase, Phase::Down);
}

#[test]
fn reset_hands_back_the_session() {
    let mut c = RepCounter::new(Exercise::PushUp, RepConfig::default());
    for _ in 0..3 {
        c.process(Some(&push_up(80.0)));
        c.process(Some(&push_up(175.0)));
    }
    let record = c.reset().expect("three reps recorded");
    assert_eq!(record.rep_count, 3);
    assert_eq!(record.exercise, Exercise::PushUp);
    assert!(record.timestamp_ms > 0);

    assert_eq!(c.rep_count(), 0);
    assert_eq!(c.state().phase, Phase::Up);
    assert_eq!(c.state().feedback, FEEDBACK_READY);
    assert_eq!(c.reset(), None);
}
