// reptrack-reps/src/lib.rs
// ============================================================
// reptrack-reps  –  hysteresis rep counter
// Turns per-frame body keypoints into a running repetition
// count and a short coaching cue.
// ------------------------------------------------------------
// Per frame: keypoints → side selection → joint angle → FSM
// ------------------------------------------------------------
// Public API
//   * RepCounter::new(exercise, cfg)
//   * RepCounter::process(Option<&keypoints>) → FrameOutcome
//   * RepCounter::reset()                     → Option<SessionRecord>
//   * RepCounter::state()                     → RepCounterState
// ============================================================

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use reptrack_detect::{Keypoint, KeypointIndex};
use serde::{Deserialize, Serialize};

mod geometry;

pub use geometry::{angle_between, joint_triple, select_side, Side};

pub const FEEDBACK_START: &str = "Get into position";
pub const FEEDBACK_PAUSED: &str = "Paused";
pub const FEEDBACK_READY: &str = "Ready";
pub const FEEDBACK_NO_PERSON: &str = "Make sure you're in frame";
pub const FEEDBACK_NOT_VISIBLE: &str = "Make sure full body is visible";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exercise {
    PushUp,
    SitUp,
}

impl Exercise {
    pub fn display_name(self) -> &'static str {
        match self {
            Exercise::PushUp => "Push-Ups",
            Exercise::SitUp => "Sit-Ups",
        }
    }

    fn cues(self) -> Cues {
        match self {
            Exercise::PushUp => Cues {
                hold_up: "Go Lower",
                enter_down: "Push Up!",
                hold_down: "Push harder",
                enter_up: "Good Job!",
            },
            Exercise::SitUp => Cues {
                hold_up: "Lie back",
                enter_down: "Sit Up!",
                hold_down: "Keep going",
                enter_up: "Down we go",
            },
        }
    }
}

impl fmt::Display for Exercise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

struct Cues {
    hold_up: &'static str,
    enter_down: &'static str,
    hold_down: &'static str,
    enter_up: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Up,
    Down,
}

/// Strict comparison of a joint angle against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Below,
    Above,
}

impl Comparator {
    pub fn holds(self, angle: f32, threshold: f32) -> bool {
        match self {
            Comparator::Below => angle < threshold,
            Comparator::Above => angle > threshold,
        }
    }
}

/// Up→Down fires when `down_comparator(angle, down_enter)`, Down→Up (and a
/// rep) when `up_comparator(angle, up_enter)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisConfig {
    pub down_enter: f32,
    pub down_comparator: Comparator,
    pub up_enter: f32,
    pub up_comparator: Comparator,
}

impl HysteresisConfig {
    /// True when no angle can satisfy both transitions at once.
    pub fn has_dead_zone(&self) -> bool {
        match (self.down_comparator, self.up_comparator) {
            (Comparator::Below, Comparator::Above) => self.down_enter < self.up_enter,
            (Comparator::Above, Comparator::Below) => self.down_enter > self.up_enter,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepConfig {
    /// Minimum mean confidence of a joint triple for its side to be used.
    pub min_side_confidence: f32,
    pub push_up: HysteresisConfig,
    pub sit_up: HysteresisConfig,
}

impl Default for RepConfig {
    fn default() -> Self {
        Self {
            min_side_confidence: 0.15,
            push_up: HysteresisConfig {
                down_enter: 100.0,
                down_comparator: Comparator::Below,
                up_enter: 150.0,
                up_comparator: Comparator::Above,
            },
            sit_up: HysteresisConfig {
                down_enter: 110.0,
                down_comparator: Comparator::Above,
                up_enter: 70.0,
                up_comparator: Comparator::Below,
            },
        }
    }
}

impl RepConfig {
    pub fn thresholds(&self, exercise: Exercise) -> &HysteresisConfig {
        match exercise {
            Exercise::PushUp => &self.push_up,
            Exercise::SitUp => &self.sit_up,
        }
    }
}

/// Snapshot of the counter, cheap to clone and publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepCounterState {
    pub exercise: Exercise,
    pub phase: Phase,
    pub rep_count: u32,
    pub feedback: String,
}

/// A finished session, handed to whoever persists workout history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub exercise: Exercise,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub rep_count: u32,
}

/// What a single frame did to the counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// No person detected.
    NoPerson,
    /// Neither side's joints were confident enough to evaluate.
    NotVisible,
    /// Angle inside the current phase's band; nothing changed.
    Hold { side: Side, angle: f32 },
    /// Phase changed. `Up` entries complete a rep.
    Entered { side: Side, angle: f32, phase: Phase },
}

impl FrameOutcome {
    pub fn completed_rep(&self) -> bool {
        matches!(self, FrameOutcome::Entered { phase: Phase::Up, .. })
    }
}

#[derive(Debug, Clone)]
pub struct RepCounter {
    config: RepConfig,
    state: RepCounterState,
}

impl RepCounter {
    pub fn new(exercise: Exercise, config: RepConfig) -> Self {
        Self {
            config,
            state: RepCounterState {
                exercise,
                phase: Phase::Up,
                rep_count: 0,
                feedback: FEEDBACK_START.to_string(),
            },
        }
    }

    pub fn state(&self) -> &RepCounterState {
        &self.state
    }

    pub fn exercise(&self) -> Exercise {
        self.state.exercise
    }

    pub fn rep_count(&self) -> u32 {
        self.state.rep_count
    }

    pub fn config(&self) -> &RepConfig {
        &self.config
    }

    /// Feed the keypoints of the best detection of a frame, if any.
    pub fn process(&mut self, keypoints: Option<&[Keypoint; KeypointIndex::COUNT]>) -> FrameOutcome {
        let Some(keypoints) = keypoints else {
            self.state.feedback = FEEDBACK_NO_PERSON.to_string();
            return FrameOutcome::NoPerson;
        };

        let exercise = self.state.exercise;
        let Some(side) = select_side(exercise, keypoints, self.config.min_side_confidence) else {
            self.state.feedback = FEEDBACK_NOT_VISIBLE.to_string();
            return FrameOutcome::NotVisible;
        };

        let [a, b, c] = joint_triple(exercise, side).map(|k| keypoints[k.index()]);
        let angle = angle_between(a, b, c);
        if !angle.is_finite() {
            self.state.feedback = FEEDBACK_NOT_VISIBLE.to_string();
            return FrameOutcome::NotVisible;
        }

        self.step(side, angle)
    }

    /// Advance the state machine with an already measured angle.
    pub fn step(&mut self, side: Side, angle: f32) -> FrameOutcome {
        let th = *self.config.thresholds(self.state.exercise);
        let cues = self.state.exercise.cues();

        let (next, cue) = match self.state.phase {
            Phase::Up if th.down_comparator.holds(angle, th.down_enter) => (Some(Phase::Down), cues.enter_down),
            Phase::Up => (None, cues.hold_up),
            Phase::Down if th.up_comparator.holds(angle, th.up_enter) => (Some(Phase::Up), cues.enter_up),
            Phase::Down => (None, cues.hold_down),
        };
        self.state.feedback = cue.to_string();

        match next {
            Some(phase) => {
                self.state.phase = phase;
                if phase == Phase::Up {
                    self.state.rep_count += 1;
                }
                debug!(
                    "{} {:?} side {:.1}° → {:?} (reps {})",
                    self.state.exercise, side, angle, phase, self.state.rep_count
                );
                FrameOutcome::Entered { side, angle, phase }
            }
            None => FrameOutcome::Hold { side, angle },
        }
    }

    /// Zero the counter. A session with at least one rep is returned so the
    /// caller can persist it.
    pub fn reset(&mut self) -> Option<SessionRecord> {
        let record = (self.state.rep_count > 0).then(|| SessionRecord {
            exercise: self.state.exercise,
            timestamp_ms: now_ms(),
            rep_count: self.state.rep_count,
        });
        self.state.rep_count = 0;
        self.state.phase = Phase::Up;
        self.state.feedback = FEEDBACK_READY.to_string();
        record
    }

    /// Switch exercise. The running session is closed first.
    pub fn select_exercise(&mut self, exercise: Exercise) -> Option<SessionRecord> {
        if exercise == self.state.exercise {
            return None;
        }
        let record = self.reset();
        self.state.exercise = exercise;
        self.state.feedback = FEEDBACK_START.to_string();
        record
    }

    /// Overwrite the cue without touching phase or count.
    pub fn set_feedback(&mut self, feedback: &str) {
        self.state.feedback = feedback.to_string();
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
