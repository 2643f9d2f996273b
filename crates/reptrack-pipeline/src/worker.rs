// ------------------------------------------------------------
// worker: the only thread that touches the model and the counter
// ------------------------------------------------------------
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use ndarray::ArrayView4;
use reptrack_camera::VideoFrame;
use reptrack_detect::{Detection, FrameGeometry, Postprocessor};
use reptrack_model::PoseModel;
use reptrack_preprocess::Preprocessor;
use reptrack_reps::{Exercise, RepCounter, RepCounterState, SessionRecord, FEEDBACK_PAUSED, FEEDBACK_START};

use crate::sink::SessionSink;
use crate::stats::Counters;
use crate::FrameResult;

/// Keypoints above this confidence count as "confident" in the debug log.
const LOG_KEYPOINT_CONF: f32 = 0.3;
/// Processed frames between two "no pose" notices.
const NO_POSE_LOG_EVERY: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectExercise(Exercise),
    StartTracking,
    StopTracking,
    Reset,
}

/// A frame accepted by the throttle, with its submission index.
pub(crate) struct Job {
    pub index: u64,
    pub frame: VideoFrame,
}

pub(crate) struct Worker {
    pub model: Box<dyn PoseModel>,
    pub preprocessor: Preprocessor,
    pub postprocessor: Postprocessor,
    pub counter: RepCounter,
    pub tracking: bool,
    pub sink: Box<dyn SessionSink>,
    pub snapshot: Arc<RwLock<RepCounterState>>,
    pub tracking_flag: Arc<AtomicBool>,
    pub counters: Arc<Counters>,
    pub results: Sender<FrameResult>,
    pub buffer: Vec<f32>,
    pub frames_without_pose: u64,
}

impl Worker {
    /// Run until both channels are closed, then close the session and hand
    /// the model back so the owner can release it.
    pub fn run(mut self, jobs: Receiver<Job>, commands: Receiver<Command>) -> Box<dyn PoseModel> {
        let mut jobs_open = true;
        let mut commands_open = true;

        while jobs_open || commands_open {
            // a closed channel is swapped for `never()` so select! stops firing on it
            let job_rx = if jobs_open { jobs.clone() } else { crossbeam_channel::never() };
            let cmd_rx = if commands_open { commands.clone() } else { crossbeam_channel::never() };
            select! {
                recv(cmd_rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle(cmd),
                    Err(_) => commands_open = false,
                },
                recv(job_rx) -> job => match job {
                    Ok(job) => {
                        // pending commands apply before the next frame
                        while let Ok(cmd) = commands.try_recv() {
                            self.handle(cmd);
                        }
                        self.process(job);
                    }
                    Err(_) => jobs_open = false,
                },
            }
        }
        // the pipeline going away ends the session too
        if let Some(record) = self.counter.reset() {
            self.complete(record);
        }
        debug!("worker quiesced");
        self.model
    }

    fn handle(&mut self, cmd: Command) {
        debug!("command {:?}", cmd);
        match cmd {
            Command::SelectExercise(exercise) => {
                if exercise != self.counter.exercise() {
                    self.set_tracking(false);
                }
                if let Some(record) = self.counter.select_exercise(exercise) {
                    self.complete(record);
                }
            }
            Command::StartTracking => {
                self.set_tracking(true);
                self.counter.set_feedback(FEEDBACK_START);
            }
            Command::StopTracking => {
                self.set_tracking(false);
                self.counter.set_feedback(FEEDBACK_PAUSED);
            }
            Command::Reset => {
                // tracking resumes only on an explicit start
                self.set_tracking(false);
                if let Some(record) = self.counter.reset() {
                    self.complete(record);
                }
            }
        }
        self.publish();
    }

    fn set_tracking(&mut self, on: bool) {
        self.tracking = on;
        self.tracking_flag.store(on, Ordering::Release);
    }

    fn complete(&mut self, record: SessionRecord) {
        info!("session complete: {} × {}", record.rep_count, record.exercise);
        self.sink.session_completed(record);
    }

    fn process(&mut self, job: Job) {
        Counters::bump(&self.counters.processed);
        let frame = &job.frame;

        let remap = match self.preprocessor.run_into(frame, &mut self.buffer) {
            Ok(remap) => remap,
            Err(e) => {
                warn!("frame {} dropped: {}", job.index, e);
                Counters::bump(&self.counters.preprocess_failures);
                return;
            }
        };
        let geometry = FrameGeometry { remap, width: frame.width, height: frame.height };

        let started = Instant::now();
        let detections = self.infer(job.index, &geometry);
        let inference_time = started.elapsed();

        if detections.is_empty() {
            self.frames_without_pose += 1;
            if self.frames_without_pose % NO_POSE_LOG_EVERY == 0 {
                info!("no pose detected in the last {} frames", self.frames_without_pose);
            }
        } else {
            self.frames_without_pose = 0;
            Counters::bump(&self.counters.with_detections);
            let best = &detections[0];
            debug!(
                "frame {}: {} detection(s), best {:.2} with {}/17 confident keypoints, inference {:.1} ms",
                job.index,
                detections.len(),
                best.score,
                best.confident_keypoints(LOG_KEYPOINT_CONF),
                inference_time.as_secs_f64() * 1000.0
            );
        }

        let outcome = if self.tracking {
            let outcome = self.counter.process(detections.first().map(|d| &d.keypoints));
            self.publish();
            Some(outcome)
        } else {
            None
        };

        self.emit(FrameResult {
            index: job.index,
            pts: frame.pts,
            detections,
            outcome,
            state: self.counter.state().clone(),
            inference_time,
        });
    }

    /// Zero detections on any failure past preprocessing.
    fn infer(&mut self, index: u64, geometry: &FrameGeometry) -> Vec<Detection> {
        let s = self.preprocessor.config().input_size as usize;
        let input = match ArrayView4::from_shape((1, 3, s, s), &self.buffer) {
            Ok(v) => v,
            Err(e) => {
                warn!("frame {}: tensor shape: {}", index, e);
                Counters::bump(&self.counters.inference_failures);
                return Vec::new();
            }
        };
        let raw = match self.model.run(input) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("frame {}: {}", index, e);
                Counters::bump(&self.counters.inference_failures);
                return Vec::new();
            }
        };
        match self.postprocessor.run(raw.view(), geometry) {
            Ok(dets) => dets,
            Err(e) => {
                warn!("frame {}: {}", index, e);
                Vec::new()
            }
        }
    }

    fn publish(&self) {
        let state = self.counter.state().clone();
        match self.snapshot.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    fn emit(&self, result: FrameResult) {
        match self.results.try_send(result) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(r)) => debug!("result for frame {} dropped, consumer is behind", r.index),
        }
    }
}
