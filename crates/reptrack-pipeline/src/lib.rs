// reptrack-pipeline/src/lib.rs
// ============================================================
// reptrack-pipeline  –  the frame-processing session
// ------------------------------------------------------------
// producer ── submit() ─┬─ throttle (every Nth frame)
//                       └─ mailbox (bounded(1), newest wins)
//                                   │
//                          worker thread: preprocess → model
//                          → postprocess → rep counter
//                                   │
//             snapshot (RwLock) ◄───┴───► results (bounded)
// ------------------------------------------------------------
// The worker owns the model while running and hands it back
// on exit; shutdown() joins it first and only then drops the
// model, so release can never overlap an inference call.
// ============================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::{info, warn};
use reptrack_camera::VideoFrame;
use reptrack_detect::{Detection, Postprocessor};
use reptrack_model::{ModelError, PoseModel};
use reptrack_preprocess::Preprocessor;
use reptrack_reps::{Exercise, FrameOutcome, RepCounter, RepCounterState};
use thiserror::Error;

mod config;
mod sink;
mod stats;
mod worker;

pub use config::{ConfigError, PipelineConfig};
pub use sink::SessionSink;
pub use stats::PipelineStats;
pub use worker::Command;

use stats::Counters;
use worker::{Job, Worker};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Model input is {model}×{model} but preprocessing produces {configured}×{configured}")]
    InputSizeMismatch { model: u32, configured: u32 },
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Pipeline is shut down")]
    Stopped,
    #[error("Worker thread panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Everything the worker learned about one processed frame.
#[derive(Debug, Clone)]
pub struct FrameResult {
    /// Submission index of the frame.
    pub index: u64,
    pub pts: Duration,
    /// Sorted by score, highest first.
    pub detections: Vec<Detection>,
    /// `None` while tracking is stopped.
    pub outcome: Option<FrameOutcome>,
    pub state: RepCounterState,
    pub inference_time: Duration,
}

/// What `submit` did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Skipped by the every-Nth-frame throttle.
    Throttled,
    /// Placed in the empty mailbox.
    Queued,
    /// Placed in the mailbox after evicting an older pending frame.
    Replaced,
}

pub struct Pipeline {
    jobs: Option<Sender<Job>>,
    evict: Receiver<Job>,
    commands: Option<Sender<Command>>,
    results: Receiver<FrameResult>,
    snapshot: Arc<RwLock<RepCounterState>>,
    tracking: Arc<AtomicBool>,
    counters: Arc<Counters>,
    frame_index: AtomicU64,
    every_n: u64,
    worker: Option<JoinHandle<Box<dyn PoseModel>>>,
}

impl Pipeline {
    /// Validate `config` and start the worker around an already loaded model.
    pub fn start<M, S>(model: M, config: PipelineConfig, sink: S) -> Result<Self>
    where
        M: PoseModel + 'static,
        S: SessionSink + 'static,
    {
        config.validate()?;
        let configured = config.preprocess.input_size;
        if model.input_size() != configured {
            return Err(PipelineError::InputSizeMismatch { model: model.input_size(), configured });
        }

        let layout = model.output_layout();
        info!(
            "pipeline: {:?} output, {} candidates/frame, every {} frame(s), {:?} resize",
            layout,
            layout.detections(),
            config.process_every_n_frames,
            config.preprocess.resize
        );

        let preprocessor = Preprocessor::new(config.preprocess.clone());
        let counter = RepCounter::new(config.exercise, config.reps.clone());
        let snapshot = Arc::new(RwLock::new(counter.state().clone()));
        let tracking = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let (job_tx, job_rx) = bounded::<Job>(1);
        let (cmd_tx, cmd_rx) = unbounded::<Command>();
        let (result_tx, result_rx) = bounded::<FrameResult>(config.result_buffer);

        let worker = Worker {
            buffer: vec![0.0; preprocessor.tensor_len()],
            model: Box::new(model),
            preprocessor,
            postprocessor: Postprocessor::new(layout, config.postprocess.clone()),
            counter,
            tracking: false,
            sink: Box::new(sink),
            snapshot: Arc::clone(&snapshot),
            tracking_flag: Arc::clone(&tracking),
            counters: Arc::clone(&counters),
            results: result_tx,
            frames_without_pose: 0,
        };

        let job_rx_worker = job_rx.clone();
        let handle = std::thread::Builder::new()
            .name("reptrack-worker".into())
            .spawn(move || worker.run(job_rx_worker, cmd_rx))
            .map_err(PipelineError::Spawn)?;

        Ok(Self {
            jobs: Some(job_tx),
            evict: job_rx,
            commands: Some(cmd_tx),
            results: result_rx,
            snapshot,
            tracking,
            counters,
            frame_index: AtomicU64::new(0),
            every_n: u64::from(config.process_every_n_frames),
            worker: Some(handle),
        })
    }

    /// Offer a frame. Never blocks on the worker.
    pub fn submit(&self, frame: VideoFrame) -> Result<Submission> {
        let jobs = self.jobs.as_ref().ok_or(PipelineError::Stopped)?;
        Counters::bump(&self.counters.submitted);

        let index = self.frame_index.fetch_add(1, Ordering::Relaxed);
        if index % self.every_n != 0 {
            Counters::bump(&self.counters.throttled);
            return Ok(Submission::Throttled);
        }

        let mut job = Job { index, frame };
        let mut replaced = false;
        loop {
            match jobs.try_send(job) {
                Ok(()) => return Ok(if replaced { Submission::Replaced } else { Submission::Queued }),
                Err(TrySendError::Full(back)) => {
                    // the worker may have taken the pending frame in the meantime
                    if self.evict.try_recv().is_ok() {
                        Counters::bump(&self.counters.replaced);
                        replaced = true;
                    }
                    job = back;
                }
                Err(TrySendError::Disconnected(_)) => return Err(PipelineError::Stopped),
            }
        }
    }

    pub fn send(&self, command: Command) -> Result<()> {
        let commands = self.commands.as_ref().ok_or(PipelineError::Stopped)?;
        commands.send(command).map_err(|_| PipelineError::Stopped)
    }

    /// Switching to another exercise also stops tracking.
    pub fn select_exercise(&self, exercise: Exercise) -> Result<()> {
        self.send(Command::SelectExercise(exercise))
    }

    pub fn start_tracking(&self) -> Result<()> {
        self.send(Command::StartTracking)
    }

    pub fn stop_tracking(&self) -> Result<()> {
        self.send(Command::StopTracking)
    }

    /// Zero the counter and stop tracking; a session with reps goes to the sink.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Latest published counter state.
    pub fn snapshot(&self) -> RepCounterState {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    /// Per-frame results. Results are dropped while this is not drained.
    pub fn results(&self) -> &Receiver<FrameResult> {
        &self.results
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Stop accepting work, let the worker finish what it holds, then
    /// release the model.
    pub fn shutdown(mut self) -> Result<PipelineStats> {
        self.stop()?;
        Ok(self.counters.snapshot())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.jobs = None;
        self.commands = None;

        let model = handle.join().map_err(|_| PipelineError::WorkerPanicked)?;
        drop(model);
        info!("pose model released");
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("pipeline shutdown: {}", e);
        }
    }
}
