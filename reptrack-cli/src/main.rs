use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam_channel::unbounded;
use log::{info, warn};
use reptrack_camera::{frame_stream, PixelFormat, RawFileSource, ReplaySource, VideoFrame};
use reptrack_model::OrtPoseModel;
use reptrack_pipeline::{Pipeline, PipelineConfig, Submission};
use reptrack_preprocess::ResizeMode;
use reptrack_reps::{Exercise, SessionRecord};
use tokio::time::Instant;
use tokio_stream::{Stream, StreamExt};

// ================ CLI ================== //

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RawFormat {
    Nv12,
    Nv21,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExerciseArg {
    PushUp,
    SitUp,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResizeArg {
    Letterbox,
    Stretch,
}

/// Count exercise reps in a recorded clip.
#[derive(Parser, Debug)]
struct CliArgs {
    /// Raw NV12/NV21 dump, a still image, or a directory of still images
    #[arg(long)]
    input: PathBuf,

    /// JSON pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// ONNX pose model (overrides the config file)
    #[arg(long)]
    model: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "push-up")]
    exercise: ExerciseArg,

    /// Frame width of a raw dump
    #[arg(long, default_value = "640")]
    width: u32,

    /// Frame height of a raw dump
    #[arg(long, default_value = "480")]
    height: u32,

    #[arg(long, value_enum, default_value = "nv21")]
    format: RawFormat,

    /// Nominal capture rate; frames are replayed at this pace
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Process every Nth frame (overrides the config file)
    #[arg(long)]
    every: Option<u32>,

    #[arg(long, value_enum)]
    resize: Option<ResizeArg>,

    /// Submit frames as fast as they are read instead of at capture pace
    #[arg(long)]
    fast: bool,
}

fn build_config(args: &CliArgs) -> Result<PipelineConfig> {
    if args.fps == 0 {
        bail!("--fps must be at least 1");
    }
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {path:?}"))?,
        None => PipelineConfig::default(),
    };
    if let Some(model) = &args.model {
        cfg.model.model_path = model.clone();
    }
    if let Some(n) = args.every {
        cfg.process_every_n_frames = n;
    }
    if let Some(resize) = args.resize {
        cfg.preprocess.resize = match resize {
            ResizeArg::Letterbox => ResizeMode::Letterbox,
            ResizeArg::Stretch => ResizeMode::Stretch,
        };
    }
    cfg.exercise = match args.exercise {
        ExerciseArg::PushUp => Exercise::PushUp,
        ExerciseArg::SitUp => Exercise::SitUp,
    };
    cfg.validate()?;
    Ok(cfg)
}

// ================ INPUT ================== //

fn is_image(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("png" | "jpg" | "jpeg" | "bmp")
    )
}

fn load_image(path: &Path, index: u32, fps: u32) -> Result<VideoFrame> {
    let rgb = image::open(path).with_context(|| format!("decoding {path:?}"))?.to_rgb8();
    let (w, h) = rgb.dimensions();
    let pts = Duration::from_secs(1) / fps * index;
    Ok(VideoFrame::packed(rgb.into_raw(), PixelFormat::Rgb8, w, h, pts))
}

fn image_frames(args: &CliArgs) -> Result<ReplaySource> {
    let paths = if args.input.is_dir() {
        let mut paths = std::fs::read_dir(&args.input)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_image(p))
            .collect::<Vec<_>>();
        paths.sort();
        paths
    } else {
        vec![args.input.clone()]
    };
    if paths.is_empty() {
        bail!("no images found in {:?}", args.input);
    }
    let frames = paths
        .iter()
        .enumerate()
        .map(|(i, p)| load_image(p, i as u32, args.fps))
        .collect::<Result<Vec<_>>>()?;
    info!("loaded {} still frame(s)", frames.len());
    Ok(ReplaySource::new(frames))
}

// ================ MAIN ================== //

type FrameStream = Pin<Box<dyn Stream<Item = reptrack_camera::Result<VideoFrame>> + Send>>;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = CliArgs::parse();
    let cfg = build_config(&args)?;

    let model = OrtPoseModel::load(&cfg.model).context("loading pose model")?;
    let (session_tx, session_rx) = unbounded::<SessionRecord>();
    let pipeline = Pipeline::start(model, cfg, session_tx)?;
    pipeline.start_tracking()?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)).context("installing ctrl-c handler")?;
    }

    // print results as they come; ends when the worker exits
    let results = pipeline.results().clone();
    let printer = thread::spawn(move || {
        for r in results.iter() {
            if let Some(outcome) = r.outcome {
                if outcome.completed_rep() {
                    println!("[{:>8.2}s] rep {} ({})", r.pts.as_secs_f64(), r.state.rep_count, r.state.exercise);
                }
            }
            log::debug!(
                "frame {}: {} detection(s), {:?} {:?} \"{}\"",
                r.index,
                r.detections.len(),
                r.state.phase,
                r.outcome,
                r.state.feedback
            );
        }
    });

    let mut frames: FrameStream = if args.input.is_dir() || is_image(&args.input) {
        Box::pin(frame_stream(image_frames(&args)?))
    } else {
        let format = match args.format {
            RawFormat::Nv12 => PixelFormat::Nv12,
            RawFormat::Nv21 => PixelFormat::Nv21,
        };
        let source = RawFileSource::open(&args.input, format, args.width, args.height, args.fps)
            .with_context(|| format!("opening {:?}", args.input))?;
        Box::pin(frame_stream(source))
    };

    let started = Instant::now();
    let mut replaced = 0u64;
    while let Some(frame) = frames.next().await {
        if stop.load(Ordering::SeqCst) {
            info!("interrupted");
            break;
        }
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                warn!("input ended early: {e}");
                break;
            }
        };
        if !args.fast {
            tokio::time::sleep_until(started + frame.pts).await;
        }
        if pipeline.submit(frame)? == Submission::Replaced {
            replaced += 1;
        }
    }
    if replaced > 0 {
        info!("{replaced} frame(s) replaced while the worker was busy");
    }

    // shutdown lets the worker finish the pending frame and closes the session
    let stats = pipeline.shutdown()?;
    if printer.join().is_err() {
        warn!("result printer panicked");
    }

    let sessions = session_rx.try_iter().collect::<Vec<_>>();
    if sessions.is_empty() {
        println!("no reps counted");
    }
    for record in &sessions {
        println!("{}: {} rep(s)", record.exercise, record.rep_count);
        println!("session: {}", serde_json::to_string(record)?);
    }
    println!("stats: {}", serde_json::to_string(&stats)?);
    Ok(())
}
