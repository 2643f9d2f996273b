//! # reptrack-model
//!
//! The pose inference adapter: tensor in, raw output tensor out.
//!
//! The pipeline only sees the [`PoseModel`] trait, so the accelerator choice
//! and the runtime behind it stay the loader's concern. [`OrtPoseModel`] is the
//! onnxruntime-backed implementation. It probes the network once at load time
//! and resolves the [`OutputLayout`], so an unsupported export fails at setup
//! instead of on every frame.

use log::{debug, info};
use ndarray::{Array4, ArrayD, ArrayView4, ArrayViewD};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod layout;

pub use layout::{OutputLayout, NUM_KEYPOINTS};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Unsupported output shape {0:?}: expected [1, 56, N] or [1, N, 57]")]
    UnsupportedOutputShape(Vec<usize>),
    #[error("Input tensor shape {actual:?} does not match model input [1, 3, {expected}, {expected}]")]
    InputShape { expected: u32, actual: Vec<usize> },
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Raw network output, shape as produced by the runtime.
pub type RawOutput = ArrayD<f32>;

/// Configuration for loading a pose network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the `.onnx` export
    pub model_path: PathBuf,
    /// Square input size the network was exported with
    pub input_size: u32,
    /// Intra-op threads handed to the runtime
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/yolov8n-pose.onnx"),
            input_size: 640,
            intra_threads: num_cpus::get().saturating_sub(1).max(1),
        }
    }
}

/// Opaque inference capability.
pub trait PoseModel: Send {
    /// Side of the square input tensor.
    fn input_size(&self) -> u32;

    /// Layout of the raw output, fixed for the lifetime of the model.
    fn output_layout(&self) -> OutputLayout;

    /// Run one `[1, 3, S, S]` tensor through the network.
    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<RawOutput>;
}

impl<M: PoseModel + ?Sized> PoseModel for Box<M> {
    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn output_layout(&self) -> OutputLayout {
        (**self).output_layout()
    }

    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<RawOutput> {
        (**self).run(input)
    }
}

/// Check an input view against the `[1, 3, S, S]` contract.
pub fn check_input(input: &ArrayView4<'_, f32>, size: u32) -> Result<()> {
    let s = size as usize;
    if input.shape() != [1, 3, s, s] {
        return Err(ModelError::InputShape { expected: size, actual: input.shape().to_vec() });
    }
    Ok(())
}

/// onnxruntime-powered pose network.
pub struct OrtPoseModel {
    session: Session,
    input_name: String,
    output_name: String,
    input_size: u32,
    layout: OutputLayout,
}

impl OrtPoseModel {
    /// Load the ONNX file, optimise it and probe the output layout.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let path = &config.model_path;
        let mut session = Session::builder()
            .map_err(|e| load_error(path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(path, e))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| load_error(path, e))?
            .commit_from_file(path)
            .map_err(|e| load_error(path, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ModelError::Load("model declares no inputs".into()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ModelError::Load("model declares no outputs".into()))?;

        // A zero tensor is enough to learn the concrete output shape, including
        // exports with symbolic dimensions.
        let s = config.input_size as usize;
        let probe = Array4::<f32>::zeros((1, 3, s, s));
        let out = infer(&mut session, &input_name, &output_name, probe.view())?;
        let layout = OutputLayout::from_shape(out.shape())?;

        info!(
            "pose model {:?} ready: input '{}' {}×{}, output '{}' {:?} → {:?}",
            config.model_path, input_name, s, s, output_name, out.shape(), layout
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            input_size: config.input_size,
            layout,
        })
    }
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> ModelError {
    ModelError::Load(format!("{path:?}: {e}"))
}

fn inference_error(e: impl std::fmt::Display) -> ModelError {
    ModelError::Inference(e.to_string())
}

fn infer(session: &mut Session, input_name: &str, output_name: &str, input: ArrayView4<'_, f32>) -> Result<RawOutput> {
    // ort wants an owned buffer
    let tensor = Tensor::from_array(input.to_owned()).map_err(inference_error)?;
    let outputs = session
        .run(ort::inputs![input_name => tensor])
        .map_err(inference_error)?;
    let view: ArrayViewD<f32> = outputs[output_name]
        .try_extract_array()
        .map_err(inference_error)?;
    Ok(view.to_owned())
}

impl PoseModel for OrtPoseModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn output_layout(&self) -> OutputLayout {
        self.layout
    }

    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<RawOutput> {
        check_input(&input, self.input_size)?;
        infer(&mut self.session, &self.input_name, &self.output_name, input)
    }
}

impl Drop for OrtPoseModel {
    fn drop(&mut self) {
        debug!("releasing onnxruntime session for '{}'", self.output_name);
    }
}
