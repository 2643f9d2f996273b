//! Aggregated pipeline configuration, loaded from JSON.

use std::path::{Path, PathBuf};

use reptrack_detect::PostprocessConfig;
use reptrack_model::ModelConfig;
use reptrack_preprocess::PreprocessConfig;
use reptrack_reps::{Exercise, HysteresisConfig, RepConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub model: ModelConfig,
    pub postprocess: PostprocessConfig,
    pub reps: RepConfig,
    /// Exercise selected when the pipeline starts.
    pub exercise: Exercise,
    /// Only every Nth submitted frame reaches the worker.
    pub process_every_n_frames: u32,
    /// Per-frame results held for a slow consumer before new ones are dropped.
    pub result_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            model: ModelConfig::default(),
            postprocess: PostprocessConfig::default(),
            reps: RepConfig::default(),
            exercise: Exercise::PushUp,
            process_every_n_frames: 4,
            result_buffer: 4,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.preprocess.input_size == 0 {
            return invalid("preprocess.input_size must be non-zero".into());
        }
        if self.model.input_size != self.preprocess.input_size {
            return invalid(format!(
                "model.input_size {} differs from preprocess.input_size {}",
                self.model.input_size, self.preprocess.input_size
            ));
        }
        if self.process_every_n_frames == 0 {
            return invalid("process_every_n_frames must be at least 1".into());
        }
        if self.result_buffer == 0 {
            return invalid("result_buffer must be at least 1".into());
        }
        if self.postprocess.max_detections == 0 {
            return invalid("postprocess.max_detections must be at least 1".into());
        }

        let unit = [
            ("postprocess.conf_threshold", self.postprocess.conf_threshold),
            ("postprocess.iou_threshold", self.postprocess.iou_threshold),
            ("reps.min_side_confidence", self.reps.min_side_confidence),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} = {value} is outside [0, 1]"));
            }
        }

        for (name, band) in [("reps.push_up", &self.reps.push_up), ("reps.sit_up", &self.reps.sit_up)] {
            check_band(name, band)?;
        }
        Ok(())
    }
}

fn check_band(name: &str, band: &HysteresisConfig) -> Result<(), ConfigError> {
    if !(0.0..=180.0).contains(&band.down_enter) || !(0.0..=180.0).contains(&band.up_enter) {
        return Err(ConfigError::Invalid(format!("{name} thresholds must lie in [0, 180] degrees")));
    }
    if !band.has_dead_zone() {
        return Err(ConfigError::Invalid(format!(
            "{name}: thresholds {} / {} leave no dead zone",
            band.down_enter, band.up_enter
        )));
    }
    Ok(())
}
