use anyhow::{Context, Result, bail};
use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::amp::params::{TARGET_LOUDNESS_DB, db_to_gain};

/// Opaque neural model capability: transforms one mono block into another
/// at the model's own fixed sample rate. The pipeline never branches on
/// the concrete architecture.
pub trait Model: Send {
    fn process(&mut self, input: &[f32], output: &mut [f32]);

    /// The rate the model was trained at; the engine resamples to match.
    fn sample_rate(&self) -> u32;

    fn reset(&mut self);
}

/// Display/bookkeeping info captured when a model file loads successfully.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub path: PathBuf,
    pub sample_rate: u32,
    /// Loudness compensation gain, pinned at load time. Unity when the
    /// file carries no loudness metadata.
    pub norm_gain: f32,
    pub loudness_db: Option<f32>,
}

pub struct LoadedModel {
    pub model: Box<dyn Model>,
    pub info: ModelInfo,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

// Serialized model description. The format carries the architecture name,
// a per-architecture config object and a flat weight vector.
#[derive(Deserialize)]
struct ModelFile {
    #[allow(dead_code)]
    version: Option<String>,
    architecture: String,
    config: serde_json::Value,
    weights: Vec<f32>,
    sample_rate: Option<u32>,
    metadata: Option<ModelMetadata>,
}

#[derive(Deserialize)]
struct ModelMetadata {
    loudness: Option<f32>,
}

const DEFAULT_MODEL_RATE: u32 = 48_000;

/// Loads a model description from disk. Runs on the control thread only;
/// a failure leaves whatever model is currently active untouched.
pub fn load_model(path: &Path) -> Result<LoadedModel> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read model file {}", path.display()))?;
    let file: ModelFile = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse model file {}", path.display()))?;

    let sample_rate = file.sample_rate.unwrap_or(DEFAULT_MODEL_RATE);

    let model: Box<dyn Model> = match file.architecture.as_str() {
        "Linear" => Box::new(LinearModel::from_file(&file, sample_rate)?),
        other => bail!("unsupported model architecture '{other}'"),
    };

    let loudness_db = file.metadata.and_then(|m| m.loudness);
    let norm_gain = loudness_db.map_or(1.0, |loudness| db_to_gain(TARGET_LOUDNESS_DB - loudness));

    let name = path
        .file_stem()
        .map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().into_owned());

    debug!(
        "Loaded model '{}' ({} @ {} Hz, norm gain {:.3})",
        name, file.architecture, sample_rate, norm_gain
    );

    Ok(LoadedModel {
        model,
        info: ModelInfo {
            name,
            path: path.to_path_buf(),
            sample_rate,
            norm_gain,
            loudness_db,
        },
    })
}

#[derive(Deserialize)]
struct LinearConfig {
    receptive_field: usize,
    #[serde(default)]
    bias: bool,
}

/// Linear architecture: an FIR over the receptive field, with an optional
/// bias term. Input history lives in a ring buffer so state carries
/// across block boundaries.
pub struct LinearModel {
    coeffs: Vec<f32>,
    bias: f32,
    history: Vec<f32>,
    write_pos: usize,
    sample_rate: u32,
}

impl LinearModel {
    fn from_file(file: &ModelFile, sample_rate: u32) -> Result<Self> {
        let config: LinearConfig = serde_json::from_value(file.config.clone())
            .context("invalid config for Linear architecture")?;

        if config.receptive_field == 0 {
            bail!("Linear model has zero receptive field");
        }

        let expected = config.receptive_field + usize::from(config.bias);
        if file.weights.len() != expected {
            bail!(
                "Linear model weight count mismatch: expected {expected}, got {}",
                file.weights.len()
            );
        }

        let coeffs = file.weights[..config.receptive_field].to_vec();
        let bias = if config.bias {
            file.weights[config.receptive_field]
        } else {
            0.0
        };

        Ok(Self {
            history: vec![0.0; coeffs.len()],
            coeffs,
            bias,
            write_pos: 0,
            sample_rate,
        })
    }
}

impl Model for LinearModel {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let len = self.history.len();

        for (y, &x) in output.iter_mut().zip(input) {
            self.history[self.write_pos] = x;

            let mut acc = self.bias;
            let mut idx = self.write_pos;
            for &coeff in &self.coeffs {
                acc += self.history[idx] * coeff;
                idx = if idx == 0 { len - 1 } else { idx - 1 };
            }

            self.write_pos = (self.write_pos + 1) % len;
            *y = acc;
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_model(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".nam").unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_linear_model() {
        let file = write_model(
            r#"{
                "version": "0.5.4",
                "architecture": "Linear",
                "config": {"receptive_field": 3, "bias": false},
                "weights": [1.0, 0.5, 0.25],
                "sample_rate": 44100,
                "metadata": {"loudness": -12.0}
            }"#,
        );

        let loaded = load_model(file.path()).unwrap();
        assert_eq!(loaded.info.sample_rate, 44100);
        assert_eq!(loaded.info.loudness_db, Some(-12.0));
        // Target -18 against measured -12 is a -6 dB trim.
        assert!((loaded.info.norm_gain - db_to_gain(-6.0)).abs() < 1e-6);
    }

    #[test]
    fn test_linear_model_impulse_response() {
        let file = write_model(
            r#"{
                "architecture": "Linear",
                "config": {"receptive_field": 3, "bias": false},
                "weights": [1.0, 0.5, 0.25]
            }"#,
        );

        let mut loaded = load_model(file.path()).unwrap();
        let input = [1.0, 0.0, 0.0, 0.0];
        let mut output = [0.0f32; 4];
        loaded.model.process(&input, &mut output);

        assert!((output[0] - 1.0).abs() < 1e-6);
        assert!((output[1] - 0.5).abs() < 1e-6);
        assert!((output[2] - 0.25).abs() < 1e-6);
        assert!((output[3] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_bias_term_is_applied() {
        let file = write_model(
            r#"{
                "architecture": "Linear",
                "config": {"receptive_field": 1, "bias": true},
                "weights": [2.0, 0.1]
            }"#,
        );

        let mut loaded = load_model(file.path()).unwrap();
        let input = [0.5];
        let mut output = [0.0f32];
        loaded.model.process(&input, &mut output);

        assert!((output[0] - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_architecture_fails() {
        let file = write_model(
            r#"{
                "architecture": "WaveNet",
                "config": {},
                "weights": []
            }"#,
        );

        let err = load_model(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported model architecture"));
    }

    #[test]
    fn test_malformed_file_fails() {
        let file = write_model("not json at all");
        assert!(load_model(file.path()).is_err());
    }

    #[test]
    fn test_weight_count_mismatch_fails() {
        let file = write_model(
            r#"{
                "architecture": "Linear",
                "config": {"receptive_field": 4, "bias": false},
                "weights": [1.0, 0.5]
            }"#,
        );

        assert!(load_model(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(load_model(Path::new("/nonexistent/model.nam")).is_err());
    }

    #[test]
    fn test_state_carries_across_blocks() {
        let mut model = LinearModel {
            coeffs: vec![0.0, 1.0],
            bias: 0.0,
            history: vec![0.0; 2],
            write_pos: 0,
            sample_rate: 48_000,
        };

        // One-sample delay: the last sample of block A appears as the
        // first output sample of block B.
        let mut out = [0.0f32; 2];
        model.process(&[1.0, 2.0], &mut out);
        assert_eq!(out, [0.0, 1.0]);

        model.process(&[0.0, 0.0], &mut out);
        assert_eq!(out, [2.0, 0.0]);
    }
}
