use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::model::engine::InferenceEngine;
use crate::model::linear::LinearModel;

/// Model files larger than this are rejected before parsing.
const MAX_MODEL_FILE_BYTES: u64 = 64 * 1024 * 1024;

/// On-disk model description (`.nam`-style JSON).
#[derive(Debug, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub version: Option<String>,
    pub architecture: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub weights: Vec<f32>,
    #[serde(default)]
    pub sample_rate: Option<f64>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub loudness: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LinearConfig {
    receptive_field: usize,
    #[serde(default)]
    bias: bool,
}

pub fn load_from_path(path: &Path) -> Result<Box<dyn InferenceEngine>> {
    let size = fs::metadata(path)
        .with_context(|| format!("Failed to stat model file {}", path.display()))?
        .len();
    if size > MAX_MODEL_FILE_BYTES {
        bail!(
            "Model file {} is too large: {size} bytes (max {MAX_MODEL_FILE_BYTES})",
            path.display()
        );
    }

    let bytes =
        fs::read(path).with_context(|| format!("Failed to read model file {}", path.display()))?;
    let engine = load_from_bytes(&bytes)
        .with_context(|| format!("Failed to load model {}", path.display()))?;

    debug!("Loaded model from {:?}", path);
    Ok(engine)
}

pub fn load_from_bytes(bytes: &[u8]) -> Result<Box<dyn InferenceEngine>> {
    let file: ModelFile = serde_json::from_slice(bytes).context("Failed to parse model file")?;
    build_engine(file)
}

fn build_engine(file: ModelFile) -> Result<Box<dyn InferenceEngine>> {
    let sample_rate = match file.sample_rate {
        Some(rate) if !rate.is_finite() || rate <= 0.0 => {
            bail!("Invalid model sample rate {rate}")
        }
        other => other,
    };
    let loudness = file
        .metadata
        .and_then(|m| m.loudness)
        .filter(|l| l.is_finite());

    match file.architecture.as_str() {
        "Linear" => {
            let config: LinearConfig = serde_json::from_value(file.config)
                .context("Invalid configuration for Linear architecture")?;

            let expected = config
                .receptive_field
                .checked_add(usize::from(config.bias))
                .context("Linear receptive field too large")?;
            if file.weights.len() != expected {
                return Err(anyhow!(
                    "Linear model expects {} weights, found {}",
                    expected,
                    file.weights.len()
                ));
            }

            let mut weights = file.weights;
            let bias = if config.bias {
                weights.pop().unwrap_or(0.0)
            } else {
                0.0
            };

            let mut model = LinearModel::new(weights, bias, sample_rate, loudness)?;
            model.prewarm();
            debug!(
                "Built Linear model: receptive field {}, version {}",
                model.receptive_field(),
                file.version.as_deref().unwrap_or("unknown")
            );
            Ok(Box::new(model))
        }
        other => Err(anyhow!("Unsupported model architecture '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const IDENTITY: &str = r#"{
        "version": "0.5.4",
        "architecture": "Linear",
        "config": { "receptive_field": 1, "bias": false },
        "weights": [1.0],
        "sample_rate": 48000,
        "metadata": { "loudness": -12.0 }
    }"#;

    #[test]
    fn parses_linear_model() {
        let model = load_from_bytes(IDENTITY.as_bytes()).unwrap();
        assert_eq!(model.expected_sample_rate(), Some(48_000.0));
        assert_eq!(model.loudness(), Some(-12.0));
    }

    #[test]
    fn trailing_weight_is_bias() {
        let json = r#"{
            "architecture": "Linear",
            "config": { "receptive_field": 2, "bias": true },
            "weights": [0.0, 0.0, 0.5]
        }"#;
        let mut model = load_from_bytes(json.as_bytes()).unwrap();
        let mut out = [0.0; 2];
        model.process(&[1.0, -1.0], &mut out);
        model.finalize(2);
        assert_eq!(out, [0.5, 0.5]);
        assert_eq!(model.expected_sample_rate(), None);
    }

    #[test]
    fn rejects_malformed_files() {
        assert!(load_from_bytes(b"not json").is_err());
        assert!(load_from_bytes(br#"{"architecture":"WaveNet","config":{},"weights":[]}"#).is_err());
        let wrong_count = r#"{
            "architecture": "Linear",
            "config": { "receptive_field": 3 },
            "weights": [1.0]
        }"#;
        assert!(load_from_bytes(wrong_count.as_bytes()).is_err());
        let bad_rate = r#"{
            "architecture": "Linear",
            "config": { "receptive_field": 1 },
            "weights": [1.0],
            "sample_rate": 0
        }"#;
        assert!(load_from_bytes(bad_rate.as_bytes()).is_err());
        let huge_field = r#"{
            "architecture": "Linear",
            "config": { "receptive_field": 18446744073709551615, "bias": true },
            "weights": [1.0]
        }"#;
        assert!(load_from_bytes(huge_field.as_bytes()).is_err());
    }

    #[test]
    fn loads_from_path() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(IDENTITY.as_bytes())?;
        let model = load_from_path(file.path())?;
        assert_eq!(model.loudness(), Some(-12.0));

        let missing = file.path().with_extension("missing");
        assert!(load_from_path(&missing).is_err());
        Ok(())
    }
}
