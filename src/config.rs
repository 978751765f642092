use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_ADDR: &str = "127.0.0.1:8765";
const DEFAULT_MODEL_PATH: &str = "models/yolov8n.onnx";
const DEFAULT_INPUT_WIDTH: u32 = 640;
const DEFAULT_INPUT_HEIGHT: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 3000;

/// Model name selecting the scripted stub backend instead of an ONNX file.
pub const STUB_MODEL: &str = "stub";

#[derive(Debug, Deserialize, Default)]
struct TrackerdConfigFile {
    addr: Option<String>,
    model: Option<ModelConfigFile>,
    aliases: Option<AliasConfigFile>,
    inference_timeout_ms: Option<u64>,
    strict: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<String>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct AliasConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TrackerdConfig {
    pub addr: String,
    pub model_path: String,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub inference_timeout: Duration,
    pub alias_path: Option<PathBuf>,
    /// Refuse to start when the model cannot be loaded.
    pub strict: bool,
}

impl TrackerdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRACKER_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrackerdConfigFile) -> Self {
        let model = file.model.unwrap_or_default();
        Self {
            addr: file.addr.unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            model_path: model
                .path
                .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
            input_width: model.input_width.unwrap_or(DEFAULT_INPUT_WIDTH),
            input_height: model.input_height.unwrap_or(DEFAULT_INPUT_HEIGHT),
            confidence_threshold: model
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            inference_timeout: Duration::from_millis(
                file.inference_timeout_ms
                    .unwrap_or(DEFAULT_INFERENCE_TIMEOUT_MS),
            ),
            alias_path: file.aliases.and_then(|aliases| aliases.path),
            strict: file.strict.unwrap_or(false),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("TRACKER_ADDR") {
            if !addr.trim().is_empty() {
                self.addr = addr;
            }
        }
        if let Ok(model) = std::env::var("TRACKER_MODEL") {
            if !model.trim().is_empty() {
                self.model_path = model;
            }
        }
        if let Ok(aliases) = std::env::var("TRACKER_ALIASES") {
            if !aliases.trim().is_empty() {
                self.alias_path = Some(PathBuf::from(aliases));
            }
        }
        if let Ok(timeout) = std::env::var("TRACKER_INFERENCE_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                anyhow!("TRACKER_INFERENCE_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.inference_timeout = Duration::from_millis(millis);
        }
        if let Ok(strict) = std::env::var("TRACKER_STRICT") {
            self.strict = matches!(strict.trim(), "1" | "true" | "yes");
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within 0..=1"));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(anyhow!("model input dimensions must be non-zero"));
        }
        if self.inference_timeout.is_zero() {
            return Err(anyhow!("inference timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<TrackerdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let cfg = TrackerdConfig::from_file(TrackerdConfigFile::default());
        assert_eq!(cfg.addr, DEFAULT_ADDR);
        assert_eq!(cfg.model_path, DEFAULT_MODEL_PATH);
        assert_eq!(cfg.confidence_threshold, 0.5);
        assert_eq!(cfg.inference_timeout, Duration::from_secs(3));
        assert!(cfg.alias_path.is_none());
        assert!(!cfg.strict);
        cfg.validate().unwrap();
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trackerd.json");
        std::fs::write(
            &path,
            r#"{
                "addr": "127.0.0.1:9000",
                "model": {"path": "stub", "confidence_threshold": 0.6},
                "strict": true
            }"#,
        )
        .unwrap();

        let file = read_config_file(&path).unwrap();
        let cfg = TrackerdConfig::from_file(file);
        assert_eq!(cfg.addr, "127.0.0.1:9000");
        assert_eq!(cfg.model_path, "stub");
        assert_eq!(cfg.confidence_threshold, 0.6);
        assert!(cfg.strict);
        // Unset fields keep their defaults.
        assert_eq!(cfg.input_width, DEFAULT_INPUT_WIDTH);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut cfg = TrackerdConfig::from_file(TrackerdConfigFile::default());
        cfg.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_input_dimension_is_rejected() {
        let mut cfg = TrackerdConfig::from_file(TrackerdConfigFile::default());
        cfg.input_height = 0;
        assert!(cfg.validate().is_err());
    }
}
