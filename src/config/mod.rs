//! Configuration management

use crate::frame::ChannelOrder;
use crate::inference::{DecoderThresholds, DetectionDecoder, Device, RowLayout};
use crate::mitigation::{BlurParams, BlurRules, MitigationPolicy};
use crate::utils::{Label, LabelCatalog};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Inference configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Path to the ONNX model file
    pub model_path: PathBuf,
    /// Device: "auto", "cpu", "coreml"
    pub device: Device,
    /// Intra-op thread count for the session
    pub intra_threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/best.onnx"),
            device: Device::Auto,
            intra_threads: 4,
        }
    }
}

/// Preprocessing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Channel order the model was trained on
    pub channel_order: ChannelOrder,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            channel_order: ChannelOrder::Rgb,
        }
    }
}

/// Detection decoding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub confidence_threshold: f32,
    pub score_threshold: f32,
    pub iou_threshold: f32,
    /// Class-index order of the model's labels
    pub labels: Vec<Label>,
    pub row_layout: RowLayout,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let thresholds = DecoderThresholds::default();
        Self {
            confidence_threshold: thresholds.confidence,
            score_threshold: thresholds.score,
            iou_threshold: thresholds.iou,
            labels: Label::ALL.to_vec(),
            row_layout: RowLayout::AnchorsLast,
        }
    }
}

/// Blur configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    /// Gaussian kernel edge, odd
    pub kernel_size: i32,
    pub sigma: f64,
    /// Exposed labels that are left unblurred
    pub disabled_labels: Vec<Label>,
}

impl Default for BlurConfig {
    fn default() -> Self {
        let params = BlurParams::default();
        Self {
            kernel_size: params.kernel_size(),
            sigma: params.sigma(),
            disabled_labels: Vec::new(),
        }
    }
}

/// Output encoding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Four-character codec code passed to the video writer
    pub fourcc: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fourcc: "mp4v".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub inference: InferenceConfig,
    pub preprocessing: PreprocessingConfig,
    pub detection: DetectionConfig,
    pub blur: BlurConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e))?;

        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_toml_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(format!("TOML serialize error: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::FileWriteError(path.to_path_buf(), e))?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("confidence_threshold", self.detection.confidence_threshold),
            ("score_threshold", self.detection.score_threshold),
            ("iou_threshold", self.detection.iou_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.inference.intra_threads == 0 {
            return Err(ConfigError::InvalidValue(
                "intra_threads must be greater than 0".to_string(),
            ));
        }

        self.catalog()?;
        self.blur_params()?;
        self.fourcc()?;

        Ok(())
    }

    pub fn decoder_thresholds(&self) -> DecoderThresholds {
        DecoderThresholds {
            confidence: self.detection.confidence_threshold,
            score: self.detection.score_threshold,
            iou: self.detection.iou_threshold,
        }
    }

    pub fn catalog(&self) -> Result<LabelCatalog, ConfigError> {
        LabelCatalog::new(self.detection.labels.clone())
    }

    pub fn blur_rules(&self) -> BlurRules {
        BlurRules::with_disabled(&self.blur.disabled_labels)
    }

    pub fn blur_params(&self) -> Result<BlurParams, ConfigError> {
        BlurParams::new(self.blur.kernel_size, self.blur.sigma)
    }

    pub fn decoder(&self) -> Result<DetectionDecoder, ConfigError> {
        Ok(DetectionDecoder::new(
            self.catalog()?,
            self.decoder_thresholds(),
            self.detection.row_layout,
        ))
    }

    pub fn mitigation_policy(&self) -> Result<MitigationPolicy, ConfigError> {
        Ok(MitigationPolicy::new(self.blur_rules(), self.blur_params()?))
    }

    /// Codec code as four characters
    pub fn fourcc(&self) -> Result<[char; 4], ConfigError> {
        let chars: Vec<char> = self.output.fourcc.chars().collect();
        match chars.as_slice() {
            [a, b, c, d] if chars.iter().all(|ch| ch.is_ascii_graphic()) => Ok([*a, *b, *c, *d]),
            _ => Err(ConfigError::InvalidValue(format!(
                "fourcc must be four printable ASCII characters, got '{}'",
                self.output.fourcc
            ))),
        }
    }

    /// Get model file path
    pub fn model_path(&self) -> &Path {
        &self.inference.model_path
    }

    /// Check if model file exists
    pub fn model_exists(&self) -> bool {
        self.inference.model_path.exists()
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileReadError(PathBuf, std::io::Error),

    #[error("Failed to write config file {0}: {1}")]
    FileWriteError(PathBuf, std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(String),

    #[error("Config serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
