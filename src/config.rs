//! Analysis Configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Detections below this confidence are dropped before evaluation.
    #[serde(default = "default_min_confidence")]
    pub min_element_confidence: f64,
    /// Lowercase extensions without the dot.
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Meters per pixel; skips scale inference when set.
    #[serde(default)]
    pub scale_factor_override: Option<f64>,
}

fn default_min_confidence() -> f64 { 0.5 }

fn default_allowed_formats() -> Vec<String> {
    ["jpg", "jpeg", "png", "bmp", "tiff", "pdf"].iter().map(|s| s.to_string()).collect()
}

fn default_max_file_size() -> u64 { 50 * 1024 * 1024 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_element_confidence: default_min_confidence(),
            allowed_formats: default_allowed_formats(),
            max_file_size_bytes: default_max_file_size(),
            scale_factor_override: None,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_element_confidence) {
            return Err(ConfigError::Invalid(format!(
                "minElementConfidence must be within [0, 1], got {}",
                self.min_element_confidence
            )));
        }
        if self.allowed_formats.is_empty() {
            return Err(ConfigError::Invalid("allowedFormats must not be empty".into()));
        }
        if self.max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid("maxFileSizeBytes must be positive".into()));
        }
        if let Some(scale) = self.scale_factor_override {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "scaleFactorOverride must be positive, got {}",
                    scale
                )));
            }
        }
        Ok(())
    }

    pub fn is_allowed_format(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .map_or(false, |ext| self.allowed_formats.iter().any(|f| f.eq_ignore_ascii_case(&ext)))
    }
}
