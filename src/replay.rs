//! Detection Replay - Recorded Detector Output
//!
//! Runs the pipeline against detections saved as JSON instead of a live
//! vision model. The drawing file is still read, validated and sized.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::elements::{DetectedElement, ExtractedText};
use crate::pipeline::{
    AnalysisPipeline, ElementDetector, ImageInfo, ImageNormalizer, NormalizedImage,
    PipelineError, Raster, TextExtractor,
};

/// Detector and OCR output for one drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBundle {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub elements: Vec<DetectedElement>,
    #[serde(default)]
    pub texts: Vec<ExtractedText>,
}

impl DetectionBundle {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path)?;
        let bundle: Self = serde_json::from_str(&content)?;
        if bundle.width == 0 || bundle.height == 0 {
            return Err(PipelineError::ImageLoad {
                path: path.display().to_string(),
                reason: format!("bundle dimensions {}x{} must be positive", bundle.width, bundle.height),
            });
        }
        Ok(bundle)
    }

    /// Pipeline that replays this bundle for any drawing it is run on.
    pub fn into_pipeline(self) -> AnalysisPipeline {
        AnalysisPipeline::new(
            Arc::new(FileImageNormalizer::new(self.width, self.height)),
            Arc::new(ReplayDetector::new(self.elements)),
            Arc::new(ReplayExtractor::new(self.texts)),
        )
    }
}

/// Reads the drawing bytes and reports fixed raster dimensions.
pub struct FileImageNormalizer {
    width: u32,
    height: u32,
}

impl FileImageNormalizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[async_trait]
impl ImageNormalizer for FileImageNormalizer {
    async fn load(&self, path: &Path) -> Result<NormalizedImage, PipelineError> {
        let data = tokio::fs::read(path).await.map_err(|e| PipelineError::ImageLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if data.is_empty() {
            return Err(PipelineError::ImageLoad {
                path: path.display().to_string(),
                reason: "file is empty".to_string(),
            });
        }

        let format = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Ok(NormalizedImage {
            info: ImageInfo {
                width: self.width,
                height: self.height,
                format,
                file_size: data.len() as u64,
            },
            raster: Raster { width: self.width, height: self.height, data },
        })
    }
}

pub struct ReplayDetector {
    elements: Vec<DetectedElement>,
}

impl ReplayDetector {
    pub fn new(elements: Vec<DetectedElement>) -> Self {
        Self { elements }
    }
}

#[async_trait]
impl ElementDetector for ReplayDetector {
    async fn detect(&self, _raster: &Raster) -> Result<Vec<DetectedElement>, PipelineError> {
        Ok(self.elements.clone())
    }
}

pub struct ReplayExtractor {
    texts: Vec<ExtractedText>,
}

impl ReplayExtractor {
    pub fn new(texts: Vec<ExtractedText>) -> Self {
        Self { texts }
    }
}

#[async_trait]
impl TextExtractor for ReplayExtractor {
    async fn extract(&self, _raster: &Raster) -> Result<Vec<ExtractedText>, PipelineError> {
        Ok(self.texts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bundle_defaults_and_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"width": 800, "height": 600}}"#).unwrap();
        let bundle = DetectionBundle::load(file.path()).unwrap();
        assert!(bundle.elements.is_empty());
        assert!(bundle.texts.is_empty());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"{{"width": 0, "height": 600}}"#).unwrap();
        assert!(matches!(DetectionBundle::load(bad.path()), Err(PipelineError::ImageLoad { .. })));
    }

    fn bundle_with_confidence(confidence: f64) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"width": 10, "height": 10, "elements": [{{"type": "emergency_exit", "name": "E", "confidence": {},
               "bounding_box": {{"x": 0, "y": 0, "width": 1, "height": 1}}}}]}}"#,
            confidence
        )
        .unwrap();
        file
    }

    #[test]
    fn test_bundle_rejects_invalid_confidence() {
        let valid = bundle_with_confidence(0.5);
        let bundle = DetectionBundle::load(valid.path()).unwrap();
        assert_eq!(bundle.elements[0].confidence, 0.5);

        let invalid = bundle_with_confidence(1.4);
        match DetectionBundle::load(invalid.path()) {
            Err(PipelineError::Serialization(e)) => {
                assert!(e.to_string().contains("Confidence must be within [0, 1], got 1.4"), "{}", e);
            }
            other => panic!("expected confidence error, got {:?}", other.map(|b| b.elements.len())),
        }
    }

    #[tokio::test]
    async fn test_normalizer_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.PNG");
        fs::write(&path, b"not really a png").unwrap();

        let image = FileImageNormalizer::new(640, 480).load(&path).await.unwrap();
        assert_eq!(image.info.format, "png");
        assert_eq!(image.info.file_size, 16);
        assert_eq!(image.raster.width, 640);
    }

    #[tokio::test]
    async fn test_normalizer_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.png");
        fs::write(&path, b"").unwrap();

        let err = FileImageNormalizer::new(1, 1).load(&path).await.unwrap_err();
        assert!(err.to_string().contains("file is empty"));
    }
}
