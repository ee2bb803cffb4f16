//! Analysis Pipeline - Single Entry Point
//!
//! Six fixed stages run strictly in order. The first failing stage stops
//! the run; `run` always returns an `AnalysisResult`, never an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use crate::compliance::{ComplianceEngine, ComplianceOutcome};
use crate::config::{AnalysisConfig, ConfigError};
use crate::elements::{DetectedElement, ExtractedText, ModelError};
use crate::hashing::compute_input_fingerprint;
use crate::metadata;
use crate::recommendations::{generate_recommendations, Recommendation};
use crate::report::{
    describe_file, determine_overall_status, AnalysisResult, AnalysisSummary, BuildingType,
    DrawingData, ProjectInfo,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to load image {path}: {reason}")]
    ImageLoad { path: String, reason: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Element detection failed: {0}")]
    Detection(String),

    #[error("Text extraction failed: {0}")]
    TextExtraction(String),

    #[error("Stage {stage} requires output of {needs}")]
    MissingStageInput { stage: &'static str, needs: &'static str },

    #[error("Report assembly failed: {0}")]
    Report(String),

    #[error("Invalid element data: {0}")]
    Model(#[from] ModelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoded drawing handed to the detector and extractor.
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub file_size: u64,
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub raster: Raster,
    pub info: ImageInfo,
}

#[async_trait]
pub trait ImageNormalizer: Send + Sync {
    async fn load(&self, path: &Path) -> Result<NormalizedImage, PipelineError>;
}

#[async_trait]
pub trait ElementDetector: Send + Sync {
    async fn detect(&self, raster: &Raster) -> Result<Vec<DetectedElement>, PipelineError>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, raster: &Raster) -> Result<Vec<ExtractedText>, PipelineError>;

    /// Title-block fields, one fixed pattern per field.
    fn extract_structured_data(&self, texts: &[ExtractedText]) -> BTreeMap<String, String> {
        metadata::extract_structured_data(texts)
    }
}

/// Receives every stage transition, e.g. to serve progress to a poller.
pub trait StageObserver: Send + Sync {
    fn stage_updated(&self, stage: &AnalysisStage);
}

pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn stage_updated(&self, _stage: &AnalysisStage) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed | StageStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    LoadImage,
    DetectElements,
    ExtractText,
    CheckCompliance,
    GenerateRecommendations,
    AssembleReport,
}

pub struct StageDescriptor {
    pub kind: StageKind,
    pub name: &'static str,
    pub description: &'static str,
    /// Stages whose output this stage reads.
    pub requires: &'static [StageKind],
}

pub static STAGES: [StageDescriptor; 6] = [
    StageDescriptor {
        kind: StageKind::LoadImage,
        name: "load_image",
        description: "Load and prepare the drawing for analysis",
        requires: &[],
    },
    StageDescriptor {
        kind: StageKind::DetectElements,
        name: "detect_elements",
        description: "Detect fire-safety elements in the drawing",
        requires: &[StageKind::LoadImage],
    },
    StageDescriptor {
        kind: StageKind::ExtractText,
        name: "extract_text",
        description: "Extract text and annotations from the drawing",
        requires: &[StageKind::LoadImage],
    },
    StageDescriptor {
        kind: StageKind::CheckCompliance,
        name: "check_compliance",
        description: "Check compliance with the fire code",
        requires: &[StageKind::LoadImage, StageKind::DetectElements, StageKind::ExtractText],
    },
    StageDescriptor {
        kind: StageKind::GenerateRecommendations,
        name: "generate_recommendations",
        description: "Generate improvement recommendations",
        requires: &[StageKind::CheckCompliance],
    },
    StageDescriptor {
        kind: StageKind::AssembleReport,
        name: "assemble_report",
        description: "Assemble the final analysis report",
        requires: &[
            StageKind::LoadImage,
            StageKind::DetectElements,
            StageKind::ExtractText,
            StageKind::CheckCompliance,
            StageKind::GenerateRecommendations,
        ],
    },
];

impl StageKind {
    pub fn descriptor(&self) -> &'static StageDescriptor {
        let index = STAGES.iter().position(|d| d.kind == *self).unwrap_or(0);
        &STAGES[index]
    }

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStage {
    pub step_id: String,
    pub name: String,
    pub description: String,
    pub status: StageStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds.
    pub duration: Option<f64>,
    pub progress: f64,
    pub result: Option<serde_json::Value>,
    pub errors: Vec<String>,
}

impl AnalysisStage {
    fn new(analysis_id: &str, index: usize, descriptor: &StageDescriptor) -> Self {
        Self {
            step_id: format!("{}-step-{}", analysis_id, index + 1),
            name: descriptor.name.to_string(),
            description: descriptor.description.to_string(),
            status: StageStatus::Pending,
            start_time: None,
            end_time: None,
            duration: None,
            progress: 0.0,
            result: None,
            errors: vec![],
        }
    }

    fn begin(&mut self) {
        if self.status != StageStatus::Pending {
            return;
        }
        self.status = StageStatus::Processing;
        self.start_time = Some(Utc::now());
        self.progress = 0.0;
    }

    fn finish(&mut self) {
        let end = Utc::now();
        self.end_time = Some(end);
        self.duration = self
            .start_time
            .and_then(|start| (end - start).num_microseconds())
            .map(|us| us as f64 / 1_000_000.0);
    }

    fn complete(&mut self, result: serde_json::Value) {
        if self.status != StageStatus::Processing {
            return;
        }
        self.finish();
        self.status = StageStatus::Completed;
        self.progress = 100.0;
        self.result = Some(result);
    }

    fn fail(&mut self, error: String) {
        if self.status != StageStatus::Processing {
            return;
        }
        self.finish();
        self.status = StageStatus::Failed;
        self.errors.push(error);
    }

    fn cancel(&mut self) {
        if self.status == StageStatus::Pending {
            self.status = StageStatus::Cancelled;
        }
    }
}

/// Per-run stage outputs, indexed by the stage that produced them.
#[derive(Default)]
struct StageOutputs {
    image: Option<NormalizedImage>,
    elements: Option<Vec<DetectedElement>>,
    texts: Option<Vec<ExtractedText>>,
    compliance: Option<ComplianceOutcome>,
    fingerprint: Option<String>,
    recommendations: Option<Vec<Recommendation>>,
    report: Option<AnalysisResult>,
}

impl StageOutputs {
    fn has(&self, kind: StageKind) -> bool {
        match kind {
            StageKind::LoadImage => self.image.is_some(),
            StageKind::DetectElements => self.elements.is_some(),
            StageKind::ExtractText => self.texts.is_some(),
            StageKind::CheckCompliance => self.compliance.is_some(),
            StageKind::GenerateRecommendations => self.recommendations.is_some(),
            StageKind::AssembleReport => self.report.is_some(),
        }
    }
}

fn missing(stage: StageKind, needs: StageKind) -> PipelineError {
    PipelineError::MissingStageInput { stage: stage.name(), needs: needs.name() }
}

struct RunContext<'a> {
    analysis_id: &'a str,
    file_path: &'a Path,
    building_type: BuildingType,
    project_info: Option<ProjectInfo>,
}

/// The analysis pipeline - single entry point for drawing analysis
pub struct AnalysisPipeline {
    normalizer: Arc<dyn ImageNormalizer>,
    detector: Arc<dyn ElementDetector>,
    extractor: Arc<dyn TextExtractor>,
    engine: Arc<ComplianceEngine>,
    config: AnalysisConfig,
}

impl AnalysisPipeline {
    pub fn new(
        normalizer: Arc<dyn ImageNormalizer>,
        detector: Arc<dyn ElementDetector>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            normalizer,
            detector,
            extractor,
            engine: Arc::new(ComplianceEngine::new()),
            config: AnalysisConfig::default(),
        }
    }

    /// Rejects a config that `AnalysisConfig::validate` rejects.
    pub fn with_config(mut self, config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Share one engine (and its catalog) across pipelines.
    pub fn with_engine(mut self, engine: Arc<ComplianceEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn engine(&self) -> &ComplianceEngine {
        &self.engine
    }

    pub async fn run(
        &self,
        file_path: impl AsRef<Path>,
        building_type: BuildingType,
        project_info: Option<ProjectInfo>,
    ) -> AnalysisResult {
        self.run_observed(file_path, building_type, project_info, &NoopObserver).await
    }

    /// `run`, reporting every stage transition to `observer`.
    pub async fn run_observed(
        &self,
        file_path: impl AsRef<Path>,
        building_type: BuildingType,
        project_info: Option<ProjectInfo>,
        observer: &dyn StageObserver,
    ) -> AnalysisResult {
        self.run_with_id(Uuid::new_v4().to_string(), file_path, building_type, project_info, observer)
            .await
    }

    /// `run_observed` under a caller-assigned id. The result and every step id
    /// carry `analysis_id`.
    pub async fn run_with_id(
        &self,
        analysis_id: String,
        file_path: impl AsRef<Path>,
        building_type: BuildingType,
        project_info: Option<ProjectInfo>,
        observer: &dyn StageObserver,
    ) -> AnalysisResult {
        let file_path = file_path.as_ref();
        let started = Instant::now();

        tracing::info!(analysis_id = %analysis_id, file = %file_path.display(), "Starting analysis");

        let ctx = RunContext { analysis_id: &analysis_id, file_path, building_type, project_info };
        let mut stages: Vec<AnalysisStage> = STAGES
            .iter()
            .enumerate()
            .map(|(i, d)| AnalysisStage::new(&analysis_id, i, d))
            .collect();
        let mut outputs = StageOutputs::default();

        for (index, descriptor) in STAGES.iter().enumerate() {
            stages[index].begin();
            observer.stage_updated(&stages[index]);

            let outcome = match descriptor.requires.iter().find(|r| !outputs.has(**r)) {
                Some(needed) => Err(missing(descriptor.kind, *needed)),
                None => self.execute(descriptor.kind, &ctx, &mut outputs).await,
            };

            match outcome {
                Ok(summary) => {
                    stages[index].complete(summary);
                    observer.stage_updated(&stages[index]);
                    tracing::info!(
                        analysis_id = %analysis_id,
                        stage = descriptor.name,
                        duration = stages[index].duration.unwrap_or_default(),
                        "Stage completed"
                    );
                }
                Err(e) => {
                    let cause = e.to_string();
                    tracing::error!(analysis_id = %analysis_id, stage = descriptor.name, error = %cause, "Stage failed");

                    stages[index].fail(cause.clone());
                    observer.stage_updated(&stages[index]);
                    for stage in stages.iter_mut().skip(index + 1) {
                        stage.cancel();
                        observer.stage_updated(stage);
                    }

                    return AnalysisResult::failed(
                        analysis_id.clone(),
                        file_path,
                        building_type,
                        &format!("stage {} failed: {}", descriptor.name, cause),
                        stages,
                        started.elapsed().as_secs_f64(),
                    );
                }
            }
        }

        match outputs.report.take() {
            Some(mut report) => {
                report.analysis_steps = stages;
                report.processing_time = started.elapsed().as_secs_f64();
                tracing::info!(
                    analysis_id = %analysis_id,
                    score = report.compliance_score,
                    status = ?report.overall_status,
                    "Analysis finished"
                );
                report
            }
            None => AnalysisResult::failed(
                analysis_id.clone(),
                file_path,
                building_type,
                "no report was assembled",
                stages,
                started.elapsed().as_secs_f64(),
            ),
        }
    }

    async fn execute(
        &self,
        kind: StageKind,
        ctx: &RunContext<'_>,
        outputs: &mut StageOutputs,
    ) -> Result<serde_json::Value, PipelineError> {
        match kind {
            StageKind::LoadImage => self.load_image(ctx, outputs).await,
            StageKind::DetectElements => self.detect_elements(outputs).await,
            StageKind::ExtractText => self.extract_text(outputs).await,
            StageKind::CheckCompliance => self.check_compliance(outputs),
            StageKind::GenerateRecommendations => self.recommend(outputs),
            StageKind::AssembleReport => self.assemble_report(ctx, outputs),
        }
    }

    async fn load_image(
        &self,
        ctx: &RunContext<'_>,
        outputs: &mut StageOutputs,
    ) -> Result<serde_json::Value, PipelineError> {
        if !self.config.is_allowed_format(ctx.file_path) {
            let (_, extension) = describe_file(ctx.file_path);
            return Err(PipelineError::UnsupportedFormat(if extension.is_empty() {
                "(none)".to_string()
            } else {
                extension
            }));
        }

        let size = tokio::fs::metadata(ctx.file_path).await?.len();
        if size > self.config.max_file_size_bytes {
            return Err(PipelineError::FileTooLarge { size, limit: self.config.max_file_size_bytes });
        }

        let image = self.normalizer.load(ctx.file_path).await?;
        let summary = serde_json::to_value(&image.info)?;
        outputs.image = Some(image);
        Ok(summary)
    }

    async fn detect_elements(&self, outputs: &mut StageOutputs) -> Result<serde_json::Value, PipelineError> {
        let image = outputs
            .image
            .as_ref()
            .ok_or_else(|| missing(StageKind::DetectElements, StageKind::LoadImage))?;

        let detected = self.detector.detect(&image.raster).await?;
        let total = detected.len();
        let elements: Vec<_> = detected
            .into_iter()
            .filter(|e| e.confidence >= self.config.min_element_confidence)
            .collect();

        tracing::info!(detected = total, kept = elements.len(), "Elements detected");
        let summary = json!({ "detected": total, "kept": elements.len() });
        outputs.elements = Some(elements);
        Ok(summary)
    }

    async fn extract_text(&self, outputs: &mut StageOutputs) -> Result<serde_json::Value, PipelineError> {
        let image = outputs
            .image
            .as_ref()
            .ok_or_else(|| missing(StageKind::ExtractText, StageKind::LoadImage))?;

        let texts = self.extractor.extract(&image.raster).await?;
        tracing::info!(texts = texts.len(), "Text extracted");
        let summary = json!({ "texts": texts.len() });
        outputs.texts = Some(texts);
        Ok(summary)
    }

    fn check_compliance(&self, outputs: &mut StageOutputs) -> Result<serde_json::Value, PipelineError> {
        let stage = StageKind::CheckCompliance;
        let image = outputs.image.as_ref().ok_or_else(|| missing(stage, StageKind::LoadImage))?;
        let elements = outputs.elements.as_ref().ok_or_else(|| missing(stage, StageKind::DetectElements))?;
        let texts = outputs.texts.as_ref().ok_or_else(|| missing(stage, StageKind::ExtractText))?;

        let dimensions = (image.info.width, image.info.height);
        let scale = self.config.scale_factor_override;
        let fingerprint = compute_input_fingerprint(elements, texts, dimensions, scale)?;
        let outcome = self.engine.assess(elements, texts, dimensions, scale);

        let summary = json!({
            "issues": outcome.issues.len(),
            "score": outcome.score,
            "meters_per_pixel": outcome.scale.meters_per_pixel,
        });
        outputs.compliance = Some(outcome);
        outputs.fingerprint = Some(fingerprint);
        Ok(summary)
    }

    fn recommend(&self, outputs: &mut StageOutputs) -> Result<serde_json::Value, PipelineError> {
        let outcome = outputs
            .compliance
            .as_ref()
            .ok_or_else(|| missing(StageKind::GenerateRecommendations, StageKind::CheckCompliance))?;

        let recommendations = generate_recommendations(&outcome.issues);
        let summary = json!({ "recommendations": recommendations.len() });
        outputs.recommendations = Some(recommendations);
        Ok(summary)
    }

    fn assemble_report(
        &self,
        ctx: &RunContext<'_>,
        outputs: &mut StageOutputs,
    ) -> Result<serde_json::Value, PipelineError> {
        let stage = StageKind::AssembleReport;
        let image = outputs.image.as_ref().ok_or_else(|| missing(stage, StageKind::LoadImage))?;
        let elements = outputs.elements.take().ok_or_else(|| missing(stage, StageKind::DetectElements))?;
        let texts = outputs.texts.take().ok_or_else(|| missing(stage, StageKind::ExtractText))?;
        let outcome = outputs.compliance.take().ok_or_else(|| missing(stage, StageKind::CheckCompliance))?;
        let recommendations = outputs
            .recommendations
            .take()
            .ok_or_else(|| missing(stage, StageKind::GenerateRecommendations))?;

        let structured = self.extractor.extract_structured_data(&texts);
        let project_info = match &ctx.project_info {
            Some(info) => ProjectInfo { building_type: ctx.building_type, ..info.clone() },
            None => ProjectInfo::from_structured(&structured, ctx.building_type),
        };
        let drawing_data = DrawingData::from_structured(&structured, ctx.file_path);

        let (overall_status, message) = determine_overall_status(&outcome.issues, outcome.score);
        let summary = AnalysisSummary::build(&elements, &texts, &outcome.issues);
        let (file_name, file_type) = describe_file(ctx.file_path);

        if !(0.0..=100.0).contains(&outcome.score) {
            return Err(PipelineError::Report(format!("score {} out of range", outcome.score)));
        }

        let stage_summary = json!({
            "overall_status": overall_status,
            "compliance_score": outcome.score,
        });

        outputs.report = Some(AnalysisResult {
            id: ctx.analysis_id.to_string(),
            file_name,
            file_size: image.info.file_size,
            file_type,
            analysis_date: Utc::now(),
            processing_time: 0.0,
            project_info,
            drawing_data,
            detected_elements: elements,
            extracted_texts: texts,
            compliance_rules: self.engine.catalog().rules().to_vec(),
            compliance_issues: outcome.issues,
            compliance_score: outcome.score,
            scale_factor: Some(outcome.scale),
            recommendations,
            analysis_steps: vec![],
            summary,
            overall_status,
            overall_status_message: message.to_string(),
            input_fingerprint: outputs.fingerprint.take(),
        });

        Ok(stage_summary)
    }
}

/// Owned request for running an analysis on a spawned task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub file_path: PathBuf,
    #[serde(default)]
    pub building_type: BuildingType,
    #[serde(default)]
    pub project_info: Option<ProjectInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let names: Vec<_> = STAGES.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "load_image",
                "detect_elements",
                "extract_text",
                "check_compliance",
                "generate_recommendations",
                "assemble_report"
            ]
        );
    }

    #[test]
    fn test_requirements_point_backwards() {
        for (index, descriptor) in STAGES.iter().enumerate() {
            for needed in descriptor.requires {
                let position = STAGES.iter().position(|d| d.kind == *needed).unwrap();
                assert!(position < index, "{} depends on a later stage", descriptor.name);
            }
        }
    }

    #[test]
    fn test_stage_transitions_are_terminal() {
        let mut stage = AnalysisStage::new("a", 0, &STAGES[0]);
        assert_eq!(stage.status, StageStatus::Pending);

        stage.begin();
        assert_eq!(stage.status, StageStatus::Processing);
        assert!(stage.start_time.is_some());

        stage.complete(json!({}));
        assert_eq!(stage.status, StageStatus::Completed);
        assert_eq!(stage.progress, 100.0);
        assert!(stage.duration.is_some());

        stage.fail("late".to_string());
        stage.cancel();
        stage.begin();
        assert_eq!(stage.status, StageStatus::Completed);
        assert!(stage.errors.is_empty());
    }

    #[test]
    fn test_failed_stage_keeps_error() {
        let mut stage = AnalysisStage::new("a", 1, &STAGES[1]);
        assert_eq!(stage.step_id, "a-step-2");
        stage.begin();
        stage.fail("boom".to_string());
        assert_eq!(stage.status, StageStatus::Failed);
        assert_eq!(stage.errors, vec!["boom".to_string()]);
        assert!(stage.status.is_terminal());
    }

    #[test]
    fn test_kind_name_lookup() {
        assert_eq!(StageKind::CheckCompliance.name(), "check_compliance");
        assert_eq!(StageKind::AssembleReport.name(), "assemble_report");
    }
}
