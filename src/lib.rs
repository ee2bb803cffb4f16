//! FireCode Core - Fire-Safety Compliance Analysis for Technical Drawings
//!
//! # Ground Rules
//! 1. Detections Are Input, Not Truth To Repair
//! 2. The Rule Catalog Is Fixed And Ordered
//! 3. Scale Is Resolved Once Per Evaluation
//! 4. Equal Inputs Give Equal Findings
//! 5. A Failed Stage Stops The Run, Never The Caller

pub mod elements;
pub mod geometry;
pub mod rules;
pub mod compliance;
pub mod metadata;
pub mod recommendations;
pub mod report;
pub mod config;
pub mod hashing;
pub mod pipeline;
pub mod registry;
pub mod replay;

pub use elements::{BoundingBox, DetectedElement, ElementType, ExtractedText, ModelError};
pub use geometry::{ScaleFactor, ScaleSource};
pub use rules::{ComplianceRule, RuleCatalog, RuleCategory, RuleId, Severity};
pub use compliance::{compliance_score, ComplianceEngine, ComplianceIssue, ComplianceOutcome, ComplianceStatus};
pub use recommendations::{generate_recommendations, Priority, Recommendation};
pub use report::{AnalysisResult, AnalysisSummary, BuildingType, DrawingData, OverallStatus, ProjectInfo};
pub use config::{AnalysisConfig, ConfigError};
pub use hashing::{canonical_json, compute_input_fingerprint};
pub use pipeline::{
    AnalysisPipeline, AnalysisRequest, AnalysisStage, ElementDetector, ImageNormalizer, PipelineError,
    StageObserver, StageStatus, TextExtractor,
};
pub use metadata::{AdditionalInfo, Dimension, TextStatistics};
pub use registry::{AnalysisRegistry, RegistryError, RegistryStatistics};
pub use replay::DetectionBundle;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
