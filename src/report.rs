//! Analysis Report - The Value Returned to Callers
//!
//! `AnalysisResult` is the authoritative schema for any serialization
//! of an analysis, successful or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::compliance::ComplianceIssue;
use crate::elements::{DetectedElement, ElementType, ExtractedText};
use crate::geometry::ScaleFactor;
use crate::metadata::{self, AdditionalInfo, TextStatistics};
use crate::pipeline::AnalysisStage;
use crate::recommendations::Recommendation;
use crate::rules::{ComplianceRule, Severity};

pub const UNSPECIFIED: &str = "Unspecified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingType {
    Residential,
    #[default]
    Commercial,
    Industrial,
    Educational,
    Healthcare,
    Governmental,
    Religious,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub title: String,
    pub location: String,
    #[serde(default)]
    pub district: Option<String>,
    pub purpose: String,
    pub building_type: BuildingType,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub floors: Option<u32>,
    #[serde(default)]
    pub occupancy: Option<u32>,
}

impl ProjectInfo {
    /// Built from title-block fields, with placeholders for anything missing.
    pub fn from_structured(data: &BTreeMap<String, String>, building_type: BuildingType) -> Self {
        let text = |key: &str, fallback: &str| {
            data.get(key).cloned().unwrap_or_else(|| fallback.to_string())
        };

        Self {
            title: text("project_title", "Unspecified project"),
            location: text("location", "Unspecified location"),
            district: data.get("district").cloned(),
            purpose: text("purpose", UNSPECIFIED),
            building_type,
            area: data.get("area").and_then(|v| v.parse().ok()),
            floors: data.get("floors").and_then(|v| v.parse().ok()),
            occupancy: data.get("occupancy").and_then(|v| v.parse().ok()),
        }
    }

    fn failed(building_type: BuildingType) -> Self {
        Self {
            title: "Failed analysis".to_string(),
            location: UNSPECIFIED.to_string(),
            district: None,
            purpose: "Failed analysis".to_string(),
            building_type,
            area: None,
            floors: None,
            occupancy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingData {
    pub drawing_number: String,
    pub title: String,
    pub scale: String,
    pub revision: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub checker: Option<String>,
}

impl DrawingData {
    pub fn from_structured(data: &BTreeMap<String, String>, file_path: &Path) -> Self {
        let stem = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "drawing".to_string());

        Self {
            drawing_number: data
                .get("drawing_number")
                .cloned()
                .unwrap_or_else(|| format!("DWG-{}", stem)),
            title: data.get("drawing_title").cloned().unwrap_or_else(|| "Technical drawing".to_string()),
            scale: data.get("scale").cloned().unwrap_or_else(|| UNSPECIFIED.to_string()),
            revision: data.get("revision").cloned().unwrap_or_else(|| "1.0".to_string()),
            date: data.get("date").cloned(),
            author: data.get("author").cloned(),
            checker: data.get("checker").cloned(),
        }
    }

    fn failed() -> Self {
        Self {
            drawing_number: "Error".to_string(),
            title: "Failed analysis".to_string(),
            scale: UNSPECIFIED.to_string(),
            revision: "0".to_string(),
            date: None,
            author: None,
            checker: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Completed,
    NeedsRevision,
    Failed,
}

/// Priority-ordered verdict: severity first, then score bands.
pub fn determine_overall_status(issues: &[ComplianceIssue], score: f64) -> (OverallStatus, &'static str) {
    let has = |severity: Severity| issues.iter().any(|i| i.severity == severity);

    if has(Severity::Critical) {
        (OverallStatus::Failed, "Drawing contains critical issues requiring immediate fix")
    } else if has(Severity::Major) {
        (OverallStatus::NeedsRevision, "Drawing contains major issues needing review")
    } else if score >= 90.0 {
        (OverallStatus::Completed, "Drawing shows excellent compliance")
    } else if score >= 75.0 {
        (OverallStatus::Completed, "Drawing is compliant with minor improvements")
    } else {
        (OverallStatus::NeedsRevision, "Drawing needs comprehensive review")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_elements: usize,
    pub total_texts: usize,
    pub total_issues: usize,
    pub critical_issues: usize,
    pub major_issues: usize,
    pub minor_issues: usize,
    pub info_issues: usize,
    pub element_types: BTreeMap<ElementType, usize>,
    pub text_statistics: Option<TextStatistics>,
    #[serde(default)]
    pub additional_info: AdditionalInfo,
}

impl AnalysisSummary {
    pub fn build(
        elements: &[DetectedElement],
        texts: &[ExtractedText],
        issues: &[ComplianceIssue],
    ) -> Self {
        let count = |severity: Severity| issues.iter().filter(|i| i.severity == severity).count();

        let mut element_types = BTreeMap::new();
        for element in elements {
            *element_types.entry(element.element_type).or_insert(0) += 1;
        }

        Self {
            total_elements: elements.len(),
            total_texts: texts.len(),
            total_issues: issues.len(),
            critical_issues: count(Severity::Critical),
            major_issues: count(Severity::Major),
            minor_issues: count(Severity::Minor),
            info_issues: count(Severity::Info),
            element_types,
            text_statistics: metadata::text_statistics(texts),
            additional_info: metadata::extract_additional_info(texts),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub analysis_date: DateTime<Utc>,
    pub processing_time: f64,
    pub project_info: ProjectInfo,
    pub drawing_data: DrawingData,
    pub detected_elements: Vec<DetectedElement>,
    pub extracted_texts: Vec<ExtractedText>,
    pub compliance_rules: Vec<ComplianceRule>,
    pub compliance_issues: Vec<ComplianceIssue>,
    pub compliance_score: f64,
    pub scale_factor: Option<ScaleFactor>,
    pub recommendations: Vec<Recommendation>,
    pub analysis_steps: Vec<AnalysisStage>,
    pub summary: AnalysisSummary,
    pub overall_status: OverallStatus,
    pub overall_status_message: String,
    /// SHA-256 over the evaluation inputs; equal inputs give equal fingerprints.
    pub input_fingerprint: Option<String>,
}

/// File name and extension as reported for `path`.
pub fn describe_file(path: &Path) -> (String, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    (name, extension)
}

impl AnalysisResult {
    /// Terminal result for an analysis that could not complete.
    pub fn failed(
        id: String,
        file_path: &Path,
        building_type: BuildingType,
        cause: &str,
        analysis_steps: Vec<AnalysisStage>,
        processing_time: f64,
    ) -> Self {
        let (file_name, file_type) = describe_file(file_path);
        let overall_status_message = format!("Failed to analyze {}: {}", file_name, cause);

        Self {
            id,
            file_name,
            file_size: 0,
            file_type,
            analysis_date: Utc::now(),
            processing_time,
            project_info: ProjectInfo::failed(building_type),
            drawing_data: DrawingData::failed(),
            detected_elements: vec![],
            extracted_texts: vec![],
            compliance_rules: vec![],
            compliance_issues: vec![],
            compliance_score: 0.0,
            scale_factor: None,
            recommendations: vec![],
            analysis_steps,
            summary: AnalysisSummary::default(),
            overall_status: OverallStatus::Failed,
            overall_status_message,
            input_fingerprint: None,
        }
    }

    pub fn has_critical_issues(&self) -> bool {
        self.compliance_issues.iter().any(|i| i.severity == Severity::Critical)
    }
}
