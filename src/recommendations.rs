//! Recommendation synthesis from compliance issues.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compliance::{ComplianceIssue, ComplianceStatus};
use crate::rules::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl From<Severity> for Priority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Priority::High,
            Severity::Major => Priority::Medium,
            Severity::Minor | Severity::Info => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub steps: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    pub timeline: String,
    pub cost: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub priority: Priority,
    /// Rule id for issue-derived recommendations, otherwise a general topic.
    pub category: String,
    pub title: String,
    pub description: String,
    pub benefits: Vec<String>,
    pub implementation: Implementation,
}

pub const MAINTENANCE_CATEGORY: &str = "maintenance";
pub const TRAINING_CATEGORY: &str = "training";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Indicative remediation cost band per severity.
pub fn estimate_cost(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "15,000 - 25,000 EGP",
        Severity::Major => "8,000 - 15,000 EGP",
        Severity::Minor => "3,000 - 8,000 EGP",
        Severity::Info => "1,000 - 3,000 EGP",
    }
}

fn from_issue(issue: &ComplianceIssue) -> Recommendation {
    Recommendation {
        id: Uuid::new_v4().to_string(),
        priority: issue.severity.into(),
        category: issue.rule_id.to_string(),
        title: format!("Fix: {}", issue.title),
        description: issue.suggested_fix.clone(),
        benefits: strings(&[
            "Improves life safety",
            "Meets regulatory requirements",
            "Reduces fire risk",
        ]),
        implementation: Implementation {
            steps: strings(&[
                "Review the current drawings",
                "Identify the locations to modify",
                "Prepare updated drawings",
                "Carry out the modifications",
                "Test and inspect",
            ]),
            resources: strings(&["Fire protection engineer", "Construction team", "Specialist equipment"]),
            timeline: "2-4 weeks".to_string(),
            cost: estimate_cost(issue.severity).to_string(),
        },
    }
}

fn general_recommendations() -> [Recommendation; 2] {
    [
        Recommendation {
            id: Uuid::new_v4().to_string(),
            priority: Priority::Medium,
            category: MAINTENANCE_CATEGORY.to_string(),
            title: "Periodic maintenance programme".to_string(),
            description: "Set up periodic maintenance for all fire-safety devices".to_string(),
            benefits: strings(&[
                "Keeps devices working reliably",
                "Avoids unexpected failures",
                "Meets regulatory requirements",
            ]),
            implementation: Implementation {
                steps: strings(&[
                    "Draw up a maintenance schedule",
                    "Train the maintenance team",
                    "Stock spare parts",
                    "Log all maintenance work",
                ]),
                resources: vec![],
                timeline: "Monthly".to_string(),
                cost: "5,000 - 10,000 EGP per year".to_string(),
            },
        },
        Recommendation {
            id: Uuid::new_v4().to_string(),
            priority: Priority::Medium,
            category: TRAINING_CATEGORY.to_string(),
            title: "Staff fire-safety training".to_string(),
            description: "Train all staff on fire-safety procedures".to_string(),
            benefits: strings(&[
                "Raises awareness",
                "Improves emergency response",
                "Reduces risk",
            ]),
            implementation: Implementation {
                steps: strings(&[
                    "Prepare a training programme",
                    "Engage specialist trainers",
                    "Run theory and practical sessions",
                    "Assess periodically",
                ]),
                resources: vec![],
                timeline: "Quarterly".to_string(),
                cost: "3,000 - 5,000 EGP per session".to_string(),
            },
        },
    ]
}

/// One recommendation per non-compliant issue, then the two general ones.
pub fn generate_recommendations(issues: &[ComplianceIssue]) -> Vec<Recommendation> {
    let mut recommendations: Vec<_> = issues
        .iter()
        .filter(|i| i.status == ComplianceStatus::NonCompliant)
        .map(from_issue)
        .collect();

    recommendations.extend(general_recommendations());
    recommendations
}
