//! Rule Catalog - Fixed Fire-Code Rule Set
//!
//! The catalog is a closed set. Adding a rule means adding a `RuleId`
//! variant, which forces a matching evaluator in `compliance`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::elements::ElementType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Info,
}

impl Severity {
    /// Points deducted from the compliance score per issue.
    pub fn deduction(&self) -> f64 {
        match self {
            Severity::Critical => 20.0,
            Severity::Major => 10.0,
            Severity::Minor => 5.0,
            Severity::Info => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Coverage,
    Distance,
    Accessibility,
    Capacity,
    Dimensions,
    Signage,
    Documentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    #[serde(rename = "rule-001")]
    SmokeDetectorCoverage,
    #[serde(rename = "rule-002")]
    HeatDetectorCoverage,
    #[serde(rename = "rule-003")]
    FireExtinguisherCoverage,
    #[serde(rename = "rule-004")]
    EmergencyExitDistance,
    #[serde(rename = "rule-005")]
    EmergencyExitWidth,
    #[serde(rename = "rule-006")]
    FireAlarmSystem,
    #[serde(rename = "rule-007")]
    DeviceAccessibility,
    #[serde(rename = "rule-008")]
    ExitSignage,
}

impl RuleId {
    pub const ALL: [RuleId; 8] = [
        RuleId::SmokeDetectorCoverage,
        RuleId::HeatDetectorCoverage,
        RuleId::FireExtinguisherCoverage,
        RuleId::EmergencyExitDistance,
        RuleId::EmergencyExitWidth,
        RuleId::FireAlarmSystem,
        RuleId::DeviceAccessibility,
        RuleId::ExitSignage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::SmokeDetectorCoverage => "rule-001",
            RuleId::HeatDetectorCoverage => "rule-002",
            RuleId::FireExtinguisherCoverage => "rule-003",
            RuleId::EmergencyExitDistance => "rule-004",
            RuleId::EmergencyExitWidth => "rule-005",
            RuleId::FireAlarmSystem => "rule-006",
            RuleId::DeviceAccessibility => "rule-007",
            RuleId::ExitSignage => "rule-008",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRule {
    pub rule_id: RuleId,
    pub title: String,
    pub description: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub requirement: String,
    pub applicable_elements: Vec<ElementType>,
}

impl ComplianceRule {
    fn define(id: RuleId) -> Self {
        use ElementType::*;

        let (title, description, category, severity, requirement, applicable) = match id {
            RuleId::SmokeDetectorCoverage => (
                "Smoke detector coverage",
                "Smoke detectors must be distributed to cover every occupied area",
                RuleCategory::Coverage,
                Severity::Critical,
                "One smoke detector per 100 m²",
                vec![SmokeDetector],
            ),
            RuleId::HeatDetectorCoverage => (
                "Heat detector coverage",
                "Heat detectors must be installed in high-risk areas",
                RuleCategory::Coverage,
                Severity::Major,
                "One heat detector per 80 m² in high-risk areas",
                vec![HeatDetector],
            ),
            RuleId::FireExtinguisherCoverage => (
                "Fire extinguisher coverage",
                "Fire extinguishers must be distributed throughout the building",
                RuleCategory::Coverage,
                Severity::Major,
                "One fire extinguisher per 200 m²",
                vec![FireExtinguisher],
            ),
            RuleId::EmergencyExitDistance => (
                "Emergency exit distance",
                "Travel distance to the nearest emergency exit must not exceed 30 m",
                RuleCategory::Distance,
                Severity::Critical,
                "Maximum 30 m to the nearest emergency exit",
                vec![EmergencyExit],
            ),
            RuleId::EmergencyExitWidth => (
                "Emergency exit width",
                "Emergency exits must be wide enough for the occupant load",
                RuleCategory::Dimensions,
                Severity::Critical,
                "Exit width of at least 90 cm",
                vec![EmergencyExit],
            ),
            RuleId::FireAlarmSystem => (
                "Fire alarm system",
                "An audible and visual fire alarm system must be present",
                RuleCategory::Coverage,
                Severity::Major,
                "Alarm system covering all areas",
                vec![FireAlarmPanel],
            ),
            RuleId::DeviceAccessibility => (
                "Protection device accessibility",
                "All protection devices must remain accessible",
                RuleCategory::Accessibility,
                Severity::Major,
                "Every device reachable for maintenance and emergencies",
                vec![SmokeDetector, HeatDetector, FireExtinguisher, FireAlarmPanel],
            ),
            RuleId::ExitSignage => (
                "Exit signage",
                "Emergency exits must carry clear signage",
                RuleCategory::Signage,
                Severity::Minor,
                "Clear, illuminated signs at every emergency exit",
                vec![EmergencyExit],
            ),
        };

        Self {
            rule_id: id,
            title: title.to_string(),
            description: description.to_string(),
            category,
            severity,
            requirement: requirement.to_string(),
            applicable_elements: applicable,
        }
    }
}

/// Immutable, ordered rule set. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<ComplianceRule>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        Self {
            rules: RuleId::ALL.iter().map(|id| ComplianceRule::define(*id)).collect(),
        }
    }

    pub fn rules(&self) -> &[ComplianceRule] {
        &self.rules
    }

    pub fn get(&self, id: RuleId) -> Option<&ComplianceRule> {
        self.rules.iter().find(|r| r.rule_id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_and_ids() {
        let catalog = RuleCatalog::new();
        let ids: Vec<_> = catalog.rules().iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["rule-001", "rule-002", "rule-003", "rule-004", "rule-005", "rule-006", "rule-007", "rule-008"]
        );
    }

    #[test]
    fn test_catalog_severities() {
        let catalog = RuleCatalog::new();
        let severity = |id| catalog.get(id).unwrap().severity;
        assert_eq!(severity(RuleId::SmokeDetectorCoverage), Severity::Critical);
        assert_eq!(severity(RuleId::HeatDetectorCoverage), Severity::Major);
        assert_eq!(severity(RuleId::EmergencyExitDistance), Severity::Critical);
        assert_eq!(severity(RuleId::EmergencyExitWidth), Severity::Critical);
        assert_eq!(severity(RuleId::ExitSignage), Severity::Minor);
    }

    #[test]
    fn test_rule_id_wire_format() {
        let json = serde_json::to_string(&RuleId::DeviceAccessibility).unwrap();
        assert_eq!(json, r#""rule-007""#);
        let parsed: RuleId = serde_json::from_str(r#""rule-004""#).unwrap();
        assert_eq!(parsed, RuleId::EmergencyExitDistance);
    }

    #[test]
    fn test_deductions() {
        assert_eq!(Severity::Critical.deduction(), 20.0);
        assert_eq!(Severity::Major.deduction(), 10.0);
        assert_eq!(Severity::Minor.deduction(), 5.0);
        assert_eq!(Severity::Info.deduction(), 0.0);
    }
}
