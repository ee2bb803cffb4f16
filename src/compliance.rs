//! Compliance Engine - Rule Evaluation and Scoring
//!
//! Every catalog rule is evaluated independently, in catalog order.
//! A rule that fails internally is logged and yields no issues;
//! it never stops the remaining rules.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::elements::{DetectedElement, ElementType, ExtractedText};
use crate::geometry::{self, ScaleFactor};
use crate::rules::{ComplianceRule, RuleCatalog, RuleId, Severity};

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static RULE_EVALUATION_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_rule_evaluation_count() -> u32 {
    RULE_EVALUATION_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_rule_evaluation_count() {
    RULE_EVALUATION_COUNT.store(0, Ordering::SeqCst);
}

pub const SMOKE_DETECTOR_AREA_M2: f64 = 100.0;
pub const FIRE_EXTINGUISHER_AREA_M2: f64 = 200.0;
pub const MAX_EXIT_DISTANCE_M: f64 = 30.0;
pub const MIN_EXIT_WIDTH_M: f64 = 0.9;
/// Share of the image assumed to be floor area when no rooms are detected.
pub const UNROOMED_FLOOR_SHARE: f64 = 0.7;
pub const ACCESSIBILITY_RADIUS_PX: f64 = 100.0;
pub const MAX_OBSTRUCTIONS: usize = 2;

/// Devices that must stay reachable, in the order their issues are reported.
const PROTECTED_DEVICE_ORDER: [ElementType; 4] = [
    ElementType::SmokeDetector,
    ElementType::HeatDetector,
    ElementType::FireExtinguisher,
    ElementType::FireAlarmPanel,
];
pub const SIGNAGE_RADIUS_PX: f64 = 50.0;

pub const HIGH_RISK_KEYWORDS: &[&str] = &[
    "مطبخ",
    "kitchen",
    "مخزن",
    "storage",
    "ميكانيكي",
    "mechanical",
    "كهربائي",
    "electrical",
    "ورشة",
    "workshop",
];

pub const EXIT_SIGN_KEYWORDS: &[&str] = &["خروج", "exit", "طوارئ", "emergency", "مخرج"];

#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("Scale factor must be positive and finite, got {0}")]
    InvalidScale(f64),

    #[error("Non-finite {what}: {value}")]
    NonFiniteMeasurement { what: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    NeedsAttention,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub id: String,
    pub rule_id: RuleId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: ComplianceStatus,
    pub evidence: Vec<String>,
    pub suggested_fix: String,
    pub affected_elements: Vec<String>,
    pub impact_score: f64,
}

impl ComplianceIssue {
    fn for_rule(rule: &ComplianceRule, status: ComplianceStatus, description: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.rule_id,
            title: rule.title.clone(),
            description,
            severity: rule.severity,
            status,
            evidence: vec![],
            suggested_fix: String::new(),
            affected_elements: vec![],
            impact_score: 0.0,
        }
    }

    fn evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    fn fix(mut self, suggested_fix: impl Into<String>) -> Self {
        self.suggested_fix = suggested_fix.into();
        self
    }

    fn affecting(mut self, ids: Vec<String>) -> Self {
        self.affected_elements = ids;
        self
    }

    fn impact(mut self, score: f64) -> Self {
        self.impact_score = score.clamp(0.0, 10.0);
        self
    }

    /// Issue content without its generated id, for comparing evaluations.
    pub fn finding(&self) -> (RuleId, &str, Severity, ComplianceStatus, &[String], &[String]) {
        (
            self.rule_id,
            self.description.as_str(),
            self.severity,
            self.status,
            self.evidence.as_slice(),
            self.affected_elements.as_slice(),
        )
    }
}

/// Issues plus the scale they were measured at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceOutcome {
    pub issues: Vec<ComplianceIssue>,
    pub score: f64,
    pub scale: ScaleFactor,
}

/// Inputs shared by every rule for one `evaluate` call.
struct Drawing<'a> {
    elements: &'a [DetectedElement],
    texts: &'a [ExtractedText],
    image_dimensions: (u32, u32),
    scale: ScaleFactor,
}

impl<'a> Drawing<'a> {
    fn of_type(&self, element_type: ElementType) -> Vec<&'a DetectedElement> {
        self.elements.iter().filter(|e| e.is(element_type)).collect()
    }

    fn meters_per_pixel(&self) -> Result<f64, RuleError> {
        let mpp = self.scale.meters_per_pixel;
        if mpp.is_finite() && mpp > 0.0 {
            Ok(mpp)
        } else {
            Err(RuleError::InvalidScale(mpp))
        }
    }

    /// Floor area in m²: sum of rooms, or a share of the whole image.
    fn total_area_m2(&self) -> Result<f64, RuleError> {
        let rooms = self.of_type(ElementType::Room);
        let area_px = if rooms.is_empty() {
            let (w, h) = self.image_dimensions;
            w as f64 * h as f64 * UNROOMED_FLOOR_SHARE
        } else {
            rooms.iter().map(|r| geometry::area(&r.bounding_box)).sum()
        };

        let mpp = self.meters_per_pixel()?;
        finite("total area", area_px * mpp * mpp)
    }
}

fn finite(what: &'static str, value: f64) -> Result<f64, RuleError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RuleError::NonFiniteMeasurement { what, value })
    }
}

fn ids(elements: &[&DetectedElement]) -> Vec<String> {
    elements.iter().map(|e| e.id.clone()).collect()
}

/// The compliance engine - evaluates the fixed catalog against one drawing
pub struct ComplianceEngine {
    catalog: RuleCatalog,
}

impl ComplianceEngine {
    pub fn new() -> Self {
        Self::with_catalog(RuleCatalog::new())
    }

    pub fn with_catalog(catalog: RuleCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Evaluate all rules. Without an explicit scale, one is inferred from
    /// `texts` for this call only.
    pub fn evaluate(
        &self,
        elements: &[DetectedElement],
        texts: &[ExtractedText],
        image_dimensions: (u32, u32),
        scale_factor: Option<f64>,
    ) -> Vec<ComplianceIssue> {
        self.assess(elements, texts, image_dimensions, scale_factor).issues
    }

    /// `evaluate` plus score and the scale actually used.
    pub fn assess(
        &self,
        elements: &[DetectedElement],
        texts: &[ExtractedText],
        image_dimensions: (u32, u32),
        scale_factor: Option<f64>,
    ) -> ComplianceOutcome {
        let scale = match scale_factor {
            Some(mpp) => ScaleFactor::explicit(mpp),
            None => geometry::infer_scale_factor(texts),
        };

        let drawing = Drawing { elements, texts, image_dimensions, scale };
        let mut issues = vec![];

        for rule in self.catalog.rules() {
            #[cfg(feature = "test-hooks")]
            RULE_EVALUATION_COUNT.fetch_add(1, Ordering::SeqCst);

            match evaluate_rule(rule, &drawing) {
                Ok(found) => {
                    tracing::debug!(rule = %rule.rule_id, issues = found.len(), "Rule evaluated");
                    issues.extend(found);
                }
                Err(e) => {
                    tracing::error!(rule = %rule.rule_id, error = %e, "Rule evaluation failed");
                }
            }
        }

        tracing::info!(
            rules = self.catalog.len(),
            issues = issues.len(),
            meters_per_pixel = scale.meters_per_pixel,
            "Compliance evaluation finished"
        );

        let score = compliance_score(&issues);
        ComplianceOutcome { issues, score, scale }
    }

    pub fn score(&self, issues: &[ComplianceIssue]) -> f64 {
        compliance_score(issues)
    }
}

impl Default for ComplianceEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 100 minus severity deductions, clamped to [0, 100], one decimal.
pub fn compliance_score(issues: &[ComplianceIssue]) -> f64 {
    if issues.is_empty() {
        return 100.0;
    }

    let deduction: f64 = issues.iter().map(|i| i.severity.deduction()).sum();
    let score = (100.0 - deduction).clamp(0.0, 100.0);
    (score * 10.0).round() / 10.0
}

fn evaluate_rule(rule: &ComplianceRule, drawing: &Drawing<'_>) -> Result<Vec<ComplianceIssue>, RuleError> {
    match rule.rule_id {
        RuleId::SmokeDetectorCoverage => check_device_coverage(
            rule,
            drawing,
            DeviceCoverage {
                device: ElementType::SmokeDetector,
                label: "smoke detector",
                area_per_device: SMOKE_DETECTOR_AREA_M2,
                missing_impact: 9.0,
                shortfall_impact: 8.5,
            },
        ),
        RuleId::HeatDetectorCoverage => check_heat_detectors(rule, drawing),
        RuleId::FireExtinguisherCoverage => check_device_coverage(
            rule,
            drawing,
            DeviceCoverage {
                device: ElementType::FireExtinguisher,
                label: "fire extinguisher",
                area_per_device: FIRE_EXTINGUISHER_AREA_M2,
                missing_impact: 8.0,
                shortfall_impact: 7.0,
            },
        ),
        RuleId::EmergencyExitDistance => check_exit_distance(rule, drawing),
        RuleId::EmergencyExitWidth => check_exit_width(rule, drawing),
        RuleId::FireAlarmSystem => check_alarm_system(rule, drawing),
        RuleId::DeviceAccessibility => check_accessibility(rule, drawing),
        RuleId::ExitSignage => check_signage(rule, drawing),
    }
}

struct DeviceCoverage {
    device: ElementType,
    label: &'static str,
    area_per_device: f64,
    missing_impact: f64,
    shortfall_impact: f64,
}

fn check_device_coverage(
    rule: &ComplianceRule,
    drawing: &Drawing<'_>,
    spec: DeviceCoverage,
) -> Result<Vec<ComplianceIssue>, RuleError> {
    let devices = drawing.of_type(spec.device);

    if devices.is_empty() {
        return Ok(vec![ComplianceIssue::for_rule(
            rule,
            ComplianceStatus::NonCompliant,
            format!("No {}s found in the drawing", spec.label),
        )
        .evidence(vec![format!("No {} was detected", spec.label)])
        .fix(format!(
            "Add {}s according to floor area (one per {} m²)",
            spec.label, spec.area_per_device
        ))
        .impact(spec.missing_impact)]);
    }

    let total_area = drawing.total_area_m2()?;
    let required = (total_area / spec.area_per_device).ceil() as usize;
    let actual = devices.len();

    if actual >= required {
        return Ok(vec![]);
    }

    let shortfall = required - actual;
    Ok(vec![ComplianceIssue::for_rule(
        rule,
        ComplianceStatus::NonCompliant,
        format!("Insufficient number of {}s", spec.label),
    )
    .evidence(vec![
        format!("Total area: {:.1} m²", total_area),
        format!("Required: {}", required),
        format!("Found: {}", actual),
        format!("Shortfall: {}", shortfall),
    ])
    .fix(format!("Add {} more {}(s)", shortfall, spec.label))
    .affecting(ids(&devices))
    .impact(spec.shortfall_impact)])
}

fn is_high_risk_room(room: &DetectedElement) -> bool {
    let name = room.name.to_lowercase();
    HIGH_RISK_KEYWORDS.iter().any(|k| name.contains(k))
}

fn check_heat_detectors(rule: &ComplianceRule, drawing: &Drawing<'_>) -> Result<Vec<ComplianceIssue>, RuleError> {
    let high_risk: Vec<_> = drawing
        .of_type(ElementType::Room)
        .into_iter()
        .filter(|r| is_high_risk_room(r))
        .collect();

    if high_risk.is_empty() || !drawing.of_type(ElementType::HeatDetector).is_empty() {
        return Ok(vec![]);
    }

    Ok(vec![ComplianceIssue::for_rule(
        rule,
        ComplianceStatus::NonCompliant,
        "No heat detectors in high-risk areas".to_string(),
    )
    .evidence(vec![format!(
        "{} high-risk area(s) without heat detectors",
        high_risk.len()
    )])
    .fix("Install heat detectors in kitchens, storage, mechanical and electrical rooms")
    .affecting(ids(&high_risk))
    .impact(7.5)])
}

fn check_exit_distance(rule: &ComplianceRule, drawing: &Drawing<'_>) -> Result<Vec<ComplianceIssue>, RuleError> {
    let exits = drawing.of_type(ElementType::EmergencyExit);

    if exits.is_empty() {
        return Ok(vec![ComplianceIssue::for_rule(
            rule,
            ComplianceStatus::NonCompliant,
            "No emergency exits found in the drawing".to_string(),
        )
        .evidence(vec!["No emergency exit was detected".to_string()])
        .fix("Add emergency exits according to floor area and occupant load")
        .impact(9.5)]);
    }

    let mut issues = vec![];
    for room in drawing.of_type(ElementType::Room) {
        let nearest = exits
            .iter()
            .map(|exit| (geometry::center_distance(&room.bounding_box, &exit.bounding_box), *exit))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let Some((distance_px, exit)) = nearest else {
            continue;
        };

        let distance_m = finite("exit distance", distance_px * drawing.meters_per_pixel()?)?;
        if distance_m <= MAX_EXIT_DISTANCE_M {
            continue;
        }

        issues.push(
            ComplianceIssue::for_rule(
                rule,
                ComplianceStatus::NonCompliant,
                format!("Emergency exit too far from {}", room.name),
            )
            .evidence(vec![
                format!("Current distance: {:.1} m", distance_m),
                format!("Maximum allowed: {} m", MAX_EXIT_DISTANCE_M),
                format!("Nearest exit: {}", exit.name),
            ])
            .fix("Add an emergency exit or shorten the travel distance")
            .affecting(vec![room.id.clone(), exit.id.clone()])
            .impact(9.0),
        );
    }

    Ok(issues)
}

fn check_exit_width(rule: &ComplianceRule, drawing: &Drawing<'_>) -> Result<Vec<ComplianceIssue>, RuleError> {
    let mut issues = vec![];

    for exit in drawing.of_type(ElementType::EmergencyExit) {
        let width_m = finite("exit width", exit.bounding_box.width() * drawing.meters_per_pixel()?)?;
        if width_m >= MIN_EXIT_WIDTH_M {
            continue;
        }

        issues.push(
            ComplianceIssue::for_rule(
                rule,
                ComplianceStatus::NonCompliant,
                format!("Emergency exit {} is too narrow", exit.name),
            )
            .evidence(vec![
                format!("Current width: {:.2} m", width_m),
                format!("Minimum required: {} m", MIN_EXIT_WIDTH_M),
            ])
            .fix("Widen the emergency exit to at least 90 cm")
            .affecting(vec![exit.id.clone()])
            .impact(8.5),
        );
    }

    Ok(issues)
}

fn check_alarm_system(rule: &ComplianceRule, drawing: &Drawing<'_>) -> Result<Vec<ComplianceIssue>, RuleError> {
    if !drawing.of_type(ElementType::FireAlarmPanel).is_empty() {
        return Ok(vec![]);
    }

    Ok(vec![ComplianceIssue::for_rule(
        rule,
        ComplianceStatus::NonCompliant,
        "No fire alarm system".to_string(),
    )
    .evidence(vec!["No fire alarm control panel was detected".to_string()])
    .fix("Install a fire alarm system with a main control panel")
    .impact(8.0)])
}

fn check_accessibility(rule: &ComplianceRule, drawing: &Drawing<'_>) -> Result<Vec<ComplianceIssue>, RuleError> {
    let mut issues = vec![];

    let devices = PROTECTED_DEVICE_ORDER.iter().flat_map(|t| drawing.of_type(*t));

    for device in devices {
        let obstructions = geometry::elements_near(device, drawing.elements, ACCESSIBILITY_RADIUS_PX)
            .into_iter()
            .filter(|e| e.element_type.is_obstruction())
            .count();

        if obstructions <= MAX_OBSTRUCTIONS {
            continue;
        }

        issues.push(
            ComplianceIssue::for_rule(
                rule,
                ComplianceStatus::NeedsAttention,
                format!("{} is hard to reach", device.name),
            )
            .evidence(vec![format!(
                "Device is surrounded by {} walls or doors",
                obstructions
            )])
            .fix("Relocate the device so it stays accessible")
            .affecting(vec![device.id.clone()])
            .impact(6.0),
        );
    }

    Ok(issues)
}

fn has_exit_sign(texts: &[&ExtractedText]) -> bool {
    texts.iter().any(|t| {
        let lower = t.text.to_lowercase();
        EXIT_SIGN_KEYWORDS.iter().any(|k| lower.contains(k))
    })
}

fn check_signage(rule: &ComplianceRule, drawing: &Drawing<'_>) -> Result<Vec<ComplianceIssue>, RuleError> {
    let mut issues = vec![];

    for exit in drawing.of_type(ElementType::EmergencyExit) {
        let nearby = geometry::texts_near(exit, drawing.texts, SIGNAGE_RADIUS_PX);
        if has_exit_sign(&nearby) {
            continue;
        }

        issues.push(
            ComplianceIssue::for_rule(
                rule,
                ComplianceStatus::NeedsAttention,
                format!("No clear sign for emergency exit {}", exit.name),
            )
            .evidence(vec!["No exit sign or marking found near the exit".to_string()])
            .fix("Add a clear, illuminated exit sign")
            .affecting(vec![exit.id.clone()])
            .impact(5.0),
        );
    }

    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::BoundingBox;

    fn element(kind: ElementType, name: &str, x: f64, y: f64, w: f64, h: f64) -> DetectedElement {
        DetectedElement::new(kind, name, 0.9, BoundingBox::new(x, y, w, h).unwrap()).unwrap()
    }

    fn text_at(s: &str, x: f64, y: f64) -> ExtractedText {
        ExtractedText::new(s, 0.9, BoundingBox::new(x, y, 20.0, 10.0).unwrap()).unwrap()
    }

    fn issues_for(issues: &[ComplianceIssue], id: RuleId) -> Vec<&ComplianceIssue> {
        issues.iter().filter(|i| i.rule_id == id).collect()
    }

    #[test]
    fn test_score_empty_is_100() {
        assert_eq!(compliance_score(&[]), 100.0);
    }

    #[test]
    fn test_score_deductions_and_clamp() {
        let engine = ComplianceEngine::new();
        // Empty drawing: smoke, extinguisher, exits, alarm.
        let issues = engine.evaluate(&[], &[], (1000, 1000), None);
        let expected = 100.0 - 20.0 - 10.0 - 20.0 - 10.0;
        assert_eq!(compliance_score(&issues), expected);

        let mut many = issues.clone();
        for _ in 0..5 {
            many.extend(issues.clone());
        }
        assert_eq!(compliance_score(&many), 0.0);
    }

    #[test]
    fn test_zero_smoke_detectors() {
        let engine = ComplianceEngine::new();
        let issues = engine.evaluate(&[], &[], (800, 600), None);
        let smoke = issues_for(&issues, RuleId::SmokeDetectorCoverage);
        assert_eq!(smoke.len(), 1);
        assert_eq!(smoke[0].status, ComplianceStatus::NonCompliant);
        assert_eq!(smoke[0].severity, Severity::Critical);
    }

    #[test]
    fn test_smoke_detector_shortfall() {
        let engine = ComplianceEngine::new();
        // 2000x2000 px room at 0.01 m/px = 400 m² -> 4 detectors required.
        let elements = vec![
            element(ElementType::Room, "Hall", 0.0, 0.0, 2000.0, 2000.0),
            element(ElementType::SmokeDetector, "SD-1", 100.0, 100.0, 10.0, 10.0),
        ];
        let issues = engine.evaluate(&elements, &[], (4000, 4000), None);
        let smoke = issues_for(&issues, RuleId::SmokeDetectorCoverage);
        assert_eq!(smoke.len(), 1);
        assert!(smoke[0].evidence.contains(&"Required: 4".to_string()));
        assert!(smoke[0].evidence.contains(&"Shortfall: 3".to_string()));
        assert_eq!(smoke[0].affected_elements.len(), 1);
    }

    #[test]
    fn test_area_estimated_from_image_without_rooms() {
        let engine = ComplianceEngine::new();
        // 2000x1000 px * 0.7 * 0.0001 = 140 m² -> 2 detectors, 1 extinguisher.
        let elements = vec![
            element(ElementType::SmokeDetector, "SD-1", 0.0, 0.0, 10.0, 10.0),
            element(ElementType::FireExtinguisher, "FE-1", 500.0, 0.0, 10.0, 10.0),
        ];
        let issues = engine.evaluate(&elements, &[], (2000, 1000), None);
        assert_eq!(issues_for(&issues, RuleId::SmokeDetectorCoverage).len(), 1);
        assert!(issues_for(&issues, RuleId::FireExtinguisherCoverage).is_empty());
    }

    #[test]
    fn test_heat_detector_in_kitchen() {
        let engine = ComplianceEngine::new();
        let elements = vec![element(ElementType::Room, "Main Kitchen", 0.0, 0.0, 100.0, 100.0)];
        let issues = engine.evaluate(&elements, &[], (1000, 1000), None);
        let heat = issues_for(&issues, RuleId::HeatDetectorCoverage);
        assert_eq!(heat.len(), 1);
        assert_eq!(heat[0].severity, Severity::Major);

        let arabic = vec![element(ElementType::Room, "مطبخ", 0.0, 0.0, 100.0, 100.0)];
        let issues = engine.evaluate(&arabic, &[], (1000, 1000), None);
        assert_eq!(issues_for(&issues, RuleId::HeatDetectorCoverage).len(), 1);

        let office = vec![element(ElementType::Room, "Office", 0.0, 0.0, 100.0, 100.0)];
        let issues = engine.evaluate(&office, &[], (1000, 1000), None);
        assert!(issues_for(&issues, RuleId::HeatDetectorCoverage).is_empty());
    }

    #[test]
    fn test_no_exits_short_circuits_distance() {
        let engine = ComplianceEngine::new();
        let elements = vec![
            element(ElementType::Room, "A", 0.0, 0.0, 100.0, 100.0),
            element(ElementType::Room, "B", 5000.0, 0.0, 100.0, 100.0),
        ];
        let issues = engine.evaluate(&elements, &[], (10000, 1000), None);
        let distance = issues_for(&issues, RuleId::EmergencyExitDistance);
        assert_eq!(distance.len(), 1);
        assert!(distance[0].affected_elements.is_empty());
    }

    #[test]
    fn test_exit_distance_names_room_and_exit() {
        let engine = ComplianceEngine::new();
        // Centers 4000 px apart at 0.01 m/px = 40 m.
        let elements = vec![
            element(ElementType::Room, "Archive", 0.0, 0.0, 100.0, 100.0),
            element(ElementType::EmergencyExit, "North Exit", 4000.0, 0.0, 100.0, 100.0),
        ];
        let issues = engine.evaluate(&elements, &[], (5000, 1000), None);
        let distance = issues_for(&issues, RuleId::EmergencyExitDistance);
        assert_eq!(distance.len(), 1);
        assert_eq!(distance[0].severity, Severity::Critical);
        assert!(distance[0].description.contains("Archive"));
        assert!(distance[0].evidence.iter().any(|e| e.contains("North Exit")));
    }

    #[test]
    fn test_exit_distance_uses_nearest_exit() {
        let engine = ComplianceEngine::new();
        let elements = vec![
            element(ElementType::Room, "Archive", 0.0, 0.0, 100.0, 100.0),
            element(ElementType::EmergencyExit, "Far", 9000.0, 0.0, 100.0, 100.0),
            element(ElementType::EmergencyExit, "Near", 1000.0, 0.0, 100.0, 100.0),
        ];
        let issues = engine.evaluate(&elements, &[], (10000, 1000), None);
        assert!(issues_for(&issues, RuleId::EmergencyExitDistance).is_empty());
    }

    #[test]
    fn test_exit_width() {
        let engine = ComplianceEngine::new();
        // 80 px * 0.01 = 0.8 m (too narrow), 120 px = 1.2 m.
        let elements = vec![
            element(ElementType::EmergencyExit, "Narrow", 0.0, 0.0, 80.0, 20.0),
            element(ElementType::EmergencyExit, "Wide", 500.0, 0.0, 120.0, 20.0),
        ];
        let issues = engine.evaluate(&elements, &[], (1000, 1000), None);
        let width = issues_for(&issues, RuleId::EmergencyExitWidth);
        assert_eq!(width.len(), 1);
        assert!(width[0].description.contains("Narrow"));
    }

    #[test]
    fn test_accessibility_needs_attention() {
        let engine = ComplianceEngine::new();
        let mut elements = vec![element(ElementType::FireExtinguisher, "FE-1", 100.0, 100.0, 10.0, 10.0)];
        for i in 0..3 {
            elements.push(element(ElementType::Wall, "W", 100.0 + i as f64 * 20.0, 130.0, 10.0, 10.0));
        }
        let issues = engine.evaluate(&elements, &[], (1000, 1000), None);
        let access = issues_for(&issues, RuleId::DeviceAccessibility);
        assert_eq!(access.len(), 1);
        assert_eq!(access[0].status, ComplianceStatus::NeedsAttention);
        assert_eq!(access[0].severity, Severity::Major);

        elements.pop();
        let issues = engine.evaluate(&elements, &[], (1000, 1000), None);
        assert!(issues_for(&issues, RuleId::DeviceAccessibility).is_empty());
    }

    #[test]
    fn test_accessibility_issues_ordered_by_device_type() {
        let engine = ComplianceEngine::new();
        let mut elements = vec![
            element(ElementType::FireAlarmPanel, "FAP-1", 500.0, 500.0, 10.0, 10.0),
            element(ElementType::FireExtinguisher, "FE-1", 800.0, 100.0, 10.0, 10.0),
            element(ElementType::SmokeDetector, "SD-1", 100.0, 100.0, 10.0, 10.0),
        ];
        for (x, y) in [(500.0, 500.0), (100.0, 100.0), (800.0, 100.0)] {
            for i in 0..3 {
                elements.push(element(ElementType::Wall, "W", x + i as f64 * 20.0, y + 30.0, 10.0, 10.0));
            }
        }

        let issues = engine.evaluate(&elements, &[], (1000, 1000), None);
        let names: Vec<_> = issues_for(&issues, RuleId::DeviceAccessibility)
            .iter()
            .map(|i| i.description.clone())
            .collect();
        assert_eq!(
            names,
            vec!["SD-1 is hard to reach", "FE-1 is hard to reach", "FAP-1 is hard to reach"]
        );
    }

    #[test]
    fn test_signage_keyword_near_exit() {
        let engine = ComplianceEngine::new();
        let elements = vec![element(ElementType::EmergencyExit, "E1", 0.0, 0.0, 100.0, 20.0)];

        let signed = vec![text_at("EXIT", 40.0, 5.0)];
        let issues = engine.evaluate(&elements, &signed, (1000, 1000), None);
        assert!(issues_for(&issues, RuleId::ExitSignage).is_empty());

        let arabic = vec![text_at("مخرج طوارئ", 40.0, 5.0)];
        let issues = engine.evaluate(&elements, &arabic, (1000, 1000), None);
        assert!(issues_for(&issues, RuleId::ExitSignage).is_empty());

        let far = vec![text_at("EXIT", 800.0, 800.0)];
        let issues = engine.evaluate(&elements, &far, (1000, 1000), None);
        let signage = issues_for(&issues, RuleId::ExitSignage);
        assert_eq!(signage.len(), 1);
        assert_eq!(signage[0].severity, Severity::Minor);
        assert_eq!(signage[0].status, ComplianceStatus::NeedsAttention);
    }

    #[test]
    fn test_invalid_scale_skips_only_scaled_rules() {
        let engine = ComplianceEngine::new();
        let elements = vec![
            element(ElementType::SmokeDetector, "SD", 0.0, 0.0, 10.0, 10.0),
            element(ElementType::EmergencyExit, "E1", 500.0, 0.0, 10.0, 10.0),
        ];
        let issues = engine.evaluate(&elements, &[], (1000, 1000), Some(f64::NAN));

        // Width and coverage need the scale and are dropped; alarm and signage still report.
        assert!(issues_for(&issues, RuleId::EmergencyExitWidth).is_empty());
        assert!(issues_for(&issues, RuleId::SmokeDetectorCoverage).is_empty());
        assert_eq!(issues_for(&issues, RuleId::FireAlarmSystem).len(), 1);
        assert_eq!(issues_for(&issues, RuleId::ExitSignage).len(), 1);
    }

    #[test]
    fn test_evaluate_idempotent() {
        let engine = ComplianceEngine::new();
        let elements = vec![
            element(ElementType::Room, "Storage", 0.0, 0.0, 3000.0, 3000.0),
            element(ElementType::EmergencyExit, "E1", 6000.0, 0.0, 50.0, 20.0),
        ];
        let texts = vec![text_at("1:100", 0.0, 0.0)];
        let a = engine.assess(&elements, &texts, (8000, 4000), None);
        let b = engine.assess(&elements, &texts, (8000, 4000), None);

        let fa: Vec<_> = a.issues.iter().map(|i| i.finding()).collect();
        let fb: Vec<_> = b.issues.iter().map(|i| i.finding()).collect();
        assert_eq!(fa, fb);
        assert_eq!(a.score, b.score);
    }

    #[test]
    fn test_declared_scale_is_used() {
        let engine = ComplianceEngine::new();
        let outcome = engine.assess(&[], &[text_at("Plan 1:100", 0.0, 0.0)], (100, 100), None);
        assert_ne!(outcome.scale.meters_per_pixel, crate::geometry::DEFAULT_METERS_PER_PIXEL);

        let outcome = engine.assess(&[], &[], (100, 100), None);
        assert_eq!(outcome.scale.meters_per_pixel, crate::geometry::DEFAULT_METERS_PER_PIXEL);
    }
}
