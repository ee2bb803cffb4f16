//! Drawing Elements - Detector and OCR Output
//!
//! Value objects produced by the external detector and text extractor.
//! Invariants are enforced at construction; nothing downstream re-checks them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Bounding box {field} must be positive and finite, got {value}")]
    NonPositiveDimension { field: &'static str, value: f64 },

    #[error("Bounding box origin must be finite")]
    NonFiniteOrigin,

    #[error("Confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),
}

/// Axis-aligned image-space region, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundingBox")]
pub struct BoundingBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Deserialize)]
struct RawBoundingBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = ModelError;

    fn try_from(raw: RawBoundingBox) -> Result<Self, Self::Error> {
        BoundingBox::new(raw.x, raw.y, raw.width, raw.height)
    }
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, ModelError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ModelError::NonFiniteOrigin);
        }
        if !(width.is_finite() && width > 0.0) {
            return Err(ModelError::NonPositiveDimension { field: "width", value: width });
        }
        if !(height.is_finite() && height > 0.0) {
            return Err(ModelError::NonPositiveDimension { field: "height", value: height });
        }
        Ok(Self { x, y, width, height })
    }

    pub fn x(&self) -> f64 { self.x }
    pub fn y(&self) -> f64 { self.y }
    pub fn width(&self) -> f64 { self.width }
    pub fn height(&self) -> f64 { self.height }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    FireAlarmPanel,
    SmokeDetector,
    HeatDetector,
    FireExtinguisher,
    EmergencyExit,
    FireHose,
    Sprinkler,
    Staircase,
    Elevator,
    Wall,
    Door,
    Window,
    Room,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::FireAlarmPanel => "fire_alarm_panel",
            ElementType::SmokeDetector => "smoke_detector",
            ElementType::HeatDetector => "heat_detector",
            ElementType::FireExtinguisher => "fire_extinguisher",
            ElementType::EmergencyExit => "emergency_exit",
            ElementType::FireHose => "fire_hose",
            ElementType::Sprinkler => "sprinkler",
            ElementType::Staircase => "staircase",
            ElementType::Elevator => "elevator",
            ElementType::Wall => "wall",
            ElementType::Door => "door",
            ElementType::Window => "window",
            ElementType::Room => "room",
        }
    }

    pub fn is_obstruction(&self) -> bool {
        matches!(self, ElementType::Wall | ElementType::Door)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_confidence(confidence: f64) -> Result<f64, ModelError> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(ModelError::ConfidenceOutOfRange(confidence))
    }
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    check_confidence(value).map_err(serde::de::Error::custom)
}

fn new_element_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedElement {
    #[serde(default = "new_element_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub name: String,
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: f64,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
}

impl DetectedElement {
    /// New element with a generated id and no tags.
    pub fn new(
        element_type: ElementType,
        name: impl Into<String>,
        confidence: f64,
        bounding_box: BoundingBox,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            id: new_element_id(),
            element_type,
            name: name.into(),
            confidence: check_confidence(confidence)?,
            bounding_box,
            properties: BTreeMap::new(),
            location: None,
            zone: None,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn is(&self, element_type: ElementType) -> bool {
        self.element_type == element_type
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: f64,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub language: Option<String>,
}

impl ExtractedText {
    pub fn new(
        text: impl Into<String>,
        confidence: f64,
        bounding_box: BoundingBox,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            text: text.into(),
            confidence: check_confidence(confidence)?,
            bounding_box,
            language: None,
        })
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}
