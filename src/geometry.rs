//! Geometry - Distances, Areas, Drawing Scale
//!
//! All distances are between bounding-box centers in pixel space.
//! Conversion to meters goes through a single meters-per-pixel factor.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::elements::{BoundingBox, DetectedElement, ExtractedText};

/// Fallback when no scale is declared: 1 pixel = 1 cm.
pub const DEFAULT_METERS_PER_PIXEL: f64 = 0.01;

/// Policy constant mapping a declared drawing ratio to meters per pixel.
pub const SCALE_RATIO_DIVISOR: f64 = 1000.0;

lazy_static! {
    // Order matters: the first pattern that matches a text wins.
    static ref SCALE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?:مقياس|scale)[:\s]*([0-9]+)\s*:\s*([0-9]+)").unwrap(),
        Regex::new(r"1\s*:\s*([0-9]+)").unwrap(),
        Regex::new(r"([0-9]+)\s*:\s*1").unwrap(),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleSource {
    /// Supplied by the caller.
    Explicit,
    /// Parsed from a scale declaration in the drawing text.
    Declared,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor {
    pub meters_per_pixel: f64,
    pub source: ScaleSource,
}

impl ScaleFactor {
    pub fn explicit(meters_per_pixel: f64) -> Self {
        Self { meters_per_pixel, source: ScaleSource::Explicit }
    }

    pub fn default_scale() -> Self {
        Self { meters_per_pixel: DEFAULT_METERS_PER_PIXEL, source: ScaleSource::Default }
    }

    pub fn to_meters(&self, pixels: f64) -> f64 {
        pixels * self.meters_per_pixel
    }

    pub fn to_square_meters(&self, square_pixels: f64) -> f64 {
        square_pixels * self.meters_per_pixel * self.meters_per_pixel
    }
}

/// Scan texts in order for a scale declaration.
pub fn infer_scale_factor(texts: &[ExtractedText]) -> ScaleFactor {
    for text in texts {
        if let Some(meters_per_pixel) = parse_scale_declaration(&text.text) {
            return ScaleFactor { meters_per_pixel, source: ScaleSource::Declared };
        }
    }
    tracing::warn!(
        texts = texts.len(),
        default = DEFAULT_METERS_PER_PIXEL,
        "No scale declaration found, using default scale"
    );
    ScaleFactor::default_scale()
}

/// Meters per pixel for one text, if it declares a usable scale.
pub fn parse_scale_declaration(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();

    for pattern in SCALE_PATTERNS.iter() {
        let Some(caps) = pattern.captures(&lower) else {
            continue;
        };

        let ratio = match (caps.get(1), caps.get(2)) {
            (Some(a), Some(b)) => {
                let num: f64 = a.as_str().parse().ok()?;
                let den: f64 = b.as_str().parse().ok()?;
                num / den
            }
            (Some(n), None) => n.as_str().parse().ok()?,
            _ => continue,
        };

        let meters_per_pixel = ratio / SCALE_RATIO_DIVISOR;
        if meters_per_pixel.is_finite() && meters_per_pixel > 0.0 {
            return Some(meters_per_pixel);
        }
    }

    None
}

pub fn center_distance(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt()
}

pub fn area(bbox: &BoundingBox) -> f64 {
    bbox.width() * bbox.height()
}

/// Other elements whose centers lie within `max_distance` pixels of `target`.
pub fn elements_near<'a>(
    target: &DetectedElement,
    elements: &'a [DetectedElement],
    max_distance: f64,
) -> Vec<&'a DetectedElement> {
    elements
        .iter()
        .filter(|e| e.id != target.id)
        .filter(|e| center_distance(&target.bounding_box, &e.bounding_box) <= max_distance)
        .collect()
}

pub fn texts_near<'a>(
    target: &DetectedElement,
    texts: &'a [ExtractedText],
    max_distance: f64,
) -> Vec<&'a ExtractedText> {
    texts
        .iter()
        .filter(|t| center_distance(&target.bounding_box, &t.bounding_box) <= max_distance)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::ElementType;

    fn bbox(x: f64, y: f64, w: f64, h: f64) -> BoundingBox {
        BoundingBox::new(x, y, w, h).unwrap()
    }

    fn text(s: &str) -> ExtractedText {
        ExtractedText::new(s, 0.9, bbox(0.0, 0.0, 10.0, 10.0)).unwrap()
    }

    #[test]
    fn test_center_distance() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(30.0, 40.0, 10.0, 10.0);
        assert_eq!(center_distance(&a, &b), 50.0);
        assert_eq!(center_distance(&a, &a), 0.0);
    }

    #[test]
    fn test_area() {
        assert_eq!(area(&bbox(5.0, 5.0, 4.0, 2.5)), 10.0);
    }

    #[test]
    fn test_scale_bare_ratio() {
        assert_eq!(parse_scale_declaration("1:100"), Some(0.1));
        assert_eq!(parse_scale_declaration("Plan 1 : 50"), Some(0.05));
        assert_eq!(parse_scale_declaration("200:1"), Some(0.2));
    }

    #[test]
    fn test_scale_labelled_ratio() {
        let declared = parse_scale_declaration("SCALE: 1:100").unwrap();
        assert!((declared - 0.00001).abs() < 1e-12);
        let arabic = parse_scale_declaration("مقياس 1:50").unwrap();
        assert!((arabic - 0.00002).abs() < 1e-12);
    }

    #[test]
    fn test_scale_rejects_zero_ratio() {
        assert_eq!(parse_scale_declaration("1:0"), None);
        assert_eq!(parse_scale_declaration("no ratio here"), None);
    }

    #[test]
    fn test_infer_first_declaration_wins() {
        let texts = vec![text("Ground floor"), text("1:200"), text("1:50")];
        let scale = infer_scale_factor(&texts);
        assert_eq!(scale.source, ScaleSource::Declared);
        assert_eq!(scale.meters_per_pixel, 0.2);
    }

    #[test]
    fn test_infer_falls_back_to_default() {
        let scale = infer_scale_factor(&[text("Kitchen")]);
        assert_eq!(scale, ScaleFactor::default_scale());
        assert_eq!(scale.meters_per_pixel, DEFAULT_METERS_PER_PIXEL);
    }

    #[test]
    fn test_conversions() {
        let scale = ScaleFactor::default_scale();
        assert!((scale.to_meters(3000.0) - 30.0).abs() < 1e-9);
        assert!((scale.to_square_meters(1_000_000.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_elements_near_excludes_self() {
        let device = DetectedElement::new(ElementType::SmokeDetector, "SD", 0.9, bbox(0.0, 0.0, 10.0, 10.0))
            .unwrap();
        let wall = DetectedElement::new(ElementType::Wall, "W", 0.9, bbox(50.0, 0.0, 10.0, 10.0)).unwrap();
        let far = DetectedElement::new(ElementType::Wall, "W2", 0.9, bbox(500.0, 0.0, 10.0, 10.0)).unwrap();
        let all = vec![device.clone(), wall, far];

        let near = elements_near(&device, &all, 100.0);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].name, "W");
    }
}
