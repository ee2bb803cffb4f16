//! Title-block metadata recovered from extracted drawing text.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::elements::ExtractedText;

/// A label must end on a word boundary and be followed by a colon, a dot or
/// whitespace before its value.
const LABEL_SEPARATOR: &str = r"(?:\s*[:.]+\s*|\s+)";

fn labelled(english: &str, arabic: &str, value: &str) -> Regex {
    labelled_with_unit(english, arabic, value, "")
}

fn labelled_with_unit(english: &str, arabic: &str, value: &str, unit: &str) -> Regex {
    let pattern = format!(r"(?i)(?:\b(?:{})\b|{}){}({}){}", english, arabic, LABEL_SEPARATOR, value, unit);
    Regex::new(&pattern).unwrap()
}

lazy_static! {
    /// One pattern per field; the first capture group is the value.
    static ref FIELD_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("drawing_number", labelled(r"drawing\s*(?:no|number)|dwg\s*no", r"رقم\s*الرسم", r"[A-Z0-9][A-Z0-9\-]*")),
        ("drawing_title", labelled(r"drawing\s*title", r"عنوان\s*الرسم", r"[^\n|]+")),
        ("scale", labelled(r"scale", r"المقياس", r"[0-9]+\s*[:/]\s*[0-9]+")),
        ("revision", labelled(r"rev(?:ision)?", r"مراجعة", r"[A-Z0-9]+")),
        ("date", labelled(r"date", r"التاريخ", r"[0-9]{1,4}[/\-.][0-9]{1,2}[/\-.][0-9]{1,4}")),
        ("author", labelled(r"drawn\s*by", r"\bرسم", r"[^\n|]+")),
        ("checker", labelled(r"checked\s*by", r"فحص", r"[^\n|]+")),
        ("approver", labelled(r"approved\s*by", r"اعتماد", r"[^\n|]+")),
        ("project_title", labelled(r"project", r"مشروع", r"[^\n|]+")),
        ("location", labelled(r"location", r"الموقع", r"[^\n|]+")),
        ("district", labelled(r"district", r"الحي", r"[^\n|]+")),
        ("purpose", labelled(r"purpose", r"الغرض", r"[^\n|]+")),
        ("building_type", labelled(r"building\s*type", r"نوع\s*المبنى", r"[^\n|]+")),
        ("area", labelled_with_unit(r"area", r"المساحة", r"[0-9.]+", r"\s*(?:m[²2]|م[²2])")),
        ("floors", labelled(r"floors", r"الطوابق", r"[0-9]+")),
        ("occupancy", labelled(r"occupancy", r"السعة", r"[0-9]+")),
        ("fire_zone", labelled(r"fire\s*zone", r"منطقة\s*الحريق", r"[A-Z0-9]+")),
    ];

    static ref DIMENSION: Regex = Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*×\s*([0-9]+(?:\.[0-9]+)?)").unwrap();
    static ref AREA: Regex = Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*(?:m|م)[²2]").unwrap();
    static ref GRID_REFERENCE: Regex = Regex::new(r"\b[A-Z][0-9]+\b").unwrap();
    static ref ROOM_NAME: Regex = Regex::new(
        r"(?i)\b(?:room|office|hall|kitchen|bathroom|storage|corridor|stair|entrance|lobby)\b|صالة انتظار|غرفة|مكتب|صالة|مطبخ|حمام|مخزن|ممر|سلم|مدخل"
    )
    .unwrap();
}

/// Fields found in the joined text, keyed by field name.
///
/// Texts are joined with a separator that the free-text patterns stop at,
/// so a value never runs into the next text block.
pub fn extract_structured_data(texts: &[ExtractedText]) -> BTreeMap<String, String> {
    let full_text = texts.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" | ");
    let mut data = BTreeMap::new();

    for (field, pattern) in FIELD_PATTERNS.iter() {
        let value = pattern
            .captures(&full_text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty());

        if let Some(value) = value {
            data.insert(field.to_string(), value);
        }
    }

    data
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub width: f64,
    pub height: f64,
}

/// Measurements and names mentioned anywhere in the drawing text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalInfo {
    /// `W × H` annotations, in drawing order.
    pub dimensions: Vec<Dimension>,
    /// Square-meter figures, in drawing order.
    pub areas: Vec<f64>,
    pub grid_references: Vec<String>,
    pub room_names: Vec<String>,
}

impl AdditionalInfo {
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
            && self.areas.is_empty()
            && self.grid_references.is_empty()
            && self.room_names.is_empty()
    }
}

/// Grid references and room names are deduplicated and sorted.
pub fn extract_additional_info(texts: &[ExtractedText]) -> AdditionalInfo {
    let full_text = texts.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" | ");

    let dimensions = DIMENSION
        .captures_iter(&full_text)
        .filter_map(|caps| {
            let width = caps[1].parse().ok()?;
            let height = caps[2].parse().ok()?;
            Some(Dimension { width, height })
        })
        .collect();

    let areas = AREA
        .captures_iter(&full_text)
        .filter_map(|caps| caps[1].parse().ok())
        .collect();

    let grid_references: BTreeSet<_> = GRID_REFERENCE
        .find_iter(&full_text)
        .map(|m| m.as_str().to_string())
        .collect();

    let room_names: BTreeSet<_> = ROOM_NAME
        .find_iter(&full_text)
        .map(|m| m.as_str().to_lowercase())
        .collect();

    AdditionalInfo {
        dimensions,
        areas,
        grid_references: grid_references.into_iter().collect(),
        room_names: room_names.into_iter().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStatistics {
    pub total_texts: usize,
    pub average_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub average_text_length: f64,
    pub total_characters: usize,
    pub languages: Vec<String>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `None` when there is no text at all.
pub fn text_statistics(texts: &[ExtractedText]) -> Option<TextStatistics> {
    if texts.is_empty() {
        return None;
    }

    let count = texts.len() as f64;
    let confidences = texts.iter().map(|t| t.confidence);
    let min = confidences.clone().fold(f64::INFINITY, f64::min);
    let max = confidences.clone().fold(f64::NEG_INFINITY, f64::max);
    let mean = confidences.sum::<f64>() / count;

    let total_characters: usize = texts.iter().map(|t| t.text.chars().count()).sum();
    let languages: BTreeSet<_> = texts.iter().filter_map(|t| t.language.clone()).collect();

    Some(TextStatistics {
        total_texts: texts.len(),
        average_confidence: round_to(mean, 3),
        min_confidence: round_to(min, 3),
        max_confidence: round_to(max, 3),
        average_text_length: round_to(total_characters as f64 / count, 1),
        total_characters,
        languages: languages.into_iter().collect(),
    })
}
