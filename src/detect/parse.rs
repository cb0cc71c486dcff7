//! Parsing of free-text model replies into raw detections.

use regex::Regex;
use std::sync::OnceLock;

use super::backend::InferenceError;
use crate::detection::RawDetection;

/// First `[` through the last `]`, across lines.
pub fn extract_json_array(text: &str) -> Option<&str> {
    static JSON_ARRAY_RE: OnceLock<Regex> = OnceLock::new();
    let re = JSON_ARRAY_RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").unwrap());
    re.find(text).map(|m| m.as_str())
}

/// Parse a model reply that should contain a JSON array of detections.
///
/// Elements that are not objects are skipped. A reply with no array, or an
/// array that is not valid JSON, is `MalformedResponse`.
pub fn parse_detections(text: &str) -> Result<Vec<RawDetection>, InferenceError> {
    let array = extract_json_array(text).ok_or_else(|| {
        InferenceError::MalformedResponse(format!(
            "no JSON array in reply ({} chars)",
            text.len()
        ))
    })?;
    let items: Vec<serde_json::Value> = serde_json::from_str(array)
        .map_err(|e| InferenceError::MalformedResponse(format!("invalid JSON array: {}", e)))?;

    let mut detections = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<RawDetection>(item) {
            Ok(raw) => detections.push(raw),
            Err(e) => log::debug!("skipping detection #{} in reply: {}", index, e),
        }
    }
    Ok(detections)
}
