//! Locating and decoding JSON inside free-form model output.
//!
//! Models wrap answers in markdown fences, prepend chatter or leave trailing
//! commas. Extraction is tolerant of that packaging but never of the payload
//! itself: a truncated or invalid record is an error, not a partial result.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, SchemaError};
use crate::record::ShotParameterRecord;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("valid fence regex"))
}

fn trailing_comma_regex() -> &'static Regex {
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    TRAILING.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid comma regex"))
}

/// Find the JSON payload (object or array) in `text`.
///
/// Fenced blocks win. Otherwise each bracket kind yields one span, from its
/// first opening to its last closing bracket; the earliest span that decodes
/// is taken, falling back to the earliest span so the decode error surfaces.
pub fn extract_json(text: &str) -> Option<&str> {
    for caps in fence_regex().captures_iter(text) {
        if let Some(body) = caps.get(1) {
            let body = body.as_str().trim();
            if body.starts_with('{') || body.starts_with('[') {
                return Some(body);
            }
        }
    }

    let mut spans: Vec<(usize, &str)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| {
            let start = text.find(open)?;
            let end = text.rfind(close)?;
            (end > start).then(|| (start, &text[start..=end]))
        })
        .collect();
    spans.sort_by_key(|(start, _)| *start);

    spans
        .iter()
        .find(|(_, span)| decode_lenient(span).is_ok())
        .or_else(|| spans.first())
        .map(|(_, span)| *span)
}

/// Remove trailing commas before closing brackets.
pub fn repair_json(json: &str) -> String {
    trailing_comma_regex().replace_all(json, "$1").into_owned()
}

/// Decode `json`, retrying once with trailing commas repaired.
pub fn decode_lenient(json: &str) -> Result<serde_json::Value> {
    match serde_json::from_str(json) {
        Ok(value) => Ok(value),
        Err(first) => {
            let repaired = repair_json(json);
            if repaired == json {
                return Err(first.into());
            }
            serde_json::from_str(&repaired).map_err(|_| SchemaError::Malformed(first))
        }
    }
}

/// Parse and validate one shot record from model output.
pub fn parse_record(text: &str) -> Result<ShotParameterRecord> {
    let json = extract_json(text).ok_or(SchemaError::NoJson)?;
    let value = decode_lenient(json)?;
    ShotParameterRecord::from_value(value)
}

/// Parse a batch of raw example objects from model output.
///
/// Accepts a bare array, an object wrapping an array under `examples` or
/// `data`, or a single example object. Records are not validated here.
pub fn parse_example_values(text: &str) -> Result<Vec<serde_json::Value>> {
    let json = extract_json(text).ok_or(SchemaError::NoJson)?;
    match decode_lenient(json)? {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut map) => {
            for key in ["examples", "data"] {
                if let Some(serde_json::Value::Array(items)) = map.remove(key) {
                    return Ok(items);
                }
            }
            Ok(vec![serde_json::Value::Object(map)])
        }
        _ => Err(SchemaError::NoJson),
    }
}
