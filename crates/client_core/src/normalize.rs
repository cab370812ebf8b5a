//! Response normalization for the prediction endpoint.
//!
//! Successive backend iterations reported the estimate under different keys.
//! The lookup below accepts all of them in a fixed order; the backend schema
//! should be pinned to `predicted_co2_emissions` so this list can shrink.

use serde_json::{Map, Value};
use shared::domain::PredictionResult;
use thiserror::Error;

/// Keys checked for the numeric estimate, first present non-null value wins.
pub const PREDICTION_KEYS: [&str; 5] = [
    "predicted_CO2",
    "predicted_co2",
    "co2_emissions",
    "predicted_CO2_Emission",
    "predicted_co2_emissions",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("response body is not valid JSON: {0}")]
    NotJson(String),
    #[error("response body is not a JSON object")]
    NotAnObject,
    #[error("none of the recognized prediction fields is present (expected one of {})", PREDICTION_KEYS.join(", "))]
    MissingPrediction,
    #[error("backend reported an error instead of a prediction: {0}")]
    BackendError(String),
    #[error("field '{field}' is not a finite number: {value}")]
    NotNumeric { field: &'static str, value: String },
}

pub fn normalize_body(bytes: &[u8]) -> Result<PredictionResult, ShapeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| ShapeError::NotJson(err.to_string()))?;
    normalize_prediction(&value)
}

pub fn normalize_prediction(body: &Value) -> Result<PredictionResult, ShapeError> {
    let object = body.as_object().ok_or(ShapeError::NotAnObject)?;

    let (field, raw) = PREDICTION_KEYS
        .iter()
        .find_map(|key| match object.get(*key) {
            None | Some(Value::Null) => None,
            Some(value) => Some((*key, value)),
        })
        .ok_or_else(|| match reported_error(object) {
            Some(message) => ShapeError::BackendError(message),
            None => ShapeError::MissingPrediction,
        })?;

    let predicted_co2_emissions = numeric(raw).ok_or_else(|| ShapeError::NotNumeric {
        field,
        value: raw.to_string(),
    })?;

    Ok(PredictionResult {
        predicted_co2_emissions,
        interpretation: text_field(object, "interpretation"),
        category: text_field(object, "category"),
        color: text_field(object, "color"),
    })
}

fn numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Older backends answer failed predictions with 2xx and `{"error": ...}`.
fn reported_error(object: &Map<String, Value>) -> Option<String> {
    text_field(object, "error").or_else(|| text_field(object, "detail"))
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
