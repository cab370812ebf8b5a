use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identity of one submission attempt. A settled response is only applied
/// while its id is still the form's current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuelType {
    #[serde(rename = "X")]
    RegularGasoline,
    #[serde(rename = "Z")]
    PremiumGasoline,
    #[serde(rename = "E")]
    Ethanol,
    #[serde(rename = "D")]
    Diesel,
    #[serde(rename = "N")]
    NaturalGas,
}

impl FuelType {
    pub const ALL: [FuelType; 5] = [
        FuelType::RegularGasoline,
        FuelType::PremiumGasoline,
        FuelType::Ethanol,
        FuelType::Diesel,
        FuelType::NaturalGas,
    ];

    /// Single-letter code the model was trained on.
    pub fn code(self) -> &'static str {
        match self {
            FuelType::RegularGasoline => "X",
            FuelType::PremiumGasoline => "Z",
            FuelType::Ethanol => "E",
            FuelType::Diesel => "D",
            FuelType::NaturalGas => "N",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FuelType::RegularGasoline => "Regular gasoline",
            FuelType::PremiumGasoline => "Premium gasoline",
            FuelType::Ethanol => "Ethanol (E85)",
            FuelType::Diesel => "Diesel",
            FuelType::NaturalGas => "Natural gas",
        }
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown fuel type '{0}' (expected one of X, Z, E, D, N)")]
pub struct UnknownFuelType(pub String);

impl FromStr for FuelType {
    type Err = UnknownFuelType;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let code = raw.trim();
        FuelType::ALL
            .into_iter()
            .find(|fuel| fuel.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| UnknownFuelType(code.to_string()))
    }
}

/// Body of `POST /predict/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub fuel_type: String,
    pub cylinders: i32,
    pub engine_size: f64,
}

/// Canonical prediction, whatever key the backend used to report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_co2_emissions: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl PredictionResult {
    pub fn from_value(predicted_co2_emissions: f64) -> Self {
        Self {
            predicted_co2_emissions,
            interpretation: None,
            category: None,
            color: None,
        }
    }

    pub fn derived_category(&self) -> EmissionCategory {
        EmissionCategory::from_grams_per_km(self.predicted_co2_emissions)
    }

    pub fn category_label(&self) -> String {
        self.category
            .clone()
            .unwrap_or_else(|| self.derived_category().label().to_string())
    }

    pub fn interpretation_text(&self) -> String {
        self.interpretation
            .clone()
            .unwrap_or_else(|| self.derived_category().interpretation().to_string())
    }

    pub fn color_hint(&self) -> String {
        self.color
            .clone()
            .unwrap_or_else(|| self.derived_category().color().to_string())
    }
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} g/km", self.predicted_co2_emissions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionCategory {
    Excellent,
    Good,
    Average,
    High,
    VeryHigh,
}

impl EmissionCategory {
    pub fn from_grams_per_km(value: f64) -> Self {
        if value < 120.0 {
            EmissionCategory::Excellent
        } else if value < 160.0 {
            EmissionCategory::Good
        } else if value < 200.0 {
            EmissionCategory::Average
        } else if value < 250.0 {
            EmissionCategory::High
        } else {
            EmissionCategory::VeryHigh
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EmissionCategory::Excellent => "Excellent",
            EmissionCategory::Good => "Good",
            EmissionCategory::Average => "Average",
            EmissionCategory::High => "High",
            EmissionCategory::VeryHigh => "Very High",
        }
    }

    pub fn interpretation(self) -> &'static str {
        match self {
            EmissionCategory::Excellent => {
                "Excellent! This vehicle has very low emissions and is environmentally friendly."
            }
            EmissionCategory::Good => {
                "Good! This vehicle has moderate emissions and is reasonably eco-friendly."
            }
            EmissionCategory::Average => "Average. This vehicle has typical emissions for its class.",
            EmissionCategory::High => {
                "High. This vehicle produces above-average emissions and may have higher fuel costs."
            }
            EmissionCategory::VeryHigh => {
                "Very High. This vehicle produces significant emissions and will have high fuel costs."
            }
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            EmissionCategory::Excellent => "green",
            EmissionCategory::Good => "lime",
            EmissionCategory::Average => "yellow",
            EmissionCategory::High => "orange",
            EmissionCategory::VeryHigh => "red",
        }
    }
}
