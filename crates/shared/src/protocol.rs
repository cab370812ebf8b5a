use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub encoder_loaded: bool,
    #[serde(default)]
    pub scaler_loaded: bool,
}

impl HealthReport {
    pub fn is_ready(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
            && self.model_loaded
            && self.encoder_loaded
            && self.scaler_loaded
    }
}

/// `GET /fuel-types`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelTypeCatalog {
    pub fuel_types: Vec<String>,
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
}

impl FuelTypeCatalog {
    pub fn builtin() -> Self {
        use crate::domain::FuelType;

        Self {
            fuel_types: FuelType::ALL.iter().map(|f| f.code().to_string()).collect(),
            descriptions: FuelType::ALL
                .iter()
                .map(|f| (f.code().to_string(), f.description().to_string()))
                .collect(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fuel_types
            .iter()
            .map(|code| (code.as_str(), self.descriptions.get(code).map(String::as_str)))
    }
}
