use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use client_core::{ClientConfig, FormOptions, FuelTypePolicy, DEFAULT_BASE_URL, DEFAULT_PREDICT_ROUTE};
use serde::Deserialize;
use tracing::warn;

const DEFAULT_CONFIG_FILE: &str = "predictor.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub predict_route: String,
    pub strict_fuel_types: bool,
    pub min_pending_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            predict_route: DEFAULT_PREDICT_ROUTE.into(),
            strict_fuel_types: true,
            min_pending_ms: 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    predict_route: Option<String>,
    strict_fuel_types: Option<bool>,
    min_pending_ms: Option<u64>,
}

impl Settings {
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let config = ClientConfig::new(&self.base_url)
            .with_context(|| format!("invalid prediction service url '{}'", self.base_url))?;
        Ok(config.with_predict_route(&self.predict_route))
    }

    pub fn form_options(&self) -> FormOptions {
        FormOptions {
            fuel_type_policy: if self.strict_fuel_types {
                FuelTypePolicy::Strict
            } else {
                FuelTypePolicy::Lenient
            },
            min_pending: Duration::from_millis(self.min_pending_ms),
        }
    }
}

/// Defaults, then `predictor.toml` (or the explicit path), then environment.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let raw = match config_path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?,
        ),
        None => fs::read_to_string(DEFAULT_CONFIG_FILE).ok(),
    };

    let file_cfg = match raw.as_deref().map(toml::from_str::<FileSettings>) {
        None => FileSettings::default(),
        Some(Ok(parsed)) => parsed,
        Some(Err(err)) if config_path.is_some() => {
            return Err(err).context("failed to parse config file");
        }
        Some(Err(err)) => {
            warn!(error = %err, file = DEFAULT_CONFIG_FILE, "ignoring unreadable config file");
            FileSettings::default()
        }
    };

    Ok(resolve_settings(file_cfg, |key| std::env::var(key).ok()))
}

fn resolve_settings(file_cfg: FileSettings, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(v) = file_cfg.api_url {
        settings.base_url = v;
    }
    if let Some(v) = file_cfg.predict_route {
        settings.predict_route = v;
    }
    if let Some(v) = file_cfg.strict_fuel_types {
        settings.strict_fuel_types = v;
    }
    if let Some(v) = file_cfg.min_pending_ms {
        settings.min_pending_ms = v;
    }

    if let Some(v) = env("API_URL") {
        settings.base_url = v;
    }
    if let Some(v) = env("VITE_API_URL") {
        settings.base_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.base_url = v;
    }

    if let Some(v) = env("APP__PREDICT_ROUTE") {
        settings.predict_route = v;
    }

    if let Some(v) = env("APP__STRICT_FUEL_TYPES") {
        if let Some(parsed) = parse_flag(&v) {
            settings.strict_fuel_types = parsed;
        }
    }

    if let Some(v) = env("APP__MIN_PENDING_MS") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.min_pending_ms = parsed;
        }
    }

    settings
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_loopback() {
        let settings = resolve_settings(FileSettings::default(), env_from(&[]));
        assert_eq!(settings, Settings::default());
        assert_eq!(
            settings.client_config().expect("config").predict_url(),
            "http://127.0.0.1:8000/predict/"
        );
    }

    #[test]
    fn environment_overrides_file_values() {
        let file_cfg: FileSettings = toml::from_str(
            r#"
            api_url = "http://file.example:9000"
            predict_route = "/api/predict"
            strict_fuel_types = false
            "#,
        )
        .expect("toml");

        let settings = resolve_settings(
            file_cfg,
            env_from(&[
                ("VITE_API_URL", "http://vite.example"),
                ("APP__API_URL", "http://app.example"),
                ("APP__MIN_PENDING_MS", "1500"),
            ]),
        );

        assert_eq!(settings.base_url, "http://app.example");
        assert_eq!(settings.predict_route, "/api/predict");
        assert!(!settings.strict_fuel_types);
        assert_eq!(
            settings.form_options().min_pending,
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn malformed_env_values_are_ignored() {
        let settings = resolve_settings(
            FileSettings::default(),
            env_from(&[
                ("APP__STRICT_FUEL_TYPES", "maybe"),
                ("APP__MIN_PENDING_MS", "soon"),
            ]),
        );
        assert!(settings.strict_fuel_types);
        assert_eq!(settings.min_pending_ms, 0);
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let settings = Settings {
            base_url: "::nope::".into(),
            ..Settings::default()
        };
        assert!(settings.client_config().is_err());
    }

    #[test]
    fn explicit_config_file_must_parse() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("co2_predict_config_test_{suffix}.toml"));

        fs::write(&path, "min_pending_ms = \"not a number\"").expect("write config");
        assert!(load_settings(Some(&path)).is_err());

        fs::write(&path, "predict_route = \"/api/predict\"").expect("write config");
        let settings = load_settings(Some(&path)).expect("load");
        assert_eq!(settings.predict_route, "/api/predict");

        fs::remove_file(&path).expect("cleanup");
    }
}
