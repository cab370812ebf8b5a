use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{PredictionRequest, PredictionResult},
    error::{ErrorBody, Failure, FailureKind},
    protocol::{FuelTypeCatalog, HealthReport},
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub mod form;
pub mod normalize;

pub use form::{
    FieldError, FormController, FormField, FormInput, FormOptions, FuelTypePolicy, Notification,
    NotificationLevel, SubmissionStatus, SubmitOutcome, UnknownField, ValidationError,
};
pub use normalize::{normalize_prediction, ShapeError, PREDICTION_KEYS};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_PREDICT_ROUTE: &str = "/predict/";
const HEALTH_ROUTE: &str = "/health";
const FUEL_TYPES_ROUTE: &str = "/fuel-types";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("unsupported scheme '{scheme}' in base url '{url}' (expected http or https)")]
    UnsupportedScheme { url: String, scheme: String },
}

/// Where the prediction service lives. Passed into the client explicitly so
/// tests can point it at a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: String,
    predict_route: String,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|source| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme {
                url: base_url.to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }

        Ok(Self {
            base_url: trimmed.to_string(),
            predict_route: DEFAULT_PREDICT_ROUTE.to_string(),
        })
    }

    pub fn with_predict_route(mut self, route: impl AsRef<str>) -> Self {
        self.predict_route = normalize_route(route.as_ref());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn predict_route(&self) -> &str {
        &self.predict_route
    }

    pub fn predict_url(&self) -> String {
        self.endpoint(&self.predict_route)
    }

    pub fn endpoint(&self, route: &str) -> String {
        format!("{}{}", self.base_url, normalize_route(route))
    }
}

fn normalize_route(route: &str) -> String {
    let route = route.trim();
    if route.is_empty() {
        return "/".to_string();
    }
    if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    }
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("prediction endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("prediction endpoint returned {status}{}", detail_suffix(.detail))]
    Status {
        status: StatusCode,
        detail: Option<String>,
    },
    #[error("unexpected response shape: {0}")]
    Shape(#[from] ShapeError),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {detail}"),
        None => String::new(),
    }
}

impl PredictError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PredictError::Transport(_) | PredictError::Status { .. } => FailureKind::Network,
            PredictError::Shape(_) => FailureKind::Shape,
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

#[async_trait]
pub trait PredictionService: Send + Sync {
    /// One round trip, no retries.
    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, PredictError>;
}

pub struct HttpPredictionClient {
    http: Client,
    config: ClientConfig,
}

impl HttpPredictionClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_http_client(config, Client::new())
    }

    pub fn with_http_client(config: ClientConfig, http: Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn health(&self) -> Result<HealthReport, PredictError> {
        let res = self
            .http
            .get(self.config.endpoint(HEALTH_ROUTE))
            .send()
            .await?;
        read_json(res).await
    }

    pub async fn fuel_types(&self) -> Result<FuelTypeCatalog, PredictError> {
        let res = self
            .http
            .get(self.config.endpoint(FUEL_TYPES_ROUTE))
            .send()
            .await?;
        read_json(res).await
    }
}

#[async_trait]
impl PredictionService for HttpPredictionClient {
    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, PredictError> {
        let url = self.config.predict_url();
        debug!(%url, "posting prediction request");

        let res = self.http.post(&url).json(request).send().await?;
        let res = ensure_success(res).await?;
        let body = res.bytes().await?;

        normalize::normalize_body(&body).map_err(|err| {
            warn!(%url, error = %err, "prediction response had an unexpected shape");
            PredictError::Shape(err)
        })
    }
}

async fn ensure_success(res: Response) -> Result<Response, PredictError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let detail = match res.bytes().await {
        Ok(body) => serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.message()),
        Err(err) => {
            debug!(error = %err, "failed to read error body");
            None
        }
    };
    warn!(%status, detail = detail.as_deref().unwrap_or(""), "prediction service returned an error status");
    Err(PredictError::Status { status, detail })
}

async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, PredictError> {
    let res = ensure_success(res).await?;
    let body = res.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| PredictError::Shape(ShapeError::NotJson(err.to_string())))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
