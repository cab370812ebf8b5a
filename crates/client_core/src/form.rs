//! Form state controller: raw field input, validation, and the submission
//! lifecycle `Idle -> Pending -> Succeeded | Failed`.

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{FuelType, PredictionRequest, PredictionResult, SubmissionId},
    error::{Failure, FailureKind},
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::PredictionService;

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    FuelType,
    Cylinders,
    EngineSize,
}

impl FormField {
    pub const ALL: [FormField; 3] = [FormField::FuelType, FormField::Cylinders, FormField::EngineSize];

    pub fn name(self) -> &'static str {
        match self {
            FormField::FuelType => "fuel_type",
            FormField::Cylinders => "cylinders",
            FormField::EngineSize => "engine_size",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown form field '{0}' (expected fuel_type, cylinders or engine_size)")]
pub struct UnknownField(pub String);

impl FromStr for FormField {
    type Err = UnknownField;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim().to_ascii_lowercase().replace('-', "_");
        FormField::ALL
            .into_iter()
            .find(|field| field.name() == name)
            .ok_or_else(|| UnknownField(raw.trim().to_string()))
    }
}

/// How strictly the fuel type field is checked before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FuelTypePolicy {
    /// Only the trained codes X, Z, E, D, N.
    #[default]
    Strict,
    /// Any non-empty text; known codes are still upper-cased.
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{field} is required")]
    Missing { field: FormField },
    #[error("{field} {reason} (got '{value}')")]
    Invalid {
        field: FormField,
        value: String,
        reason: &'static str,
    },
}

impl FieldError {
    pub fn field(&self) -> FormField {
        match self {
            FieldError::Missing { field } | FieldError::Invalid { field, .. } => *field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid form input: {}", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn for_field(&self, field: FormField) -> Option<&FieldError> {
        self.errors.iter().find(|err| err.field() == field)
    }
}

/// Raw text as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormInput {
    pub fuel_type: String,
    pub cylinders: String,
    pub engine_size: String,
}

impl FormInput {
    pub fn is_empty(&self) -> bool {
        self.fuel_type.is_empty() && self.cylinders.is_empty() && self.engine_size.is_empty()
    }

    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::FuelType => &self.fuel_type,
            FormField::Cylinders => &self.cylinders,
            FormField::EngineSize => &self.engine_size,
        }
    }

    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        let slot = match field {
            FormField::FuelType => &mut self.fuel_type,
            FormField::Cylinders => &mut self.cylinders,
            FormField::EngineSize => &mut self.engine_size,
        };
        *slot = value.into();
    }

    /// Coerces every field, collecting all problems instead of stopping at
    /// the first one.
    pub fn validate(&self, policy: FuelTypePolicy) -> Result<PredictionRequest, ValidationError> {
        let mut errors = Vec::new();

        let fuel_type = parse_fuel_type(&self.fuel_type, policy).map_err(|err| errors.push(err));
        let cylinders = parse_cylinders(&self.cylinders).map_err(|err| errors.push(err));
        let engine_size = parse_engine_size(&self.engine_size).map_err(|err| errors.push(err));

        match (fuel_type, cylinders, engine_size) {
            (Ok(fuel_type), Ok(cylinders), Ok(engine_size)) => Ok(PredictionRequest {
                fuel_type,
                cylinders,
                engine_size,
            }),
            _ => Err(ValidationError { errors }),
        }
    }
}

fn parse_fuel_type(raw: &str, policy: FuelTypePolicy) -> Result<String, FieldError> {
    let field = FormField::FuelType;
    let value = raw.trim();
    if value.is_empty() {
        return Err(FieldError::Missing { field });
    }

    match (value.parse::<FuelType>(), policy) {
        (Ok(fuel), _) => Ok(fuel.code().to_string()),
        (Err(_), FuelTypePolicy::Lenient) => Ok(value.to_string()),
        (Err(_), FuelTypePolicy::Strict) => Err(FieldError::Invalid {
            field,
            value: value.to_string(),
            reason: "must be one of X, Z, E, D, N",
        }),
    }
}

fn parse_cylinders(raw: &str) -> Result<i32, FieldError> {
    let field = FormField::Cylinders;
    let value = raw.trim();
    if value.is_empty() {
        return Err(FieldError::Missing { field });
    }

    value.parse::<i32>().map_err(|_| FieldError::Invalid {
        field,
        value: value.to_string(),
        reason: "must be a whole number",
    })
}

fn parse_engine_size(raw: &str) -> Result<f64, FieldError> {
    let field = FormField::EngineSize;
    let value = raw.trim();
    if value.is_empty() {
        return Err(FieldError::Missing { field });
    }

    match value.parse::<f64>() {
        Ok(size) if size.is_finite() && size > 0.0 => Ok(size),
        _ => Err(FieldError::Invalid {
            field,
            value: value.to_string(),
            reason: "must be a positive number of litres",
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Pending,
    Succeeded(PredictionResult),
    Failed(Failure),
}

impl SubmissionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, SubmissionStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Succeeded(_) | SubmissionStatus::Failed(_)
        )
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        match self {
            SubmissionStatus::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            SubmissionStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

/// Transient toast-style message; exactly one per submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub submission: SubmissionId,
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The response settled the form; carries the terminal status.
    Applied(SubmissionStatus),
    /// A reset or newer submission happened while this one was in flight.
    Superseded,
}

#[derive(Debug, Clone, Default)]
pub struct FormOptions {
    pub fuel_type_policy: FuelTypePolicy,
    /// Presentation pacing only. Never a timeout.
    pub min_pending: Duration,
}

#[derive(Default)]
struct FormState {
    input: FormInput,
    status: SubmissionStatus,
    current: Option<SubmissionId>,
}

pub struct FormController {
    service: Arc<dyn PredictionService>,
    options: FormOptions,
    inner: Mutex<FormState>,
    notifications: broadcast::Sender<Notification>,
}

impl FormController {
    pub fn new(service: Arc<dyn PredictionService>) -> Arc<Self> {
        Self::with_options(service, FormOptions::default())
    }

    pub fn with_options(service: Arc<dyn PredictionService>, options: FormOptions) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Arc::new(Self {
            service,
            options,
            inner: Mutex::new(FormState::default()),
            notifications,
        })
    }

    fn state(&self) -> MutexGuard<'_, FormState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn input(&self) -> FormInput {
        self.state().input.clone()
    }

    pub fn status(&self) -> SubmissionStatus {
        self.state().status.clone()
    }

    pub fn set_field(&self, field: FormField, value: impl Into<String>) {
        self.state().input.set(field, value);
    }

    pub fn update_field(&self, name: &str, value: impl Into<String>) -> Result<(), UnknownField> {
        let field = name.parse::<FormField>()?;
        self.set_field(field, value);
        Ok(())
    }

    /// Clears the input and returns to `Idle`. A submission still in flight
    /// becomes stale and will not touch the form when it settles.
    pub fn reset(&self) {
        let mut state = self.state();
        if let Some(id) = state.current.take() {
            debug!(submission = %id, "reset abandons in-flight submission");
        }
        state.input = FormInput::default();
        state.status = SubmissionStatus::Idle;
    }

    pub async fn submit(&self) -> Result<SubmitOutcome, ValidationError> {
        let (id, request) = {
            let mut state = self.state();
            let request = state.input.validate(self.options.fuel_type_policy)?;
            let id = SubmissionId::new();
            if let Some(previous) = state.current.replace(id) {
                debug!(submission = %previous, superseded_by = %id, "newer submission replaces in-flight one");
            }
            state.status = SubmissionStatus::Pending;
            (id, request)
        };

        info!(
            submission = %id,
            fuel_type = %request.fuel_type,
            cylinders = request.cylinders,
            engine_size = request.engine_size,
            "submitting prediction request"
        );

        let mut guard = PendingGuard {
            controller: self,
            id,
            armed: true,
        };

        let started = Instant::now();
        let outcome = self.service.predict(&request).await;
        if let Some(remaining) = self.options.min_pending.checked_sub(started.elapsed()) {
            tokio::time::sleep(remaining).await;
        }

        guard.armed = false;
        let status = match outcome {
            Ok(result) => SubmissionStatus::Succeeded(result),
            Err(err) => {
                warn!(submission = %id, error = %err, "prediction failed");
                SubmissionStatus::Failed(err.to_failure())
            }
        };

        Ok(self.settle(id, status))
    }

    fn settle(&self, id: SubmissionId, status: SubmissionStatus) -> SubmitOutcome {
        let applied = {
            let mut state = self.state();
            if state.current == Some(id) {
                state.current = None;
                state.status = status.clone();
                true
            } else {
                false
            }
        };

        if !applied {
            debug!(submission = %id, "discarding stale prediction response");
            self.notify(
                id,
                NotificationLevel::Info,
                "Earlier prediction request was superseded.",
            );
            return SubmitOutcome::Superseded;
        }

        match &status {
            SubmissionStatus::Succeeded(result) => {
                info!(submission = %id, predicted = result.predicted_co2_emissions, "prediction succeeded");
                self.notify(id, NotificationLevel::Success, "Prediction successful!");
            }
            SubmissionStatus::Failed(failure) => {
                let message = match failure.kind {
                    FailureKind::Network => {
                        "Prediction failed: could not reach the prediction service or it rejected the request."
                    }
                    FailureKind::Shape => {
                        "Prediction failed: the prediction service returned an unexpected response."
                    }
                };
                self.notify(id, NotificationLevel::Error, message);
            }
            SubmissionStatus::Idle | SubmissionStatus::Pending => {}
        }

        SubmitOutcome::Applied(status)
    }

    fn notify(&self, submission: SubmissionId, level: NotificationLevel, message: &str) {
        let _ = self.notifications.send(Notification {
            submission,
            level,
            message: message.to_string(),
            at: Utc::now(),
        });
    }
}

/// Settles the form as failed if a submission is dropped or unwinds before
/// its response is applied, so `Pending` never outlives the attempt.
struct PendingGuard<'a> {
    controller: &'a FormController,
    id: SubmissionId,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!(submission = %self.id, "submission abandoned before the response settled");
        self.controller.settle(
            self.id,
            SubmissionStatus::Failed(Failure::new(
                FailureKind::Network,
                "prediction request was abandoned before a response arrived",
            )),
        );
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
