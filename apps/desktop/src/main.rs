use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    FormController, FormField, HttpPredictionClient, Notification, NotificationLevel,
    SubmissionStatus, SubmitOutcome,
};
use shared::{domain::PredictionResult, protocol::FuelTypeCatalog};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod config;
mod repl;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "co2-predict", about = "Estimate vehicle CO2 emissions from a prediction service")]
struct Cli {
    /// Prediction service base url (overrides config and environment).
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Route of the prediction endpoint, e.g. /predict/ or /api/predict.
    #[arg(long, global = true)]
    route: Option<String>,
    /// Accept free-text fuel types instead of the X/Z/E/D/N codes.
    #[arg(long, global = true)]
    lenient: bool,
    /// Settings file to read instead of ./predictor.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one prediction.
    Predict {
        #[arg(long)]
        fuel_type: String,
        #[arg(long)]
        cylinders: String,
        #[arg(long)]
        engine_size: String,
    },
    /// Report whether the service has its model, encoder and scaler loaded.
    Health,
    /// List the accepted fuel type codes.
    FuelTypes,
    /// Fill in and submit the form line by line.
    Interactive,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }
    if let Some(route) = cli.route {
        settings.predict_route = route;
    }
    if cli.lenient {
        settings.strict_fuel_types = false;
    }

    let client = Arc::new(HttpPredictionClient::new(settings.client_config()?));

    match cli.command {
        Command::Predict {
            fuel_type,
            cylinders,
            engine_size,
        } => {
            let controller = FormController::with_options(client, settings.form_options());
            let mut notifications = controller.subscribe_notifications();
            controller.set_field(FormField::FuelType, fuel_type);
            controller.set_field(FormField::Cylinders, cylinders);
            controller.set_field(FormField::EngineSize, engine_size);

            let outcome = match controller.submit().await {
                Ok(outcome) => outcome,
                Err(invalid) => {
                    for err in &invalid.errors {
                        eprintln!("  {err}");
                    }
                    bail!("form input rejected; nothing was sent");
                }
            };
            print_notifications(&mut notifications);

            match outcome {
                SubmitOutcome::Applied(SubmissionStatus::Succeeded(result)) => print_result(&result),
                SubmitOutcome::Applied(SubmissionStatus::Failed(failure)) => bail!(failure.message),
                other => bail!("prediction did not settle: {other:?}"),
            }
        }
        Command::Health => {
            let report = client.health().await?;
            println!("status:  {}", report.status);
            println!("model:   {}", loaded(report.model_loaded));
            println!("encoder: {}", loaded(report.encoder_loaded));
            println!("scaler:  {}", loaded(report.scaler_loaded));
            if !report.is_ready() {
                bail!("prediction service is not ready");
            }
        }
        Command::FuelTypes => {
            let catalog = match client.fuel_types().await {
                Ok(catalog) => catalog,
                Err(err) => {
                    warn!(error = %err, "could not fetch fuel types; showing built-in list");
                    FuelTypeCatalog::builtin()
                }
            };
            for (code, description) in catalog.entries() {
                println!("{code}  {}", description.unwrap_or("-"));
            }
        }
        Command::Interactive => {
            let controller = FormController::with_options(client, settings.form_options());
            repl::run(controller).await?;
        }
    }

    Ok(())
}

fn loaded(flag: bool) -> &'static str {
    if flag {
        "loaded"
    } else {
        "missing"
    }
}

fn print_result(result: &PredictionResult) {
    println!("Estimated CO2 emission: {result}");
    println!("Category: {} ({})", result.category_label(), result.color_hint());
    println!("{}", result.interpretation_text());
}

pub(crate) fn describe_status(status: &SubmissionStatus) -> String {
    match status {
        SubmissionStatus::Idle => "idle".to_string(),
        SubmissionStatus::Pending => "predicting...".to_string(),
        SubmissionStatus::Succeeded(result) => {
            format!("estimated CO2 emission: {result} [{}]", result.category_label())
        }
        SubmissionStatus::Failed(failure) => format!("failed: {}", failure.message),
    }
}

pub(crate) fn print_notifications(rx: &mut broadcast::Receiver<Notification>) {
    loop {
        match rx.try_recv() {
            Ok(note) => eprintln!("{}", format_notification(&note)),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "dropped notifications"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

fn format_notification(note: &Notification) -> String {
    let tag = match note.level {
        NotificationLevel::Success => "ok",
        NotificationLevel::Error => "error",
        NotificationLevel::Info => "info",
    };
    format!("[{tag}] {}", note.message)
}
