use super::*;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode as HttpStatus},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

#[derive(Clone)]
struct CaptureState {
    tx: Arc<Mutex<Option<oneshot::Sender<(Option<String>, Value)>>>>,
    reply: Value,
}

async fn spawn_server(app: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn handle_capture(
    State(state): State<CaptureState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send((content_type, body));
    }
    Json(state.reply.clone())
}

async fn spawn_capture_server(
    route: &str,
    reply: Value,
) -> anyhow::Result<(String, oneshot::Receiver<(Option<String>, Value)>)> {
    let (tx, rx) = oneshot::channel();
    let state = CaptureState {
        tx: Arc::new(Mutex::new(Some(tx))),
        reply,
    };
    let app = Router::new()
        .route(route, post(handle_capture))
        .with_state(state);
    Ok((spawn_server(app).await?, rx))
}

async fn spawn_status_server(status: HttpStatus, body: Value) -> anyhow::Result<String> {
    let app = Router::new().route(
        "/predict/",
        post(move || {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );
    spawn_server(app).await
}

fn sample_request() -> PredictionRequest {
    PredictionRequest {
        fuel_type: "X".into(),
        cylinders: 4,
        engine_size: 2.0,
    }
}

fn client_for(base_url: &str) -> HttpPredictionClient {
    HttpPredictionClient::new(ClientConfig::new(base_url).expect("config"))
}

#[tokio::test]
async fn predict_posts_json_payload_and_normalizes_legacy_key() {
    let (base_url, payload_rx) = spawn_capture_server("/predict/", json!({"predicted_CO2": 195.5}))
        .await
        .expect("spawn server");
    let client = client_for(&base_url);

    let result = client.predict(&sample_request()).await.expect("predict");
    assert_eq!(result.predicted_co2_emissions, 195.5);

    let (content_type, payload) = payload_rx.await.expect("captured payload");
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(
        payload,
        json!({"fuel_type": "X", "cylinders": 4, "engine_size": 2.0})
    );
}

#[tokio::test]
async fn predict_uses_configured_route() {
    let (base_url, payload_rx) = spawn_capture_server(
        "/api/predict",
        json!({"predicted_co2_emissions": 142.0, "category": "Good"}),
    )
    .await
    .expect("spawn server");
    let config = ClientConfig::new(&format!("{base_url}/"))
        .expect("config")
        .with_predict_route("api/predict");
    let client = HttpPredictionClient::new(config);

    let result = client.predict(&sample_request()).await.expect("predict");
    assert_eq!(result.predicted_co2_emissions, 142.0);
    assert_eq!(result.category.as_deref(), Some("Good"));
    payload_rx.await.expect("route was hit");
}

#[tokio::test]
async fn empty_success_body_is_a_shape_error() {
    let base_url = spawn_status_server(HttpStatus::OK, json!({}))
        .await
        .expect("spawn server");
    let err = client_for(&base_url)
        .predict(&sample_request())
        .await
        .expect_err("should fail");

    assert!(matches!(err, PredictError::Shape(ShapeError::MissingPrediction)));
    assert_eq!(err.kind(), FailureKind::Shape);
    assert!(err.to_string().contains("unexpected response shape"));
}

#[tokio::test]
async fn success_status_with_error_body_keeps_backend_message() {
    let base_url = spawn_status_server(
        HttpStatus::OK,
        json!({"error": "could not convert string to float: 'abc'"}),
    )
    .await
    .expect("spawn server");
    let err = client_for(&base_url)
        .predict(&sample_request())
        .await
        .expect_err("should fail");

    assert!(matches!(
        &err,
        PredictError::Shape(ShapeError::BackendError(message))
            if message == "could not convert string to float: 'abc'"
    ));
    let failure = err.to_failure();
    assert_eq!(failure.kind, FailureKind::Shape);
    assert!(failure
        .message
        .ends_with("could not convert string to float: 'abc'"));
}

#[tokio::test]
async fn server_error_is_a_network_error() {
    let base_url = spawn_status_server(HttpStatus::INTERNAL_SERVER_ERROR, json!({}))
        .await
        .expect("spawn server");
    let err = client_for(&base_url)
        .predict(&sample_request())
        .await
        .expect_err("should fail");

    match &err {
        PredictError::Status { status, detail } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(detail, &None);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), FailureKind::Network);
}

#[tokio::test]
async fn error_detail_is_carried_in_the_message() {
    let base_url = spawn_status_server(
        HttpStatus::SERVICE_UNAVAILABLE,
        json!({"detail": "Prediction service not fully initialized."}),
    )
    .await
    .expect("spawn server");
    let err = client_for(&base_url)
        .predict(&sample_request())
        .await
        .expect_err("should fail");

    assert_eq!(err.kind(), FailureKind::Network);
    assert!(err
        .to_string()
        .ends_with(": Prediction service not fully initialized."));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = client_for(&format!("http://{addr}"))
        .predict(&sample_request())
        .await
        .expect_err("should fail");
    assert!(matches!(err, PredictError::Transport(_)));
    assert_eq!(err.to_failure().kind, FailureKind::Network);
}

#[tokio::test]
async fn health_and_fuel_type_catalog_are_decoded() {
    let app = Router::new()
        .route(
            "/health",
            get(|| async {
                Json(json!({
                    "status": "healthy",
                    "model_loaded": true,
                    "encoder_loaded": true,
                    "scaler_loaded": true
                }))
            }),
        )
        .route(
            "/fuel-types",
            get(|| async {
                Json(json!({
                    "fuel_types": ["X", "D"],
                    "descriptions": {"X": "Regular gasoline", "D": "Diesel"}
                }))
            }),
        );
    let base_url = spawn_server(app).await.expect("spawn server");
    let client = client_for(&base_url);

    let health = client.health().await.expect("health");
    assert!(health.is_ready());

    let catalog = client.fuel_types().await.expect("fuel types");
    let entries: Vec<(&str, Option<&str>)> = catalog.entries().collect();
    assert_eq!(
        entries,
        vec![("X", Some("Regular gasoline")), ("D", Some("Diesel"))]
    );
}

#[test]
fn config_trims_trailing_slash_and_normalizes_routes() {
    let config = ClientConfig::new("http://localhost:8000/").expect("config");
    assert_eq!(config.base_url(), "http://localhost:8000");
    assert_eq!(config.predict_url(), "http://localhost:8000/predict/");

    let config = config.with_predict_route("api/predict");
    assert_eq!(config.predict_route(), "/api/predict");
    assert_eq!(config.endpoint("/health"), "http://localhost:8000/health");
}

#[test]
fn config_rejects_bad_base_urls() {
    assert!(matches!(
        ClientConfig::new("not a url"),
        Err(ConfigError::InvalidBaseUrl { .. })
    ));
    assert!(matches!(
        ClientConfig::new("ftp://example.com"),
        Err(ConfigError::UnsupportedScheme { .. })
    ));
}
