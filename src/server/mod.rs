//! HTTP surface of the application. Two endpoints cover the whole api:
//! registering one measurement and listing all of them. Everything else
//! (filtering, sorting) happens on the client side.

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio::{net::TcpListener, select};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    storage::measurement_store::{JsonFileStore, MeasurementStore},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;

pub const DEFAULT_PORT: u16 = 3000;

/// Resolves the port the same way for `serve` and the standalone server
/// binary: explicit argument first, then CLICKSPAN_PORT, then the default.
pub fn resolve_port(arg: Option<u16>) -> u16 {
    arg.or_else(|| {
        std::env::var("CLICKSPAN_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
    })
    .unwrap_or(DEFAULT_PORT)
}

/// Represents the starting point for the server.
pub async fn start_server(dir: PathBuf, port: u16) -> Result<()> {
    let store = JsonFileStore::new(dir)?;
    store.ensure_exists().await?;

    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await?;
    info!("Measurement api listening on http://{}", listener.local_addr()?);

    let shutdown_token = CancellationToken::new();

    let (_, serve_result) = tokio::join!(
        detect_shutdown(shutdown_token.clone()),
        serve(listener, store, DefaultClock, shutdown_token),
    );

    if let Err(e) = &serve_result {
        error!("Server got an error {e:?}");
    }

    serve_result
}

/// Runs the api over an already bound listener until `shutdown_token` is
/// cancelled. Split from [start_server] so tests can use an ephemeral port
/// and a substituted store.
pub async fn serve(
    listener: TcpListener,
    store: impl MeasurementStore + Send + Sync + 'static,
    clock: impl Clock,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let state = AppState {
        store: Arc::new(store),
        clock: Arc::new(clock),
    };

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_token.cancelled_owned())
        .await?;
    Ok(())
}

/// Detects signals sent to the process and cancels the server.
async fn detect_shutdown(cancellation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancellation.cancel();
        },
    };
}

struct AppState<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

fn router<S: MeasurementStore + Send + Sync + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/register", post(register::<S>))
        .route("/api/registers", get(list_registers::<S>))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    "ok"
}

/// Validates and persists one measurement. The body is taken as loose json
/// so that a missing or non-numeric `elapsedMs` answers with the same 400 as
/// an out-of-range one.
async fn register<S: MeasurementStore + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let elapsed_ms = body.get("elapsedMs").and_then(Value::as_f64);
    let Some(elapsed_ms) = elapsed_ms.filter(|v| v.is_finite() && *v > 0.) else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "elapsedMs must be a positive finite number",
        );
    };

    match state.store.append(elapsed_ms, state.clock.time()).await {
        Ok(created) => {
            debug!("Registered measurement {created:?}");
            (StatusCode::CREATED, Json(created)).into_response()
        }
        Err(e) => {
            error!("Failed to append measurement {e:?}");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to persist measurement",
            )
        }
    }
}

/// Answers with every stored measurement in insertion order. A store that
/// can't be loaded answers as empty, the listing never fails.
async fn list_registers<S: MeasurementStore + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
) -> axum::response::Response {
    if let Err(e) = state.store.ensure_exists().await {
        warn!("Failed to initialize store before listing {e:?}");
    }
    let measurements = match state.store.read_all().await {
        Ok(measurements) => measurements,
        Err(e) => {
            warn!("Failed to load measurements {e:?}");
            vec![]
        }
    };
    Json(measurements).into_response()
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
        .into_response()
}
