use std::{net::Ipv4Addr, path::PathBuf, sync::Arc};

use axum::{
    Json, Router, extract,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    serve,
};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, signal};

use crate::{
    config::Config,
    controller::{Controller, StatusSnapshot},
    defs::Sample,
    pipeline::Pipeline,
    store::{RunId, RunInfo, RunLog},
};

pub async fn launch(config_path: &str, port: Option<u16>) -> Result<()> {
    let config = Config::load(config_path).await?;
    let port = port.unwrap_or(config.server.port);

    let pipeline = Pipeline::start(&config).await?;
    let app = create_router(pipeline.controller.clone(), config.store.path.clone());

    let socket = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    tracing::info!("Listening on http://0.0.0.0:{port}");

    serve(socket, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}

/* === Router === */

struct AppState {
    controller: Arc<Controller>,
    store_path: PathBuf,
}

fn create_router(controller: Arc<Controller>, store_path: PathBuf) -> Router {
    let state = Arc::new(AppState {
        controller,
        store_path,
    });

    Router::new()
        .route("/setpoint", post(setpoint))
        .route("/link/open", post(open_link))
        .route("/link/close", post(close_link))
        .route("/status", get(status))
        .route("/runs", get(list_runs))
        .route("/runs/{id}", get(fetch_run))
        .with_state(state)
}

/* == Command path == */

#[derive(Deserialize)]
struct SetpointPayload {
    value: f64,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn setpoint(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Json(payload): extract::Json<SetpointPayload>,
) -> Json<MessageResponse> {
    let message = state.controller.submit_setpoint(payload.value);

    Json(MessageResponse { message })
}

async fn open_link(extract::State(state): extract::State<Arc<AppState>>) -> Json<MessageResponse> {
    let message = state.controller.open_link();

    Json(MessageResponse { message })
}

async fn close_link(extract::State(state): extract::State<Arc<AppState>>) -> Json<MessageResponse> {
    let message = state.controller.close_link();

    Json(MessageResponse { message })
}

/* == Status == */

async fn status(extract::State(state): extract::State<Arc<AppState>>) -> Json<StatusSnapshot> {
    Json(state.controller.status())
}

/* == History == */

async fn list_runs(
    extract::State(state): extract::State<Arc<AppState>>,
) -> StandardResponse<Vec<RunInfo>> {
    RunLog::read_runs(&state.store_path).await.into()
}

async fn fetch_run(
    extract::State(state): extract::State<Arc<AppState>>,
    extract::Path(id): extract::Path<u32>,
) -> StandardResponse<Vec<Sample>> {
    RunLog::read_samples(&state.store_path, RunId(id)).await.into()
}

/* == Types == */

#[derive(Serialize)]
#[serde(tag = "status")]
enum StandardResponse<T = ()> {
    Success { data: T },
    Error { message: String },
}

impl<T: Serialize> From<Result<T>> for StandardResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => StandardResponse::Success { data },
            Err(error) => StandardResponse::Error {
                message: error.to_string(),
            },
        }
    }
}

impl<T: Serialize> IntoResponse for StandardResponse<T> {
    fn into_response(self) -> axum::response::Response {
        match self {
            StandardResponse::Success { .. } => (StatusCode::OK, Json(self)),
            StandardResponse::Error { .. } => (StatusCode::BAD_REQUEST, Json(self)),
        }
        .into_response()
    }
}
