use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use extract::{CancellationToken, OllamaClient};
use pipeline::{MetricsSnapshot, Pipeline, PipelineError, RunOutput, RunRequest, WorkerPool};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    pool: WorkerPool,
    /// Tokens of runs currently executing, keyed by run id
    in_flight: Arc<DashMap<Uuid, CancellationToken>>,
    backend: Arc<OllamaClient>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, pool: WorkerPool, backend: Arc<OllamaClient>) -> Self {
        Self {
            pipeline,
            pool,
            in_flight: Arc::new(DashMap::new()),
            backend,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/runs", post(start_run))
        .route("/runs/:id", delete(cancel_run))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    stage: Option<String>,
}

struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self {
            status: status_for(&error),
            body: ErrorBody {
                error: error.to_string(),
                stage: Some(error.stage().to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::ExtractionEmpty { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::ExtractionUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::InvalidResponse { .. } => StatusCode::BAD_GATEWAY,
        PipelineError::Cancelled { .. } => StatusCode::CONFLICT,
    }
}

/// A run request whose text is either inline or read from a local file.
#[derive(Debug, Deserialize)]
struct StartRun {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(flatten)]
    request: RunRequest,
}

impl ApiError {
    fn bad_request(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: error.to_string(),
                stage: None,
            },
        }
    }
}

/// Keeps a run cancellable while its handler lives. Dropping the handler,
/// for instance when the client disconnects, unregisters the run.
struct InFlight {
    runs: Arc<DashMap<Uuid, CancellationToken>>,
    run_id: Uuid,
}

impl InFlight {
    /// `None` when a run with this id is already registered.
    fn register(runs: &Arc<DashMap<Uuid, CancellationToken>>, run_id: Uuid, cancel: &CancellationToken) -> Option<Self> {
        match runs.entry(run_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(cancel.clone());
                Some(Self {
                    runs: runs.clone(),
                    run_id,
                })
            }
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.runs.remove(&self.run_id);
    }
}

async fn start_run(
    State(state): State<AppState>,
    Json(body): Json<StartRun>,
) -> Result<Json<RunOutput>, ApiError> {
    let mut request = body.request;
    if let Some(path) = body.path {
        let document = ingest::load_document(&path)
            .await
            .map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
        request.text = document.text;
        request.doc_id.get_or_insert(document.doc_id);
        request.title = request.title.or(document.title);
    }

    let run_id = *request.run_id.get_or_insert_with(Uuid::new_v4);
    let cancel = CancellationToken::new();
    let _registration = InFlight::register(&state.in_flight, run_id, &cancel).ok_or_else(|| ApiError {
        status: StatusCode::CONFLICT,
        body: ErrorBody {
            error: format!("run {run_id} is already in flight"),
            stage: None,
        },
    })?;

    let result = state.pool.run(state.pipeline.run(request, &cancel)).await;

    let output = match result {
        Ok(output) => output?,
        Err(closed) => {
            return Err(ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: ErrorBody {
                    error: closed.to_string(),
                    stage: None,
                },
            });
        }
    };

    if let Some(dir) = &state.pipeline.config().report.output_dir {
        // The run already succeeded; a failed write only costs the copy on disk
        let written = match report::export_json(&output) {
            Ok(json) => report::write_outputs(dir, &run_id.to_string(), &output.report, &json).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(%run_id, error = %e, "Failed to write run outputs");
        }
    }

    Ok(Json(output))
}

async fn cancel_run(State(state): State<AppState>, Path(run_id): Path<Uuid>) -> StatusCode {
    match state.in_flight.get(&run_id) {
        Some(token) => {
            token.cancel();
            info!(%run_id, "Run cancellation requested");
            StatusCode::ACCEPTED
        }
        None => StatusCode::NOT_FOUND,
    }
}

#[derive(Serialize)]
struct HealthResponse {
    llm: String,
    runs_in_flight: usize,
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, llm) = match state.backend.ping().await {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("error: {e}")),
    };

    (
        status,
        Json(HealthResponse {
            llm,
            runs_in_flight: state.in_flight.len(),
        }),
    )
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.pipeline.metrics().snapshot())
}
