//! HTTP server for the compiler.
//!
//! # API Endpoints
//!
//! | Method | Path            | Description                                   |
//! |--------|-----------------|-----------------------------------------------|
//! | GET    | `/health`       | Health check                                  |
//! | POST   | `/api/compile`  | Upload CSVs, download the xlsx workbook       |
//! | POST   | `/api/preview`  | Upload CSVs, get the sheets back as JSON      |
//! | GET    | `/api/logs`     | SSE stream for real-time logs                 |
//!
//! Both upload endpoints take the same multipart form: repeated `local` and
//! `national` file parts, and optional repeated `local_label` /
//! `national_label` text parts giving one label per file of that kind, in
//! file order. A kind sent without labels gets `Metric N (%)` defaults.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, PreviewResponse};
use crate::config::{Settings, XLSX_CONTENT_TYPE};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::loader::{pair_labels_or_default, Upload};
use crate::models::{MetricLabel, SourceKind};
use crate::transform::pipeline::{compile, CompileOptions, CompileResult};

type Rejection = (StatusCode, Json<Value>);

/// Shared, read-only server state
#[derive(Debug, Clone)]
struct AppState {
    options: CompileOptions,
}

/// Files and labels read from one multipart form.
#[derive(Debug, Default)]
pub struct CompileForm {
    pub local: Vec<Upload>,
    pub local_labels: Vec<MetricLabel>,
    pub national: Vec<Upload>,
    pub national_labels: Vec<MetricLabel>,
}

impl CompileForm {
    /// Pair labels for both kinds and run the pipeline.
    pub fn compile(self, options: &CompileOptions) -> Result<CompileResult, PipelineError> {
        let mut files = pair_labels_or_default(SourceKind::Local, self.local, self.local_labels)?;
        files.extend(pair_labels_or_default(
            SourceKind::National,
            self.national,
            self.national_labels,
        )?);
        compile(files, options)
    }
}

/// Build the router.
pub fn router(settings: &Settings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let state = Arc::new(AppState {
        options: CompileOptions {
            region_name: settings.region_name.clone(),
        },
    });

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/compile", post(compile_workbook))
        .route("/api/preview", post(preview))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes()))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> ServerResult<()> {
    let app = router(&settings);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    println!("🚀 ePACT2 compiler running on http://localhost:{}", settings.port);
    println!("   POST /api/compile - Upload CSVs, download workbook");
    println!("   POST /api/preview - Upload CSVs, preview sheets as JSON");
    println!("   GET  /api/logs    - SSE log stream");
    println!("   GET  /health      - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "epact-compiler",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "compile": "POST /api/compile",
            "preview": "POST /api/preview",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload CSVs, answer with the workbook as an attachment.
async fn compile_workbook(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, Rejection> {
    let result = run(state, multipart).await?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE)),
        (header::CONTENT_DISPOSITION, content_disposition(&result.file_name)),
    ];
    Ok((StatusCode::OK, headers, result.workbook).into_response())
}

/// Upload CSVs, answer with the sheets as JSON.
async fn preview(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<PreviewResponse>, Rejection> {
    let result = run(state, multipart).await?;
    Ok(Json(PreviewResponse::from(result)))
}

async fn run(state: Arc<AppState>, multipart: Multipart) -> Result<CompileResult, Rejection> {
    let form = read_form(multipart).await.map_err(reject)?;

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 NEW UPLOAD: {} local, {} national file(s)",
        form.local.len(),
        form.national.len()
    );
    println!("{}\n", "=".repeat(70));

    tokio::task::spawn_blocking(move || form.compile(&state.options))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(error_response(&format!("Compilation task failed: {}", e))),
            )
        })?
        .map_err(|e| reject(ServerError::Pipeline(e)))
}

async fn read_form(mut multipart: Multipart) -> ServerResult<CompileForm> {
    let mut form = CompileForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(str::to_string);

        match name.as_str() {
            "local" | "national" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                let uploads = if name == "local" { &mut form.local } else { &mut form.national };
                let file_name =
                    file_name.unwrap_or_else(|| format!("{}-{}.csv", name, uploads.len() + 1));
                log_info(format!("Received {} file '{}' ({} bytes)", name, file_name, bytes.len()));
                uploads.push(Upload::new(file_name, bytes.to_vec()));
            }
            "local_label" | "national_label" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                let label = MetricLabel::new(text.trim());
                if name == "local_label" {
                    form.local_labels.push(label);
                } else {
                    form.national_labels.push(label);
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

fn content_disposition(file_name: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// HTTP status for a failed run.
fn status_for(err: &ServerError) -> StatusCode {
    match err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Pipeline(
            PipelineError::LabelCountMismatch { .. }
            | PipelineError::NoData
            | PipelineError::Csv { .. }
            | PipelineError::Normalize(_)
            | PipelineError::Manifest(_),
        ) => StatusCode::BAD_REQUEST,
        ServerError::Pipeline(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ServerError) -> Rejection {
    let status = status_for(&err);
    let message = match &err {
        ServerError::Pipeline(inner) => inner.to_string(),
        other => other.to_string(),
    };
    log_error(&message);
    (status, Json(error_response(&message)))
}
