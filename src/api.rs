// HTTP API - axum router over the import/export pipelines
//
// Handlers return Result<_, ApiError>; every failure, including a panicked
// blocking task, becomes a response here instead of taking the process down.

use crate::config::{Config, ExportMode};
use crate::db::open_reader;
use crate::error::{ErrorKind, PriceError};
use crate::export::{export_archive, export_archive_to};
use crate::import::import_archive;
use crate::record::PriceTotals;
use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rusqlite::Connection;
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const PRICES_PATH: &str = "/api/v0/prices";

/// Name of the multipart field carrying the archive
pub const UPLOAD_FIELD: &str = "file";

const EXPORT_FILENAME: &str = "response.zip";
const STREAM_CHUNK_SIZE: usize = 64 * 1024;
const STREAM_CHANNEL_DEPTH: usize = 8;

pub type SharedDb = Arc<Mutex<Connection>>;

/// Shared application state
///
/// `db` serves imports and buffered exports. Streaming exports open their own
/// read-only connection to `database` so a slow client never holds `db`.
#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub database: PathBuf,
    pub export_mode: ExportMode,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(conn: Connection, config: &Config) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            database: config.database.clone(),
            export_mode: config.export_mode,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route(PRICES_PATH, get(get_prices).post(post_prices))
        .route("/api/v0/prices/", get(get_prices).post(post_prices))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Error boundary
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.to_string(),
        }
    }
}

impl From<PriceError> for ApiError {
    fn from(err: PriceError) -> Self {
        match err.kind() {
            ErrorKind::ClientInput => {
                tracing::warn!(error = %err, "Request rejected");
                Self {
                    status: StatusCode::BAD_REQUEST,
                    message: err.to_string(),
                }
            }
            ErrorKind::Storage => {
                tracing::error!(error = %err, "Storage failure");
                Self::internal("storage failure")
            }
            ErrorKind::Serialization => {
                tracing::error!(error = %err, "Serialization failure");
                Self::internal("failed to build archive")
            }
            ErrorKind::Internal => {
                tracing::error!(error = %err, "Internal failure");
                Self::internal("Internal Server Error")
            }
        }
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        tracing::error!(error = %err, "Pipeline task did not complete");
        Self::internal("Internal Server Error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// A panic while holding the lock leaves the connection usable: the open
/// transaction was rolled back when it was dropped during unwinding.
fn lock_db(db: &SharedDb) -> MutexGuard<'_, Connection> {
    db.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Database lock was poisoned; recovering");
        PoisonError::into_inner(poisoned)
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

/// POST /api/v0/prices - import a ZIP of CSV files
async fn post_prices(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PriceTotals>, ApiError> {
    let mut multipart = multipart.map_err(|e| PriceError::Upload {
        message: e.body_text(),
    })?;
    let archive = read_upload(&mut multipart).await?;

    let db = state.db.clone();
    let totals = tokio::task::spawn_blocking(move || {
        let mut conn = lock_db(&db);
        import_archive(&mut conn, &archive)
    })
    .await??;

    Ok(Json(totals))
}

async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, PriceError> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let bytes = field.bytes().await.map_err(upload_error)?;
        tracing::info!(file = ?file_name, bytes = bytes.len(), "Upload received");
        return Ok(bytes);
    }

    Err(PriceError::Upload {
        message: format!("missing multipart field {:?}", UPLOAD_FIELD),
    })
}

fn upload_error(err: MultipartError) -> PriceError {
    PriceError::Upload {
        message: err.to_string(),
    }
}

/// GET /api/v0/prices - export every record as data.csv inside a ZIP
async fn get_prices(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.export_mode {
        ExportMode::Buffered => {
            let db = state.db.clone();
            let archive = tokio::task::spawn_blocking(move || {
                let conn = lock_db(&db);
                export_archive(&conn)
            })
            .await??;
            Ok((archive_headers(), archive).into_response())
        }
        ExportMode::Streaming => {
            let database = state.database.clone();
            let reader = tokio::task::spawn_blocking(move || open_reader(&database)).await??;
            Ok(stream_export(reader))
        }
    }
}

fn archive_headers() -> [(header::HeaderName, String); 2] {
    [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", EXPORT_FILENAME),
        ),
    ]
}

/// Headers go out immediately; a failure after that aborts the body mid-archive.
fn stream_export(conn: Connection) -> Response {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(STREAM_CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let sink = ChunkSender {
            tx: tx.clone(),
            buf: Vec::with_capacity(STREAM_CHUNK_SIZE),
        };

        if let Err(err) = export_archive_to(&conn, sink) {
            tracing::error!(error = %err, "Streaming export failed; response truncated");
            // Fails only if the client already went away
            let _ = tx.blocking_send(Err(io::Error::new(io::ErrorKind::Other, err.to_string())));
        }
    });

    (archive_headers(), Body::from_stream(ReceiverStream::new(rx))).into_response()
}

/// Blocking writer that forwards fixed-size chunks to the response body
struct ChunkSender {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: Vec<u8>,
}

impl ChunkSender {
    fn send_buffered(&mut self) -> io::Result<()> {
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buf,
            Vec::with_capacity(STREAM_CHUNK_SIZE),
        ));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }
}

impl Write for ChunkSender {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= STREAM_CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.send_buffered()?;
        }
        Ok(())
    }
}
