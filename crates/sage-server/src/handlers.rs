//! Request handlers for the Sage API.

use std::convert::Infallible;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{error, info, instrument, warn};

use sage::domain::{ChunkPoint, Document, StructuralChunk};
use sage::error::Error;
use sage::parser::ParseMetadata;
use sage::query::answer_stream;

use crate::app::AppState;

#[derive(Debug, Default, Deserialize)]
struct IngestMetadata {
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Accepted on the wire but not interpreted yet.
    #[serde(default)]
    #[allow(dead_code)]
    pub filters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub hash: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `POST /api/v1/ingest`: multipart upload with `file` and `metadata`.
#[instrument(skip(state, multipart))]
pub async fn ingest(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename = String::new();
    let mut mime_type = String::from("application/octet-stream");
    let mut metadata = IngestMetadata::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    &format!("failed to parse form: {err}"),
                );
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                filename = field.file_name().unwrap_or("upload").to_string();
                if let Some(content_type) = field.content_type() {
                    mime_type = content_type.to_string();
                }
                match field.bytes().await {
                    Ok(bytes) => file_bytes = Some(bytes.to_vec()),
                    Err(err) => {
                        return json_error(
                            StatusCode::BAD_REQUEST,
                            &format!("failed to read file: {err}"),
                        );
                    }
                }
            }
            Some("metadata") => {
                if let Ok(raw) = field.text().await {
                    metadata = serde_json::from_str(&raw).unwrap_or_default();
                }
            }
            _ => {}
        }
    }

    let Some(bytes) = file_bytes else {
        return json_error(StatusCode::BAD_REQUEST, "missing 'file' parameter");
    };

    let file_hash = hex::encode(Sha256::digest(&bytes));
    info!(filename, size = bytes.len(), hash = %file_hash, "received ingest request");

    let doc = Document {
        id: 0,
        file_hash: file_hash.clone(),
        title: if metadata.title.is_empty() {
            filename.clone()
        } else {
            metadata.title.clone()
        },
        author: metadata.author.clone(),
        file_path: filename.clone(),
        file_size: bytes.len() as i64,
        mime_type: mime_type.clone(),
        created_at: 0,
        updated_at: 0,
    };

    let saga = match state.orchestrator.start_or_resume(&doc).await {
        Ok(saga) => saga,
        Err(Error::AlreadyIngested { hash }) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "hash": hash, "status": "completed" })),
            )
                .into_response();
        }
        Err(err) => {
            error!(error = %err, "failed to initialize ingestion");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to initialize ingestion",
            );
        }
    };

    // Parse synchronously: a worker failure must surface on this request.
    let parse_meta = ParseMetadata {
        filename,
        mime_type,
        document_id: saga.document_id.to_string(),
    };
    let chunks = match state.parser.parse(&parse_meta, bytes).await {
        Ok(chunks) => chunks,
        Err(err) => {
            error!(error = %err, "parser worker failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "worker processing failed");
        }
    };

    // Embedding and the dual-store saga run in the background; the saga row
    // carries progress from here on.
    let title = doc.title.clone();
    let state_for_task = state.clone();
    let saga_for_task = saga.clone();
    tokio::spawn(async move {
        run_ingestion(state_for_task, saga_for_task, title, chunks).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "saga_id": saga.id, "status": "processing" })),
    )
        .into_response()
}

async fn run_ingestion(
    state: AppState,
    saga: sage::domain::IngestSaga,
    title: String,
    chunks: Vec<StructuralChunk>,
) {
    let doc_id = saga.document_id.to_string();
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

    let embedded = match state.batcher.generate(&texts, "dense", "retrieval").await {
        Ok((embedded, _)) => embedded,
        Err(err) => {
            error!(saga_id = saga.id, error = %err, "failed to generate embeddings");
            return;
        }
    };

    let points: Vec<ChunkPoint> = embedded
        .into_iter()
        .zip(&chunks)
        .enumerate()
        .map(|(index, (e, chunk))| ChunkPoint {
            chunk_id: ChunkPoint::id_for(&doc_id, index),
            text: e.text,
            vector: e.vector,
            page_number: chunk.page_number,
            kind: chunk.kind,
        })
        .collect();

    if let Err(err) = state
        .orchestrator
        .run_ingestion_saga(&saga, &title, &points, &chunks)
        .await
    {
        warn!(saga_id = saga.id, error = %err, "ingestion saga failed");
    }
}

/// `GET /api/v1/ingest/status?hash=<hex>`.
#[instrument(skip(state))]
pub async fn ingest_status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Response {
    let hash = params.hash.to_lowercase();
    if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return json_error(StatusCode::BAD_REQUEST, "hash must be 64 hex characters");
    }

    match state.orchestrator.get_document_status(&hash).await {
        Ok(saga) => {
            let updated_at = chrono::DateTime::from_timestamp(saga.updated_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            (
                StatusCode::OK,
                Json(json!({
                    "saga_id": saga.id,
                    "document_id": saga.document_id,
                    "status": saga.status.label(),
                    "current_step": saga.current_step.label(),
                    "updated_at": updated_at,
                })),
            )
                .into_response()
        }
        Err(Error::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "not_started" })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "status lookup failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "status lookup failed")
        }
    }
}

/// `GET /api/v1/documents/{document_id}/status`.
#[instrument(skip(state))]
pub async fn document_status(
    State(state): State<AppState>,
    axum::extract::Path(document_id): axum::extract::Path<i64>,
) -> Response {
    match state.orchestrator.get_document_saga(document_id).await {
        Ok(saga) => {
            let updated_at = chrono::DateTime::from_timestamp(saga.updated_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            (
                StatusCode::OK,
                Json(json!({
                    "saga_id": saga.id,
                    "document_id": saga.document_id,
                    "status": saga.status.label(),
                    "current_step": saga.current_step.label(),
                    "updated_at": updated_at,
                })),
            )
                .into_response()
        }
        Err(Error::NotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, "document not found")
        }
        Err(err) => {
            error!(error = %err, "document status lookup failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "status lookup failed")
        }
    }
}

/// `HEAD /api/v1/documents/{document_id}`: existence check.
#[instrument(skip(state))]
pub async fn document_exists(
    State(state): State<AppState>,
    axum::extract::Path(document_id): axum::extract::Path<i64>,
) -> StatusCode {
    match state.orchestrator.document_exists(document_id).await {
        Ok(true) => StatusCode::OK,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(err) => {
            error!(error = %err, "document existence check failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// `POST /api/v1/query`: streams generation events as SSE.
#[instrument(skip(state, request), fields(session_id = request.session_id.as_deref().unwrap_or("")))]
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    if request.query.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "query field is required"));
    }

    info!("processing query request");
    let mut events = answer_stream(state.generator, request.query);

    let stream = async_stream::stream! {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => yield Ok(Event::default().data(payload)),
                Err(err) => warn!(error = %err, "failed to encode event"),
            }
        }
        // Channel closed: end of answer.
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `GET /healthz` liveness probe.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `GET /readyz` readiness probe over the downstream stores.
pub async fn readyz(State(state): State<AppState>) -> Response {
    let vector = state.vector_store.ping().await;
    let graph = state.graph_store.ping().await;

    match (&vector, &graph) {
        (Ok(()), Ok(())) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        _ => {
            let detail = json!({
                "status": "not_ready",
                "vector_store": vector.is_ok(),
                "graph_store": graph.is_ok(),
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(detail)).into_response()
        }
    }
}
