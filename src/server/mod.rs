
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::QaError;
use crate::answer::AnswerComposer;
use crate::completion::CompletionClient;
use crate::config::{API_KEY_ENV, Config};
use crate::corpus::{SharedCorpus, build_corpus};
use crate::embeddings::{TextEncoder, build_encoder};

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub corpus: SharedCorpus,
    pub composer: Arc<AnswerComposer>,
    pub encoder: Arc<dyn TextEncoder>,
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    question: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    answer: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    message: String,
    ready: bool,
    documents: usize,
    chunks: usize,
}

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    documents: usize,
    chunks: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: String,
}

type HandlerError = (StatusCode, Json<ErrorBody>);

/// Build the application router
#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/status", get(status_handler))
        .route("/rebuild", post(rebuild_handler))
        .with_state(state)
}

/// Build the corpus, then serve until the process is stopped.
///
/// The startup build is synchronous: the listener does not bind until the
/// corpus is ready, so no request can observe a half-built index. An empty
/// corpus is fatal here; there would be nothing to serve.
#[inline]
pub async fn run(config: Config) -> crate::Result<()> {
    let config = Arc::new(config);
    let encoder: Arc<dyn TextEncoder> = Arc::from(build_encoder(&config.embedding)?);

    let api_key = config.completion_api_key();
    if api_key.is_none() {
        warn!(
            "{API_KEY_ENV} is not set; queries will return an error until it is provided"
        );
    }
    let completion = CompletionClient::new(&config.completion, api_key);
    let composer = Arc::new(AnswerComposer::new(
        Arc::clone(&encoder),
        completion,
        config.retrieval.top_k,
    ));

    let corpus = SharedCorpus::new();
    let built = {
        let config = Arc::clone(&config);
        let encoder = Arc::clone(&encoder);
        tokio::task::spawn_blocking(move || build_corpus(&config, encoder.as_ref()))
            .await
            .map_err(|e| QaError::Ingest(format!("Corpus build task failed: {e}")))??
    };
    corpus.replace(built).await;

    let state = AppState {
        corpus,
        composer,
        encoder,
        config: Arc::clone(&config),
    };

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| QaError::Config(format!("Failed to bind {addr}: {e}")))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| QaError::Other(anyhow::anyhow!("Server shutdown: {e}")))?;

    Ok(())
}

/// POST /query: answer a question against the current corpus
async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, HandlerError> {
    let Json(request) = payload.map_err(|rejection| {
        bad_request(format!("Invalid request body: {rejection}"))
    })?;

    let question = request.question.trim().to_string();
    if question.is_empty() {
        return Err(bad_request("The question must not be empty".to_string()));
    }

    let corpus = state.corpus.get().await;
    let composer = Arc::clone(&state.composer);

    let answer = tokio::task::spawn_blocking(move || composer.answer(corpus.as_deref(), &question))
        .await
        .map_err(|e| internal_error(format!("Answer task failed: {e}")))?
        .map_err(error_response)?;

    Ok(Json(QueryResponse { answer }))
}

/// GET /status: liveness plus corpus counts
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let corpus = state.corpus.get().await;
    let (documents, chunks) = corpus
        .as_ref()
        .map_or((0, 0), |c| (c.stats.documents_loaded, c.stats.chunks_created));

    Json(StatusResponse {
        message: "docs-qa is live".to_string(),
        ready: corpus.is_some(),
        documents,
        chunks,
    })
}

/// POST /rebuild: rebuild the corpus off to the side and swap it in.
/// In-flight queries keep the corpus they already hold; a failed rebuild
/// leaves the current corpus serving.
async fn rebuild_handler(
    State(state): State<AppState>,
) -> Result<Json<RebuildResponse>, HandlerError> {
    info!("Rebuild requested");

    let config = Arc::clone(&state.config);
    let encoder = Arc::clone(&state.encoder);
    let built = tokio::task::spawn_blocking(move || build_corpus(&config, encoder.as_ref()))
        .await
        .map_err(|e| internal_error(format!("Rebuild task failed: {e}")))?
        .map_err(error_response)?;

    let response = RebuildResponse {
        documents: built.stats.documents_loaded,
        chunks: built.stats.chunks_created,
    };
    state.corpus.replace(built).await;

    Ok(Json(response))
}

fn error_response(err: QaError) -> HandlerError {
    let status = match &err {
        QaError::IndexNotReady => StatusCode::SERVICE_UNAVAILABLE,
        QaError::Completion(_) | QaError::Embedding(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Request failed: {err}");
    }

    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

fn bad_request(message: String) -> HandlerError {
    warn!("Bad request: {message}");
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message }))
}

fn internal_error(message: String) -> HandlerError {
    error!("{message}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { error: message }),
    )
}
