//! HTTP API server implementation

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::core::config::ServiceConfig;
use crate::core::errors::TranslationError;
use crate::core::hub::resolve_artifacts;
use crate::core::models::TranslationRequest;
use crate::core::translator::Translator;

/// Message attached to every successful translation
pub const MODEL_LOADED_MESSAGE: &str = "Model loaded successfully";

/// Extra message attached to length-exceeded errors
pub const LENGTH_EXCEEDED_MESSAGE: &str = "Input sentence length exceeds max_length";

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Application state
#[derive(Clone)]
pub struct AppState {
    translator: Arc<Translator>,
    legacy_responses: bool,
}

impl AppState {
    /// Share one loaded translator across handlers
    pub fn new(translator: Arc<Translator>, legacy_responses: bool) -> Self {
        Self {
            translator,
            legacy_responses,
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    model: String,
}

/// Successful translation response
#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    /// English output, or the failure text in legacy mode
    #[serde(rename = "translatedText")]
    pub translated_text: String,
    /// Always the model-loaded notice
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable failure
    pub error: String,
    /// Extra context, set for length-exceeded input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Stable machine-readable code; absent in legacy mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Landing page handler
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check handler
async fn health_check(State(state): State<Arc<AppState>>) -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.translator.model_name().to_string(),
    })
}

/// Translation handler
async fn translate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TranslationRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected translation request: {}", rejection.body_text());
            let err = TranslationError::MalformedRequest(rejection.body_text());
            return error_response(&err, state.legacy_responses);
        }
    };

    let text = match request.require_text() {
        Ok(text) => text.to_string(),
        Err(err) => return error_response(&err, state.legacy_responses),
    };

    // inference blocks, keep it off the async workers
    let translator = state.translator.clone();
    let result = tokio::task::spawn_blocking(move || translator.translate(&text)).await;

    match result {
        Ok(Ok(translated_text)) => (
            StatusCode::OK,
            axum::Json(TranslateResponse {
                translated_text,
                message: MODEL_LOADED_MESSAGE.to_string(),
            }),
        )
            .into_response(),
        Ok(Err(err)) => {
            if err.is_inference_error() {
                error!("Translation failed: {}", err);
            } else {
                warn!("Rejected translation input: {}", err);
            }
            error_response(&err, state.legacy_responses)
        }
        Err(join_error) => {
            let err = TranslationError::Generation(join_error.to_string());
            error!("Translation task failed: {}", err);
            error_response(&err, state.legacy_responses)
        }
    }
}

/// HTTP status for an error in structured mode
pub fn status_for(err: &TranslationError) -> StatusCode {
    match err {
        TranslationError::TooLong { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        err if err.is_input_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render an error either with real status codes or in the always-200 legacy shapes
pub fn error_response(err: &TranslationError, legacy: bool) -> Response {
    if legacy {
        return match err {
            TranslationError::MalformedRequest(_) => (
                StatusCode::OK,
                axum::Json(ErrorResponse {
                    error: err.to_string(),
                    message: None,
                    code: None,
                }),
            )
                .into_response(),
            // validation, length and inference failures travel in the success shape
            _ => (
                StatusCode::OK,
                axum::Json(TranslateResponse {
                    translated_text: err.to_string(),
                    message: MODEL_LOADED_MESSAGE.to_string(),
                }),
            )
                .into_response(),
        };
    }

    let length_message = match err {
        TranslationError::TooLong { .. } => Some(LENGTH_EXCEEDED_MESSAGE.to_string()),
        _ => None,
    };

    (
        status_for(err),
        axum::Json(ErrorResponse {
            error: err.to_string(),
            message: length_message,
            code: Some(err.code().to_string()),
        }),
    )
        .into_response()
}

/// Create the router; CORS is open on `/translate` only
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let translate_routes = Router::new()
        .route("/translate", post(translate))
        .layer(cors);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .merge(translate_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServiceConfig) -> anyhow::Result<()> {
    if config.legacy_responses {
        warn!("Legacy responses enabled: all errors are reported with HTTP 200");
    }

    // model loading failures are fatal
    let artifacts = resolve_artifacts(&config.model, true).await?;
    let translator = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || Translator::load(&config, &artifacts)).await??
    };

    // Create app state
    let state = Arc::new(AppState::new(Arc::new(translator), config.legacy_responses));

    // Create router
    let app = create_router(state);

    // Bind address
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;

    info!("Starting server on {}", listener.local_addr()?);

    // Start server
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
