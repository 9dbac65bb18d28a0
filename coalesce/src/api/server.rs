//! HTTP Server for the coalesce API.
//!
//! Provides REST endpoints to run the step over an uploaded CSV and to check
//! a configuration against an upstream schema.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/coalesce`   | Coalesce an uploaded CSV             |
//! | POST   | `/api/check`      | Design-time configuration check      |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::Multipart,
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::types::{error_response, CheckRequest, CheckResponse, CoalesceResponse};
use crate::config::{parse_flag, CoalesceConfig};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::logs::{log_info, LOG_BROADCASTER};
use crate::models::RowMeta;
use crate::transform::coalescer::{RowCoalescer, DEFAULT_STEP_NAME};
use crate::transform::pipeline::{coalesce_bytes, RunOptions};

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(PipelineError::Csv(_) | PipelineError::Config(_)) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Pipeline(PipelineError::Step(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

/// Build the application router
pub fn router() -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/coalesce", post(coalesce_upload))
        .route("/api/check", post(check_config))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
}

/// Start the HTTP server
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Coalesce server running on http://localhost:{}", port);
    println!("   POST /api/coalesce - Coalesce a CSV file (multipart: file, config)");
    println!("   POST /api/check    - Check a configuration");
    println!("   GET  /api/logs     - SSE log stream");
    println!("   GET  /health       - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router()).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "coalesce",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "coalesce": "POST /api/coalesce",
            "check": "POST /api/check",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // lagged receivers skip the entries they missed
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

/// Coalesce endpoint.
///
/// Multipart fields: `file` (CSV), `config` (JSON document), and optionally
/// `typed_header`, `empty_is_null` (flags) and `step_name`.
async fn coalesce_upload(mut multipart: Multipart) -> ServerResult<Json<CoalesceResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut config_text: Option<String> = None;
    let mut options = RunOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                file_data = Some(bytes.to_vec());
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                match name.as_str() {
                    "config" => config_text = Some(text),
                    "typed_header" => options.parse.typed_header = parse_flag(&text).unwrap_or(false),
                    "empty_is_null" => options.empty_is_null = parse_flag(&text),
                    "step_name" if !text.trim().is_empty() => options.step_name = text,
                    _ => {}
                }
            }
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;
    let config_text =
        config_text.ok_or_else(|| ServerError::BadRequest("No config provided".to_string()))?;
    let config = CoalesceConfig::from_json(&config_text).map_err(PipelineError::from)?;

    log_info(format!(
        "📄 New upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let result = tokio::task::spawn_blocking(move || coalesce_bytes(&bytes, config, &options))
        .await
        .map_err(|e| PipelineError::Output(format!("Run aborted: {}", e)))??;

    Ok(Json(CoalesceResponse::from(result)))
}

/// Design-time check endpoint
async fn check_config(Json(request): Json<CheckRequest>) -> ServerResult<Json<CheckResponse>> {
    let config = CoalesceConfig::from_value(&request.config).map_err(PipelineError::from)?;
    let step_name = request.step_name.unwrap_or_else(|| DEFAULT_STEP_NAME.to_string());
    let coalescer = RowCoalescer::configure(config)
        .map_err(PipelineError::from)?
        .named(step_name);

    let prev = request.fields.map(RowMeta::from_fields);
    let remarks = coalescer.check(prev.as_ref(), &request.input_steps);
    let output_fields = prev
        .as_ref()
        .and_then(|meta| coalescer.derive_schema(meta).ok())
        .map(|meta| meta.fields().to_vec());

    Ok(Json(CheckResponse::new(remarks, output_fields)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;

    #[tokio::test]
    async fn test_check_endpoint() {
        let request: CheckRequest = serde_json::from_value(json!({
            "config": {
                "fields": [{ "output_field": "phone", "input_fields": ["home", "work", ""] }]
            },
            "fields": [
                { "name": "home", "type": "String" },
                { "name": "work", "type": "String" }
            ],
            "inputSteps": ["csv input"]
        }))
        .unwrap();

        let Json(response) = check_config(Json(request)).await.unwrap();
        assert_eq!(response.status, "ok");
        assert_eq!(response.remarks.len(), 2);
        let fields = response.output_fields.unwrap();
        assert_eq!(fields.last().unwrap().name, "phone");
    }

    #[tokio::test]
    async fn test_check_endpoint_rejects_bad_config() {
        let request: CheckRequest = serde_json::from_value(json!({
            "config": { "fields": [{ "output_field": "" }] }
        }))
        .unwrap();

        assert!(matches!(
            check_config(Json(request)).await,
            Err(ServerError::Pipeline(PipelineError::Config(_)))
        ));
    }

    #[test]
    fn test_error_status() {
        let bad = ServerError::BadRequest("no file".into()).into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let step = ServerError::Pipeline(PipelineError::Step(StepError::SchemaConflict {
            field: "out".into(),
        }))
        .into_response();
        assert_eq!(step.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
