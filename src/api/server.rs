//! HTTP server implementation for the upload front-end

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::models::{ErrorResponse, RecognizeResponse};
use crate::config::Config;
use crate::pipeline::{AudioBlob, Transcript, TranscriptPipeline};
use crate::recognition::LanguageTag;

/// Content types the upload endpoint accepts, with the extension hint handed
/// to the transcoder.
const ALLOWED_CONTENT_TYPES: [(&str, &str); 5] = [
    ("video/ogg", "ogg"),
    ("audio/ogg", "ogg"),
    ("audio/mpeg", "mp3"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
];

const FORMAT_REJECTED: &str = "shu formatdagi audio qabul qilinadi: ogg, mp3, wav";
const UNRECOGNIZED: &str = "Audio tanib bo'lmadi.";

fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(allowed, _)| *allowed == content_type)
        .map(|(_, extension)| *extension)
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TranscriptPipeline>,
}

/// Build the application router with CORS, tracing and the upload size bound.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/recognize/", post(recognize_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Configure and start the HTTP server
pub async fn start_http_server(state: AppState, config: &Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = build_router(state, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 API server listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ovoz",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Voice recognition handler: multipart `file` + `language` in, grouped
/// digits out.
async fn recognize_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut language: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read multipart body: {e}");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read multipart: {e}"),
                );
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((content_type, bytes.to_vec())),
                    Err(e) => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            format!("Failed to read file: {e}"),
                        )
                    }
                }
            }
            "language" => match field.text().await {
                Ok(value) => language = Some(value),
                Err(e) => {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read language: {e}"),
                    )
                }
            },
            _ => {}
        }
    }

    let Some((content_type, bytes)) = file else {
        return error_response(StatusCode::BAD_REQUEST, "No file uploaded".to_string());
    };

    let Some(extension) = extension_for(&content_type) else {
        warn!("Rejected upload with content type {content_type}");
        return error_response(StatusCode::BAD_REQUEST, FORMAT_REJECTED.to_string());
    };

    let Some(language) = language.as_deref().and_then(LanguageTag::from_locale) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "language must be uz_UZ or ru_RU".to_string(),
        );
    };

    let transcript = state
        .pipeline
        .transcribe(AudioBlob::new(bytes, extension), language)
        .await;

    transcript_response(language, transcript)
}

/// Map a pipeline outcome onto the HTTP wire format.
fn transcript_response(language: LanguageTag, transcript: Transcript) -> Response {
    match transcript {
        Transcript::Recognized(text) => (
            StatusCode::OK,
            Json(RecognizeResponse {
                language: language.locale().to_string(),
                text,
            }),
        )
            .into_response(),
        Transcript::Unrecognized => {
            error_response(StatusCode::BAD_REQUEST, UNRECOGNIZED.to_string())
        }
        Transcript::BackendUnavailable(detail) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Google API xatosi: {detail}"),
        ),
        Transcript::InternalError(detail) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Noma'lum xato: {detail}"),
        ),
    }
}

fn error_response(status: StatusCode, detail: String) -> Response {
    (status, Json(ErrorResponse { detail })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_content_types_map_to_extensions() {
        assert_eq!(extension_for("video/ogg"), Some("ogg"));
        assert_eq!(extension_for("audio/ogg"), Some("ogg"));
        assert_eq!(extension_for("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for("audio/wav"), Some("wav"));
        assert_eq!(extension_for("audio/x-wav"), Some("wav"));
    }

    #[test]
    fn unknown_content_types_are_rejected() {
        assert_eq!(extension_for("image/png"), None);
        assert_eq!(extension_for("audio/flac"), None);
        assert_eq!(extension_for(""), None);
    }

    #[test]
    fn outcome_status_codes() {
        let language = LanguageTag::Uzbek;

        let ok = transcript_response(language, Transcript::Recognized("1234".to_string()));
        assert_eq!(ok.status(), StatusCode::OK);

        let unrecognized = transcript_response(language, Transcript::Unrecognized);
        assert_eq!(unrecognized.status(), StatusCode::BAD_REQUEST);

        let unavailable = transcript_response(
            language,
            Transcript::BackendUnavailable("down".to_string()),
        );
        assert_eq!(unavailable.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let internal =
            transcript_response(language, Transcript::InternalError("boom".to_string()));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
