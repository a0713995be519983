//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs basic request/result info.

use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, Multipart, State,
    },
    response::IntoResponse,
    Json,
};
use tracing::{error, info, instrument, warn};

use crate::error::{ApiError, HintError};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_root() -> impl IntoResponse {
    Json(RootOut {
        success: true,
        message: "DSA Hint Generator API is running",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
    Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_get_review(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<HintIn>, JsonRejection>,
) -> Result<Json<HintOut>, ApiError> {
    let prompt = match payload {
        Ok(Json(HintIn { prompt: Some(p) })) if !p.trim().is_empty() => p,
        Ok(_) => return Err(ApiError::InvalidProblemStatement),
        Err(rejection) => {
            warn!(target: "hints", error = %rejection, "Rejected hint request body");
            return Err(ApiError::InvalidProblemStatement);
        }
    };
    let expose = state.settings.expose_error_details();

    let Some(coordinator) = &state.hints else {
        error!(target: "hints", "Hint request received but no model provider is configured");
        return Err(ApiError::HintsFailed {
            detail: expose.then(|| "GEMINI_API_KEY is not set".to_string()),
        });
    };

    match coordinator.produce_hints(&prompt).await {
        Ok(data) => {
            info!(target: "hints", model = %data.model_used, "HTTP hints served");
            Ok(Json(HintOut { success: true, data }))
        }
        Err(HintError::EmptyProblemStatement) => Err(ApiError::InvalidProblemStatement),
        Err(e) => {
            error!(target: "hints", error = %e.detail(), "Error generating hints");
            Err(ApiError::HintsFailed { detail: expose.then(|| e.detail()) })
        }
    }
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_ocr(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrOut>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!(target: "ocr", error = %e, "Rejected OCR upload");
        ApiError::NoImage
    })?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(target: "ocr", error = %e, "Malformed multipart body");
        ApiError::NoImage
    })? {
        if field.name() != Some("image") {
            continue;
        }
        let mime = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            warn!(target: "ocr", error = %e, "Failed to read uploaded image");
            ApiError::NoImage
        })?;
        upload = Some((bytes, mime));
        break;
    }

    let Some((bytes, mime)) = upload.filter(|(b, _)| !b.is_empty()) else {
        return Err(ApiError::NoImage);
    };
    if !mime.starts_with("image/") {
        warn!(target: "ocr", %mime, "Upload is not an image");
        return Err(ApiError::NoImage);
    }

    let Some(extractor) = &state.ocr else {
        error!(target: "ocr", "OCR request received but no model provider is configured");
        return Err(ApiError::OcrFailed);
    };

    match extractor.extract_text(&bytes, &mime).await {
        Ok(text) => {
            info!(target: "ocr", image_len = bytes.len(), text_len = text.len(), "OCR text extracted");
            Ok(Json(OcrOut { success: true, text }))
        }
        Err(e) => {
            error!(target: "ocr", error = %e, "OCR error");
            Err(ApiError::OcrFailed)
        }
    }
}

pub async fn http_not_found() -> ApiError {
    ApiError::NotFound
}
