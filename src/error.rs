//! Error types for the provider, the fallback layers, OCR, and the HTTP boundary.

use std::time::Duration;

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use thiserror::Error;

use crate::domain::{BackendId, HintStage};
use crate::protocol::ErrorOut;

/// Generic message shown to end users when a hint batch fails.
pub const HINTS_FAILED_MESSAGE: &str = "Failed to generate hints. Please try again later.";

/// One failed call to the generation provider.
#[derive(Debug, Error)]
pub enum GenerateError {
  #[error("Gemini HTTP {status}: {message}")]
  Http { status: u16, message: String },

  #[error("transport error: {0}")]
  Transport(String),

  #[error("decode error: {0}")]
  Decode(String),

  #[error("model returned no text")]
  EmptyResponse,

  #[error("attempt timed out after {0:?}")]
  Timeout(Duration),
}

impl GenerateError {
  /// True when the provider rejected the call for rate or usage limits.
  pub fn is_quota(&self) -> bool {
    match self {
      GenerateError::Http { status: 429, .. } => true,
      GenerateError::Http { .. } | GenerateError::Transport(_) | GenerateError::Decode(_) => {
        let msg = self.to_string().to_lowercase();
        msg.contains("quota") || msg.contains("429") || msg.contains("resource_exhausted")
      }
      GenerateError::EmptyResponse | GenerateError::Timeout(_) => false,
    }
  }
}

impl From<reqwest::Error> for GenerateError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      GenerateError::Decode(e.to_string())
    } else {
      GenerateError::Transport(e.to_string())
    }
  }
}

/// Every candidate in one orchestrator call failed.
#[derive(Debug, Error)]
pub enum FallbackError {
  #[error("All models failed to generate a response (tried: {})", format_backends(.attempted))]
  AllBackendsFailed { attempted: Vec<BackendId> },
}

fn format_backends(list: &[BackendId]) -> String {
  if list.is_empty() {
    return "none".into();
  }
  list.iter().map(BackendId::as_str).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Error)]
pub enum HintError {
  #[error("problem statement must not be empty")]
  EmptyProblemStatement,

  #[error("Failed to generate hints. Please try again later.")]
  GenerationFailed { stage: HintStage, cause: String },
}

impl HintError {
  /// Internal detail text, safe to show only in development mode.
  pub fn detail(&self) -> String {
    match self {
      HintError::EmptyProblemStatement => self.to_string(),
      HintError::GenerationFailed { stage, cause } => format!("stage {stage}: {cause}"),
    }
  }
}

#[derive(Debug, Error)]
pub enum OcrError {
  #[error("text extraction failed: {0}")]
  Provider(#[from] GenerateError),

  #[error("no text found in image")]
  NoText,
}

/// Errors surfaced by HTTP handlers, rendered as the `{ success: false, .. }` envelope.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("A valid problem statement is required")]
  InvalidProblemStatement,

  #[error("Failed to generate hints. Please try again later.")]
  HintsFailed { detail: Option<String> },

  #[error("No image uploaded")]
  NoImage,

  #[error("OCR processing failed")]
  OcrFailed,

  #[error("Too many requests, please try again later.")]
  RateLimited,

  #[error("Endpoint not found")]
  NotFound,
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::InvalidProblemStatement | ApiError::NoImage => StatusCode::BAD_REQUEST,
      ApiError::HintsFailed { .. } | ApiError::OcrFailed => StatusCode::INTERNAL_SERVER_ERROR,
      ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
      ApiError::NotFound => StatusCode::NOT_FOUND,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = match &self {
      // OCR responses put their text under `error`.
      ApiError::NoImage | ApiError::OcrFailed => ErrorOut::with_error(self.to_string()),
      ApiError::HintsFailed { detail } => ErrorOut {
        success: false,
        message: Some(HINTS_FAILED_MESSAGE.to_string()),
        error: detail.clone(),
      },
      _ => ErrorOut::with_message(self.to_string()),
    };
    (status, Json(body)).into_response()
  }
}
