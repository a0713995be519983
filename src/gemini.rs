//! Minimal Gemini client for our use-cases.
//!
//! We only call `models/{model}:generateContent`, either with a system instruction
//! plus one user turn (hints) or with an inline image (OCR).
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: The API key travels in the `x-goog-api-key` header so it never shows up in logged URLs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::BackendId;
use crate::error::{GenerateError, OcrError};
use crate::provider::{Generator, TextExtractor};

const OCR_INSTRUCTION: &str = "Transcribe all text visible in this image exactly as written. \
Preserve line breaks, numbers, and symbols. Output ONLY the transcribed text, no commentary.";

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub ocr_model: BackendId,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let ocr_model = std::env::var("GEMINI_OCR_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".into());

    let client = match reqwest::Client::builder().timeout(Duration::from_secs(120)).build() {
      Ok(c) => c,
      Err(e) => {
        warn!(target: "gemini", error = %e, "Failed to build HTTP client");
        return None;
      }
    };

    Some(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), ocr_model: BackendId::new(ocr_model) })
  }

  /// Endpoint for one model; the key is sent as a header, not a query parameter.
  fn endpoint(&self, model: &BackendId) -> String {
    format!("{}/models/{}:generateContent", self.base_url, model)
  }

  #[instrument(level = "info", skip(self, model, body), fields(model = %model))]
  async fn generate_content(&self, model: &BackendId, body: &GenerateContentRequest<'_>) -> Result<String, GenerateError> {
    let url = self.endpoint(model);
    let start = Instant::now();

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "algohints-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(body)
      .send()
      .await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_gemini_error(&body).unwrap_or(body);
      return Err(GenerateError::Http { status: status.as_u16(), message });
    }

    let body: GenerateContentResponse = res.json().await?;
    if let Some(usage) = &body.usage_metadata {
      info!(target: "gemini", prompt_tokens = ?usage.prompt_token_count, completion_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }
    let text = response_text(body)?;
    info!(target: "gemini", elapsed = ?start.elapsed(), text_len = text.len(), "Gemini response received");
    Ok(text)
  }
}

#[async_trait]
impl Generator for Gemini {
  async fn generate(&self, model: &BackendId, system: &str, user: &str) -> Result<String, GenerateError> {
    let body = GenerateContentRequest {
      system_instruction: Some(ContentReq { role: None, parts: vec![PartReq::Text { text: system }] }),
      contents: vec![ContentReq { role: Some("user"), parts: vec![PartReq::Text { text: user }] }],
    };
    self.generate_content(model, &body).await
  }
}

#[async_trait]
impl TextExtractor for Gemini {
  #[instrument(level = "info", skip(self, image, mime), fields(image_len = image.len(), %mime))]
  async fn extract_text(&self, image: &[u8], mime: &str) -> Result<String, OcrError> {
    let body = GenerateContentRequest {
      system_instruction: None,
      contents: vec![ContentReq {
        role: Some("user"),
        parts: vec![
          PartReq::Inline { inline_data: InlineData { mime_type: mime.to_string(), data: BASE64.encode(image) } },
          PartReq::Text { text: OCR_INSTRUCTION },
        ],
      }],
    };
    let text = self.generate_content(&self.ocr_model, &body).await?;
    if text.trim().is_empty() {
      return Err(OcrError::NoText);
    }
    Ok(text)
  }
}

// --- generateContent DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<ContentReq<'a>>,
  contents: Vec<ContentReq<'a>>,
}

#[derive(Serialize)]
struct ContentReq<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  role: Option<&'a str>,
  parts: Vec<PartReq<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PartReq<'a> {
  Text { text: &'a str },
  Inline {
    #[serde(rename = "inlineData")]
    inline_data: InlineData,
  },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
  mime_type: String,
  data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  #[serde(default)]
  usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Option<ContentResp>,
}

#[derive(Deserialize)]
struct ContentResp {
  #[serde(default)]
  parts: Vec<PartResp>,
}

#[derive(Deserialize)]
struct PartResp {
  #[serde(default)]
  text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)]
  prompt_token_count: Option<u32>,
  #[serde(default)]
  candidates_token_count: Option<u32>,
  #[serde(default)]
  total_token_count: Option<u32>,
}

/// Concatenated text parts of the first candidate.
fn response_text(body: GenerateContentResponse) -> Result<String, GenerateError> {
  let text: String = body
    .candidates
    .into_iter()
    .next()
    .and_then(|c| c.content)
    .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
    .unwrap_or_default();
  if text.trim().is_empty() {
    return Err(GenerateError::EmptyResponse);
  }
  Ok(text.trim().to_string())
}

/// Try to extract `"{STATUS}: {message}"` from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
    #[serde(default)]
    status: Option<String>,
  }
  let w = serde_json::from_str::<EWrap>(body).ok()?;
  Some(match w.error.status {
    Some(status) => format!("{}: {}", status, w.error.message),
    None => w.error.message,
  })
}
