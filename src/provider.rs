//! Seams to the external model provider. `gemini::Gemini` implements both in production;
//! tests plug in scripted fakes.

use async_trait::async_trait;

use crate::domain::BackendId;
use crate::error::{GenerateError, OcrError};

#[async_trait]
pub trait Generator: Send + Sync {
  /// One generation call against `model`. No retries happen at this layer.
  async fn generate(&self, model: &BackendId, system: &str, user: &str) -> Result<String, GenerateError>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
  /// Transcribe the text visible in an uploaded image.
  async fn extract_text(&self, image: &[u8], mime: &str) -> Result<String, OcrError>;
}
