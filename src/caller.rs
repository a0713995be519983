//! Single-attempt backend caller.
//!
//! One call to the provider for one backend, bounded by an optional timeout.
//! The outcome is classified and written to the health registry here, so both
//! the orchestrator and the coordinator's pinned attempts keep it current.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::domain::BackendId;
use crate::error::GenerateError;
use crate::provider::Generator;
use crate::registry::HealthRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
  /// Rate or usage limit; the backend is now marked exhausted.
  Quota,
  /// Any other provider error, including timeouts.
  Other,
  /// Skipped without a network call because the backend was already exhausted.
  Skipped,
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
  Success(String),
  Failure { kind: FailureKind, reason: String },
}

#[derive(Clone)]
pub struct BackendCaller {
  generator: Arc<dyn Generator>,
  registry: Arc<HealthRegistry>,
  system_instruction: Arc<str>,
  attempt_timeout: Option<Duration>,
}

impl BackendCaller {
  pub fn new(
    generator: Arc<dyn Generator>,
    registry: Arc<HealthRegistry>,
    system_instruction: Arc<str>,
    attempt_timeout: Option<Duration>,
  ) -> Self {
    Self { generator, registry, system_instruction, attempt_timeout }
  }

  pub fn registry(&self) -> &HealthRegistry { &self.registry }

  /// Never errors: every failure comes back as `Outcome::Failure`.
  #[instrument(level = "debug", skip(self, backend, prompt), fields(%backend, prompt_len = prompt.len()))]
  pub async fn attempt(&self, backend: &BackendId, prompt: &str) -> Outcome {
    if self.registry.is_exhausted(backend) {
      info!(target: "fallback", %backend, "Skipping backend due to previous quota exceeded error");
      return Outcome::Failure { kind: FailureKind::Skipped, reason: "backend quota exhausted".into() };
    }

    info!(target: "fallback", %backend, "Attempting generation");
    let start = Instant::now();
    let call = self.generator.generate(backend, &self.system_instruction, prompt);
    let result = match self.attempt_timeout {
      Some(limit) => match tokio::time::timeout(limit, call).await {
        Ok(r) => r,
        Err(_) => Err(GenerateError::Timeout(limit)),
      },
      None => call.await,
    };
    let elapsed = start.elapsed();

    match result {
      Ok(text) => {
        self.registry.record_success(backend);
        info!(target: "fallback", %backend, ?elapsed, text_len = text.len(), "Generation succeeded");
        Outcome::Success(text)
      }
      Err(e) if e.is_quota() => {
        warn!(target: "fallback", %backend, ?elapsed, error = %e, "Quota failure");
        self.registry.mark_exhausted(backend);
        Outcome::Failure { kind: FailureKind::Quota, reason: e.to_string() }
      }
      Err(e) => {
        warn!(target: "fallback", %backend, ?elapsed, error = %e, "Generation failed");
        Outcome::Failure { kind: FailureKind::Other, reason: e.to_string() }
      }
    }
  }
}
