//! Application state: server settings, the hint coordinator, OCR, and the rate limiter.
//!
//! This module owns:
//!   - the process-wide health registry (through the coordinator's caller)
//!   - the hint coordinator, present only when the provider is configured
//!   - the optional text extractor used by the OCR route
//!   - the in-memory rate limiter guarding `/ai/*`
//!
//! Without GEMINI_API_KEY the service still starts; hint and OCR routes then
//! answer with their failure envelopes.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::caller::BackendCaller;
use crate::config::{load_hints_config_from_env, ServerSettings};
use crate::coordinator::HintCoordinator;
use crate::gemini::Gemini;
use crate::orchestrator::FallbackOrchestrator;
use crate::provider::TextExtractor;
use crate::registry::HealthRegistry;
use crate::routes::rate_limit::RateLimiter;

pub struct AppState {
    pub settings: ServerSettings,
    pub hints: Option<HintCoordinator>,
    pub ocr: Option<Arc<dyn TextExtractor>>,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        settings: ServerSettings,
        hints: Option<HintCoordinator>,
        ocr: Option<Arc<dyn TextExtractor>>,
        limiter: RateLimiter,
    ) -> Self {
        Self { settings, hints, ocr, limiter }
    }

    /// Build state from env: load config, init the Gemini client, wire the fallback stack.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Self {
        let settings = ServerSettings::from_env();
        let cfg = load_hints_config_from_env();

        let Some(gemini) = Gemini::from_env().map(Arc::new) else {
            warn!(target: "algohints_backend", "Gemini disabled (no GEMINI_API_KEY). Hint and OCR requests will fail.");
            return Self::new(settings, None, None, RateLimiter::default());
        };
        info!(target: "algohints_backend", base_url = %gemini.base_url, ocr_model = %gemini.ocr_model, "Gemini enabled.");

        let registry = Arc::new(HealthRegistry::new(cfg.fallback.exhaustion_ttl()));
        let caller = BackendCaller::new(
            gemini.clone(),
            registry,
            cfg.prompts.system_instruction.as_str().into(),
            cfg.fallback.attempt_timeout(),
        );
        let coordinator = HintCoordinator::new(
            FallbackOrchestrator::new(caller),
            cfg.fallback.preference_list(),
            cfg.prompts.clone(),
        );
        info!(
            target: "algohints_backend",
            models = ?coordinator.preferences(),
            attempt_timeout = ?cfg.fallback.attempt_timeout(),
            exhaustion_ttl = ?cfg.fallback.exhaustion_ttl(),
            "Model fallback configured"
        );

        let ocr: Arc<dyn TextExtractor> = gemini;
        Self::new(settings, Some(coordinator), Some(ocr), RateLimiter::default())
    }
}
