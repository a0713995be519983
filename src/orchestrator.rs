//! Fallback orchestration across an ordered list of backends.
//!
//! Candidate order for one call:
//!   1. the registry's last successful backend, if any (even when it is not in the list);
//!   2. the preference list in declared order, minus the backend tried in step 1.
//! Exhausted backends are skipped by the caller without a network call. Each
//! candidate gets exactly one attempt; the first success wins.

use tracing::{error, info, instrument};

use crate::caller::{BackendCaller, Outcome};
use crate::domain::{BackendId, Generated};
use crate::error::FallbackError;

#[derive(Clone)]
pub struct FallbackOrchestrator {
  caller: BackendCaller,
}

impl FallbackOrchestrator {
  pub fn new(caller: BackendCaller) -> Self { Self { caller } }

  pub fn caller(&self) -> &BackendCaller { &self.caller }

  #[instrument(level = "info", skip(self, preferences, prompt), fields(candidates = preferences.len()))]
  pub async fn generate(&self, preferences: &[BackendId], prompt: &str) -> Result<Generated, FallbackError> {
    // Captured once so a concurrent success elsewhere cannot cause a repeat attempt here.
    let affinity = self.caller.registry().last_successful();
    let mut attempted = Vec::with_capacity(preferences.len() + 1);

    if let Some(backend) = &affinity {
      info!(target: "fallback", %backend, "Trying previously successful model first");
      attempted.push(backend.clone());
      if let Outcome::Success(text) = self.caller.attempt(backend, prompt).await {
        return Ok(Generated { backend: backend.clone(), text });
      }
      info!(target: "fallback", %backend, "Previously successful model failed, trying others");
    }

    for backend in preferences {
      if affinity.as_ref() == Some(backend) {
        continue;
      }
      attempted.push(backend.clone());
      if let Outcome::Success(text) = self.caller.attempt(backend, prompt).await {
        return Ok(Generated { backend: backend.clone(), text });
      }
    }

    error!(target: "fallback", tried = attempted.len(), "All models failed to generate a response");
    Err(FallbackError::AllBackendsFailed { attempted })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::testing::{caller_with, ids, ScriptedGenerator, Step};

  fn orchestrator(gen: &Arc<ScriptedGenerator>) -> FallbackOrchestrator {
    FallbackOrchestrator::new(caller_with(gen.clone(), None))
  }

  #[tokio::test]
  async fn first_healthy_backend_in_order_wins() {
    let gen = Arc::new(ScriptedGenerator::new().always("a", Step::Fail).always("b", Step::Ok).always("c", Step::Ok));
    let orch = orchestrator(&gen);

    let out = orch.generate(&ids(&["a", "b", "c"]), "p").await.unwrap();
    assert_eq!(out.backend, "b".into());
    assert_eq!(out.text, "b|p");
    assert_eq!(gen.models_called(), vec!["a", "b"]);
  }

  #[tokio::test]
  async fn previous_success_is_tried_first() {
    let gen = Arc::new(ScriptedGenerator::new().queue("a", &[Step::Fail]).always("a", Step::Ok).always("b", Step::Ok));
    let orch = orchestrator(&gen);
    let prefs = ids(&["a", "b"]);

    orch.generate(&prefs, "one").await.unwrap();
    let second = orch.generate(&prefs, "two").await.unwrap();

    assert_eq!(second.backend, "b".into());
    assert_eq!(gen.models_called(), vec!["a", "b", "b"]);
  }

  #[tokio::test]
  async fn affinity_applies_even_outside_the_preference_list() {
    let gen = Arc::new(ScriptedGenerator::new().always("z", Step::Ok).always("a", Step::Ok));
    let orch = orchestrator(&gen);
    orch.caller().registry().record_success(&"z".into());

    let out = orch.generate(&ids(&["a"]), "p").await.unwrap();
    assert_eq!(out.backend, "z".into());
    assert_eq!(gen.models_called(), vec!["z"]);
  }

  #[tokio::test]
  async fn affinity_backend_is_not_retried_from_the_list() {
    let gen = Arc::new(ScriptedGenerator::new().always("a", Step::Fail).always("b", Step::Ok));
    let orch = orchestrator(&gen);
    orch.caller().registry().record_success(&"a".into());

    let out = orch.generate(&ids(&["a", "b"]), "p").await.unwrap();
    assert_eq!(out.backend, "b".into());
    assert_eq!(gen.calls_to("a"), 1);
  }

  #[tokio::test]
  async fn all_failures_make_exactly_one_attempt_per_candidate() {
    let gen = Arc::new(ScriptedGenerator::new());
    let orch = orchestrator(&gen);

    let err = orch.generate(&ids(&["a", "b", "c"]), "p").await.unwrap_err();
    let FallbackError::AllBackendsFailed { attempted } = err;
    assert_eq!(attempted, ids(&["a", "b", "c"]));
    assert_eq!(gen.models_called().len(), 3);
  }

  #[tokio::test]
  async fn all_failures_with_affinity_make_n_plus_one_attempts() {
    let gen = Arc::new(ScriptedGenerator::new());
    let orch = orchestrator(&gen);
    orch.caller().registry().record_success(&"z".into());

    assert!(orch.generate(&ids(&["a", "b", "c"]), "p").await.is_err());
    assert_eq!(gen.models_called(), vec!["z", "a", "b", "c"]);
  }

  #[tokio::test]
  async fn exhausted_backend_is_never_called_again() {
    let gen = Arc::new(ScriptedGenerator::new().always("a", Step::Quota).always("b", Step::Fail));
    let orch = orchestrator(&gen);
    let prefs = ids(&["a", "b"]);

    for _ in 0..3 {
      assert!(orch.generate(&prefs, "p").await.is_err());
    }
    assert_eq!(gen.calls_to("a"), 1);
    assert_eq!(gen.calls_to("b"), 3);
    assert!(orch.caller().registry().is_exhausted(&"a".into()));
  }

  #[tokio::test]
  async fn non_quota_failure_keeps_backend_eligible() {
    let gen = Arc::new(
      ScriptedGenerator::new()
        .queue("a", &[Step::Fail])
        .always("a", Step::Ok)
        .queue("b", &[Step::Ok])
        .always("b", Step::Fail),
    );
    let orch = orchestrator(&gen);
    let prefs = ids(&["a", "b"]);

    let first = orch.generate(&prefs, "p").await.unwrap();
    assert_eq!(first.backend, "b".into());
    assert!(!orch.caller().registry().is_exhausted(&"a".into()));

    // Affinity `b` now fails; `a` gets a real attempt again.
    let second = orch.generate(&prefs, "q").await.unwrap();
    assert_eq!(second.backend, "a".into());
    assert_eq!(gen.models_called(), vec!["a", "b", "b", "a"]);
  }

  #[tokio::test]
  async fn empty_preferences_without_affinity_fail_immediately() {
    let gen = Arc::new(ScriptedGenerator::new());
    let orch = orchestrator(&gen);

    let FallbackError::AllBackendsFailed { attempted } = orch.generate(&[], "p").await.unwrap_err();
    assert!(attempted.is_empty());
    assert!(gen.models_called().is_empty());
  }
}
