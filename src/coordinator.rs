//! Hint batch coordination: one problem statement in, four progressive hints out.
//!
//! Stage one runs through the orchestrator and pins a backend. Stages two to
//! four are spawned as independent tasks that try the pinned backend directly
//! and fall back to a full orchestrator call on their own. The batch is all or
//! nothing: one failed stage fails the request.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::caller::Outcome;
use crate::config::Prompts;
use crate::domain::{BackendId, Generated, HintBatch, HintStage};
use crate::error::{FallbackError, HintError};
use crate::orchestrator::FallbackOrchestrator;
use crate::util::{fill_template, preview};

#[derive(Clone)]
pub struct HintCoordinator {
  orchestrator: FallbackOrchestrator,
  preferences: Arc<[BackendId]>,
  prompts: Arc<Prompts>,
}

impl HintCoordinator {
  pub fn new(orchestrator: FallbackOrchestrator, preferences: Vec<BackendId>, prompts: Prompts) -> Self {
    Self { orchestrator, preferences: preferences.into(), prompts: Arc::new(prompts) }
  }

  pub fn preferences(&self) -> &[BackendId] { &self.preferences }

  /// Stage prompt with the statement embedded.
  pub fn stage_prompt(&self, stage: HintStage, problem: &str) -> String {
    fill_template(self.prompts.template_for(stage), &[("problem", problem)])
  }

  #[instrument(level = "info", skip(self, problem), fields(batch_id = %Uuid::new_v4(), problem_len = problem.len()))]
  pub async fn produce_hints(&self, problem: &str) -> Result<HintBatch, HintError> {
    if problem.trim().is_empty() {
      return Err(HintError::EmptyProblemStatement);
    }
    info!(target: "hints", problem = %preview(problem, 100), "Processing hint request");

    let first_prompt = self.stage_prompt(HintStage::BasicIdea, problem);
    let first = self
      .orchestrator
      .generate(&self.preferences, &first_prompt)
      .await
      .map_err(|e| {
        error!(target: "hints", error = %e, "Stage one failed");
        HintError::GenerationFailed { stage: HintStage::BasicIdea, cause: e.to_string() }
      })?;
    let pinned = first.backend.clone();
    info!(target: "hints", model = %pinned, "Using model for all hints");

    let mut tasks = JoinSet::new();
    let mut stage_of = HashMap::new();
    for stage in &HintStage::ALL[1..] {
      let stage = *stage;
      let this = self.clone();
      let pinned = pinned.clone();
      let prompt = self.stage_prompt(stage, problem);
      let handle = tasks.spawn(async move { this.follow_up_stage(stage, &pinned, &prompt).await });
      stage_of.insert(handle.id(), stage);
    }

    // Barrier: every stage settles before the batch is judged.
    let mut texts: [Option<String>; 4] = [Some(first.text), None, None, None];
    let mut failures: Vec<(HintStage, String)> = Vec::new();
    while let Some(joined) = tasks.join_next_with_id().await {
      match joined {
        Ok((id, Ok(generated))) => {
          if let Some(stage) = stage_of.get(&id) {
            texts[stage.index()] = Some(generated.text);
          }
        }
        Ok((id, Err(e))) => {
          if let Some(stage) = stage_of.get(&id) {
            failures.push((*stage, e.to_string()));
          }
        }
        Err(e) => {
          let stage = stage_of.get(&e.id()).copied().unwrap_or(HintStage::Approach);
          error!(target: "hints", %stage, error = %e, "Stage task aborted");
          failures.push((stage, format!("stage task aborted: {e}")));
        }
      }
    }

    if let Some((stage, cause)) = failures.into_iter().min_by_key(|(s, _)| s.index()) {
      error!(target: "hints", %stage, %cause, "Hint batch failed");
      return Err(HintError::GenerationFailed { stage, cause });
    }

    let [Some(basic_idea), Some(approach_hint), Some(algorithm_hint), Some(pseudocode_hint)] = texts else {
      let stage = texts.iter().position(Option::is_none).map_or(HintStage::Approach, |i| HintStage::ALL[i]);
      return Err(HintError::GenerationFailed { stage, cause: "stage result missing".into() });
    };
    info!(target: "hints", model = %pinned, "Successfully generated all hints");
    Ok(HintBatch { basic_idea, approach_hint, algorithm_hint, pseudocode_hint, model_used: pinned })
  }

  /// Pinned backend first, unless it is exhausted; otherwise or on failure, full fallback.
  #[instrument(level = "debug", skip(self, stage, pinned, prompt), fields(%stage, %pinned))]
  async fn follow_up_stage(&self, stage: HintStage, pinned: &BackendId, prompt: &str) -> Result<Generated, FallbackError> {
    let caller = self.orchestrator.caller();
    if !caller.registry().is_exhausted(pinned) {
      match caller.attempt(pinned, prompt).await {
        Outcome::Success(text) => return Ok(Generated { backend: pinned.clone(), text }),
        Outcome::Failure { kind, reason } => {
          warn!(target: "hints", %stage, backend = %pinned, ?kind, %reason, "Pinned model failed; falling back");
        }
      }
    }
    let generated = self.orchestrator.generate(&self.preferences, prompt).await?;
    if generated.backend != *pinned {
      info!(target: "hints", %stage, backend = %generated.backend, "Stage served by fallback model");
    }
    Ok(generated)
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::caller::FailureKind;
  use crate::testing::{caller_with, ids, ScriptedGenerator, Step};

  const PROBLEM: &str = "Given an array of integers, return indices of the two numbers that add up to a target.";

  fn coordinator(gen: &Arc<ScriptedGenerator>, prefs: &[&str]) -> HintCoordinator {
    let orch = FallbackOrchestrator::new(caller_with(gen.clone(), None));
    HintCoordinator::new(orch, ids(prefs), Prompts::default())
  }

  fn produced_by(text: &str) -> &str {
    text.split('|').next().unwrap_or_default()
  }

  #[tokio::test]
  async fn all_stages_from_the_first_model() {
    let gen = Arc::new(ScriptedGenerator::new().always("a", Step::Ok).always("b", Step::Ok));
    let coord = coordinator(&gen, &["a", "b"]);

    let batch = coord.produce_hints(PROBLEM).await.unwrap();
    assert_eq!(batch.model_used, "a".into());
    assert!(batch.basic_idea.contains("Basic Idea Hint"));
    assert!(batch.approach_hint.contains("Approach Hint"));
    assert!(batch.algorithm_hint.contains("Algorithm/Concept Hint"));
    assert!(batch.pseudocode_hint.contains("Pseudocode Structure"));
    assert_eq!(gen.calls_to("a"), 4);
    assert_eq!(gen.calls_to("b"), 0);
    assert!(gen.prompts().iter().all(|p| p.contains(PROBLEM)));
  }

  #[tokio::test]
  async fn empty_statement_is_rejected_without_calls() {
    let gen = Arc::new(ScriptedGenerator::new().always("a", Step::Ok));
    let coord = coordinator(&gen, &["a"]);

    let err = coord.produce_hints("   ").await.unwrap_err();
    assert!(matches!(err, HintError::EmptyProblemStatement));
    assert!(gen.models_called().is_empty());
  }

  #[tokio::test]
  async fn stage_one_failure_fails_the_batch() {
    let gen = Arc::new(ScriptedGenerator::new().always("a", Step::Fail).always("b", Step::Quota));
    let coord = coordinator(&gen, &["a", "b"]);

    let err = coord.produce_hints(PROBLEM).await.unwrap_err();
    assert!(matches!(err, HintError::GenerationFailed { stage: HintStage::BasicIdea, .. }));
    assert_eq!(gen.models_called(), vec!["a", "b"]);
  }

  #[tokio::test]
  async fn later_stage_failure_fails_the_whole_batch() {
    let gen = Arc::new(ScriptedGenerator::new().queue("a", &[Step::Ok]).always("a", Step::Fail).always("b", Step::Fail));
    let coord = coordinator(&gen, &["a", "b"]);

    let err = coord.produce_hints(PROBLEM).await.unwrap_err();
    match err {
      HintError::GenerationFailed { stage, cause } => {
        assert_eq!(stage, HintStage::Approach);
        assert!(cause.contains("All models failed"));
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn pinned_model_quota_moves_stages_to_next_model() {
    let gen = Arc::new(
      ScriptedGenerator::new()
        .queue("a", &[Step::Ok])
        .always("a", Step::Quota)
        .always("b", Step::Ok)
        .always("c", Step::Ok),
    );
    let coord = coordinator(&gen, &["a", "b", "c"]);

    let batch = coord.produce_hints(PROBLEM).await.unwrap();
    assert_eq!(batch.model_used, "a".into());
    assert_eq!(produced_by(&batch.basic_idea), "a");
    assert_eq!(produced_by(&batch.approach_hint), "b");
    assert_eq!(produced_by(&batch.algorithm_hint), "b");
    assert_eq!(produced_by(&batch.pseudocode_hint), "b");
    assert_eq!(gen.calls_to("c"), 0);

    let registry = coord.orchestrator.caller().registry();
    assert!(registry.is_exhausted(&"a".into()));

    // A later unrelated request never returns to `a`.
    let a_calls = gen.calls_to("a");
    let next = coord.produce_hints("Find the longest increasing subsequence.").await.unwrap();
    assert_eq!(next.model_used, "b".into());
    assert_eq!(gen.calls_to("a"), a_calls);
  }

  #[tokio::test]
  async fn pinned_model_transient_failure_recovers_per_stage() {
    let gen = Arc::new(
      ScriptedGenerator::new()
        .queue("a", &[Step::Ok])
        .always("a", Step::Fail)
        .always("b", Step::Ok),
    );
    let coord = coordinator(&gen, &["a", "b"]);

    let batch = coord.produce_hints(PROBLEM).await.unwrap();
    assert_eq!(batch.model_used, "a".into());
    assert_eq!(produced_by(&batch.pseudocode_hint), "b");
    assert!(!coord.orchestrator.caller().registry().is_exhausted(&"a".into()));
  }

  #[tokio::test]
  async fn follow_up_stages_run_concurrently_after_stage_one() {
    let gen = Arc::new(ScriptedGenerator::new().always("a", Step::Slow(Duration::from_millis(50))));
    let coord = coordinator(&gen, &["a"]);

    coord.produce_hints(PROBLEM).await.unwrap();
    assert_eq!(gen.peak_in_flight(), 3);

    let timings = gen.timings();
    assert_eq!(timings.len(), 4);
    let stage_one = timings.iter().find(|t| t.prompt.contains("Basic Idea Hint")).unwrap();
    for follow_up in timings.iter().filter(|t| !t.prompt.contains("Basic Idea Hint")) {
      assert!(follow_up.started >= stage_one.finished, "follow-up began before stage one returned");
    }
  }

  #[tokio::test]
  async fn pinned_model_exhausted_before_follow_ups_is_not_retried() {
    // Stage one succeeds on `a` while a concurrent request sees `a` run out of quota.
    let gen = Arc::new(
      ScriptedGenerator::new()
        .queue("a", &[Step::Slow(Duration::from_millis(50)), Step::Quota])
        .always("a", Step::Ok)
        .always("b", Step::Ok),
    );
    let coord = coordinator(&gen, &["a", "b"]);
    let caller = coord.orchestrator.caller().clone();

    let concurrent = async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      caller.attempt(&"a".into(), "other request").await
    };
    let (batch, other) = tokio::join!(coord.produce_hints(PROBLEM), concurrent);

    assert!(matches!(other, Outcome::Failure { kind: FailureKind::Quota, .. }));
    let batch = batch.unwrap();
    assert_eq!(batch.model_used, "a".into());
    assert_eq!(produced_by(&batch.basic_idea), "a");
    for hint in [&batch.approach_hint, &batch.algorithm_hint, &batch.pseudocode_hint] {
      assert_eq!(produced_by(hint), "b");
    }
    // Only stage one and the concurrent call reached `a`.
    assert_eq!(gen.calls_to("a"), 2);
    assert_eq!(gen.calls_to("b"), 3);
  }

  #[tokio::test]
  async fn aborted_stage_task_reports_its_own_stage() {
    let gen = Arc::new(ScriptedGenerator::new().always("a", Step::Ok).panic_on_prompt("Pseudocode Structure"));
    let coord = coordinator(&gen, &["a"]);

    let err = coord.produce_hints(PROBLEM).await.unwrap_err();
    match err {
      HintError::GenerationFailed { stage, cause } => {
        assert_eq!(stage, HintStage::Pseudocode);
        assert!(cause.contains("stage task aborted"));
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn stage_prompt_embeds_statement() {
    let gen = Arc::new(ScriptedGenerator::new());
    let coord = coordinator(&gen, &["a"]);
    let prompt = coord.stage_prompt(HintStage::Pseudocode, "sort a list");
    assert!(prompt.starts_with("I need a Pseudocode Structure"));
    assert!(prompt.ends_with("sort a list"));
    assert_eq!(coord.preferences(), ids(&["a"]).as_slice());
  }
}
