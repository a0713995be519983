//! Scripted in-memory provider used by unit tests across modules.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::caller::BackendCaller;
use crate::domain::BackendId;
use crate::error::GenerateError;
use crate::provider::Generator;
use crate::registry::HealthRegistry;

#[derive(Clone, Copy, Debug)]
pub enum Step {
  /// Reply with `"{model}|{prompt}"`.
  Ok,
  /// Like `Ok`, after sleeping.
  Slow(Duration),
  Quota,
  Fail,
  Hang,
}

/// Per-model behavior: queued steps are consumed first, then the default applies.
/// Models without any script fail.
#[derive(Default)]
pub struct ScriptedGenerator {
  defaults: Mutex<HashMap<String, Step>>,
  queued: Mutex<HashMap<String, VecDeque<Step>>>,
  calls: Mutex<Vec<(String, String)>>,
  timings: Mutex<Vec<CallTiming>>,
  in_flight: AtomicUsize,
  peak_in_flight: AtomicUsize,
  panic_on: Mutex<Option<String>>,
}

/// Start and end of one completed call.
#[derive(Clone, Debug)]
pub struct CallTiming {
  pub prompt: String,
  pub started: Instant,
  pub finished: Instant,
}

impl ScriptedGenerator {
  pub fn new() -> Self { Self::default() }

  pub fn always(self, model: &str, step: Step) -> Self {
    self.defaults.lock().unwrap().insert(model.to_string(), step);
    self
  }

  pub fn queue(self, model: &str, steps: &[Step]) -> Self {
    self.queued.lock().unwrap().entry(model.to_string()).or_default().extend(steps.iter().copied());
    self
  }

  /// Panic inside any call whose prompt contains `needle`.
  pub fn panic_on_prompt(self, needle: &str) -> Self {
    *self.panic_on.lock().unwrap() = Some(needle.to_string());
    self
  }

  /// Most calls observed running at the same time.
  pub fn peak_in_flight(&self) -> usize {
    self.peak_in_flight.load(Ordering::SeqCst)
  }

  pub fn timings(&self) -> Vec<CallTiming> {
    self.timings.lock().unwrap().clone()
  }

  /// Models called, in call order.
  pub fn models_called(&self) -> Vec<String> {
    self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
  }

  pub fn calls_to(&self, model: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|(m, _)| m == model).count()
  }

  pub fn prompts(&self) -> Vec<String> {
    self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
  }

  fn next_step(&self, model: &str) -> Step {
    if let Some(step) = self.queued.lock().unwrap().get_mut(model).and_then(|q| q.pop_front()) {
      return step;
    }
    self.defaults.lock().unwrap().get(model).copied().unwrap_or(Step::Fail)
  }
}

#[async_trait]
impl Generator for ScriptedGenerator {
  async fn generate(&self, model: &BackendId, _system: &str, user: &str) -> Result<String, GenerateError> {
    self.calls.lock().unwrap().push((model.to_string(), user.to_string()));
    let needle = self.panic_on.lock().unwrap().clone();
    if needle.is_some_and(|n| user.contains(&n)) {
      panic!("scripted panic for model {model}");
    }

    let started = Instant::now();
    let now_running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak_in_flight.fetch_max(now_running, Ordering::SeqCst);
    let result = match self.next_step(model.as_str()) {
      Step::Ok => Ok(format!("{model}|{user}")),
      Step::Slow(delay) => {
        tokio::time::sleep(delay).await;
        Ok(format!("{model}|{user}"))
      }
      Step::Quota => Err(GenerateError::Http {
        status: 429,
        message: "RESOURCE_EXHAUSTED: You exceeded your current quota".into(),
      }),
      Step::Fail => Err(GenerateError::Http { status: 500, message: "INTERNAL: backend error".into() }),
      Step::Hang => {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(String::new())
      }
    };
    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    self.timings.lock().unwrap().push(CallTiming { prompt: user.to_string(), started, finished: Instant::now() });
    result
  }
}

/// Caller wired to a fresh registry (no TTL) and the given fake.
pub fn caller_with(generator: Arc<ScriptedGenerator>, timeout: Option<Duration>) -> BackendCaller {
  BackendCaller::new(generator, Arc::new(HealthRegistry::new(None)), "system".into(), timeout)
}

pub fn ids(names: &[&str]) -> Vec<BackendId> {
  names.iter().map(|n| BackendId::from(*n)).collect()
}
