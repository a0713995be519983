//! Process-wide backend health: which backends are quota-exhausted, and which
//! one succeeded most recently.
//!
//! Shared by every in-flight hint batch. Operations never suspend, so a plain
//! `std::sync::Mutex` is enough on the multi-threaded runtime.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::domain::BackendId;

#[derive(Default)]
struct Inner {
  exhausted: HashMap<BackendId, Instant>,
  last_successful: Option<BackendId>,
}

pub struct HealthRegistry {
  inner: Mutex<Inner>,
  exhaustion_ttl: Option<Duration>,
}

impl HealthRegistry {
  /// Fresh registry. With `exhaustion_ttl = None` marks never expire.
  pub fn new(exhaustion_ttl: Option<Duration>) -> Self {
    Self { inner: Mutex::new(Inner::default()), exhaustion_ttl }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn is_exhausted(&self, backend: &BackendId) -> bool {
    let mut inner = self.lock();
    let Some(marked_at) = inner.exhausted.get(backend).copied() else {
      return false;
    };
    match self.exhaustion_ttl {
      Some(ttl) if marked_at.elapsed() >= ttl => {
        inner.exhausted.remove(backend);
        info!(target: "fallback", %backend, ?ttl, "Exhaustion mark expired");
        false
      }
      _ => true,
    }
  }

  /// Idempotent; re-marking keeps the original timestamp.
  pub fn mark_exhausted(&self, backend: &BackendId) {
    let mut inner = self.lock();
    if !inner.exhausted.contains_key(backend) {
      inner.exhausted.insert(backend.clone(), Instant::now());
      warn!(target: "fallback", %backend, "Backend marked quota-exhausted");
    }
  }

  /// Last writer wins. A success racing with a quota mark on the same backend
  /// is not recorded, so `last_successful` is never an exhausted backend.
  pub fn record_success(&self, backend: &BackendId) {
    let mut inner = self.lock();
    if inner.exhausted.contains_key(backend) {
      debug!(target: "fallback", %backend, "Success from an exhausted backend; affinity unchanged");
      return;
    }
    inner.last_successful = Some(backend.clone());
  }

  pub fn last_successful(&self) -> Option<BackendId> {
    self.lock().last_successful.clone()
  }
}
