//! Domain models: backend identifiers, hint stages, and the assembled hint batch.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque name of one generation backend (a concrete model variant).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
  pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }
  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for BackendId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for BackendId {
  fn from(s: &str) -> Self { Self(s.to_string()) }
}

/// Progressive disclosure levels, in the order they are revealed to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HintStage {
  BasicIdea,
  Approach,
  Algorithm,
  Pseudocode,
}

impl HintStage {
  pub const ALL: [HintStage; 4] = [
    HintStage::BasicIdea,
    HintStage::Approach,
    HintStage::Algorithm,
    HintStage::Pseudocode,
  ];

  /// Position in `ALL`.
  pub fn index(self) -> usize {
    match self {
      HintStage::BasicIdea => 0,
      HintStage::Approach => 1,
      HintStage::Algorithm => 2,
      HintStage::Pseudocode => 3,
    }
  }

  /// Wire name, matching the field of `HintBatch` this stage fills.
  pub fn as_str(self) -> &'static str {
    match self {
      HintStage::BasicIdea => "basicIdea",
      HintStage::Approach => "approachHint",
      HintStage::Algorithm => "algorithmHint",
      HintStage::Pseudocode => "pseudocodeHint",
    }
  }
}

impl fmt::Display for HintStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A successful generation and the backend that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Generated {
  pub backend: BackendId,
  pub text: String,
}

/// Four stage outputs for one problem statement.
/// `model_used` is the backend of the first stage only; later stages may have
/// been served by a fallback backend.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HintBatch {
  pub basic_idea: String,
  pub approach_hint: String,
  pub algorithm_hint: String,
  pub pseudocode_hint: String,
  pub model_used: BackendId,
}
