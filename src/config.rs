//! Loading configuration: server settings from env, prompts + fallback policy from TOML.
//!
//! See `HintsConfig`, `Prompts` and `FallbackCfg` for the expected TOML schema.
//! Every TOML key is optional; missing keys keep the built-in defaults.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{BackendId, HintStage};

/// Preference order used when neither TOML nor `GEMINI_MODELS` provide one.
/// Most capable first, with a lower-tier fallback at the end.
pub const DEFAULT_MODELS: [&str; 3] = [
  "gemini-2.5-pro-preview-03-25",
  "gemini-2.5-pro-exp-03-25",
  "gemini-2.0-flash",
];

const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 90;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct HintsConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub fallback: FallbackCfg,
}

/// Prompts sent to the model. Stage templates embed the statement via `{problem}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system_instruction: String,
  pub basic_idea_template: String,
  pub approach_template: String,
  pub algorithm_template: String,
  pub pseudocode_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system_instruction: DEFAULT_SYSTEM_INSTRUCTION.trim().into(),
      basic_idea_template: "I need a Basic Idea Hint for this problem. Focus on reframing it in simple terms, using analogies if helpful, and identifying the core challenge without suggesting specific approaches:\n\n{problem}".into(),
      approach_template: "I need an Approach Hint for this problem. Suggest general problem-solving paradigms (like DP, Greedy, DFS/BFS, etc.), explain WHY this approach fits, and discuss trade-offs between possible approaches. No implementation details yet:\n\n{problem}".into(),
      algorithm_template: "I need an Algorithm/Concept Hint for this problem. Recommend specific algorithms, data structures, or techniques. Explain key insights, identify edge cases, address complexity, and include relevant mathematical concepts if applicable:\n\n{problem}".into(),
      pseudocode_template: "I need a Pseudocode Structure for this problem. Provide high-level pseudocode that outlines the solution logic, including initialization, main operations, and return steps. Identify variables and cover key logic branches and edge cases, but do NOT provide direct code implementation:\n\n{problem}".into(),
    }
  }
}

impl Prompts {
  pub fn template_for(&self, stage: HintStage) -> &str {
    match stage {
      HintStage::BasicIdea => &self.basic_idea_template,
      HintStage::Approach => &self.approach_template,
      HintStage::Algorithm => &self.algorithm_template,
      HintStage::Pseudocode => &self.pseudocode_template,
    }
  }
}

const DEFAULT_SYSTEM_INSTRUCTION: &str = r#"
Advanced Problem-Solving Hint System

You are an expert DSA and Competitive Programming Coach that provides progressive, structured hints to help users develop their problem-solving skills without giving away complete solutions.

## Hint Structure (Always Follow This Sequence)

### 1. Basic Idea Hint
- Reframe the problem in simple, intuitive terms
- Identify the core challenge without suggesting specific approaches
- Help the user understand what the problem is really asking
- Use analogies or real-world examples to illustrate the problem

### 2. Approach Hint
- Suggest general problem-solving paradigms (DP, Greedy, DFS/BFS, etc.)
- Explain WHY this approach fits the problem's characteristics
- Discuss trade-offs between different possible approaches
- Do not provide implementation details yet

### 3. Algorithm/Concept Hint
- Recommend specific algorithms, data structures, or techniques
- Explain key insights needed to solve the problem
- Identify potential edge cases and optimization opportunities
- Address time/space complexity considerations
- Include relevant mathematical concepts if applicable

### 4. Pseudocode Structure
- Provide high-level pseudocode that outlines the solution logic
- Include initialization, main operations, and return steps
- Identify variables and their purposes
- Cover key logic branches and edge cases
- Do NOT provide direct code implementation

## Critical Guidelines

1. NEVER provide complete solutions or direct code implementations
2. Always maintain a teaching tone that encourages independent thinking
3. Structure hints progressively - from general to specific
4. Use clear formatting with bullet points, numbered lists, and emphasis
5. Include diagrams or visual explanations using text when beneficial
6. Address edge cases and optimizations in later hints
7. Acknowledge multiple valid approaches when they exist
8. For optimization problems, discuss space/time complexity explicitly
9. Use precise technical terminology appropriate for the topic
10. Break down complex problems into smaller, manageable components

Your goal is to be a masterful guide who leads the user to their "aha!" moment rather than providing the answer directly. Each hint should build naturally on the previous one, creating a pathway to understanding.
"#;

/// Fallback policy knobs.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FallbackCfg {
  /// Ordered preference list of model names.
  pub models: Vec<String>,
  /// Upper bound for a single backend attempt. `0` disables the bound.
  pub attempt_timeout_secs: u64,
  /// When set, exhaustion marks expire after this many seconds.
  pub exhaustion_ttl_secs: Option<u64>,
}

impl Default for FallbackCfg {
  fn default() -> Self {
    Self {
      models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
      attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
      exhaustion_ttl_secs: None,
    }
  }
}

impl FallbackCfg {
  /// Preference list as backend ids; blanks are dropped, an empty list falls back to the defaults.
  pub fn preference_list(&self) -> Vec<BackendId> {
    let list: Vec<BackendId> = self
      .models
      .iter()
      .map(|m| m.trim())
      .filter(|m| !m.is_empty())
      .map(BackendId::from)
      .collect();
    if list.is_empty() {
      warn!(target: "algohints_backend", "Empty model preference list; using defaults");
      return DEFAULT_MODELS.iter().map(|m| BackendId::from(*m)).collect();
    }
    list
  }

  pub fn attempt_timeout(&self) -> Option<Duration> {
    (self.attempt_timeout_secs > 0).then(|| Duration::from_secs(self.attempt_timeout_secs))
  }

  pub fn exhaustion_ttl(&self) -> Option<Duration> {
    self.exhaustion_ttl_secs.filter(|s| *s > 0).map(Duration::from_secs)
  }
}

impl HintsConfig {
  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str::<HintsConfig>(s)
  }
}

/// Load `HintsConfig` from HINTS_CONFIG_PATH (if set) and apply the GEMINI_MODELS override.
/// Read/parse errors are logged and the defaults are used instead.
pub fn load_hints_config_from_env() -> HintsConfig {
  let mut cfg = match std::env::var("HINTS_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match HintsConfig::from_toml_str(&s) {
        Ok(cfg) => {
          info!(target: "algohints_backend", %path, "Loaded hints config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "algohints_backend", %path, error = %e, "Failed to parse TOML config");
          HintsConfig::default()
        }
      },
      Err(e) => {
        error!(target: "algohints_backend", %path, error = %e, "Failed to read TOML config file");
        HintsConfig::default()
      }
    },
    Err(_) => HintsConfig::default(),
  };

  if let Ok(models) = std::env::var("GEMINI_MODELS") {
    cfg.fallback.models = parse_model_list(&models);
  }
  cfg
}

fn parse_model_list(raw: &str) -> Vec<String> {
  raw.split(',').map(|m| m.trim().to_string()).filter(|m| !m.is_empty()).collect()
}

fn parse_flag(raw: &str) -> bool {
  matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
  Development,
  Production,
}

impl AppEnv {
  fn parse(raw: &str) -> Self {
    if raw.eq_ignore_ascii_case("production") { AppEnv::Production } else { AppEnv::Development }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      AppEnv::Development => "development",
      AppEnv::Production => "production",
    }
  }
}

/// Listener, environment and CORS settings.
#[derive(Clone, Debug)]
pub struct ServerSettings {
  pub host: String,
  pub port: u16,
  pub env: AppEnv,
  pub frontend_url: Option<String>,
  /// Honor `x-forwarded-for` / `x-real-ip` for client identity (only behind a trusted proxy).
  pub trust_proxy: bool,
}

impl Default for ServerSettings {
  fn default() -> Self {
    Self { host: "0.0.0.0".into(), port: 3000, env: AppEnv::Development, frontend_url: None, trust_proxy: false }
  }
}

impl ServerSettings {
  pub fn from_env() -> Self {
    let defaults = Self::default();
    Self {
      host: std::env::var("HOST").unwrap_or(defaults.host),
      port: std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(defaults.port),
      env: std::env::var("APP_ENV").map(|v| AppEnv::parse(&v)).unwrap_or(defaults.env),
      frontend_url: std::env::var("FRONTEND_URL").ok().filter(|u| !u.trim().is_empty()),
      trust_proxy: std::env::var("TRUST_PROXY").map(|v| parse_flag(&v)).unwrap_or(defaults.trust_proxy),
    }
  }

  /// Internal failure causes are only echoed to clients outside production.
  pub fn expose_error_details(&self) -> bool {
    self.env == AppEnv::Development
  }

  /// Origins allowed by CORS for the current environment.
  pub fn allowed_origins(&self) -> Vec<String> {
    match self.env {
      AppEnv::Production => self.frontend_url.iter().cloned().collect(),
      AppEnv::Development => {
        vec!["http://localhost:5173".into(), "https://algohints-1.onrender.com".into()]
      }
    }
  }
}
