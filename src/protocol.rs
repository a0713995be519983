//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::HintBatch;

#[derive(Debug, Deserialize)]
pub struct HintIn {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Serialize)]
pub struct HintOut {
    pub success: bool,
    pub data: HintBatch,
}

#[derive(Serialize)]
pub struct OcrOut {
    pub success: bool,
    pub text: String,
}

#[derive(Serialize)]
pub struct RootOut {
    pub success: bool,
    pub message: &'static str,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

/// Failure envelope. Hint routes fill `message` (plus `error` detail in development);
/// OCR routes fill `error`.
#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorOut {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()), error: None }
    }

    pub fn with_error(error: impl Into<String>) -> Self {
        Self { success: false, message: None, error: Some(error.into()) }
    }
}
