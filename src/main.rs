//! AlgoHints · Progressive DSA Hint Backend
//!
//! - Axum HTTP API (`/ai/get-review`, `/ai/ocr`)
//! - Gemini integration with ordered model fallback and quota tracking
//! - Graceful shutdown on SIGINT/SIGTERM, bounded by a grace period
//!
//! Important env variables:
//!   HOST / PORT        : listen address (default 0.0.0.0:3000)
//!   APP_ENV            : "development" (default) or "production"
//!   FRONTEND_URL       : allowed CORS origin in production
//!   TRUST_PROXY        : "true" to key rate limits on x-forwarded-for / x-real-ip
//!   GEMINI_API_KEY     : enables hint generation and OCR
//!   GEMINI_BASE_URL    : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODELS      : comma-separated model preference list
//!   GEMINI_OCR_MODEL   : default "gemini-2.0-flash"
//!   HINTS_CONFIG_PATH  : path to TOML config (prompts + fallback policy)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod caller;
mod config;
mod coordinator;
mod domain;
mod error;
mod gemini;
mod orchestrator;
mod protocol;
mod provider;
mod registry;
mod routes;
mod shutdown;
mod state;
mod telemetry;
mod util;

#[cfg(test)]
mod testing;

use std::{future::IntoFuture, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::oneshot};
use tracing::{info, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (settings, fallback stack, OCR, limiter).
  let state = Arc::new(AppState::from_env());
  let host = state.settings.host.clone();
  let port = state.settings.port;
  let env = state.settings.env;

  let app = build_router(state);

  let listener = TcpListener::bind((host.as_str(), port)).await?;
  let addr = listener.local_addr()?;
  info!(target: "algohints_backend", %addr, env = env.as_str(), "HTTP server listening");

  let (started_tx, started_rx) = oneshot::channel();
  let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .with_graceful_shutdown(async move {
      shutdown::shutdown_signal().await;
      let _ = started_tx.send(());
    })
    .into_future();

  if shutdown::drain_with_grace(server, started_rx, shutdown::SHUTDOWN_GRACE).await? {
    info!(target: "algohints_backend", "Server closed");
  } else {
    warn!(target: "algohints_backend", grace = ?shutdown::SHUTDOWN_GRACE, "Forcing shutdown with requests still in flight");
  }
  Ok(())
}
