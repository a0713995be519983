//! Process shutdown: signal handling and a bounded drain of in-flight requests.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{info, warn};

/// How long in-flight requests may keep running once shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!(target: "algohints_backend", error = %e, "Failed to listen for Ctrl+C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        warn!(target: "algohints_backend", error = %e, "Failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  info!(target: "algohints_backend", "Shutting down gracefully...");
}

/// Drive `server` to completion. Once `started` fires, the server gets `grace`
/// to finish; after that it is dropped. Returns whether it drained in time.
pub async fn drain_with_grace<F>(server: F, started: oneshot::Receiver<()>, grace: Duration) -> std::io::Result<bool>
where
  F: Future<Output = std::io::Result<()>>,
{
  tokio::pin!(server);
  let deadline = async {
    // A dropped sender means shutdown never started; keep serving.
    if started.await.is_err() {
      std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
  };

  tokio::select! {
    res = &mut server => res.map(|()| true),
    _ = deadline => Ok(false),
  }
}
