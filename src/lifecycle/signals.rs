//! OS signal handling.
//!
//! Ctrl+C (SIGINT) cancels the root signal handed to the server, which stops
//! the accept loop and propagates into every in-flight request.

use crate::lifecycle::CancellationSignal;

/// Wait for Ctrl+C, then cancel `signal`.
pub async fn shutdown_on_ctrl_c(signal: CancellationSignal) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C; shutting down"),
            }
            signal.cancel();
        }
        _ = signal.cancelled() => {}
    }
}
