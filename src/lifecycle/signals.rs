//! OS signal handling.

use tokio_util::sync::CancellationToken;

/// Wait for Ctrl+C, then cancel `token` so pending backoff waits abort.
pub async fn wait_for_ctrl_c(token: &CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Shutdown signal received");
            token.cancel();
        }
        Err(e) => tracing::error!(error = %e, "Failed to install Ctrl+C handler"),
    }
}
