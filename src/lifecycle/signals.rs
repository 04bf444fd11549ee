//! OS signal handling.
//!
//! SIGINT (Ctrl+C) stops scheduling new requests; a second SIGINT cancels
//! in-flight requests without waiting for the grace period.

use crate::lifecycle::Shutdown;

/// Trigger `stop` on the first Ctrl+C and `cancel` on the second.
pub async fn listen_for_ctrl_c(stop: Shutdown, cancel: Shutdown) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("Failed to install Ctrl+C handler; stop signal unavailable");
        return;
    }
    tracing::info!("Stop signal received, no further requests will be dispatched");
    stop.trigger();

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Second stop signal received, cancelling in-flight requests");
        cancel.trigger();
    }
}
