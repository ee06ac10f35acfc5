//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl+C) and, on Unix, SIGTERM
//! - Resolve as soon as either arrives, or the shutdown coordinator fires
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed is logged and treated as never firing
//! - A closed coordinator channel never fires; only an explicit trigger does

use tokio::sync::broadcast::{self, error::RecvError};

/// Resolve when the process is asked to stop.
pub async fn shutdown_signal(mut trigger: broadcast::Receiver<()>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let triggered = async {
        match trigger.recv().await {
            Ok(()) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received"),
        _ = terminate => tracing::info!("SIGTERM received"),
        _ = triggered => tracing::info!("Shutdown triggered"),
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::lifecycle::Shutdown;

    #[tokio::test]
    async fn test_trigger_resolves() {
        let shutdown = Shutdown::new();
        let signal = tokio::spawn(shutdown_signal(shutdown.subscribe()));

        shutdown.trigger();
        assert!(tokio::time::timeout(Duration::from_secs(1), signal).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_coordinator_does_not_resolve() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.subscribe();
        drop(shutdown);

        let waited = tokio::time::timeout(Duration::from_millis(200), shutdown_signal(trigger)).await;
        assert!(waited.is_err());
    }
}
