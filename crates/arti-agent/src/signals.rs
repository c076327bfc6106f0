//! Process termination signals.

use tokio_util::sync::CancellationToken;

/// Cancel `shutdown` on the first SIGINT or SIGTERM (Ctrl-C on Windows).
pub fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let signal = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            name = wait_for_signal() => name,
        };
        tracing::info!(signal, "Received termination signal");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => Some(term),
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            None
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "SIGINT handler failed");
            }
            "SIGINT"
        }
        _ = async {
            match term.as_mut() {
                Some(term) => term.recv().await,
                None => std::future::pending().await,
            }
        } => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl-C handler failed");
        std::future::pending::<()>().await;
    }
    "Ctrl-C"
}
