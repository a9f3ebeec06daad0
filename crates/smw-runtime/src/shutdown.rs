use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel `token` on the first SIGINT or SIGTERM (Ctrl+C only on non-unix).
///
/// The bridge task also exits quietly if the token is cancelled by someone
/// else first.
pub fn spawn_signal_bridge(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = shutdown_signal() => token.cancel(),
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, stopping after the current pass"),
        _ = terminate => info!("received SIGTERM, stopping after the current pass"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn bridge_exits_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = spawn_signal_bridge(token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("bridge must exit once the token is cancelled")
            .unwrap();
    }
}
