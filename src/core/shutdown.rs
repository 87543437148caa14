use std::future::Future;

use tokio::signal;
use tokio::sync::oneshot;

/// Resolves when the student abandons the quiz from the terminal (Ctrl+C or SIGTERM).
pub(crate) async fn abandon_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
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

    tracing::info!("abandon signal received");
}

/// Turns the first interrupt into the returned abandon notice and runs `on_second` if
/// another one arrives, so a stuck save or results lookup can be cut short.
pub(crate) fn watch_interrupts<S, Fut, X>(
    mut next_interrupt: S,
    on_second: X,
) -> oneshot::Receiver<()>
where
    S: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    X: FnOnce() + Send + 'static,
{
    let (abandon_tx, abandon_rx) = oneshot::channel();
    tokio::spawn(async move {
        next_interrupt().await;
        let _ = abandon_tx.send(());

        next_interrupt().await;
        tracing::warn!("second interrupt received; exiting without waiting for the server");
        on_second();
    });
    abandon_rx
}
