//! Ctrl+C handling.

use tokio::sync::watch;

/// First Ctrl+C flips the returned flag so the caller can stop reading events and
/// drain in-flight pipelines. A second Ctrl+C exits immediately.
pub fn setup_shutdown_handler() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, finishing in-flight pages (press again to force quit)");
            let _ = shutdown_tx.send(true);

            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nForce quit requested, exiting immediately...");
                std::process::exit(1);
            }
        }
    });

    shutdown_rx
}
