use tokio::signal;

/// Resolves on the first SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be installed.
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    let terminate = sigterm.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            log::info!("Received SIGINT, shutting down");
        }
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down");
        }
    }
    Ok(())
}
