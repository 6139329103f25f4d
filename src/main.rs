/// Entry point for mount-sentinel.
///
/// Watches the configured volume mounts, serves their health on the status API
/// and, when enabled, deletes its own pod once a mount stays unhealthy.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the status API cannot
/// bind its address.
///
/// # Examples
///
/// ```bash
/// POD_NAME=app-0 RUST_LOG=info mount-sentinel --mount /data --watchdog
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    mount_sentinel::run().await
}
