use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `cancellation` on Ctrl-C. Returns as soon as the token is cancelled by anything else,
/// usually the browser closing the channel.
pub async fn detect_shutdown(cancellation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            cancellation.cancel();
        },
        _ = cancellation.cancelled() => {}
    };
}
