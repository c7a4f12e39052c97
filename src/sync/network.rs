use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// How long a connectivity probe may take
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Check network connectivity by opening a TCP connection to `probe`
///
/// The default probe is a public DNS server on port 53, which answers fast
/// and is reachable from almost any network that can reach the web at all.
pub async fn is_connected(probe: &str, limit: Duration) -> bool {
    match timeout(limit, TcpStream::connect(probe)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(probe, error = %e, "connectivity probe failed");
            false
        }
        Err(_) => {
            debug!(probe, "connectivity probe timed out");
            false
        }
    }
}
