//! Short-timeout TCP reachability check.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// Returns true only if a TCP connection to `address:port` completes
/// within `deadline`. Refusal, resolution failure and timeout all read as
/// false. The connection is dropped before returning.
pub async fn probe(address: &str, port: u16, deadline: Duration) -> bool {
    match timeout(deadline, TcpStream::connect((address, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            tracing::debug!(address, port, "Probe connected");
            true
        }
        Ok(Err(e)) => {
            tracing::debug!(address, port, error = %e, "Probe refused");
            false
        }
        Err(_) => {
            tracing::debug!(
                address,
                port,
                timeout_ms = deadline.as_millis() as u64,
                "Probe timed out"
            );
            false
        }
    }
}
