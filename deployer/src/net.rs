//! DNS helpers

use std::net::IpAddr;
use std::time::Duration;

use tokio::net::lookup_host;
use tracing::warn;

/// Interval between resolution attempts
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Resolve `host`, retrying every 2 seconds until cluster DNS answers.
///
/// Unbounded: service names only resolve once the cluster's DNS has the
/// freshly deployed backends, and there is no useful fallback before then.
pub async fn resolve_host(host: &str) -> IpAddr {
    loop {
        match lookup_host((host, 0)).await {
            Ok(mut addrs) => {
                if let Some(addr) = addrs.next() {
                    return addr.ip();
                }
                warn!("no addresses for host: {}", host);
            }
            Err(e) => {
                warn!("error resolving host {}: {}", host, e);
            }
        }
        tokio::time::sleep(RETRY_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_localhost() {
        let addr = resolve_host("localhost").await;
        assert!(addr.is_loopback());
    }
}
