use crate::config::ProbeConfig;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::warn;

/// Fast-fail gate in front of every upstream call: can we open a TCP
/// connection to a well-known host at all?
#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
    address: String,
    timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self::new(cfg.address.clone(), cfg.timeout())
    }

    pub async fn check(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(address = %self.address, error = %e, "No internet connection available");
                false
            }
            Err(_) => {
                warn!(address = %self.address, "No internet connection available (timed out)");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_succeeds_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = ConnectivityProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(probe.check().await);
    }

    #[tokio::test]
    async fn test_probe_fails_when_nothing_listens() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = ConnectivityProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn test_probe_fails_on_unresolvable_host() {
        let probe = ConnectivityProbe::new("not a host", Duration::from_millis(500));
        assert!(!probe.check().await);
    }
}
