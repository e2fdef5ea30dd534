//! Keep-alive background task
//!
//! The hosting platform idles services that see no traffic, so this task
//! periodically requests the service's own public URL.

use crate::config::KeepAliveConfig;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum PingOutcome {
    Ok,
    Failed(u16),
    Error(String),
}

pub struct KeepAlivePinger {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    timeout: Duration,
}

impl KeepAlivePinger {
    pub fn new(
        http: reqwest::Client,
        url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            interval,
            timeout,
        }
    }

    pub fn from_config(http: reqwest::Client, cfg: &KeepAliveConfig) -> Self {
        Self::new(
            http,
            cfg.url.clone(),
            Duration::from_secs(cfg.interval_secs),
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    /// Start the loop on the runtime. The caller owns the handle and aborts it
    /// on shutdown.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Ping, sleep, repeat. Never returns.
    pub async fn run(&self) {
        tracing::info!(
            "Keep-alive started (url: {}, interval: {}s)",
            self.url,
            self.interval.as_secs()
        );

        loop {
            self.ping().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn ping(&self) -> PingOutcome {
        match self.http.get(&self.url).timeout(self.timeout).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                tracing::info!("Ping successful");
                PingOutcome::Ok
            }
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::warn!("Ping failed with status {}", status);
                PingOutcome::Failed(status)
            }
            Err(e) => {
                tracing::error!("Ping error: {}", e);
                PingOutcome::Error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn pinger(url: String, interval: Duration) -> KeepAlivePinger {
        KeepAlivePinger::new(reqwest::Client::new(), url, interval, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_ping_ok() {
        let base = serve(Router::new().route("/health", get(|| async { "OK" }))).await;
        let outcome = pinger(format!("{}/health", base), Duration::from_secs(180))
            .ping()
            .await;
        assert_eq!(outcome, PingOutcome::Ok);
    }

    #[tokio::test]
    async fn test_ping_non_200_is_failure() {
        let base = serve(Router::new().route(
            "/health",
            get(|| async { AxumStatus::SERVICE_UNAVAILABLE }),
        ))
        .await;
        let outcome = pinger(format!("{}/health", base), Duration::from_secs(180))
            .ping()
            .await;
        assert_eq!(outcome, PingOutcome::Failed(503));
    }

    #[tokio::test]
    async fn test_ping_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = pinger(format!("http://{}/", addr), Duration::from_secs(180))
            .ping()
            .await;
        assert!(matches!(outcome, PingOutcome::Error(_)));
    }

    #[tokio::test]
    async fn test_loop_keeps_pinging_through_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::INTERNAL_SERVER_ERROR
                }
            }),
        ))
        .await;

        let handle = pinger(format!("{}/", base), Duration::from_millis(50)).spawn();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!handle.is_finished());
        handle.abort();

        assert!(hits.load(Ordering::SeqCst) >= 2);
    }
}
