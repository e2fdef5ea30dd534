use crate::config::ThingsboardConfig;
use crate::error::{AppError, Result};
use crate::probe::ConnectivityProbe;
use crate::retry::RetryPolicy;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// Obtains bearer tokens for the ThingsBoard REST API.
#[derive(Debug, Clone)]
pub struct Authenticator {
    http: reqwest::Client,
    base_url: String,
    credentials: ThingsboardConfig,
    probe: ConnectivityProbe,
    retry: RetryPolicy,
}

impl Authenticator {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        credentials: ThingsboardConfig,
        probe: ConnectivityProbe,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            credentials,
            probe,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The configured static token if there is one, otherwise a live login.
    pub async fn authenticate(&self) -> Option<String> {
        if let Some(token) = self.credentials.jwt_token.as_deref() {
            debug!("Using configured static token");
            return Some(token.to_string());
        }
        self.login().await
    }

    /// Live login, ignoring any static token. A 401 is final; anything else
    /// is retried per the retry policy.
    pub async fn login(&self) -> Option<String> {
        let (username, password) = match (
            self.credentials.username.as_deref(),
            self.credentials.password.as_deref(),
        ) {
            (Some(u), Some(p)) => (u, p),
            _ => {
                error!("ThingsBoard username/password not configured");
                return None;
            }
        };

        if !self.probe.check().await {
            return None;
        }

        for attempt in 0..self.retry.max_attempts {
            match self.login_once(username, password).await {
                Ok(Some(token)) => {
                    info!("Obtained ThingsBoard token");
                    return Some(token);
                }
                Ok(None) => {
                    error!("Login response did not contain a token");
                    return None;
                }
                Err(AppError::AuthRejected(reason)) => {
                    error!("Authentication failed: {}", reason);
                    return None;
                }
                Err(e) => {
                    warn!("Login attempt {} failed: {}", attempt + 1, e);
                    if let Some(delay) = self.retry.delay_after(attempt) {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!(
            "Giving up on ThingsBoard login after {} attempts",
            self.retry.max_attempts
        );
        None
    }

    async fn login_once(&self, username: &str, password: &str) -> Result<Option<String>> {
        let url = format!("{}/api/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { username, password })
            .timeout(LOGIN_TIMEOUT)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AppError::AuthRejected(
                "invalid username or password".to_string(),
            ));
        }

        let body: LoginResponse = response.error_for_status()?.json().await?;
        Ok(body.token)
    }
}
