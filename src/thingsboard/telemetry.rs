use crate::error::{AppError, Result};
use crate::probe::ConnectivityProbe;
use crate::retry::RetryPolicy;
use crate::thingsboard::auth::Authenticator;
use crate::thingsboard::keys::{query_keys, RawTelemetry, TelemetryKey};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Optional bounds for a timeseries query, sent as query parameters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl TimeseriesQuery {
    pub fn window(start_ts: i64, end_ts: i64, interval: i64, limit: u32) -> Self {
        Self {
            start_ts: Some(start_ts),
            end_ts: Some(end_ts),
            interval: Some(interval),
            limit: Some(limit),
        }
    }
}

/// Reads device timeseries, refreshing the token once on a 401.
#[derive(Debug, Clone)]
pub struct TelemetryFetcher {
    http: reqwest::Client,
    base_url: String,
    device_id: Option<String>,
    probe: ConnectivityProbe,
    authenticator: Authenticator,
    retry: RetryPolicy,
}

impl TelemetryFetcher {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        device_id: Option<String>,
        probe: ConnectivityProbe,
        authenticator: Authenticator,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            device_id,
            probe,
            authenticator,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Raw upstream body, or `None` on any failure (already logged).
    pub async fn fetch(
        &self,
        token: &str,
        keys: &[TelemetryKey],
        query: &TimeseriesQuery,
    ) -> Option<RawTelemetry> {
        if token.is_empty() {
            warn!("No token available for telemetry fetch");
            return None;
        }

        let Some(device_id) = self.device_id.as_deref() else {
            error!("ThingsBoard device id not configured");
            return None;
        };

        if !self.probe.check().await {
            return None;
        }

        match self.fetch_with_refresh(device_id, token, keys, query).await {
            Ok(raw) => Some(raw),
            Err(e) => {
                error!("Failed to fetch telemetry: {}", e);
                None
            }
        }
    }

    async fn fetch_with_refresh(
        &self,
        device_id: &str,
        token: &str,
        keys: &[TelemetryKey],
        query: &TimeseriesQuery,
    ) -> Result<RawTelemetry> {
        let url = format!(
            "{}/api/plugins/telemetry/DEVICE/{}/values/timeseries",
            self.base_url, device_id
        );
        let keys = query_keys(keys);

        let mut response = self.get(&url, token, &keys, query).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            info!("Token expired, refreshing...");
            // One refresh, one retry. If the refresh fails the 401 stands.
            if let Some(new_token) = self.authenticator.login().await {
                response = self.get(&url, &new_token, &keys, query).await?;
            }
        }

        let body: Value = response.error_for_status()?.json().await?;
        match body {
            Value::Object(map) => Ok(map),
            other => Err(AppError::Upstream(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// One logical GET. Transient statuses and transport errors are retried
    /// per the retry policy; the final outcome is returned as-is.
    async fn get(
        &self,
        url: &str,
        token: &str,
        keys: &str,
        query: &TimeseriesQuery,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let outcome = self.send(url, token, keys, query).await;

            let reason = match &outcome {
                Ok(response) if is_transient(response.status()) => {
                    Some(format!("status {}", response.status()))
                }
                Ok(_) => None,
                Err(e) => Some(e.to_string()),
            };
            let Some(reason) = reason else {
                return outcome;
            };

            let Some(delay) = self.retry.delay_after(attempt) else {
                return outcome;
            };
            warn!(
                "Telemetry request attempt {} failed ({}), retrying in {:?}",
                attempt + 1,
                reason,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send(
        &self,
        url: &str,
        token: &str,
        keys: &str,
        query: &TimeseriesQuery,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .get(url)
            .header("X-Authorization", format!("Bearer {}", token))
            .query(query)
            .timeout(FETCH_TIMEOUT);

        if !keys.is_empty() {
            request = request.query(&[("keys", keys)]);
        }

        Ok(request.send().await?)
    }
}

/// Statuses worth another attempt. 401 is not one of them; it goes through
/// the token refresh instead.
fn is_transient(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
