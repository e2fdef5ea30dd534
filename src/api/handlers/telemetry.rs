use crate::api::models::telemetry::{
    build_series, SeriesResponse, TelemetryError, TelemetrySnapshot,
};
use crate::api::SharedState;
use crate::thingsboard::{RawTelemetry, TelemetryKey, TimeseriesQuery};
use axum::{extract::State, response::Json};
use chrono::{Local, TimeZone, Utc};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Trailing window served by the series endpoints.
#[derive(Debug, Clone, Copy)]
pub struct SeriesWindow {
    pub days: i64,
    pub interval_ms: i64,
    pub limit: u32,
    pub label: &'static str,
    pub failure: &'static str,
}

pub const WEEKLY: SeriesWindow = SeriesWindow {
    days: 7,
    interval_ms: 3_600_000,
    limit: 168,
    label: "hourly",
    failure: "Could not fetch weekly telemetry",
};

pub const MONTHLY: SeriesWindow = SeriesWindow {
    days: 30,
    interval_ms: 86_400_000,
    limit: 30,
    label: "daily",
    failure: "Could not fetch monthly telemetry",
};

async fn token(state: &SharedState) -> Result<String, TelemetryError> {
    state
        .authenticator
        .authenticate()
        .await
        .ok_or(TelemetryError::Unauthorized)
}

async fn fetch(
    state: &SharedState,
    token: &str,
    keys: &[TelemetryKey],
    query: &TimeseriesQuery,
    failure: &'static str,
) -> Result<RawTelemetry, TelemetryError> {
    // An empty body is as useless to the dashboard as a failed call.
    state
        .fetcher
        .fetch(token, keys, query)
        .await
        .filter(|raw| !raw.is_empty())
        .ok_or(TelemetryError::FetchFailed(failure))
}

pub async fn get_latest(
    State(state): State<SharedState>,
) -> Result<Json<TelemetrySnapshot>, TelemetryError> {
    let token = token(&state).await?;

    let mut keys = TelemetryKey::METRICS.to_vec();
    keys.push(TelemetryKey::TunnelUrl);

    let raw = fetch(
        &state,
        &token,
        &keys,
        &TimeseriesQuery::default(),
        "Could not fetch telemetry",
    )
    .await?;

    Ok(Json(TelemetrySnapshot::from_raw(
        &raw,
        Utc::now().timestamp_millis(),
    )))
}

pub async fn get_weekly(
    State(state): State<SharedState>,
) -> Result<Json<SeriesResponse>, TelemetryError> {
    get_series(&state, WEEKLY).await.map(Json)
}

pub async fn get_monthly(
    State(state): State<SharedState>,
) -> Result<Json<SeriesResponse>, TelemetryError> {
    get_series(&state, MONTHLY).await.map(Json)
}

async fn get_series(
    state: &SharedState,
    window: SeriesWindow,
) -> Result<SeriesResponse, TelemetryError> {
    let token = token(state).await?;

    let end_ts = Utc::now().timestamp_millis();
    let start_ts = end_ts - window.days * DAY_MS;
    let query = TimeseriesQuery::window(start_ts, end_ts, window.interval_ms, window.limit);

    let raw = fetch(
        state,
        &token,
        &TelemetryKey::SERIES_METRICS,
        &query,
        window.failure,
    )
    .await?;

    let data = build_series(&raw);
    tracing::debug!(points = data.len(), interval = window.label, "Assembled series");

    Ok(SeriesResponse {
        data,
        start_date: local_date(start_ts),
        end_date: local_date(end_ts),
        interval: window.label.to_string(),
        online: true,
    })
}

fn local_date(ts_ms: i64) -> String {
    Local
        .timestamp_millis_opt(ts_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
