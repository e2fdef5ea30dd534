use crate::thingsboard::keys::{
    extract_latest, extract_text, sample_at, series_len, ts_at, RawTelemetry, TelemetryKey,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySnapshot {
    pub power: f64,
    pub power_timestamp: Option<i64>,
    pub voltage: f64,
    pub voltage_timestamp: Option<i64>,
    pub current: f64,
    pub current_timestamp: Option<i64>,
    pub frequency: f64,
    pub frequency_timestamp: Option<i64>,
    pub rmp: f64,
    pub rmp_timestamp: Option<i64>,
    pub energy: f64,
    pub energy_timestamp: Option<i64>,
    pub powerfactor: f64,
    pub powerfactor_timestamp: Option<i64>,
    pub timestamp: i64,
    pub online: bool,
    pub ngrok_url: Option<String>,
}

impl TelemetrySnapshot {
    pub fn from_raw(raw: &RawTelemetry, now_ms: i64) -> Self {
        let power = extract_latest(raw, TelemetryKey::Power);
        let voltage = extract_latest(raw, TelemetryKey::Voltage);
        let current = extract_latest(raw, TelemetryKey::Current);
        let frequency = extract_latest(raw, TelemetryKey::Frequency);
        let rmp = extract_latest(raw, TelemetryKey::Rmp);
        let energy = extract_latest(raw, TelemetryKey::Energy);
        let powerfactor = extract_latest(raw, TelemetryKey::PowerFactor);

        Self {
            power: power.value,
            power_timestamp: power.ts,
            voltage: voltage.value,
            voltage_timestamp: voltage.ts,
            current: current.value,
            current_timestamp: current.ts,
            frequency: frequency.value,
            frequency_timestamp: frequency.ts,
            rmp: rmp.value,
            rmp_timestamp: rmp.ts,
            energy: energy.value,
            energy_timestamp: energy.ts,
            powerfactor: powerfactor.value,
            powerfactor_timestamp: powerfactor.ts,
            timestamp: now_ms,
            online: true,
            ngrok_url: extract_text(raw, TelemetryKey::TunnelUrl),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: Option<i64>,
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
    pub frequency: f64,
    pub rmp: f64,
    pub energy: f64,
}

/// One point per power reading. Companion metrics are matched by position
/// and read as 0 past the end of their own series.
pub fn build_series(raw: &RawTelemetry) -> Vec<SeriesPoint> {
    let value = |key, i| sample_at(raw, key, i).value;

    (0..series_len(raw, TelemetryKey::Power))
        .map(|i| SeriesPoint {
            timestamp: ts_at(raw, TelemetryKey::Power, i),
            power: value(TelemetryKey::Power, i),
            voltage: value(TelemetryKey::Voltage, i),
            current: value(TelemetryKey::Current, i),
            frequency: value(TelemetryKey::Frequency, i),
            rmp: value(TelemetryKey::Rmp, i),
            energy: value(TelemetryKey::Energy, i),
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub data: Vec<SeriesPoint>,
    pub start_date: String,
    pub end_date: String,
    pub interval: String,
    pub online: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub online: bool,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Authentication failed")]
    Unauthorized,
    #[error("{0}")]
    FetchFailed(&'static str),
}

impl TelemetryError {
    pub fn status(&self) -> StatusCode {
        match self {
            TelemetryError::Unauthorized => StatusCode::UNAUTHORIZED,
            TelemetryError::FetchFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TelemetryError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            online: false,
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn raw(v: Value) -> RawTelemetry {
        v.as_object().cloned().unwrap()
    }

    fn points(n: usize, base_ts: i64, value: f64) -> Value {
        Value::Array(
            (0..n)
                .map(|i| json!({ "ts": base_ts + i as i64 * 3_600_000, "value": format!("{}", value + i as f64) }))
                .collect(),
        )
    }

    #[test]
    fn test_snapshot_from_mixed_variants() {
        let data = raw(json!({
            "Power": [{ "ts": 10, "value": "1500.5" }],
            "VOLTAGE": [{ "ts": 11, "value": "230" }],
            "current": [{ "ts": 12, "value": 6.5 }],
            "PF": [{ "ts": 13, "value": "0.97" }],
            "Rmp": [{ "ts": 14, "value": "garbage" }],
            "Ngrok_Url": [{ "ts": 15, "value": "https://x.ngrok.io" }],
        }));

        let snap = TelemetrySnapshot::from_raw(&data, 99);
        assert_eq!(snap.power, 1500.5);
        assert_eq!(snap.power_timestamp, Some(10));
        assert_eq!(snap.voltage, 230.0);
        assert_eq!(snap.current, 6.5);
        assert_eq!(snap.powerfactor, 0.97);
        assert_eq!(snap.powerfactor_timestamp, Some(13));
        assert_eq!(snap.rmp, 0.0);
        assert_eq!(snap.rmp_timestamp, None);
        assert_eq!(snap.energy, 0.0);
        assert_eq!(snap.frequency_timestamp, None);
        assert_eq!(snap.timestamp, 99);
        assert!(snap.online);
        assert_eq!(snap.ngrok_url.as_deref(), Some("https://x.ngrok.io"));
    }

    #[test]
    fn test_snapshot_serializes_null_tunnel_url() {
        let snap = TelemetrySnapshot::from_raw(&raw(json!({ "power": [] })), 1);
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["ngrok_url"], Value::Null);
        assert_eq!(v["power_timestamp"], Value::Null);
        assert_eq!(v["online"], json!(true));
    }

    #[test]
    fn test_series_pads_short_companions() {
        let data = raw(json!({
            "Power": points(168, 1_000, 100.0),
            "voltage": points(100, 1_000, 220.0),
        }));

        let series = build_series(&data);
        assert_eq!(series.len(), 168);
        assert_eq!(series[0].timestamp, Some(1_000));
        assert_eq!(series[0].power, 100.0);
        assert_eq!(series[99].voltage, 319.0);
        for point in &series[100..] {
            assert_eq!(point.voltage, 0.0);
        }
        assert!(series.iter().all(|p| p.current == 0.0 && p.energy == 0.0));
        assert_eq!(series[167].timestamp, Some(1_000 + 167 * 3_600_000));
    }

    #[test]
    fn test_series_length_follows_power_not_longest() {
        let data = raw(json!({
            "power": points(3, 0, 1.0),
            "Energy": points(10, 0, 5.0),
        }));
        assert_eq!(build_series(&data).len(), 3);
    }

    #[test]
    fn test_series_empty_without_power() {
        let data = raw(json!({ "Voltage": points(5, 0, 1.0) }));
        assert!(build_series(&data).is_empty());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(TelemetryError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            TelemetryError::FetchFailed("Could not fetch telemetry").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            TelemetryError::FetchFailed("Could not fetch telemetry").to_string(),
            "Could not fetch telemetry"
        );
    }
}
