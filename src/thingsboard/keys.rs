//! Canonical telemetry keys and the upstream spellings they may arrive under.
//!
//! Devices publish the same metric as `Power`, `power` or `POWER` depending on
//! firmware, so every lookup goes through the variant table. Lookups never
//! fail: anything missing or malformed reads as `0.0` with no timestamp.

use serde_json::{Map, Value};

/// Body of a ThingsBoard timeseries query: upstream key -> `[{ts, value}, ...]`.
pub type RawTelemetry = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryKey {
    Power,
    Voltage,
    Current,
    Energy,
    Frequency,
    PowerFactor,
    Rmp,
    /// Tunnel endpoint the device reports alongside its readings.
    TunnelUrl,
}

impl TelemetryKey {
    /// Every metric served by the snapshot endpoint.
    pub const METRICS: [TelemetryKey; 7] = [
        TelemetryKey::Power,
        TelemetryKey::Voltage,
        TelemetryKey::Current,
        TelemetryKey::Frequency,
        TelemetryKey::Rmp,
        TelemetryKey::Energy,
        TelemetryKey::PowerFactor,
    ];

    /// Metrics carried in the weekly/monthly series (no power factor).
    pub const SERIES_METRICS: [TelemetryKey; 6] = [
        TelemetryKey::Power,
        TelemetryKey::Voltage,
        TelemetryKey::Current,
        TelemetryKey::Frequency,
        TelemetryKey::Rmp,
        TelemetryKey::Energy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TelemetryKey::Power => "power",
            TelemetryKey::Voltage => "voltage",
            TelemetryKey::Current => "current",
            TelemetryKey::Energy => "energy",
            TelemetryKey::Frequency => "frequency",
            TelemetryKey::PowerFactor => "powerfact",
            TelemetryKey::Rmp => "rmp",
            TelemetryKey::TunnelUrl => "ngrok_url",
        }
    }

    /// Upstream spellings in priority order; the first one present wins.
    pub fn variants(self) -> &'static [&'static str] {
        match self {
            TelemetryKey::Power => &["Power", "power", "POWER"],
            TelemetryKey::Voltage => &["Voltage", "voltage", "VOLTAGE"],
            TelemetryKey::Current => &["Current", "current", "CURRENT"],
            TelemetryKey::Energy => &["Energy", "energy", "ENERGY"],
            TelemetryKey::Frequency => &["Frequency", "frequency", "FREQUENCY"],
            TelemetryKey::PowerFactor => &["PowerFact", "PF", "powerfactor", "Power_Factor"],
            TelemetryKey::Rmp => &["RMP", "rmp", "Rmp"],
            TelemetryKey::TunnelUrl => &["ngrok_url", "Ngrok_Url", "NGROK_URL"],
        }
    }
}

/// One reading. Absent or unparsable data reads as `0.0` with no timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub ts: Option<i64>,
}

/// Comma-joined `keys` query parameter covering every variant of `keys`,
/// deduplicated, in declaration order.
pub fn query_keys(keys: &[TelemetryKey]) -> String {
    let mut out: Vec<&str> = Vec::new();
    for variant in keys.iter().flat_map(|k| k.variants()) {
        if !out.contains(variant) {
            out.push(variant);
        }
    }
    out.join(",")
}

pub fn resolve_key(raw: &RawTelemetry, key: TelemetryKey) -> Option<&'static str> {
    key.variants().iter().copied().find(|v| raw.contains_key(*v))
}

fn series(raw: &RawTelemetry, key: TelemetryKey) -> &[Value] {
    resolve_key(raw, key)
        .and_then(|k| raw.get(k))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn series_len(raw: &RawTelemetry, key: TelemetryKey) -> usize {
    series(raw, key).len()
}

/// Sample at `index` of the resolved series for `key`.
pub fn sample_at(raw: &RawTelemetry, key: TelemetryKey, index: usize) -> Sample {
    series(raw, key)
        .get(index)
        .and_then(parse_entry)
        .unwrap_or_default()
}

/// Timestamp at `index`, independent of whether the value there parses.
pub fn ts_at(raw: &RawTelemetry, key: TelemetryKey, index: usize) -> Option<i64> {
    series(raw, key)
        .get(index)
        .and_then(|entry| entry.get("ts"))
        .and_then(coerce_ts)
}

/// Most recent reading; ThingsBoard returns series newest first.
pub fn extract_latest(raw: &RawTelemetry, key: TelemetryKey) -> Sample {
    sample_at(raw, key, 0)
}

/// First non-null `value` among the variants of `key`, rendered as text.
pub fn extract_text(raw: &RawTelemetry, key: TelemetryKey) -> Option<String> {
    key.variants().iter().find_map(|variant| {
        let entry = raw.get(*variant)?.as_array()?.first()?;
        match entry.get("value")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    })
}

fn parse_entry(entry: &Value) -> Option<Sample> {
    let value = entry.get("value").and_then(coerce_f64)?;
    let ts = entry.get("ts").and_then(coerce_ts);
    Some(Sample { value, ts })
}

fn coerce_f64(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn coerce_ts(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
