pub mod auth;
pub mod keys;
pub mod telemetry;

pub use auth::Authenticator;
pub use keys::{RawTelemetry, Sample, TelemetryKey};
pub use telemetry::{TelemetryFetcher, TimeseriesQuery};

/// Upstream ThingsBoard instance. Not configurable.
pub const THINGSBOARD_HOST: &str = "https://demo.thingsboard.io";
