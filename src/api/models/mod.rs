pub mod health;
pub mod telemetry;

pub use health::HealthResponse;
pub use telemetry::{
    build_series, ErrorResponse, SeriesPoint, SeriesResponse, TelemetryError, TelemetrySnapshot,
};
