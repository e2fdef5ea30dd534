pub mod handlers;
pub mod models;
pub mod routes;

pub use routes::create_router;

use crate::config::Config;
use crate::probe::ConnectivityProbe;
use crate::thingsboard::{Authenticator, TelemetryFetcher, THINGSBOARD_HOST};
use std::sync::Arc;

/// Everything a handler needs. Built once in `main`, never mutated.
#[derive(Debug, Clone)]
pub struct AppState {
    pub authenticator: Authenticator,
    pub fetcher: TelemetryFetcher,
    pub probe: ConnectivityProbe,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self::with_base_url(config, http, THINGSBOARD_HOST)
    }

    /// Same as [`AppState::new`] against a different ThingsBoard host.
    pub fn with_base_url(config: &Config, http: reqwest::Client, base_url: &str) -> Self {
        let probe = ConnectivityProbe::from_config(&config.probe);
        let retry = config.retry.policy();
        let authenticator = Authenticator::new(
            http.clone(),
            base_url,
            config.thingsboard.clone(),
            probe.clone(),
        )
        .with_retry(retry);
        let fetcher = TelemetryFetcher::new(
            http,
            base_url,
            config.thingsboard.device_id.clone(),
            probe.clone(),
            authenticator.clone(),
        )
        .with_retry(retry);

        Self {
            authenticator,
            fetcher,
            probe,
        }
    }
}
