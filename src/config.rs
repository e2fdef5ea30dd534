use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Public URL of the deployed service; the keep-alive task pings it.
pub const DEFAULT_KEEPALIVE_URL: &str = "https://iems-backend-u6bb.onrender.com/health";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub thingsboard: ThingsboardConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub keepalive: KeepAliveConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

fn default_api_host() -> String {
    "0.0.0.0".into()
}

fn default_api_port() -> u16 {
    5000
}

/// Credentials for the upstream ThingsBoard tenant.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ThingsboardConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Pre-issued bearer token; when set no login call is made.
    #[serde(default)]
    pub jwt_token: Option<String>,
}

// Manual impl so secrets never end up in logs.
impl std::fmt::Debug for ThingsboardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThingsboardConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("device_id", &self.device_id)
            .field("jwt_token", &self.jwt_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_address")]
    pub address: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            address: default_probe_address(),
            timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_probe_address() -> String {
    "8.8.8.8:53".into()
}

fn default_probe_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keepalive_url")]
    pub url: String,
    #[serde(default = "default_keepalive_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_keepalive_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_keepalive_url(),
            interval_secs: default_keepalive_interval_secs(),
            timeout_secs: default_keepalive_timeout_secs(),
        }
    }
}

/// Retries for upstream ThingsBoard calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_attempts(self.max_attempts)
            .with_delay(Duration::from_millis(self.initial_delay_ms))
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_keepalive_url() -> String {
    DEFAULT_KEEPALIVE_URL.into()
}

fn default_keepalive_interval_secs() -> u64 {
    180
}

fn default_keepalive_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load YAML from disk, substitute $(VAR)/${VAR} with env vars, then parse.
    ///
    /// A missing file falls back to defaults so the service can run from
    /// environment variables alone.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut cfg: Self = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let expanded = expand_env_placeholders(&raw)?;
            serde_yaml::from_str(&expanded)?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Credentials and the port come from the hosting platform's environment.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = non_empty_env("TB_USERNAME") {
            self.thingsboard.username = Some(v);
        }
        if let Some(v) = non_empty_env("TB_PASSWORD") {
            self.thingsboard.password = Some(v);
        }
        if let Some(v) = non_empty_env("TB_DEVICE_ID") {
            self.thingsboard.device_id = Some(v);
        }
        if let Some(v) = non_empty_env("TB_JWT_TOKEN") {
            self.thingsboard.jwt_token = Some(v);
        }
        if let Some(port) = non_empty_env("PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.api.port == 0 {
            return Err(AppError::Config("API port cannot be 0".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "Retry max_attempts must be at least 1".to_string(),
            ));
        }

        if self.probe.address.trim().is_empty() {
            return Err(AppError::Config(
                "Probe address cannot be empty".to_string(),
            ));
        }

        if self.keepalive.enabled {
            if self.keepalive.url.trim().is_empty() {
                return Err(AppError::Config(
                    "Keep-alive URL cannot be empty".to_string(),
                ));
            }
            if self.keepalive.interval_secs == 0 {
                return Err(AppError::Config(
                    "Keep-alive interval must be positive".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
fn expand_env_placeholders(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let end = match it.peek().copied() {
            Some('$') => {
                // "$$" -> "$"
                it.next();
                out.push('$');
                continue;
            }
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                continue;
            }
        };

        it.next();
        let var = read_until(&mut it, end).ok_or_else(|| {
            AppError::Config(format!("unterminated env placeholder: missing '{}'", end))
        })?;
        let val = std::env::var(&var)
            .map_err(|_| AppError::Config(format!("missing environment variable: {}", var)))?;
        out.push_str(&val);
    }

    Ok(out)
}

fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_tb_env() {
        for key in [
            "TB_USERNAME",
            "TB_PASSWORD",
            "TB_DEVICE_ID",
            "TB_JWT_TOKEN",
            "PORT",
        ] {
            std::env::remove_var(key);
        }
    }

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.yaml", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_expand_placeholders() {
        std::env::set_var("IEMS_TEST_PLACEHOLDER", "value");
        let out = expand_env_placeholders("a: $(IEMS_TEST_PLACEHOLDER)\nb: ${IEMS_TEST_PLACEHOLDER}")
            .unwrap();
        assert_eq!(out, "a: value\nb: value");
        std::env::remove_var("IEMS_TEST_PLACEHOLDER");
    }

    #[test]
    fn test_expand_placeholders_escapes_and_bare_dollar() {
        let out = expand_env_placeholders("price: $$5 and $x").unwrap();
        assert_eq!(out, "price: $5 and $x");
    }

    #[test]
    fn test_expand_placeholders_missing_var() {
        let err = expand_env_placeholders("a: $(IEMS_DEFINITELY_NOT_SET)").unwrap_err();
        assert!(err.to_string().contains("IEMS_DEFINITELY_NOT_SET"));
    }

    #[test]
    fn test_expand_placeholders_unterminated() {
        assert!(expand_env_placeholders("a: ${OPEN").is_err());
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        clear_tb_env();
        let cfg = Config::load("/nonexistent/iems-config.yaml").unwrap();
        assert_eq!(cfg.api.host, "0.0.0.0");
        assert_eq!(cfg.api.port, 5000);
        assert_eq!(cfg.probe.address, "8.8.8.8:53");
        assert_eq!(cfg.probe.timeout_secs, 5);
        assert!(cfg.keepalive.enabled);
        assert_eq!(cfg.keepalive.interval_secs, 180);
        assert_eq!(cfg.keepalive.timeout_secs, 10);
        assert_eq!(cfg.keepalive.url, DEFAULT_KEEPALIVE_URL);
        assert!(cfg.thingsboard.username.is_none());
        assert!(cfg.thingsboard.jwt_token.is_none());
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.initial_delay_ms, 1000);
    }

    #[test]
    #[serial]
    fn test_env_overrides_yaml() {
        clear_tb_env();
        let path = write_temp(
            "iems-config-override",
            r#"
api:
  port: 8081
thingsboard:
  username: "yaml-user"
  password: "yaml-pass"
"#,
        );

        std::env::set_var("TB_USERNAME", "env-user");
        std::env::set_var("TB_DEVICE_ID", "device-123");
        std::env::set_var("TB_JWT_TOKEN", "   ");

        let cfg = tokio_test::assert_ok!(Config::load(&path));
        assert_eq!(cfg.api.port, 8081);
        assert_eq!(cfg.thingsboard.username.as_deref(), Some("env-user"));
        assert_eq!(cfg.thingsboard.password.as_deref(), Some("yaml-pass"));
        assert_eq!(cfg.thingsboard.device_id.as_deref(), Some("device-123"));
        // Blank values count as unset.
        assert!(cfg.thingsboard.jwt_token.is_none());

        clear_tb_env();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    #[serial]
    fn test_validate_rejects_zero_interval() {
        clear_tb_env();
        let path = write_temp(
            "iems-config-interval",
            r#"
keepalive:
  interval_secs: 0
"#,
        );

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    #[serial]
    fn test_disabled_keepalive_skips_validation() {
        clear_tb_env();
        let path = write_temp(
            "iems-config-disabled",
            r#"
keepalive:
  enabled: false
  url: ""
  interval_secs: 0
"#,
        );

        let cfg = Config::load(&path).unwrap();
        assert!(!cfg.keepalive.enabled);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_debug_masks_secrets() {
        let tb = ThingsboardConfig {
            username: Some("user".into()),
            password: Some("hunter2".into()),
            device_id: None,
            jwt_token: Some("secret-token".into()),
        };
        let rendered = format!("{:?}", tb);
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    #[serial]
    fn test_retry_section_builds_policy() {
        clear_tb_env();
        let path = write_temp(
            "iems-config-retry",
            r#"
retry:
  max_attempts: 5
  initial_delay_ms: 250
"#,
        );

        let cfg = Config::load(&path).unwrap();
        let policy = cfg.retry.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_after(0), Some(Duration::from_millis(250)));
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(500)));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    #[serial]
    fn test_validate_rejects_zero_attempts() {
        clear_tb_env();
        let path = write_temp(
            "iems-config-attempts",
            r#"
retry:
  max_attempts: 0
"#,
        );

        assert!(matches!(Config::load(&path), Err(AppError::Config(_))));

        std::fs::remove_file(&path).ok();
    }
}
