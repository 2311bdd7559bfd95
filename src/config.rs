use anyhow::{Context, Result, ensure};
use std::{env, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// JIP endpoint and request queue configuration
    pub jip: JipConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JipConfig {
    /// URL of the JIP CGI every action is posted to
    pub url: String,
    /// Delay before an empty request queue checks for new work again
    pub poll_interval: Duration,
    /// Upper bound for a single request/response round trip
    pub request_timeout: Duration,
}

impl Default for JipConfig {
    fn default() -> Self {
        Self {
            url: JipConfig::DEFAULT_URL.to_string(),
            poll_interval: Duration::from_millis(JipConfig::DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_secs(JipConfig::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// Returns a reference to the cached configuration. On first call, it loads
    /// and validates all configuration from environment variables. Subsequent
    /// calls return the cached instance.
    ///
    /// # Panics
    /// Panics if configuration loading fails. The application cannot talk to
    /// the mesh network without a valid configuration.
    pub fn get() -> &'static Self {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
        APP_CONFIG.get_or_init(|| {
            Self::load_internal().expect("failed to load application configuration")
        })
    }

    /// Load and validate all configuration from environment variables
    ///
    /// This should only be called once via get().
    fn load_internal() -> Result<Self> {
        let jip = JipConfig::load()?;

        Ok(Self { jip })
    }
}

impl JipConfig {
    pub const DEFAULT_URL: &str = "http://localhost/cgi-bin/JIP.cgi";
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

    fn load() -> Result<Self> {
        let url = env::var("JIP_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_string());

        let poll_interval =
            parse_nonzero_var("JIP_POLL_INTERVAL_MS", Self::DEFAULT_POLL_INTERVAL_MS)
                .map(Duration::from_millis)?;

        let request_timeout =
            parse_var("JIP_REQUEST_TIMEOUT_SECS", Self::DEFAULT_REQUEST_TIMEOUT_SECS)
                .map(Duration::from_secs)?;

        Ok(Self {
            url,
            poll_interval,
            request_timeout,
        })
    }
}

fn parse_var(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("failed to parse {name}: invalid format")),
        Err(_) => Ok(default),
    }
}

fn parse_nonzero_var(name: &str, default: u64) -> Result<u64> {
    let value = parse_var(name, default)?;
    ensure!(value > 0, "{name} must be greater than zero");

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_cgi_endpoint_and_100ms_poll() {
        let config = JipConfig::default();

        assert_eq!(config.url, "http://localhost/cgi-bin/JIP.cgi");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn parse_var_falls_back_to_default_when_unset() {
        let value = parse_var("JIP_TEST_UNSET_VARIABLE_7f3a", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn parse_var_rejects_invalid_numbers() {
        // SAFETY: the variable name is unique to this test
        unsafe { env::set_var("JIP_TEST_INVALID_NUMBER_7f3a", "ten") };

        let result = parse_var("JIP_TEST_INVALID_NUMBER_7f3a", 1);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("JIP_TEST_INVALID_NUMBER_7f3a")
        );
    }

    #[test]
    fn parse_nonzero_var_rejects_zero_poll_interval() {
        // SAFETY: the variable name is unique to this test
        unsafe { env::set_var("JIP_TEST_ZERO_INTERVAL_7f3a", "0") };

        let result = parse_nonzero_var("JIP_TEST_ZERO_INTERVAL_7f3a", 100);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("JIP_TEST_ZERO_INTERVAL_7f3a must be greater than zero")
        );
    }

    #[test]
    fn parse_nonzero_var_accepts_default() {
        let value = parse_nonzero_var("JIP_TEST_UNSET_INTERVAL_7f3a", 100).unwrap();
        assert_eq!(value, 100);
    }

    #[test]
    fn parse_var_trims_whitespace() {
        // SAFETY: the variable name is unique to this test
        unsafe { env::set_var("JIP_TEST_PADDED_NUMBER_7f3a", " 250 ") };

        let value = parse_var("JIP_TEST_PADDED_NUMBER_7f3a", 1).unwrap();
        assert_eq!(value, 250);
    }
}
