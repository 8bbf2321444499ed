//! Configuration management for the carhire server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Gateway credentials and the token secret are required; everything else
//! falls back to a default when absent or unparsable.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Startup configuration failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is absent or blank.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and metrics listeners
    pub server: ServerConfig,
    /// Paynow gateway credentials and budgets
    pub paynow: PaynowConfig,
    /// Token signing
    pub auth: AuthConfig,
    /// Mail relay, when configured
    pub smtp: Option<SmtpConfig>,
    /// Booking windows
    pub booking: BookingConfig,
    /// Background sweepers
    pub jobs: JobsConfig,
    /// Websocket sessions
    pub realtime: RealtimeConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Paynow integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaynowConfig {
    /// Merchant integration id
    pub integration_id: String,
    /// Hashing key; never logged
    #[serde(skip_serializing)]
    pub integration_key: String,
    /// Webhook callback URL handed to the gateway
    pub result_url: String,
    /// Browser return URL after a redirect payment
    pub return_url: String,
    /// Interface root, e.g. `https://www.paynow.co.zw/interface`
    pub base_url: String,
    /// Fallback payer email for mobile payments
    pub merchant_email: Option<String>,
    /// Budget per gateway call
    pub call_timeout: Duration,
    /// Budget for an initiate end-to-end
    pub initiate_timeout: Duration,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    /// User token TTL in seconds (default: 1 day)
    pub jwt_ttl: u64,
    /// Device token TTL in seconds (default: 30 days)
    pub device_token_ttl: u64,
}

/// Mail relay credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    pub host: String,
    /// Relay port
    pub port: u16,
    /// Login
    pub username: Option<String>,
    /// Password; never logged
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Sender mailbox
    pub from: String,
}

/// Booking windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Minutes a customer has to pay after the driver accepts
    pub payment_window_minutes: i64,
    /// Minutes an unanswered driver request stays open
    pub driver_request_ttl_minutes: i64,
}

impl BookingConfig {
    /// Payment window as a chrono duration.
    #[must_use]
    pub fn payment_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.payment_window_minutes)
    }

    /// Request TTL as a chrono duration.
    #[must_use]
    pub fn driver_request_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.driver_request_ttl_minutes)
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            payment_window_minutes: 30,
            driver_request_ttl_minutes: 120,
        }
    }
}

/// Background sweeper settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Period of every sweeper
    pub sweep_interval: Duration,
}

/// Websocket session settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Server ping period
    pub ping_interval: Duration,
    /// Close sessions silent for this long
    pub idle_timeout: Duration,
    /// Outbound frames buffered per session
    pub session_queue: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(25),
            idle_timeout: Duration::from_secs(60),
            session_queue: 256,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] when a required variable is absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] when a required variable is absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let secs = |key: &str, default: u64| {
            get(key).and_then(|s| s.parse().ok()).unwrap_or(default)
        };

        let smtp = get("SMTP_HOST").map(|host| SmtpConfig {
            host,
            port: get("SMTP_PORT").and_then(|s| s.parse().ok()).unwrap_or(587),
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD"),
            from: get("SMTP_FROM").unwrap_or_else(|| "no-reply@carhire.local".to_string()),
        });

        Ok(Self {
            server: ServerConfig {
                host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: get("PORT").and_then(|s| s.parse().ok()).unwrap_or(8080),
                metrics_host: get("METRICS_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                metrics_port: get("METRICS_PORT").and_then(|s| s.parse().ok()).unwrap_or(9090),
                shutdown_timeout: secs("SHUTDOWN_TIMEOUT", 30),
            },
            paynow: PaynowConfig {
                integration_id: required("PAYNOW_INTEGRATION_ID")?,
                integration_key: required("PAYNOW_INTEGRATION_KEY")?,
                result_url: required("PAYNOW_RESULT_URL")?,
                return_url: required("PAYNOW_RETURN_URL")?,
                base_url: get("PAYNOW_BASE_URL")
                    .unwrap_or_else(|| "https://www.paynow.co.zw/interface".to_string()),
                merchant_email: get("PAYNOW_MERCHANT_EMAIL"),
                call_timeout: Duration::from_secs(secs("GATEWAY_CALL_TIMEOUT_SECS", 10)),
                initiate_timeout: Duration::from_secs(secs("GATEWAY_INITIATE_TIMEOUT_SECS", 30)),
            },
            auth: AuthConfig {
                jwt_secret: required("JWT_SECRET")?,
                jwt_ttl: secs("JWT_TTL_SECS", 86_400),
                device_token_ttl: secs("DEVICE_TOKEN_TTL_SECS", 2_592_000),
            },
            smtp,
            booking: BookingConfig {
                payment_window_minutes: get("PAYMENT_WINDOW_MINUTES")
                    .and_then(|s| s.parse().ok())
                    .filter(|m: &i64| *m > 0)
                    .unwrap_or(30),
                driver_request_ttl_minutes: get("DRIVER_REQUEST_TTL_MINUTES")
                    .and_then(|s| s.parse().ok())
                    .filter(|m: &i64| *m > 0)
                    .unwrap_or(120),
            },
            jobs: JobsConfig {
                sweep_interval: Duration::from_secs(secs("SWEEP_INTERVAL_SECS", 60).max(1)),
            },
            realtime: RealtimeConfig {
                ping_interval: Duration::from_secs(secs("WS_PING_INTERVAL_SECS", 25).max(1)),
                idle_timeout: Duration::from_secs(secs("WS_IDLE_TIMEOUT_SECS", 60).max(1)),
                session_queue: get("WS_SESSION_QUEUE")
                    .and_then(|s| s.parse().ok())
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(256),
            },
        })
    }

    /// `host:port` of the HTTP listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// `host:port` of the Prometheus listener.
    #[must_use]
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.server.metrics_host, self.server.metrics_port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required_only() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("PAYNOW_INTEGRATION_ID", "1201"),
            ("PAYNOW_INTEGRATION_KEY", "secret-key"),
            ("PAYNOW_RESULT_URL", "https://api.test/api/v1/payments/webhook/paynow"),
            ("PAYNOW_RETURN_URL", "https://app.test/payments/return"),
            ("JWT_SECRET", "jwt-secret"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()))
    }

    #[test]
    fn defaults_apply() {
        let config = load(&required_only()).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.metrics_address(), "0.0.0.0:9090");
        assert_eq!(config.paynow.call_timeout, Duration::from_secs(10));
        assert_eq!(config.paynow.initiate_timeout, Duration::from_secs(30));
        assert_eq!(config.booking.payment_window(), chrono::Duration::minutes(30));
        assert_eq!(config.realtime.session_queue, 256);
        assert!(config.smtp.is_none());
    }

    #[test]
    fn missing_secret_is_fatal() {
        let mut vars = required_only();
        vars.remove("JWT_SECRET");
        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut vars = required_only();
        vars.insert("PAYNOW_INTEGRATION_KEY", "   ");
        assert_eq!(
            load(&vars).unwrap_err(),
            ConfigError::Missing("PAYNOW_INTEGRATION_KEY")
        );
    }

    #[test]
    fn overrides_and_garbage() {
        let mut vars = required_only();
        vars.insert("PORT", "3000");
        vars.insert("PAYMENT_WINDOW_MINUTES", "15");
        vars.insert("SWEEP_INTERVAL_SECS", "not-a-number");
        vars.insert("SMTP_HOST", "smtp.test");
        let config = load(&vars).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.booking.payment_window_minutes, 15);
        assert_eq!(config.jobs.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.smtp.map(|s| s.port), Some(587));
    }
}
