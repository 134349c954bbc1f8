//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Webhook secret used by the mock gateway when no real keys are set.
pub const DEV_GATEWAY_SECRET: &str = "dev-gateway-secret";

/// Public key id reported by the mock gateway.
pub const DEV_GATEWAY_KEY_ID: &str = "rzp_test_local";

/// Payment gateway settings.
#[derive(Clone)]
pub struct GatewayConfig {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub base_url: String,
    pub currency: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Returns the key pair when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.key_id, &self.key_secret) {
            (Some(id), Some(secret)) => Some((id, secret)),
            _ => None,
        }
    }

    /// Secret used to verify callback signatures.
    pub fn signing_secret(&self) -> &str {
        self.credentials()
            .map(|(_, secret)| secret)
            .unwrap_or(DEV_GATEWAY_SECRET)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            key_id: None,
            key_secret: None,
            base_url: "https://api.razorpay.com".to_string(),
            currency: "INR".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &self.key_secret.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs in memory
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `RAZORPAY_KEY_ID` / `RAZORPAY_KEY_SECRET`: gateway keys; unset uses
///   the mock gateway
/// - `RAZORPAY_BASE_URL`: gateway API root (default: `"https://api.razorpay.com"`)
/// - `PAYMENT_CURRENCY`: currency code (default: `"INR"`)
/// - `GATEWAY_TIMEOUT_SECS`: bound on each gateway call (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub gateway: GatewayConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty("DATABASE_URL"),
            max_connections: non_empty("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.max_connections),
            gateway: GatewayConfig {
                key_id: non_empty("RAZORPAY_KEY_ID"),
                key_secret: non_empty("RAZORPAY_KEY_SECRET"),
                base_url: non_empty("RAZORPAY_BASE_URL").unwrap_or(defaults.gateway.base_url),
                currency: non_empty("PAYMENT_CURRENCY").unwrap_or(defaults.gateway.currency),
                timeout: non_empty("GATEWAY_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.gateway.timeout),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            max_connections: 10,
            gateway: GatewayConfig::default(),
        }
    }
}
