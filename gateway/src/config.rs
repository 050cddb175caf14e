//! Typed configuration (§6, §10.3).
//!
//! Loaded from environment variables via `envy`, with an optional `.env`
//! file pulled in first by `dotenvy`. Unknown JSON/env fields are ignored,
//! matching the documented schema's forward-compatibility stance.

use serde::Deserialize;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_connection_cap() -> i64 {
    50_000
}

fn default_keepalive_interval_secs() -> u64 {
    15
}

fn default_keepalive_failure_budget() -> u8 {
    3
}

fn default_handshake_timeout_secs() -> u64 {
    15
}

fn default_read_limit_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_online_notify_debounce_secs() -> i64 {
    600
}

fn default_reconcile_interval_secs() -> u64 {
    600
}

fn default_mailbox_page_size() -> i64 {
    10
}

fn default_bus_topic() -> String {
    "ws-gateway".to_string()
}

fn default_bus_consumer_concurrency() -> usize {
    1
}

fn default_supported_app_version() -> String {
    "1.0.0".to_string()
}

fn default_env() -> String {
    "prod".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    pub storage_host: String,
    pub storage_port: u16,
    #[serde(default)]
    pub storage_pwd: Option<String>,

    pub cache_host: String,
    pub cache_port: u16,
    #[serde(default)]
    pub cache_pwd: Option<String>,

    pub jwt_public_key_path: String,

    #[serde(default = "default_bus_topic")]
    pub bus_topic: String,
    pub bus_brokers: String,
    #[serde(default = "default_bus_consumer_concurrency")]
    pub bus_consumer_concurrency: usize,

    #[serde(default = "default_connection_cap")]
    pub connection_cap: i64,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_keepalive_failure_budget")]
    pub keepalive_failure_budget: u8,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_read_limit_bytes")]
    pub read_limit_bytes: usize,
    #[serde(default = "default_online_notify_debounce_secs")]
    pub online_notify_debounce_secs: i64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_mailbox_page_size")]
    pub mailbox_page_size: i64,
    #[serde(default = "default_supported_app_version")]
    pub supported_app_version: String,
    #[serde(default = "default_env")]
    pub env: String,
}

impl Config {
    /// Loads `.env` (if present) then env vars prefixed `WS_GATEWAY_`.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config: Config = envy::prefixed("WS_GATEWAY_").from_env()?;
        config.storage_pwd = interpolate_placeholder(config.storage_pwd, "STORAGE_PWD");
        config.cache_pwd = interpolate_placeholder(config.cache_pwd, "CACHE_PWD");
        Ok(config)
    }

    pub fn redis_connection_string(&self) -> String {
        match &self.cache_pwd {
            Some(pwd) if !pwd.is_empty() => {
                format!("redis://:{}@{}:{}", pwd, self.cache_host, self.cache_port)
            }
            _ => format!("redis://{}:{}", self.cache_host, self.cache_port),
        }
    }

    pub fn postgres_connection_string(&self, user: &str, database: &str) -> String {
        match &self.storage_pwd {
            Some(pwd) if !pwd.is_empty() => format!(
                "postgres://{}:{}@{}:{}/{}",
                user, pwd, self.storage_host, self.storage_port, database
            ),
            _ => format!(
                "postgres://{}@{}:{}/{}",
                user, self.storage_host, self.storage_port, database
            ),
        }
    }
}

/// `STORAGE_PWD`/`CACHE_PWD` may be set to the literal string
/// `"${VAR_NAME}"` when secrets are injected by a sidecar after the process
/// environment is otherwise assembled; resolve that one level of
/// indirection here rather than at every call site.
fn interpolate_placeholder(value: Option<String>, var_name: &str) -> Option<String> {
    match value {
        Some(v) if v == format!("${{{}}}", var_name) => std::env::var(var_name).ok(),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn placeholder_resolves_from_named_env_var() {
        std::env::set_var("STORAGE_PWD", "s3cr3t");
        let resolved = interpolate_placeholder(Some("${STORAGE_PWD}".to_string()), "STORAGE_PWD");
        assert_eq!(resolved.as_deref(), Some("s3cr3t"));
        std::env::remove_var("STORAGE_PWD");
    }

    #[test]
    fn literal_password_passes_through_unchanged() {
        let resolved = interpolate_placeholder(Some("literal-pass".to_string()), "STORAGE_PWD");
        assert_eq!(resolved.as_deref(), Some("literal-pass"));
    }

    #[test]
    #[serial]
    fn load_picks_up_prefixed_env_vars() {
        std::env::set_var("WS_GATEWAY_STORAGE_HOST", "db.internal");
        std::env::set_var("WS_GATEWAY_STORAGE_PORT", "5432");
        std::env::set_var("WS_GATEWAY_CACHE_HOST", "redis.internal");
        std::env::set_var("WS_GATEWAY_CACHE_PORT", "6379");
        std::env::set_var("WS_GATEWAY_JWT_PUBLIC_KEY_PATH", "/keys");
        std::env::set_var("WS_GATEWAY_BUS_BROKERS", "kafka:9092");

        let config = Config::load().unwrap();
        assert_eq!(config.storage_host, "db.internal");
        assert_eq!(config.connection_cap, 50_000);
        assert_eq!(config.keepalive_failure_budget, 3);

        for var in [
            "WS_GATEWAY_STORAGE_HOST",
            "WS_GATEWAY_STORAGE_PORT",
            "WS_GATEWAY_CACHE_HOST",
            "WS_GATEWAY_CACHE_PORT",
            "WS_GATEWAY_JWT_PUBLIC_KEY_PATH",
            "WS_GATEWAY_BUS_BROKERS",
        ] {
            std::env::remove_var(var);
        }
    }
}
