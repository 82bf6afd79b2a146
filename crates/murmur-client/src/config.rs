//! Client configuration loaded from environment variables.

use std::time::Duration;

use murmur_shared::constants::{
    DEFAULT_HTTP_PORT, RECONNECT_DELAY_MS, SUBSCRIBE_RETRY_TIMEOUT_SECS,
};

#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the Murmur server (`http://` or `https://`).
    /// Env: `MURMUR_SERVER_URL`
    /// Default: `http://localhost:5000`
    pub server_url: String,

    /// Credentials used by the terminal client.
    /// Env: `MURMUR_EMAIL`, `MURMUR_PASSWORD`
    pub email: Option<String>,
    pub password: Option<String>,

    /// Delay between delivery channel reconnect attempts.
    /// Env: `MURMUR_RECONNECT_DELAY_MS`
    /// Default: 1000 ms
    pub reconnect_delay: Duration,

    /// How long a conversation waits for the delivery channel before giving
    /// up on live updates.
    /// Env: `MURMUR_SUBSCRIBE_TIMEOUT_SECS`
    /// Default: 10 s
    pub subscribe_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("reconnect_delay", &self.reconnect_delay)
            .field("subscribe_timeout", &self.subscribe_timeout)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            email: None,
            password: None,
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            subscribe_timeout: Duration::from_secs(SUBSCRIBE_RETRY_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("MURMUR_SERVER_URL") {
            config.server_url = url.trim_end_matches('/').to_string();
        }
        config.email = lookup("MURMUR_EMAIL").filter(|v| !v.is_empty());
        config.password = lookup("MURMUR_PASSWORD").filter(|v| !v.is_empty());

        if let Some(val) = lookup("MURMUR_RECONNECT_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.reconnect_delay = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid MURMUR_RECONNECT_DELAY_MS, using default"),
            }
        }

        if let Some(val) = lookup("MURMUR_SUBSCRIBE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.subscribe_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid MURMUR_SUBSCRIBE_TIMEOUT_SECS, using default"
                ),
            }
        }

        config
    }

    /// WebSocket base derived from the HTTP base (`http` -> `ws`, `https` -> `wss`).
    pub fn ws_base_url(&self) -> String {
        if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.server_url.clone()
        }
    }
}
