//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use murmur_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_SESSION_TTL_DAYS, MAX_IMAGE_SIZE};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API and push channel.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// SQLite database file. `:memory:` keeps everything in RAM.
    /// Env: `DATABASE_PATH`
    /// Default: `./murmur.db`
    pub database_path: PathBuf,

    /// Directory where uploaded images are stored.
    /// Env: `MEDIA_STORAGE_PATH`
    /// Default: `./media`
    pub media_storage_path: PathBuf,

    /// Maximum decoded image size in bytes (10 MiB).
    /// Env: `MAX_IMAGE_SIZE`
    pub max_image_size: usize,

    /// Base URL prefixed to media links handed to clients.
    /// Env: `PUBLIC_BASE_URL`
    /// Default: `http://localhost:5000`
    pub public_base_url: String,

    /// Ed25519 seed used to sign session tokens (hex-encoded, 64 chars).
    /// Env: `SESSION_SIGNING_KEY`
    /// Default: none, a fresh key is generated per process (sessions do
    /// not survive restarts).
    pub session_signing_key: Option<[u8; 32]>,

    /// Session lifetime.
    /// Env: `SESSION_TTL_DAYS`
    /// Default: 7 days
    pub session_ttl: chrono::Duration,

    /// Origin allowed by CORS (with credentials).
    /// Env: `CORS_ORIGIN`
    /// Default: `http://localhost:5173`
    pub cors_origin: String,

    /// Production mode: session cookies are marked `Secure`.
    /// Env: `PRODUCTION` (true/false)
    /// Default: `false`
    pub production: bool,

    /// Also push a routed message to the sender's own channels.
    /// Env: `ECHO_TO_SENDER` (true/false)
    /// Default: `false`
    pub echo_to_sender: bool,

    /// A push channel that stays silent this long is dropped. The server
    /// pings at half this interval.
    /// Env: `CHANNEL_IDLE_TIMEOUT_SECS`
    /// Default: 60 s
    pub channel_idle_timeout: Duration,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("media_storage_path", &self.media_storage_path)
            .field("max_image_size", &self.max_image_size)
            .field("public_base_url", &self.public_base_url)
            .field("session_signing_key", &self.session_signing_key.map(|_| "<redacted>"))
            .field("session_ttl", &self.session_ttl)
            .field("cors_origin", &self.cors_origin)
            .field("production", &self.production)
            .field("echo_to_sender", &self.echo_to_sender)
            .field("channel_idle_timeout", &self.channel_idle_timeout)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./murmur.db"),
            media_storage_path: PathBuf::from("./media"),
            max_image_size: MAX_IMAGE_SIZE,
            public_base_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            session_signing_key: None,
            session_ttl: chrono::Duration::days(DEFAULT_SESSION_TTL_DAYS),
            cors_origin: "http://localhost:5173".to_string(),
            production: false,
            echo_to_sender: false,
            channel_idle_timeout: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("MEDIA_STORAGE_PATH") {
            config.media_storage_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("MAX_IMAGE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_image_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_IMAGE_SIZE, using default"),
            }
        }

        if let Some(url) = lookup("PUBLIC_BASE_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(hex_key) = lookup("SESSION_SIGNING_KEY") {
            match parse_hex_key(&hex_key) {
                Ok(key) => config.session_signing_key = Some(key),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid SESSION_SIGNING_KEY, generating an ephemeral key"
                    );
                }
            }
        }

        if let Some(val) = lookup("SESSION_TTL_DAYS") {
            match val.parse::<i64>() {
                Ok(days) if days > 0 => config.session_ttl = chrono::Duration::days(days),
                _ => tracing::warn!(value = %val, "Invalid SESSION_TTL_DAYS, using default"),
            }
        }

        if let Some(origin) = lookup("CORS_ORIGIN") {
            config.cors_origin = origin;
        }

        if let Some(val) = lookup("PRODUCTION") {
            config.production = parse_flag(&val);
        }

        if let Some(val) = lookup("ECHO_TO_SENDER") {
            config.echo_to_sender = parse_flag(&val);
        }

        if let Some(val) = lookup("CHANNEL_IDLE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs >= 2 => config.channel_idle_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid CHANNEL_IDLE_TIMEOUT_SECS, using default"
                ),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_flag(val: &str) -> bool {
    !matches!(val.trim(), "false" | "0" | "")
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_key(hex: &str) -> Result<[u8; 32], String> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex.len()));
    }
    let bytes = hex::decode(hex).map_err(|e| e.to_string())?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert!(config.session_signing_key.is_none());
        assert!(!config.echo_to_sender);
        assert_eq!(config.session_ttl, chrono::Duration::days(7));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("PUBLIC_BASE_URL", "https://chat.example.com/"),
            ("SESSION_SIGNING_KEY", &"ab".repeat(32)),
            ("ECHO_TO_SENDER", "true"),
            ("PRODUCTION", "1"),
            ("SESSION_TTL_DAYS", "30"),
        ]));
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.public_base_url, "https://chat.example.com");
        assert_eq!(config.session_signing_key, Some([0xab; 32]));
        assert!(config.echo_to_sender);
        assert!(config.production);
        assert_eq!(config.session_ttl, chrono::Duration::days(30));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "nonsense"),
            ("SESSION_SIGNING_KEY", "abcd"),
            ("MAX_IMAGE_SIZE", "-1"),
            ("ECHO_TO_SENDER", "false"),
        ]));
        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert!(config.session_signing_key.is_none());
        assert_eq!(config.max_image_size, MAX_IMAGE_SIZE);
        assert!(!config.echo_to_sender);
    }

    #[test]
    fn test_debug_redacts_key() {
        let mut config = ServerConfig::default();
        config.session_signing_key = Some([7; 32]);
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("07070707"));
    }
}
