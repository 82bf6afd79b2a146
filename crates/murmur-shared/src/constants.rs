/// Application name
pub const APP_NAME: &str = "Murmur";

/// Push event carrying a freshly stored message
pub const EVENT_NEW_MESSAGE: &str = "newMessage";

/// Push event carrying the ordered list of connected user ids
pub const EVENT_GET_ONLINE_USERS: &str = "getOnlineUsers";

/// Name of the cookie holding the session token
pub const SESSION_COOKIE: &str = "session";

/// Session lifetime in days
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Minimum password length accepted at signup
pub const MIN_PASSWORD_LEN: usize = 6;

/// Minimum display name length accepted on profile update
pub const MIN_FULL_NAME_LEN: usize = 3;

/// Default HTTP port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Maximum decoded image size in bytes (10 MiB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// How long a client waits for its push channel before giving up on live updates
pub const SUBSCRIBE_RETRY_TIMEOUT_SECS: u64 = 10;

/// Delay between push channel reconnect attempts
pub const RECONNECT_DELAY_MS: u64 = 1_000;
