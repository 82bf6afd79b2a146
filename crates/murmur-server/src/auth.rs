//! Session authentication: password hashing, signed session tokens, the
//! `AuthUser` extractor and the `/api/auth/*` handlers.

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tracing::{info, warn};

use murmur_shared::constants::{MIN_FULL_NAME_LEN, MIN_PASSWORD_LEN, SESSION_COOKIE};
use murmur_shared::protocol::{
    AuthResponse, LoginRequest, SignupRequest, StatusResponse, UpdateProfileRequest,
};
use murmur_shared::token::SessionToken;
use murmur_shared::{UserId, UserProfile};
use murmur_store::{ProfileUpdate, StoreError, User};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::error::ServerError;

// ---------------------------------------------------------------------------
// Session keys
// ---------------------------------------------------------------------------

/// Signs and validates session tokens.
pub struct SessionKeys {
    signing: SigningKey,
    ttl: chrono::Duration,
}

impl SessionKeys {
    pub fn new(signing: SigningKey, ttl: chrono::Duration) -> Self {
        Self { signing, ttl }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let signing = match config.session_signing_key {
            Some(seed) => SigningKey::from_bytes(&seed),
            None => {
                warn!("No SESSION_SIGNING_KEY configured, sessions will not survive a restart");
                SigningKey::generate(&mut OsRng)
            }
        };
        Self::new(signing, config.session_ttl)
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Issue an encoded token for `user_id` valid for the configured TTL.
    pub fn issue(&self, user_id: &UserId) -> String {
        SessionToken::issue(user_id.clone(), Utc::now() + self.ttl, &self.signing).encode()
    }

    pub fn validate(&self, raw: &str) -> Result<UserId, ServerError> {
        Ok(SessionToken::validate(raw, &self.signing.verifying_key())?)
    }
}

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// Hash a password with Argon2id and a random salt. Runs off the async
/// executor.
pub async fn hash_password(password: String) -> Result<String, ServerError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ServerError::Internal(format!("failed to hash password: {e}")))
    })
    .await
    .map_err(|e| ServerError::Internal(format!("hashing task failed: {e}")))?
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ServerError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)
            .map_err(|e| ServerError::Internal(format!("invalid password hash: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| ServerError::Internal(format!("verify task failed: {e}")))?
}

// ---------------------------------------------------------------------------
// Token transport
// ---------------------------------------------------------------------------

/// Find a session token in `Authorization: Bearer` or the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str, ttl: chrono::Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie(secure: bool) -> String {
    session_cookie("", chrono::Duration::zero(), secure)
}

fn with_cookie(cookie: String, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// The authenticated caller. Rejects with 401 when the token is missing,
/// invalid, expired, or names a user that no longer exists.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> &UserId {
        &self.0.id
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers)
            .ok_or_else(|| ServerError::Unauthenticated("No Token Provided".to_string()))?;
        let user_id = state.sessions.validate(&token)?;

        match state.with_db(|db| db.get_user(&user_id)) {
            Ok(user) => Ok(AuthUser(user)),
            Err(ServerError::Persistence(StoreError::NotFound)) => {
                Err(ServerError::Unauthenticated("User not found".to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn auth_reply(state: &AppState, status: StatusCode, user: UserProfile) -> Response {
    let token = state.sessions.issue(&user.id);
    let cookie = session_cookie(&token, state.sessions.ttl(), state.config.production);
    with_cookie(cookie, (status, Json(AuthResponse { user, token })))
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Response, ServerError> {
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if full_name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ServerError::BadRequest("All fields are required".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ServerError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if state.with_db(|db| db.get_user_by_email(&email))?.is_some() {
        return Err(ServerError::BadRequest("User already exists".to_string()));
    }

    let user = User {
        id: UserId::new(),
        full_name,
        email,
        password_hash: hash_password(req.password).await?,
        profile_pic: None,
        created_at: Utc::now(),
    };

    match state.with_db(|db| db.create_user(&user)) {
        Err(ServerError::Persistence(StoreError::Duplicate(_))) => {
            return Err(ServerError::BadRequest("User already exists".to_string()));
        }
        other => other?,
    }

    info!(user = %user.id, "User signed up");
    Ok(auth_reply(&state, StatusCode::CREATED, user.profile()))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ServerError> {
    let invalid = || ServerError::BadRequest("Invalid Credentials".to_string());
    let email = req.email.trim().to_lowercase();

    let user = state
        .with_db(|db| db.get_user_by_email(&email))?
        .ok_or_else(invalid)?;
    if !verify_password(req.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    info!(user = %user.id, "User logged in");
    Ok(auth_reply(&state, StatusCode::OK, user.profile()))
}

pub async fn logout(State(state): State<AppState>) -> Response {
    with_cookie(
        clear_cookie(state.config.production),
        Json(StatusResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}

pub async fn check(user: AuthUser) -> Json<UserProfile> {
    Json(user.0.profile())
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ServerError> {
    let full_name = req
        .full_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if let Some(name) = &full_name {
        if name.chars().count() < MIN_FULL_NAME_LEN {
            return Err(ServerError::BadRequest(format!(
                "Name must be at least {MIN_FULL_NAME_LEN} characters"
            )));
        }
    }

    let profile_pic = match req.profile_pic.filter(|p| !p.trim().is_empty()) {
        Some(raw) => Some(state.media.store_base64(&raw).await?),
        None => None,
    };

    let update = ProfileUpdate {
        full_name,
        profile_pic,
    };
    if update.is_empty() {
        return Err(ServerError::BadRequest("Nothing to update".to_string()));
    }

    let updated = state.with_db(|db| db.update_user_profile(user.id(), &update))?;
    info!(user = %updated.id, "Profile updated");
    Ok(Json(updated.profile()))
}

pub async fn delete_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServerError> {
    state.with_db(|db| db.delete_user(user.id()))?;
    info!(user = %user.id(), "Account deleted");

    Ok(with_cookie(
        clear_cookie(state.config.production),
        Json(StatusResponse {
            message: "Account deleted successfully".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify_password() {
        let hash = hash_password("hunter22".into()).await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".into(), hash).await.unwrap());
    }

    #[test]
    fn test_session_keys_round_trip() {
        let keys = SessionKeys::new(
            SigningKey::from_bytes(&[3; 32]),
            chrono::Duration::days(7),
        );
        let token = keys.issue(&"u1".into());
        assert_eq!(keys.validate(&token).unwrap(), UserId::from("u1"));

        let other = SessionKeys::new(
            SigningKey::from_bytes(&[4; 32]),
            chrono::Duration::days(7),
        );
        assert!(matches!(
            other.validate(&token),
            Err(ServerError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_token_from_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        assert!(token_from_headers(&headers).is_none());

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=from-cookie"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-cookie"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = session_cookie("abc", chrono::Duration::days(7), true);
        assert!(cookie.starts_with("session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.ends_with("; Secure"));

        let cleared = clear_cookie(false);
        assert!(cleared.contains("Max-Age=0"));
        assert!(!cleared.contains("Secure"));
    }
}
