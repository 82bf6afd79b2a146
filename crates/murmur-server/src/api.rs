use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{SubsecRound, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use murmur_shared::protocol::StatusResponse;
use murmur_shared::{Message, MessageDraft, UserId, UserProfile};
use murmur_store::{Database, StoreError};

use crate::auth::{self, AuthUser, SessionKeys};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway;
use crate::media::MediaStore;
use crate::presence::PresenceRegistry;
use crate::router::MessageRouter;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub presence: PresenceRegistry,
    pub router: MessageRouter,
    pub media: Arc<MediaStore>,
    pub sessions: Arc<SessionKeys>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Open the database and media store described by `config`.
    /// A `DATABASE_PATH` of `:memory:` keeps everything in RAM.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let db = if config.database_path.as_os_str() == ":memory:" {
            Database::open_in_memory()?
        } else {
            Database::open_at(&config.database_path)?
        };

        let media = MediaStore::new(
            config.media_storage_path.clone(),
            config.max_image_size,
            config.public_base_url.clone(),
        )
        .await?;

        let presence = PresenceRegistry::new();
        let router = MessageRouter::new(presence.clone(), config.echo_to_sender);

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            presence,
            router,
            media: Arc::new(media),
            sessions: Arc::new(SessionKeys::from_config(&config)),
            config: Arc::new(config),
        })
    }

    /// Run a store operation under the database lock. The lock is never
    /// held across an await point.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> murmur_store::Result<T>,
    ) -> Result<T, ServerError> {
        let db = self
            .db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".to_string()))?;
        Ok(f(&db)?)
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);
    match HeaderValue::from_str(&state.config.cors_origin) {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => warn!(origin = %state.config.cors_origin, "Invalid CORS_ORIGIN, cross-origin requests disabled"),
    }

    // base64 inflates by 4/3; leave headroom for the JSON envelope.
    let body_limit = state.config.max_image_size / 3 * 4 + 64 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(gateway::ws_handler))
        .route("/media/:name", get(media_file))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/check", get(auth::check))
        .route("/api/auth/update-profile", put(auth::update_profile))
        .route("/api/auth/delete-account", delete(auth::delete_account))
        .route("/api/messages/users", get(sidebar_users))
        .route("/api/messages/:id", get(get_messages))
        .route("/api/messages/send/:id", post(send_message))
        .route("/api/messages/clear/:id", delete(clear_chat))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the future is dropped.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(state, listener).await
}

/// Serve on an already bound listener (lets tests bind port 0).
pub async fn serve_on(state: AppState, listener: TcpListener) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP API listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    online_users: usize,
    open_channels: usize,
    stored_messages: u64,
}

/// Liveness plus a few counters. Fails with 500 when the database is unusable.
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ServerError> {
    let stored_messages = state.with_db(|db| db.count_messages())?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        online_users: state.presence.online_users().await.len(),
        open_channels: state.presence.channel_count().await,
        stored_messages,
    }))
}

async fn media_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let (data, content_type) = state.media.get(&name).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        data,
    ))
}

async fn sidebar_users(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<UserProfile>>, ServerError> {
    let users = state.with_db(|db| db.list_users_except(user.id()))?;
    Ok(Json(users.iter().map(|u| u.profile()).collect()))
}

async fn get_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(partner): Path<String>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let partner = UserId::from(partner);
    let messages = state.with_db(|db| db.get_conversation(user.id(), &partner))?;
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(receiver): Path<String>,
    Json(draft): Json<MessageDraft>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let draft = draft.normalized();
    if draft.is_empty() {
        return Err(ServerError::BadRequest(
            "Message must contain text or an image".to_string(),
        ));
    }

    let receiver_id = UserId::from(receiver);
    match state.with_db(|db| db.get_user(&receiver_id)) {
        Err(ServerError::Persistence(StoreError::NotFound)) => {
            return Err(ServerError::NotFound("Receiver not found".to_string()));
        }
        other => other?,
    };

    let image_url = match &draft.image {
        Some(raw) => Some(state.media.store_base64(raw).await?),
        None => None,
    };

    let message = Message {
        id: Uuid::new_v4(),
        sender_id: user.id().clone(),
        receiver_id,
        text: draft.text,
        image_url,
        created_at: Utc::now().trunc_subsecs(6),
    };
    state.with_db(|db| db.insert_message(&message))?;

    // Stored; live delivery is best effort from here on.
    state.router.route(&message).await;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn clear_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Path(partner): Path<String>,
) -> Result<Json<StatusResponse>, ServerError> {
    let partner = UserId::from(partner);
    let removed = state.with_db(|db| db.delete_conversation(user.id(), &partner))?;
    info!(user = %user.id(), partner = %partner, removed, "Conversation cleared");

    Ok(Json(StatusResponse {
        message: "Chat cleared successfully".to_string(),
    }))
}
