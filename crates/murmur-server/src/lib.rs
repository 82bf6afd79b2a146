//! # murmur-server
//!
//! HTTP and WebSocket server for Murmur one-to-one chat.
//!
//! - **REST API** (axum) for auth, roster, history, send and clear
//! - **Push gateway**: one WebSocket delivery channel per client instance
//! - **Presence registry** mapping each user to their live channels
//! - **Message router** pushing stored messages to the receiver's channels
//! - **Media store** for content-addressed image uploads

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod media;
pub mod presence;
pub mod router;

pub use api::{build_router, serve, serve_on, AppState};
pub use config::ServerConfig;
pub use error::ServerError;
