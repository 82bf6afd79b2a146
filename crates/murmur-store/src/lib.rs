//! # murmur-store
//!
//! Durable storage for the Murmur server, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for users and
//! messages. Callers own the synchronisation (the server keeps the handle
//! behind a mutex).

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
