//! # murmur-client
//!
//! Client core for Murmur one-to-one chat, independent of any UI:
//!
//! - **REST client** for auth, roster, history, send and clear
//! - **Delivery channel** over WebSocket with automatic reconnect
//! - **Conversation store** holding the open conversation and its live feed
//! - **Reconnection supervisor** deferring the live feed until the channel is up
//!
//! The UI listens on the [`ClientEvent`] stream for notifications and state changes.

pub mod api;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod selection;
pub mod session;
pub mod supervisor;

pub use api::{AuthApi, HttpChatApi, MessagesApi};
pub use channel::{DeliveryChannel, MemoryChannel, WsChannel};
pub use config::ClientConfig;
pub use conversation::{ConversationStore, ConversationView, ViewState};
pub use error::{ClientError, Result};
pub use events::{ClientEvent, EventEmitter, Notification, NotificationLevel};
pub use selection::{FileSelectionStore, MemorySelectionStore, SelectionStore};
pub use session::Session;
pub use supervisor::{Arming, ReconnectionSupervisor};
