//! # murmur-shared
//!
//! Types shared by the Murmur server, store and client: identifiers, the
//! message record, the push-channel wire events and signed session tokens.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod token;
pub mod types;

pub use error::{ProtocolError, TokenError};
pub use protocol::ServerEvent;
pub use types::{ChannelId, Message, MessageDraft, UserId, UserProfile};
