//! Events emitted by the client core to whatever UI drives it.

use tokio::sync::mpsc;

use murmur_shared::{Message, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Notification(Notification),
    /// History for a newly selected partner finished loading.
    ConversationLoaded { partner: UserId, count: usize },
    /// A message was appended to the open conversation (push or own send).
    MessageAppended(Message),
    ConversationCleared { partner: UserId },
    OnlineUsers(Vec<UserId>),
}

/// Cloneable sending side of the client event stream. Sending never fails
/// loudly: a UI that stopped listening just stops receiving.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl EventEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Client event dropped, no listener");
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(ClientEvent::Notification(Notification {
            level: NotificationLevel::Success,
            message: message.into(),
        }));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(ClientEvent::Notification(Notification {
            level: NotificationLevel::Error,
            message: message.into(),
        }));
    }
}
