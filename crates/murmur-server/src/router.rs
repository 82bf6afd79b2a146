//! Message router: pushes a freshly stored message to the receiver's live
//! channels.
//!
//! Routing is fire-and-forget. An offline receiver is a normal outcome and
//! the sender's request has already succeeded by the time we get here; the
//! receiver will load the message from history on its next conversation load.

use std::collections::HashSet;

use tracing::{debug, info};

use murmur_shared::{Message, ServerEvent};

use crate::presence::PresenceRegistry;

#[derive(Clone)]
pub struct MessageRouter {
    presence: PresenceRegistry,
    echo_to_sender: bool,
}

impl MessageRouter {
    pub fn new(presence: PresenceRegistry, echo_to_sender: bool) -> Self {
        Self {
            presence,
            echo_to_sender,
        }
    }

    /// Push `message` as a `newMessage` event to every channel of its
    /// receiver (and of its sender when echo is enabled). Each channel gets
    /// the event at most once. Returns the number of channels that accepted
    /// it.
    pub async fn route(&self, message: &Message) -> usize {
        let mut targets = self.presence.resolve(&message.receiver_id).await;
        if self.echo_to_sender && message.sender_id != message.receiver_id {
            targets.extend(self.presence.resolve(&message.sender_id).await);
        }

        if targets.is_empty() {
            debug!(
                message = %message.id,
                receiver = %message.receiver_id,
                "Receiver offline, message stays in history only"
            );
            return 0;
        }

        let event = ServerEvent::NewMessage(message.clone());
        let mut seen = HashSet::new();
        let mut delivered = 0;

        for sink in targets {
            if !seen.insert(sink.channel_id) {
                continue;
            }
            if sink.send(event.clone()) {
                delivered += 1;
            } else {
                // Writer already gone; unregister is on its way.
                debug!(channel = %sink.channel_id, "Dropped push to closing channel");
            }
        }

        info!(
            message = %message.id,
            receiver = %message.receiver_id,
            delivered,
            "Message routed"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use murmur_shared::{ChannelId, UserId};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn message(from: &str, to: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: from.into(),
            receiver_id: to.into(),
            text: Some("hi".into()),
            image_url: None,
            created_at: Utc::now(),
        }
    }

    async fn connect(
        presence: &PresenceRegistry,
        user: &str,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        presence.register(UserId::from(user), ChannelId::new(), tx).await;
        rx
    }

    #[tokio::test]
    async fn test_routes_to_every_receiver_channel() {
        let presence = PresenceRegistry::new();
        let router = MessageRouter::new(presence.clone(), false);
        let mut phone = connect(&presence, "u2").await;
        let mut laptop = connect(&presence, "u2").await;
        let mut sender = connect(&presence, "u1").await;

        let m = message("u1", "u2");
        assert_eq!(router.route(&m).await, 2);

        assert_eq!(phone.try_recv().unwrap(), ServerEvent::NewMessage(m.clone()));
        assert_eq!(laptop.try_recv().unwrap(), ServerEvent::NewMessage(m));
        assert!(phone.try_recv().is_err());
        assert!(sender.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_offline_receiver_is_not_an_error() {
        let presence = PresenceRegistry::new();
        let router = MessageRouter::new(presence, false);
        assert_eq!(router.route(&message("u1", "u2")).await, 0);
    }

    #[tokio::test]
    async fn test_echo_reaches_sender_devices() {
        let presence = PresenceRegistry::new();
        let router = MessageRouter::new(presence.clone(), true);
        let mut receiver = connect(&presence, "u2").await;
        let mut sender = connect(&presence, "u1").await;

        let m = message("u1", "u2");
        assert_eq!(router.route(&m).await, 2);
        assert!(receiver.try_recv().is_ok());
        assert!(sender.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_self_message_delivered_once_with_echo() {
        let presence = PresenceRegistry::new();
        let router = MessageRouter::new(presence.clone(), true);
        let mut rx = connect(&presence, "u1").await;

        assert_eq!(router.route(&message("u1", "u1")).await, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_channel_counts_as_undelivered() {
        let presence = PresenceRegistry::new();
        let router = MessageRouter::new(presence.clone(), false);
        let rx = connect(&presence, "u2").await;
        drop(rx);

        assert_eq!(router.route(&message("u1", "u2")).await, 0);
    }
}
