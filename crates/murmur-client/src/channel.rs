//! Client side of the delivery channel.
//!
//! A [`DeliveryChannel`] exposes three signals: whether it is connected, a
//! broadcast of `newMessage` pushes, and the latest online-users list.
//! [`WsChannel`] drives them from a WebSocket that reconnects with a fixed
//! delay until it is explicitly disconnected. [`MemoryChannel`] drives them
//! by hand and is used to embed the conversation store without a server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{debug, info, warn};

use murmur_shared::{Message, ServerEvent, UserId};

use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventEmitter};

const PUSH_BUFFER: usize = 256;

pub trait DeliveryChannel: Send + Sync {
    /// `true` while the channel is connected. Changes are observable through
    /// the returned receiver.
    fn connection_state(&self) -> watch::Receiver<bool>;

    fn is_connected(&self) -> bool {
        *self.connection_state().borrow()
    }

    /// Every `newMessage` push received after this call.
    fn subscribe_messages(&self) -> broadcast::Receiver<Message>;

    /// Latest `getOnlineUsers` list (empty while disconnected).
    fn online_users(&self) -> watch::Receiver<Vec<UserId>>;
}

/// The state shared by both channel implementations.
struct Signals {
    connected: watch::Sender<bool>,
    online: watch::Sender<Vec<UserId>>,
    messages: broadcast::Sender<Message>,
}

impl Signals {
    fn new() -> Arc<Self> {
        let (connected, _) = watch::channel(false);
        let (online, _) = watch::channel(Vec::new());
        let (messages, _) = broadcast::channel(PUSH_BUFFER);
        Arc::new(Self {
            connected,
            online,
            messages,
        })
    }

    fn apply(&self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage(message) => {
                // No subscriber means no conversation is open; nothing to do.
                let _ = self.messages.send(message);
            }
            ServerEvent::GetOnlineUsers(users) => {
                self.online.send_replace(users);
            }
        }
    }

    fn set_disconnected(&self) {
        self.connected.send_replace(false);
        self.online.send_replace(Vec::new());
    }
}

// ---------------------------------------------------------------------------
// WebSocket channel
// ---------------------------------------------------------------------------

/// The identity a running connection loop was started with.
struct Connection {
    user_id: UserId,
    token: String,
    task: JoinHandle<()>,
}

impl Connection {
    fn is_running_as(&self, user_id: &UserId, token: &str) -> bool {
        !self.task.is_finished() && self.user_id == *user_id && self.token == token
    }
}

pub struct WsChannel {
    signals: Arc<Signals>,
    ws_base_url: String,
    reconnect_delay: Duration,
    events: EventEmitter,
    current: Mutex<Option<Connection>>,
}

impl WsChannel {
    pub fn new(ws_base_url: impl Into<String>, reconnect_delay: Duration, events: EventEmitter) -> Self {
        Self {
            signals: Signals::new(),
            ws_base_url: ws_base_url.into(),
            reconnect_delay,
            events,
            current: Mutex::new(None),
        }
    }

    /// Start the connect/reconnect loop for `user_id`. A no-op while a loop
    /// for the same user and token is running; a loop for anyone else is
    /// torn down and replaced.
    pub fn connect(&self, user_id: &UserId, token: &str) -> Result<()> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/ws", self.ws_base_url),
            &[("userId", user_id.as_str()), ("token", token)],
        )
        .map_err(|e| ClientError::Channel(format!("invalid URL: {e}")))?;

        let mut current = self
            .current
            .lock()
            .map_err(|_| ClientError::Channel("connection state poisoned".to_string()))?;
        if current
            .as_ref()
            .is_some_and(|c| c.is_running_as(user_id, token))
        {
            debug!("Delivery channel already running");
            return Ok(());
        }

        if let Some(previous) = current.take() {
            previous.task.abort();
            self.signals.set_disconnected();
            info!(previous = %previous.user_id, user = %user_id, "Delivery channel identity changed");
        }

        *current = Some(Connection {
            user_id: user_id.clone(),
            token: token.to_string(),
            task: tokio::spawn(run_connection(
                url.to_string(),
                self.signals.clone(),
                self.reconnect_delay,
                self.events.clone(),
            )),
        });
        Ok(())
    }

    /// User the connection loop is running for, if any.
    pub fn connected_as(&self) -> Option<UserId> {
        let current = self.current.lock().ok()?;
        current
            .as_ref()
            .filter(|c| !c.task.is_finished())
            .map(|c| c.user_id.clone())
    }

    /// Stop reconnecting and drop the current connection.
    pub fn disconnect(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(connection) = current.take() {
                connection.task.abort();
                info!(user = %connection.user_id, "Delivery channel disconnected");
            }
        }
        self.signals.set_disconnected();
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl DeliveryChannel for WsChannel {
    fn connection_state(&self) -> watch::Receiver<bool> {
        self.signals.connected.subscribe()
    }

    fn subscribe_messages(&self) -> broadcast::Receiver<Message> {
        self.signals.messages.subscribe()
    }

    fn online_users(&self) -> watch::Receiver<Vec<UserId>> {
        self.signals.online.subscribe()
    }
}

async fn run_connection(
    url: String,
    signals: Arc<Signals>,
    reconnect_delay: Duration,
    events: EventEmitter,
) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((mut stream, _)) => {
                info!("Delivery channel connected");
                signals.connected.send_replace(true);

                // Reading also flushes the pongs tungstenite queues for server pings.
                while let Some(frame) = stream.next().await {
                    match frame {
                        Ok(tungstenite::Message::Text(text)) => match ServerEvent::from_json(&text) {
                            Ok(event) => {
                                if let ServerEvent::GetOnlineUsers(users) = &event {
                                    events.emit(ClientEvent::OnlineUsers(users.clone()));
                                }
                                signals.apply(event);
                            }
                            Err(e) => debug!(error = %e, "Ignoring unknown push frame"),
                        },
                        Ok(tungstenite::Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            debug!(error = %e, "Delivery channel read failed");
                            break;
                        }
                    }
                }

                signals.set_disconnected();
                warn!("Delivery channel lost, reconnecting");
            }
            Err(tungstenite::Error::Http(resp)) if resp.status() == 401 => {
                warn!("Delivery channel rejected the session");
                events.error("Session expired, please log in again");
                signals.set_disconnected();
                return;
            }
            Err(e) => debug!(error = %e, "Delivery channel connect failed"),
        }

        tokio::time::sleep(reconnect_delay).await;
    }
}

// ---------------------------------------------------------------------------
// In-memory channel
// ---------------------------------------------------------------------------

/// Hand-driven channel: the owner flips connectivity and injects pushes.
#[derive(Clone)]
pub struct MemoryChannel {
    signals: Arc<Signals>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            signals: Signals::new(),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        if connected {
            self.signals.connected.send_replace(true);
        } else {
            self.signals.set_disconnected();
        }
    }

    /// Deliver a server event as if it came over the wire.
    pub fn push(&self, event: ServerEvent) {
        self.signals.apply(event);
    }

    /// Number of live `newMessage` subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.signals.messages.receiver_count()
    }
}

impl DeliveryChannel for MemoryChannel {
    fn connection_state(&self) -> watch::Receiver<bool> {
        self.signals.connected.subscribe()
    }

    fn subscribe_messages(&self) -> broadcast::Receiver<Message> {
        self.signals.messages.subscribe()
    }

    fn online_users(&self) -> watch::Receiver<Vec<UserId>> {
        self.signals.online.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_memory_channel_signals() {
        let channel = MemoryChannel::new();
        let mut state = channel.connection_state();
        assert!(!channel.is_connected());

        channel.set_connected(true);
        state.changed().await.unwrap();
        assert!(*state.borrow());

        channel.push(ServerEvent::GetOnlineUsers(vec!["u1".into()]));
        assert_eq!(*channel.online_users().borrow(), vec![UserId::from("u1")]);

        let mut rx = channel.subscribe_messages();
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: "u1".into(),
            receiver_id: "u2".into(),
            text: Some("hi".into()),
            image_url: None,
            created_at: Utc::now(),
        };
        channel.push(ServerEvent::NewMessage(message.clone()));
        assert_eq!(rx.recv().await.unwrap(), message);

        channel.set_connected(false);
        assert!(channel.online_users().borrow().is_empty());
    }

    #[tokio::test]
    async fn test_ws_channel_starts_disconnected() {
        let (events, _rx) = EventEmitter::channel();
        let channel = WsChannel::new("ws://127.0.0.1:9", Duration::from_millis(50), events);
        assert!(!channel.is_connected());
        assert!(channel.connected_as().is_none());
        channel.disconnect();
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_ws_channel_follows_identity() {
        let (events, _rx) = EventEmitter::channel();
        // Nothing listens on the discard port; the loop just keeps retrying.
        let channel = WsChannel::new("ws://127.0.0.1:9", Duration::from_millis(50), events);

        channel.connect(&"u1".into(), "token-1").unwrap();
        assert_eq!(channel.connected_as(), Some(UserId::from("u1")));

        channel.connect(&"u1".into(), "token-1").unwrap();
        assert_eq!(channel.connected_as(), Some(UserId::from("u1")));

        channel.connect(&"u2".into(), "token-2").unwrap();
        assert_eq!(channel.connected_as(), Some(UserId::from("u2")));

        channel.disconnect();
        assert!(channel.connected_as().is_none());
    }

    #[tokio::test]
    async fn test_ws_channel_rejects_bad_url() {
        let (events, _rx) = EventEmitter::channel();
        let channel = WsChannel::new("not a url", Duration::from_millis(50), events);
        assert!(matches!(
            channel.connect(&"u1".into(), "t"),
            Err(ClientError::Channel(_))
        ));
        assert!(channel.connected_as().is_none());
    }
}
