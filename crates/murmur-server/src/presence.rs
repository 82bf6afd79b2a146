//! Presence registry.
//!
//! Maps each connected user to the set of push channels currently open for
//! them. One registry lives in the server state for the whole process
//! lifetime; the push gateway mutates it on connect/disconnect and the
//! message router reads it.
//!
//! All mutations and lookups go through one `RwLock`, so a lookup that
//! starts after `unregister` returns can never observe the closed channel,
//! and a lookup that starts after `register` returns always observes the
//! new one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use murmur_shared::{ChannelId, ServerEvent, UserId};

/// Sending half of a channel's outbound event queue.
pub type EventSink = mpsc::UnboundedSender<ServerEvent>;

/// A resolved channel: where to push events for one connection.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    pub channel_id: ChannelId,
    tx: EventSink,
}

impl ChannelSink {
    /// Queue an event for this channel. Returns `false` when the channel's
    /// writer has already gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Outcome of [`PresenceRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// A new mapping was created.
    Added,
    /// The channel was already registered for this user; nothing changed.
    AlreadyRegistered,
    /// The channel was registered for a different user and has been moved.
    Rebound { previous: UserId },
}

#[derive(Default)]
struct Inner {
    channels: HashMap<ChannelId, (UserId, EventSink)>,
    by_user: BTreeMap<UserId, BTreeSet<ChannelId>>,
}

impl Inner {
    fn detach(&mut self, channel_id: &ChannelId, user_id: &UserId) {
        if let Some(set) = self.by_user.get_mut(user_id) {
            set.remove(channel_id);
            if set.is_empty() {
                self.by_user.remove(user_id);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `channel_id` belongs to `user_id`.
    ///
    /// Re-registering the same channel for the same user is a no-op. A new
    /// channel for an already-present user is added next to the existing
    /// ones (multi-device), never replacing them.
    pub async fn register(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        tx: EventSink,
    ) -> Registration {
        let mut inner = self.inner.write().await;

        let outcome = match inner.channels.get(&channel_id) {
            Some((existing, _)) if *existing == user_id => return Registration::AlreadyRegistered,
            Some((existing, _)) => {
                let previous = existing.clone();
                inner.detach(&channel_id, &previous);
                Registration::Rebound { previous }
            }
            None => Registration::Added,
        };

        inner.channels.insert(channel_id, (user_id.clone(), tx));
        let channels = inner.by_user.entry(user_id.clone()).or_default();
        channels.insert(channel_id);

        info!(
            user = %user_id,
            channel = %channel_id,
            user_channels = channels.len(),
            "Channel registered"
        );

        outcome
    }

    /// Remove exactly the mapping for `channel_id`. Other channels of the
    /// same user are untouched. Returns the user the channel belonged to.
    pub async fn unregister(&self, channel_id: ChannelId) -> Option<UserId> {
        let mut inner = self.inner.write().await;
        let (user_id, _) = inner.channels.remove(&channel_id)?;
        inner.detach(&channel_id, &user_id);

        info!(
            user = %user_id,
            channel = %channel_id,
            still_online = inner.by_user.contains_key(&user_id),
            "Channel unregistered"
        );

        Some(user_id)
    }

    /// Every live channel of `user_id`. Empty means "currently offline",
    /// which is a normal outcome, not an error.
    pub async fn resolve(&self, user_id: &UserId) -> Vec<ChannelSink> {
        let inner = self.inner.read().await;
        let Some(ids) = inner.by_user.get(user_id) else {
            debug!(user = %user_id, "Resolve: user offline");
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| {
                inner.channels.get(id).map(|(_, tx)| ChannelSink {
                    channel_id: *id,
                    tx: tx.clone(),
                })
            })
            .collect()
    }

    /// Connected users, sorted and without duplicates.
    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.read().await.by_user.keys().cloned().collect()
    }

    pub async fn channel_count(&self) -> usize {
        self.inner.read().await.channels.len()
    }

    /// Queue `event` on every registered channel. Returns how many channels
    /// accepted it.
    pub async fn broadcast(&self, event: &ServerEvent) -> usize {
        let inner = self.inner.read().await;
        inner
            .channels
            .values()
            .filter(|(_, tx)| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Send the current online list to everyone. Called after every
    /// connect and disconnect.
    pub async fn broadcast_online_users(&self) -> usize {
        let event = ServerEvent::GetOnlineUsers(self.online_users().await);
        self.broadcast(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> (EventSink, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    fn ids(sinks: &[ChannelSink]) -> BTreeSet<ChannelId> {
        sinks.iter().map(|s| s.channel_id).collect()
    }

    #[tokio::test]
    async fn test_multi_device_presence() {
        let registry = PresenceRegistry::new();
        let user = UserId::from("u1");
        let (c1, c2) = (ChannelId::new(), ChannelId::new());

        registry.register(user.clone(), c1, sink().0).await;
        registry.register(user.clone(), c2, sink().0).await;
        assert_eq!(ids(&registry.resolve(&user).await), BTreeSet::from([c1, c2]));

        registry.unregister(c1).await;
        assert_eq!(ids(&registry.resolve(&user).await), BTreeSet::from([c2]));
        assert_eq!(registry.online_users().await, vec![user.clone()]);

        registry.unregister(c2).await;
        assert!(registry.resolve(&user).await.is_empty());
        assert!(registry.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_resolve_is_empty() {
        let registry = PresenceRegistry::new();
        assert!(registry.resolve(&"ghost".into()).await.is_empty());
        assert!(registry.unregister(ChannelId::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_register_is_idempotent_per_channel() {
        let registry = PresenceRegistry::new();
        let channel = ChannelId::new();

        assert_eq!(
            registry.register("u1".into(), channel, sink().0).await,
            Registration::Added
        );
        assert_eq!(
            registry.register("u1".into(), channel, sink().0).await,
            Registration::AlreadyRegistered
        );
        assert_eq!(registry.resolve(&"u1".into()).await.len(), 1);
        assert_eq!(registry.channel_count().await, 1);
    }

    #[tokio::test]
    async fn test_rebinding_channel_moves_it() {
        let registry = PresenceRegistry::new();
        let channel = ChannelId::new();
        registry.register("u1".into(), channel, sink().0).await;

        let outcome = registry.register("u2".into(), channel, sink().0).await;
        assert_eq!(
            outcome,
            Registration::Rebound {
                previous: "u1".into()
            }
        );
        assert!(registry.resolve(&"u1".into()).await.is_empty());
        assert_eq!(registry.resolve(&"u2".into()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_online_users_sorted_unique() {
        let registry = PresenceRegistry::new();
        registry.register("u2".into(), ChannelId::new(), sink().0).await;
        registry.register("u1".into(), ChannelId::new(), sink().0).await;
        registry.register("u2".into(), ChannelId::new(), sink().0).await;

        assert_eq!(
            registry.online_users().await,
            vec![UserId::from("u1"), UserId::from("u2")]
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_channel() {
        let registry = PresenceRegistry::new();
        let (tx1, mut rx1) = sink();
        let (tx2, mut rx2) = sink();
        let (tx3, rx3) = sink();
        registry.register("u1".into(), ChannelId::new(), tx1).await;
        registry.register("u1".into(), ChannelId::new(), tx2).await;
        registry.register("u2".into(), ChannelId::new(), tx3).await;
        drop(rx3);

        assert_eq!(registry.broadcast_online_users().await, 2);

        let expected = ServerEvent::GetOnlineUsers(vec!["u1".into(), "u2".into()]);
        assert_eq!(rx1.try_recv().unwrap(), expected);
        assert_eq!(rx2.try_recv().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_resolve_after_unregister_never_sees_closed_channel() {
        let registry = PresenceRegistry::new();
        let user = UserId::from("u1");
        let channel = ChannelId::new();
        registry.register(user.clone(), channel, sink().0).await;

        let reader = registry.clone();
        registry.unregister(channel).await;
        assert!(reader.resolve(&user).await.is_empty());
    }
}
