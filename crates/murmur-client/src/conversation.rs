//! Client conversation store.
//!
//! Holds the open conversation (partner, message list, load state) and the
//! push subscription feeding it. The list only ever contains
//! server-confirmed records: history loaded on open, the authoritative
//! reply to our own sends, and pushes from the open partner.
//!
//! `ConversationStore` is a cheap cloneable handle. The state mutex is
//! never held across an `.await`; every async operation re-checks a
//! selection generation after its await so a response for a conversation
//! that is no longer open is dropped.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use murmur_shared::{Message, MessageDraft, UserId, UserProfile};

use crate::api::MessagesApi;
use crate::channel::DeliveryChannel;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventEmitter};
use crate::selection::SelectionStore;
use crate::supervisor::ReconnectionSupervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Idle,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationView {
    pub partner: Option<UserId>,
    pub messages: Vec<Message>,
    pub state: ViewState,
    pub clearing: bool,
}

impl ConversationView {
    pub fn is_loading(&self) -> bool {
        self.state == ViewState::Loading
    }
}

/// A live `newMessage` subscription. Dropping it stops the feed.
struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    fn spawn(rx: broadcast::Receiver<Message>, store: Weak<Shared>) -> Self {
        Self {
            task: tokio::spawn(pump(rx, store)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn pump(mut rx: broadcast::Receiver<Message>, store: Weak<Shared>) {
    loop {
        match rx.recv().await {
            Ok(message) => {
                let Some(shared) = store.upgrade() else { break };
                ConversationStore { shared }.receive_push(message);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Push subscription lagged, some messages only in history");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

struct Inner {
    view: ConversationView,
    generation: u64,
    subscription: Option<Subscription>,
    /// Confirmed sends that arrived while history was still loading.
    pending: Vec<Message>,
    /// A clear succeeded while loading, so the in-flight history is stale.
    cleared_while_loading: bool,
}

impl Inner {
    /// Start a new selection generation showing `view`.
    fn reset(&mut self, view: ConversationView) -> u64 {
        self.generation += 1;
        self.subscription = None;
        self.view = view;
        self.pending.clear();
        self.cleared_while_loading = false;
        self.generation
    }
}

/// Push `message` unless a message with the same id is already present.
fn append_unique(messages: &mut Vec<Message>, message: Message) -> bool {
    if messages.iter().any(|m| m.id == message.id) {
        return false;
    }
    messages.push(message);
    true
}

struct Shared {
    api: Arc<dyn MessagesApi>,
    channel: Arc<dyn DeliveryChannel>,
    selection: Arc<dyn SelectionStore>,
    events: EventEmitter,
    supervisor: ReconnectionSupervisor,
    inner: Mutex<Inner>,
}

#[derive(Clone)]
pub struct ConversationStore {
    shared: Arc<Shared>,
}

impl ConversationStore {
    pub fn new(
        api: Arc<dyn MessagesApi>,
        channel: Arc<dyn DeliveryChannel>,
        selection: Arc<dyn SelectionStore>,
        events: EventEmitter,
        subscribe_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                channel,
                selection,
                events,
                supervisor: ReconnectionSupervisor::new(subscribe_timeout),
                inner: Mutex::new(Inner {
                    view: ConversationView::default(),
                    generation: 0,
                    subscription: None,
                    pending: Vec::new(),
                    cleared_while_loading: false,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn view(&self) -> ConversationView {
        self.lock().view.clone()
    }

    pub fn partner(&self) -> Option<UserId> {
        self.lock().view.partner.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().view.messages.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().subscription.is_some()
    }

    /// Open the conversation with `partner`. A no-op if it is already open.
    pub async fn select_partner(&self, partner: UserId) {
        let generation = {
            let mut inner = self.lock();
            if inner.view.partner.as_ref() == Some(&partner) {
                return;
            }
            inner.reset(ConversationView {
                partner: Some(partner.clone()),
                messages: Vec::new(),
                state: ViewState::Loading,
                clearing: false,
            })
        };
        self.shared.supervisor.disarm();

        if let Err(e) = self.shared.selection.save(Some(&partner)) {
            warn!(error = %e, "Failed to persist selection");
        }

        let history = self.shared.api.get_messages(&partner).await;

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                debug!(partner = %partner, "Discarding stale history response");
                return;
            }
            inner.view.state = ViewState::Ready;
            let pending = std::mem::take(&mut inner.pending);
            let cleared = std::mem::replace(&mut inner.cleared_while_loading, false);

            let loaded = match history {
                Ok(_) if cleared => {
                    debug!(partner = %partner, "Cleared while loading, dropping history snapshot");
                    true
                }
                Ok(messages) => {
                    inner.view.messages = messages;
                    true
                }
                Err(e) => {
                    warn!(partner = %partner, error = %e, "Failed to load history");
                    self.shared.events.error(e.user_message());
                    false
                }
            };
            for message in pending {
                append_unique(&mut inner.view.messages, message);
            }
            if loaded {
                self.shared.events.emit(ClientEvent::ConversationLoaded {
                    partner: partner.clone(),
                    count: inner.view.messages.len(),
                });
            }
        }

        self.ensure_subscribed();
    }

    /// Close the open conversation and forget the persisted selection.
    pub fn close(&self) {
        self.lock().reset(ConversationView::default());
        self.shared.supervisor.disarm();

        if let Err(e) = self.shared.selection.save(None) {
            warn!(error = %e, "Failed to clear persisted selection");
        }
    }

    /// Apply an inbound push. Returns whether it was appended: only pushes
    /// from the open partner, while ready, and not already present.
    pub fn receive_push(&self, message: Message) -> bool {
        let mut inner = self.lock();
        if inner.view.state != ViewState::Ready
            || inner.view.partner.as_ref() != Some(&message.sender_id)
        {
            return false;
        }
        if !append_unique(&mut inner.view.messages, message.clone()) {
            return false;
        }
        self.shared.events.emit(ClientEvent::MessageAppended(message));
        true
    }

    /// Send to the open partner. The message is appended only once the
    /// server has returned the stored record.
    pub async fn send(&self, draft: MessageDraft) -> Result<Message> {
        let Some(partner) = self.partner() else {
            return Err(self.report(ClientError::NoChatSelected));
        };
        let draft = draft.normalized();
        if draft.is_empty() {
            return Err(self.report(ClientError::EmptyMessage));
        }

        match self.shared.api.send_message(&partner, &draft).await {
            Ok(message) => {
                self.append_confirmed(message.clone());
                Ok(message)
            }
            Err(e) => Err(self.report(e)),
        }
    }

    fn append_confirmed(&self, message: Message) {
        let mut inner = self.lock();
        if inner.view.partner.as_ref() != Some(&message.receiver_id) {
            return;
        }
        let state = inner.view.state;
        match state {
            // Merged once history lands; the snapshot may predate the insert.
            ViewState::Loading => {
                append_unique(&mut inner.pending, message);
            }
            ViewState::Ready => {
                if append_unique(&mut inner.view.messages, message.clone()) {
                    self.shared.events.emit(ClientEvent::MessageAppended(message));
                }
            }
            ViewState::Idle => {}
        }
    }

    /// Delete the whole conversation with the open partner.
    pub async fn clear_conversation(&self) -> Result<()> {
        let started = {
            let mut inner = self.lock();
            match inner.view.partner.clone() {
                None => Err(ClientError::NoChatSelected),
                Some(_) if inner.view.clearing => Err(ClientError::ClearInProgress),
                Some(partner) => {
                    inner.view.clearing = true;
                    Ok((partner, inner.generation))
                }
            }
        };
        let (partner, generation) = match started {
            Ok(started) => started,
            Err(ClientError::ClearInProgress) => return Err(ClientError::ClearInProgress),
            Err(e) => return Err(self.report(e)),
        };

        let result = self.shared.api.clear_chat(&partner).await;

        {
            let mut inner = self.lock();
            if inner.generation == generation {
                inner.view.clearing = false;
                if result.is_ok() {
                    inner.view.messages.clear();
                    inner.pending.clear();
                    if inner.view.is_loading() {
                        inner.cleared_while_loading = true;
                    }
                }
            }
        }

        match result {
            Ok(()) => {
                info!(partner = %partner, "Conversation cleared");
                self.shared
                    .events
                    .emit(ClientEvent::ConversationCleared { partner });
                self.shared.events.success("Chat cleared successfully");
                Ok(())
            }
            Err(e) => Err(self.report(e)),
        }
    }

    /// Reopen the persisted conversation, if any.
    pub async fn restore_selection(&self) -> Option<UserId> {
        let partner = self.shared.selection.load()?;
        self.select_partner(partner.clone()).await;
        Some(partner)
    }

    /// Fetch the roster for the sidebar.
    pub async fn load_roster(&self) -> Result<Vec<UserProfile>> {
        self.shared
            .api
            .list_users()
            .await
            .map_err(|e| self.report(e))
    }

    fn ensure_subscribed(&self) {
        let store = Arc::downgrade(&self.shared);
        self.shared
            .supervisor
            .ensure_subscribed(self.shared.channel.connection_state(), move || {
                if let Some(shared) = store.upgrade() {
                    ConversationStore { shared }.subscribe_current();
                }
            });
    }

    /// (Re)subscribe for whatever conversation is open right now.
    fn subscribe_current(&self) {
        let mut inner = self.lock();
        if inner.view.state != ViewState::Ready || inner.view.partner.is_none() {
            return;
        }
        let rx = self.shared.channel.subscribe_messages();
        inner.subscription = Some(Subscription::spawn(rx, Arc::downgrade(&self.shared)));
    }

    fn report(&self, error: ClientError) -> ClientError {
        self.shared.events.error(error.user_message());
        error
    }
}
