//! Logged-in session: ties the REST client, the delivery channel and the
//! conversation store to one authenticated user.
//!
//! The delivery channel is opened whenever an authenticated profile becomes
//! known (login, signup, or a successful auth check) and closed on logout.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use murmur_shared::protocol::{LoginRequest, SignupRequest, UpdateProfileRequest};
use murmur_shared::{UserId, UserProfile};

use crate::api::{AuthApi, HttpChatApi};
use crate::channel::{DeliveryChannel, WsChannel};
use crate::config::ClientConfig;
use crate::conversation::ConversationStore;
use crate::error::{ClientError, Result};
use crate::events::EventEmitter;
use crate::selection::SelectionStore;

pub struct Session {
    api: HttpChatApi,
    channel: Arc<WsChannel>,
    conversation: ConversationStore,
    events: EventEmitter,
    profile: RwLock<Option<UserProfile>>,
}

impl Session {
    pub fn new(config: &ClientConfig, selection: Arc<dyn SelectionStore>, events: EventEmitter) -> Self {
        let api = HttpChatApi::new(config.server_url.clone());
        let channel = Arc::new(WsChannel::new(
            config.ws_base_url(),
            config.reconnect_delay,
            events.clone(),
        ));
        let conversation = ConversationStore::new(
            Arc::new(api.clone()),
            channel.clone(),
            selection,
            events.clone(),
            config.subscribe_timeout,
        );

        Self {
            api,
            channel,
            conversation,
            events,
            profile: RwLock::new(None),
        }
    }

    pub fn api(&self) -> &HttpChatApi {
        &self.api
    }

    pub fn channel(&self) -> &WsChannel {
        &self.channel
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.read().ok().and_then(|p| p.clone())
    }

    /// Ids of connected users, as last pushed by the server.
    pub fn online_users(&self) -> Vec<UserId> {
        self.channel.online_users().borrow().clone()
    }

    pub async fn signup(&self, full_name: &str, email: &str, password: &str) -> Result<UserProfile> {
        let req = SignupRequest {
            full_name: full_name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth = self.api.signup(&req).await.map_err(|e| self.report(e))?;
        self.establish(auth.user.clone(), &auth.token)
            .map_err(|e| self.report(e))?;
        self.events.success("Account created successfully");
        Ok(auth.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth = self.api.login(&req).await.map_err(|e| self.report(e))?;
        self.establish(auth.user.clone(), &auth.token)
            .map_err(|e| self.report(e))?;
        self.events.success("Logged in successfully");
        Ok(auth.user)
    }

    /// Validate a stored token and resume the session.
    pub async fn resume(&self, token: String) -> Result<UserProfile> {
        self.api.set_token(Some(token));
        let result = self.check_auth().await;
        if result.is_err() {
            self.api.set_token(None);
        }
        result
    }

    /// Re-check the current session with the server and reopen the
    /// conversation that was open last time.
    pub async fn check_auth(&self) -> Result<UserProfile> {
        let token = self.api.token().ok_or(ClientError::NotLoggedIn)?;
        let profile = self.api.check_auth().await?;
        self.establish(profile.clone(), &token)?;
        self.conversation.restore_selection().await;
        Ok(profile)
    }

    /// End the session. Local state is torn down even if the server call fails.
    pub async fn logout(&self) -> Result<()> {
        let result = self.api.logout().await;

        self.channel.disconnect();
        self.conversation.close();
        if let Ok(mut profile) = self.profile.write() {
            *profile = None;
        }
        self.api.set_token(None);

        match result {
            Ok(()) => {
                info!("Logged out");
                self.events.success("Logged out successfully");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Server logout failed");
                Err(self.report(e))
            }
        }
    }

    pub async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<UserProfile> {
        let profile = self
            .api
            .update_profile(req)
            .await
            .map_err(|e| self.report(e))?;
        if let Ok(mut current) = self.profile.write() {
            *current = Some(profile.clone());
        }
        self.events.success("Profile updated successfully");
        Ok(profile)
    }

    /// Bind the channel and the conversation store to `profile`. Switching
    /// to another user closes whatever the previous one had open.
    fn establish(&self, profile: UserProfile, token: &str) -> Result<()> {
        if let Some(previous) = self.profile().filter(|p| p.id != profile.id) {
            info!(previous = %previous.id, user = %profile.id, "Switching user");
            self.conversation.close();
        }
        self.channel.connect(&profile.id, token)?;

        info!(user = %profile.id, "Session established");
        if let Ok(mut current) = self.profile.write() {
            *current = Some(profile);
        }
        Ok(())
    }

    fn report(&self, error: ClientError) -> ClientError {
        self.events.error(error.user_message());
        error
    }
}
