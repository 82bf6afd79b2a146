//! REST client for the Murmur server.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use murmur_shared::protocol::{
    AuthResponse, LoginRequest, SignupRequest, StatusResponse, UpdateProfileRequest,
};
use murmur_shared::{Message, MessageDraft, UserId, UserProfile};

use crate::error::{ClientError, Result};

/// Account operations.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn signup(&self, req: &SignupRequest) -> Result<AuthResponse>;
    async fn login(&self, req: &LoginRequest) -> Result<AuthResponse>;
    async fn logout(&self) -> Result<()>;
    async fn check_auth(&self) -> Result<UserProfile>;
    async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<UserProfile>;
}

/// Conversation operations used by the conversation store.
#[async_trait]
pub trait MessagesApi: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserProfile>>;
    async fn get_messages(&self, partner: &UserId) -> Result<Vec<Message>>;
    async fn send_message(&self, partner: &UserId, draft: &MessageDraft) -> Result<Message>;
    async fn clear_chat(&self, partner: &UserId) -> Result<()>;
}

/// `reqwest`-backed implementation of both APIs. The session token returned
/// by login/signup is kept and sent as a bearer token afterwards.
#[derive(Clone)]
pub struct HttpChatApi {
    http: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    /// `base_url` joined with `segments`, each percent-encoded as one path
    /// segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let invalid = || ClientError::InvalidUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn auth_request(&self, path: &[&str], body: &impl serde::Serialize) -> Result<AuthResponse> {
        let resp = self.http.post(self.endpoint(path)?).json(body).send().await?;
        let auth: AuthResponse = parse(resp).await?;
        self.set_token(Some(auth.token.clone()));
        Ok(auth)
    }
}

/// Decode a success body, or turn an error reply into a [`ClientError`].
async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let message = resp
        .json::<StatusResponse>()
        .await
        .map(|body| body.message)
        .unwrap_or_else(|_| status.to_string());
    debug!(status = status.as_u16(), message = %message, "Request failed");

    if status == StatusCode::UNAUTHORIZED {
        Err(ClientError::Unauthenticated(message))
    } else {
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AuthApi for HttpChatApi {
    async fn signup(&self, req: &SignupRequest) -> Result<AuthResponse> {
        self.auth_request(&["api", "auth", "signup"], req).await
    }

    async fn login(&self, req: &LoginRequest) -> Result<AuthResponse> {
        self.auth_request(&["api", "auth", "login"], req).await
    }

    async fn logout(&self) -> Result<()> {
        let resp = self
            .authorized(self.http.post(self.endpoint(&["api", "auth", "logout"])?))
            .send()
            .await?;
        let _: StatusResponse = parse(resp).await?;
        self.set_token(None);
        Ok(())
    }

    async fn check_auth(&self) -> Result<UserProfile> {
        let resp = self
            .authorized(self.http.get(self.endpoint(&["api", "auth", "check"])?))
            .send()
            .await?;
        parse(resp).await
    }

    async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<UserProfile> {
        let resp = self
            .authorized(self.http.put(self.endpoint(&["api", "auth", "update-profile"])?))
            .json(req)
            .send()
            .await?;
        parse(resp).await
    }
}

#[async_trait]
impl MessagesApi for HttpChatApi {
    async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let resp = self
            .authorized(self.http.get(self.endpoint(&["api", "messages", "users"])?))
            .send()
            .await?;
        parse(resp).await
    }

    async fn get_messages(&self, partner: &UserId) -> Result<Vec<Message>> {
        let resp = self
            .authorized(self.http.get(self.endpoint(&["api", "messages", partner.as_str()])?))
            .send()
            .await?;
        parse(resp).await
    }

    async fn send_message(&self, partner: &UserId, draft: &MessageDraft) -> Result<Message> {
        let resp = self
            .authorized(
                self.http
                    .post(self.endpoint(&["api", "messages", "send", partner.as_str()])?),
            )
            .json(draft)
            .send()
            .await?;
        parse(resp).await
    }

    async fn clear_chat(&self, partner: &UserId) -> Result<()> {
        let resp = self
            .authorized(
                self.http
                    .delete(self.endpoint(&["api", "messages", "clear", partner.as_str()])?),
            )
            .send()
            .await?;
        let _: StatusResponse = parse(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_partner_segment() {
        let api = HttpChatApi::new("http://localhost:5000/");
        let url = api
            .endpoint(&["api", "messages", "send", "a/b c?d"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/messages/send/a%2Fb%20c%3Fd"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = HttpChatApi::new("https://chat.example.com/murmur");
        let url = api.endpoint(&["api", "auth", "check"]).unwrap();
        assert_eq!(url.as_str(), "https://chat.example.com/murmur/api/auth/check");
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        let api = HttpChatApi::new("not a url");
        assert!(matches!(
            api.endpoint(&["api"]),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
