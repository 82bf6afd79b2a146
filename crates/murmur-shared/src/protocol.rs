use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{Message, UserId, UserProfile};

/// Events pushed from the server to a delivery channel.
///
/// Encoded as JSON text frames: `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A message was stored for (or, with echo enabled, by) this channel's user
    #[serde(rename = "newMessage")]
    NewMessage(Message),

    /// Ordered list of every currently connected user
    #[serde(rename = "getOnlineUsers")]
    GetOnlineUsers(Vec<UserId>),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => crate::constants::EVENT_NEW_MESSAGE,
            ServerEvent::GetOnlineUsers(_) => crate::constants::EVENT_GET_ONLINE_USERS,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }
}

// ---------------------------------------------------------------------------
// REST bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Base64 image, same encoding rules as message images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

/// Returned by signup and login: the profile plus the session token for
/// non-browser clients (browsers also get it as a cookie).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: UserProfile,
    pub token: String,
}

/// `{ "message": ... }` body used for both status and error replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_event_envelope() {
        let event = ServerEvent::GetOnlineUsers(vec!["u1".into(), "u2".into()]);
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "getOnlineUsers");
        assert_eq!(json["data"], serde_json::json!(["u1", "u2"]));
        assert_eq!(event.name(), "getOnlineUsers");
    }

    #[test]
    fn test_new_message_parses() {
        let raw = r#"{"event":"newMessage","data":{"id":"8c5d4a52-3b8f-4c4e-9a43-7d5f7a0ad1b2","senderId":"u1","receiverId":"u2","text":"hi","createdAt":"2024-01-01T00:00:00Z"}}"#;
        match ServerEvent::from_json(raw).unwrap() {
            ServerEvent::NewMessage(m) => {
                assert_eq!(m.sender_id.as_str(), "u1");
                assert_eq!(m.text.as_deref(), Some("hi"));
                assert!(m.image_url.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(ServerEvent::from_json(r#"{"event":"typing","data":null}"#).is_err());
    }

    #[test]
    fn test_auth_response_is_flat() {
        let resp = AuthResponse {
            user: UserProfile {
                id: "u1".into(),
                full_name: "Ada".into(),
                email: "ada@example.com".into(),
                profile_pic: None,
                created_at: Utc::now(),
            },
            token: "t".into(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["id"], "u1");
        assert_eq!(json["fullName"], "Ada");
        assert_eq!(json["token"], "t");
    }
}
