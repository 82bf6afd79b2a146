use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity = opaque server-assigned string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One accepted push-channel connection on the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored chat message. Immutable once the server has assigned `id` and
/// `created_at`; at least one of `text` / `image_url` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether this message belongs to the conversation between `a` and `b`
    /// (in either direction).
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (&self.sender_id == a && &self.receiver_id == b)
            || (&self.sender_id == b && &self.receiver_id == a)
    }

    pub fn has_content(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
            || self.image_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Outbound message as typed by the user: text and/or a base64 image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 payload, optionally wrapped in a `data:image/...;base64,` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    /// Trim the text and drop empty fields.
    pub fn normalized(self) -> Self {
        let text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let image = self.image.filter(|i| !i.trim().is_empty());
        Self { text, image }
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, |t| t.trim().is_empty())
            && self.image.as_deref().map_or(true, |i| i.trim().is_empty())
    }
}

/// Public view of a registered user. The password hash never leaves the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, receiver: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender.into(),
            receiver_id: receiver.into(),
            text: Some("hi".into()),
            image_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_between_either_direction() {
        let m = message("u1", "u2");
        assert!(m.is_between(&"u1".into(), &"u2".into()));
        assert!(m.is_between(&"u2".into(), &"u1".into()));
        assert!(!m.is_between(&"u1".into(), &"u3".into()));
    }

    #[test]
    fn test_message_wire_shape() {
        let m = message("u1", "u2");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["receiverId"], "u2");
        assert_eq!(json["text"], "hi");
        assert!(json.get("imageUrl").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_draft_normalization() {
        let draft = MessageDraft {
            text: Some("   ".into()),
            image: None,
        };
        assert!(draft.is_empty());
        assert_eq!(draft.normalized(), MessageDraft::default());

        let draft = MessageDraft::text("  hello ").normalized();
        assert_eq!(draft.text.as_deref(), Some("hello"));
        assert!(!draft.is_empty());
    }

    #[test]
    fn test_has_content() {
        let mut m = message("u1", "u2");
        assert!(m.has_content());
        m.text = None;
        assert!(!m.has_content());
        m.image_url = Some("http://localhost/media/x.png".into());
        assert!(m.has_content());
    }
}
