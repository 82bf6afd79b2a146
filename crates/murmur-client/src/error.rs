use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Unauthorized: {0}")]
    Unauthenticated(String),

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Delivery channel error: {0}")]
    Channel(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("No chat selected")]
    NoChatSelected,

    #[error("A clear is already in progress")]
    ClearInProgress,

    #[error("Not logged in")]
    NotLoggedIn,
}

impl ClientError {
    /// Text shown to the user when this error becomes a notification.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Unauthenticated(_) | ClientError::NotLoggedIn => {
                "Session expired, please log in again".to_string()
            }
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Http(_) => "Could not reach the server".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
