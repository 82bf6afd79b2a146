use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed session token: {0}")]
    Malformed(String),

    #[error("Session token expired")]
    Expired,

    #[error("Invalid session token signature")]
    InvalidSignature,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
