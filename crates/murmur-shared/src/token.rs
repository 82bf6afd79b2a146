//! Session tokens.
//!
//! A token binds a [`UserId`] to an expiry and is signed by the server's
//! Ed25519 key. It travels as base64url-encoded JSON in the `session` cookie,
//! an `Authorization: Bearer` header, or the push channel's `token` query
//! parameter.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::types::UserId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub user_id: UserId,
    pub valid_until: DateTime<Utc>,
    /// Hex-encoded Ed25519 signature over [`SessionToken::signed_payload`].
    pub signature: String,
}

impl SessionToken {
    /// Sign a new token for `user_id`.
    pub fn issue(user_id: UserId, valid_until: DateTime<Utc>, key: &SigningKey) -> Self {
        let payload = signed_payload(&user_id, &valid_until);
        let signature = key.sign(&payload);
        Self {
            user_id,
            valid_until,
            signature: hex::encode(signature.to_bytes()),
        }
    }

    /// Check expiry and signature.
    pub fn verify(&self, key: &VerifyingKey) -> Result<(), TokenError> {
        if Utc::now() > self.valid_until {
            return Err(TokenError::Expired);
        }

        let sig_bytes = hex::decode(&self.signature)
            .map_err(|e| TokenError::Malformed(format!("signature: {e}")))?;
        let signature =
            Signature::from_slice(&sig_bytes).map_err(|_| TokenError::InvalidSignature)?;

        key.verify(&signed_payload(&self.user_id, &self.valid_until), &signature)
            .map_err(|_| TokenError::InvalidSignature)
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))
    }

    /// Decode and verify in one step, returning the bound user.
    pub fn validate(raw: &str, key: &VerifyingKey) -> Result<UserId, TokenError> {
        let token = Self::decode(raw)?;
        token.verify(key)?;
        Ok(token.user_id)
    }
}

// payload = user_id || 0x00 || valid_until (rfc3339, seconds)
fn signed_payload(user_id: &UserId, valid_until: &DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(user_id.as_str().as_bytes());
    payload.push(0);
    payload.extend_from_slice(
        valid_until
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .as_bytes(),
    );
    payload
}
