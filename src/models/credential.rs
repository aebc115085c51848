use std::fmt::{Debug, Formatter, Result as FmtResult};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Claims that may carry the identity of the credential holder, in lookup order.
pub const IDENTITY_CLAIMS: [&str; 4] = ["email", "userEmail", "sub", "username"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecipientError {
    #[error("no bearer credential is configured")]
    MissingCredential,

    #[error("credential is not a three-part token")]
    MalformedToken,

    #[error("credential payload is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("credential payload is not a JSON object: {0}")]
    InvalidPayload(String),

    #[error("credential carries none of the email, userEmail, sub or username claims")]
    NoIdentityClaim,
}

/// Static bearer token used against the order service.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential(String);

impl BearerCredential {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into().trim().to_string();
        (!token.is_empty()).then_some(Self(token))
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    /// Decodes the payload segment without checking the signature.
    pub fn claims(&self) -> Result<Map<String, JsonValue>, RecipientError> {
        let mut segments = self.0.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) if !payload.is_empty() => payload,
            _ => return Err(RecipientError::MalformedToken),
        };

        // Tolerate tokens minted with the standard alphabet or with padding.
        let normalized = payload
            .trim_end_matches('=')
            .replace('+', "-")
            .replace('/', "_");

        let bytes = URL_SAFE_NO_PAD
            .decode(normalized)
            .map_err(|e| RecipientError::InvalidEncoding(e.to_string()))?;

        match serde_json::from_slice::<JsonValue>(&bytes) {
            Ok(JsonValue::Object(claims)) => Ok(claims),
            Ok(other) => Err(RecipientError::InvalidPayload(format!(
                "expected an object, found {}",
                other
            ))),
            Err(e) => Err(RecipientError::InvalidPayload(e.to_string())),
        }
    }

    pub fn identity_claim(&self) -> Result<String, RecipientError> {
        let claims = self.claims()?;

        IDENTITY_CLAIMS
            .iter()
            .filter_map(|name| claims.get(*name).and_then(JsonValue::as_str))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(RecipientError::NoIdentityClaim)
    }
}

impl Debug for BearerCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("BearerCredential(<redacted>)")
    }
}
