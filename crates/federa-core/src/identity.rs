//! Identity claims model and the values exchanged with provider peers
//!
//! Everything here is plain data: the verified [`Identity`] handed back to the
//! host, the [`Scopes`] the host asks for, the [`TokenSet`] returned by the
//! token endpoint and the [`VerifiedIdToken`] produced by the verifier.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{FederaError, Result};

// =============================================================================
// Identity
// =============================================================================

/// Verified result of a login or refresh.
///
/// Built fresh on every successful callback or refresh. The connector never
/// stores it; persistence belongs to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject of the verified ID token
    pub user_id: String,
    /// Display name (`name` claim)
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    /// Opaque reauthentication token, the provider's refresh token
    #[serde(default)]
    pub connector_data: Vec<u8>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Identity {
    /// Refresh token carried by this identity, if any.
    pub fn refresh_token(&self) -> Option<String> {
        if self.connector_data.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&self.connector_data).into_owned())
    }
}

/// Scopes requested by the host for one login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scopes {
    /// Ask the provider for a long-lived refresh token
    pub offline_access: bool,
    /// Resolve group memberships into the identity
    pub groups: bool,
}

// =============================================================================
// Token endpoint values
// =============================================================================

/// Token response from the provider's token endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Absolute expiry, derived from `expires_in` on receipt
    #[serde(skip)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Non-standard response fields such as `id_token`
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenSet {
    /// A token that only carries a refresh token and an access token that
    /// has already expired, so the next token request must refresh it.
    pub fn expired_with_refresh(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: Some(refresh_token.into()),
            expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            ..Default::default()
        }
    }

    /// Stamp `expires_at` from `expires_in`, relative to now.
    pub fn with_expiry_from_now(mut self) -> Self {
        if let Some(secs) = self.expires_in {
            self.expires_at = Some(Utc::now() + chrono::Duration::seconds(secs));
        }
        self
    }

    pub fn is_expired(&self) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.expires_at {
            Some(at) => at <= Utc::now(),
            None => false,
        }
    }

    /// Look up an extra response field.
    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// Raw ID token string, if the response carried one.
    pub fn id_token(&self) -> Option<&str> {
        self.extra("id_token").and_then(|v| v.as_str())
    }
}

/// An ID token whose signature, issuer, audience and expiry were checked.
#[derive(Debug, Clone)]
pub struct VerifiedIdToken {
    pub subject: String,
    pub issuer: String,
    /// Full claim set of the token
    pub claims: serde_json::Value,
}

impl VerifiedIdToken {
    /// Decode the claim set into a typed structure.
    pub fn claims<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.claims.clone())
            .map_err(|e| FederaError::id_token_invalid(format!("failed to decode claims: {}", e)))
    }
}

/// Claims the connector reads from a Google ID token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoogleClaims {
    #[serde(default, rename = "name")]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    /// Hosted domain
    #[serde(default, rename = "hd")]
    pub hosted_domain: String,
}

// =============================================================================
// Directory values
// =============================================================================

/// One page of a "list groups for member" query.
#[derive(Debug, Clone, Default)]
pub struct GroupPage {
    /// Group email addresses
    pub groups: Vec<String>,
    /// Continuation token, `None` or empty on the last page
    pub next_page_token: Option<String>,
}

impl GroupPage {
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}
