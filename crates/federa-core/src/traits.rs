//! Capability traits the connector needs from its peers
//!
//! Each trait has one production implementation in `federa-identity`; tests
//! substitute in-process doubles.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{error::Result, identity::*};

// =============================================================================
// OIDC Provider Traits
// =============================================================================

/// OAuth2 authorization-code and refresh-token exchange
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Build the provider authorization URL for `state`, with additional
    /// query parameters appended after the standard ones.
    fn authorization_url(&self, state: &str, extra_params: &[(&str, &str)]) -> Result<String>;

    /// Exchange an authorization code for a token set
    async fn exchange_code(&self, code: &str) -> Result<TokenSet>;

    /// Redeem a refresh token for a new token set
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet>;

    /// Return a valid token for `current`, refreshing it when its access
    /// token has expired. A refresh response without a refresh token keeps
    /// the one already held.
    async fn token(&self, current: TokenSet) -> Result<TokenSet> {
        if !current.is_expired() {
            return Ok(current);
        }

        let Some(refresh_token) = current.refresh_token.clone().filter(|t| !t.is_empty()) else {
            return Err(crate::FederaError::token_exchange(
                "token expired and no refresh token is available",
            ));
        };

        let mut refreshed = self.refresh_token(&refresh_token).await?;
        if refreshed.refresh_token.as_deref().map_or(true, str::is_empty) {
            refreshed.refresh_token = Some(refresh_token);
        }
        Ok(refreshed)
    }
}

/// Verification of a raw ID token against the provider's keys
#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    /// Check signature, issuer, audience and expiry
    async fn verify(&self, raw_id_token: &str) -> Result<VerifiedIdToken>;
}

// =============================================================================
// Directory Traits
// =============================================================================

/// A directory service client for one tenant
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// List one page of the groups `member_key` (a user or group email) is
    /// directly a member of.
    async fn list_groups(&self, member_key: &str, page_token: Option<&str>) -> Result<GroupPage>;
}

/// Creates directory clients impersonating a tenant's administrative identity
#[async_trait]
pub trait DirectoryClientFactory: Send + Sync {
    async fn create(&self, admin_email: &str) -> Result<Arc<dyn DirectoryClient>>;
}
