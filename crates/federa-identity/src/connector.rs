//! Google login connector
//!
//! Drives the OAuth2 / OIDC handshake against the provider, checks the
//! verified claims against the hosted-domain whitelist, resolves group
//! memberships through the directory routes and assembles the [`Identity`].
//!
//! No call is retried. Token exchange, verification and every directory page
//! are attempted once per invocation and failures go straight back to the
//! host.

use reqwest::Url;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use federa_core::{
    ConnectorConfig, DirectoryClientFactory, FederaError, GoogleClaims, IdTokenVerifier,
    Identity, Result, Scopes, TokenExchanger, TokenSet,
};

use crate::groups::{filter_groups, GroupResolver};
use crate::providers::{OidcProvider, ServiceAccountFactory};
use crate::routing::DirectoryRoutes;

/// Login hint asking the provider to offer any hosted domain
const ANY_HOSTED_DOMAIN: &str = "*";

/// Connector for logins through Google
pub struct GoogleConnector {
    redirect_uri: String,
    hosted_domains: Vec<String>,
    allowed_groups: Vec<String>,
    fetch_transitive_group_membership: bool,
    exchanger: Arc<dyn TokenExchanger>,
    verifier: Arc<dyn IdTokenVerifier>,
    resolver: GroupResolver,
    shutdown: CancellationToken,
}

impl GoogleConnector {
    /// Open a connector against the configured issuer.
    ///
    /// Directory clients are created from the configured service account
    /// key, or application default credentials, when groups can be requested.
    pub async fn open(config: ConnectorConfig) -> Result<Self> {
        let config = config.normalize();
        config.validate()?;

        if config.wants_directory() {
            let factory = ServiceAccountFactory::from_config(&config)?;
            Self::open_with_factory(config, Some(&factory)).await
        } else {
            Self::open_with_factory(config, None).await
        }
    }

    /// Open a connector, creating directory clients through `factory`.
    #[instrument(skip(config, factory), fields(issuer = %config.issuer_url))]
    pub async fn open_with_factory(
        config: ConnectorConfig,
        factory: Option<&dyn DirectoryClientFactory>,
    ) -> Result<Self> {
        let config = config.normalize();
        config.validate()?;

        let provider = Arc::new(OidcProvider::discover(&config).await?);

        let routes = if config.wants_directory() {
            let factory = factory.ok_or_else(|| {
                FederaError::config_error("groups are requested but no directory factory was given")
            })?;
            DirectoryRoutes::build(&config.domain_to_admin_email, factory).await?
        } else {
            DirectoryRoutes::new()
        };

        let connector = Self::with_peers(&config, provider.clone(), provider.clone(), routes);
        provider.spawn_key_refresh(connector.shutdown.clone());

        info!("Google connector ready");
        Ok(connector)
    }

    /// Build from already constructed peers. Nothing is fetched.
    pub fn with_peers(
        config: &ConnectorConfig,
        exchanger: Arc<dyn TokenExchanger>,
        verifier: Arc<dyn IdTokenVerifier>,
        routes: DirectoryRoutes,
    ) -> Self {
        Self {
            redirect_uri: config.redirect_uri.clone(),
            hosted_domains: config.hosted_domains.clone(),
            allowed_groups: config.groups.clone(),
            fetch_transitive_group_membership: config.fetch_transitive_group_membership,
            exchanger,
            verifier,
            resolver: GroupResolver::new(Arc::new(routes)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop background work owned by the connector
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Authorization URL the browser is redirected to.
    ///
    /// The `hd` hint only narrows the provider's account picker. The hosted
    /// domain whitelist itself is enforced when the callback arrives.
    pub fn login_url(&self, scopes: Scopes, callback_url: &str, state: &str) -> Result<String> {
        if self.redirect_uri != callback_url {
            return Err(FederaError::config_mismatch(format!(
                "expected callback URL {:?} did not match the URL in the config {:?}",
                callback_url, self.redirect_uri
            )));
        }

        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(first) = self.hosted_domains.first() {
            let preferred_domain = if self.hosted_domains.len() > 1 {
                ANY_HOSTED_DOMAIN
            } else {
                first.as_str()
            };
            params.push(("hd", preferred_domain));
        }

        if scopes.offline_access {
            params.push(("access_type", "offline"));
            params.push(("prompt", "consent"));
        }

        self.exchanger.authorization_url(state, &params)
    }

    /// Complete a login from the provider's redirect back to the host
    #[instrument(skip(self, callback))]
    pub async fn handle_callback(&self, scopes: Scopes, callback: &Url) -> Result<Identity> {
        let mut error = None;
        let mut error_description = None;
        let mut code = None;
        // A repeated key keeps its first value
        for (key, value) in callback.query_pairs() {
            let slot = match key.as_ref() {
                "error" => &mut error,
                "error_description" => &mut error_description,
                "code" => &mut code,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.into_owned());
        }

        if let Some(error) = error.filter(|e| !e.is_empty()) {
            warn!("Provider returned error {}", error);
            return Err(FederaError::provider_denied(
                error,
                error_description.unwrap_or_default(),
            ));
        }

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| FederaError::token_exchange("no authorization code in callback"))?;

        let token = self
            .exchanger
            .exchange_code(&code)
            .await
            .map_err(into_token_exchange_error)?;

        self.create_identity(scopes, token).await
    }

    /// Derive a fresh identity from the refresh token held by `identity`
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn refresh(&self, scopes: Scopes, identity: &Identity) -> Result<Identity> {
        let stored = identity.refresh_token().unwrap_or_default();
        let token = self
            .exchanger
            .token(TokenSet::expired_with_refresh(stored))
            .await
            .map_err(into_token_exchange_error)?;

        self.create_identity(scopes, token).await
    }

    async fn create_identity(&self, scopes: Scopes, token: TokenSet) -> Result<Identity> {
        let raw_id_token = token.id_token().ok_or(FederaError::MissingIdToken)?;

        let id_token = self
            .verifier
            .verify(raw_id_token)
            .await
            .map_err(|e| match e {
                FederaError::IdTokenInvalid { .. } => e,
                other => FederaError::id_token_invalid(other.to_string()),
            })?;

        let claims: GoogleClaims = id_token.claims()?;

        if !self.hosted_domains.is_empty()
            && !self.hosted_domains.iter().any(|d| *d == claims.hosted_domain)
        {
            return Err(FederaError::DomainNotAllowed {
                domain: claims.hosted_domain,
            });
        }

        let mut groups = Vec::new();
        if scopes.groups && !self.resolver.routes().is_empty() {
            let mut visited = HashSet::new();
            groups = self
                .resolver
                .resolve_groups(
                    &claims.email,
                    self.fetch_transitive_group_membership,
                    &mut visited,
                )
                .await
                .map_err(FederaError::group_resolution)?;

            if !self.allowed_groups.is_empty() {
                groups = filter_groups(groups, &self.allowed_groups);
                if groups.is_empty() {
                    return Err(FederaError::NoAuthorizedGroup {
                        user: claims.username,
                    });
                }
            }
        }

        debug!(
            user_id = %id_token.subject,
            groups = groups.len(),
            "Assembled identity"
        );

        Ok(Identity {
            user_id: id_token.subject,
            username: claims.username,
            email: claims.email,
            email_verified: claims.email_verified,
            connector_data: token.refresh_token.unwrap_or_default().into_bytes(),
            groups,
        })
    }
}

impl Drop for GoogleConnector {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn into_token_exchange_error(e: FederaError) -> FederaError {
    match e {
        FederaError::TokenExchangeFailed { .. } => e,
        other => FederaError::token_exchange(other.to_string()),
    }
}
