//! OIDC provider peer
//!
//! Works with any OIDC-compliant provider, using the discovery document to
//! configure endpoints. Implements both the code/refresh exchange and the ID
//! token verification the connector depends on.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use federa_core::{
    ConnectorConfig, FederaError, IdTokenVerifier, Result, TokenExchanger, TokenSet,
    VerifiedIdToken, GOOGLE_ISSUER_URL,
};

use super::common::*;

/// Seconds a fetched key set stays fresh
const JWKS_TTL_SECS: u64 = 3600;

/// Clock skew tolerated on `exp`, `nbf` and `iat`
const CLOCK_SKEW_SECS: u64 = 60;

const HTTP_TIMEOUT_SECS: u64 = 30;

/// OIDC provider discovered from its issuer
pub struct OidcProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    discovery: OidcDiscovery,
    http_client: HttpClient,
    jwks_cache: Arc<JwksCache>,
}

impl OidcProvider {
    /// Fetch the discovery document of `config.issuer_url` and build the
    /// provider from it
    #[instrument(skip(config), fields(issuer = %config.issuer_url))]
    pub async fn discover(config: &ConnectorConfig) -> Result<Self> {
        let http_client = HttpClient::new(HTTP_TIMEOUT_SECS)?;
        let discovery = OidcDiscovery::fetch(&config.issuer_url, &http_client).await?;

        info!("Discovered OIDC provider {}", discovery.issuer);
        Ok(Self::from_discovery(config, discovery, http_client))
    }

    /// Build from an already known discovery document
    pub fn from_discovery(
        config: &ConnectorConfig,
        discovery: OidcDiscovery,
        http_client: HttpClient,
    ) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.effective_scopes(),
            discovery,
            http_client,
            jwks_cache: Arc::new(JwksCache::new(JWKS_TTL_SECS)),
        }
    }

    pub fn discovery(&self) -> &OidcDiscovery {
        &self.discovery
    }

    /// Refresh the key set in the background every cache period until
    /// `cancel` fires.
    pub fn spawn_key_refresh(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.jwks_cache.clone();
        let http_client = self.http_client.clone();
        let jwks_uri = self.discovery.jwks_uri.clone();
        let period = Duration::from_secs(cache.ttl_secs());

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Stopping JWKS refresh for {}", jwks_uri);
                        break;
                    }
                    _ = tokio::time::sleep(period) => {
                        if let Err(e) = cache.refresh(&jwks_uri, &http_client).await {
                            warn!("Background JWKS refresh failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Issuers accepted in the `iss` claim. Google also issues tokens with
    /// the scheme-less form of its issuer.
    fn accepted_issuers(&self) -> Vec<String> {
        let mut issuers = vec![self.discovery.issuer.clone()];
        if self.discovery.issuer == GOOGLE_ISSUER_URL {
            issuers.push("accounts.google.com".to_string());
        }
        issuers
    }

    /// The header algorithm must be advertised by the provider (RS256 when
    /// discovery lists none) and match the key's own `alg` when it has one.
    fn check_algorithm(&self, alg: Algorithm, jwk: Option<&Jwk>) -> Result<()> {
        let advertised = match self.discovery.id_token_signing_alg_values_supported.as_deref() {
            Some(algs) if !algs.is_empty() => algs.iter().any(|a| parse_algorithm(a) == Some(alg)),
            _ => alg == Algorithm::RS256,
        };
        if !advertised {
            return Err(FederaError::id_token_invalid(format!(
                "id token signed with unsupported algorithm {:?}",
                alg
            )));
        }

        if let Some(key_alg) = jwk.and_then(|k| k.alg.as_deref()) {
            if parse_algorithm(key_alg) != Some(alg) {
                return Err(FederaError::id_token_invalid(format!(
                    "id token algorithm {:?} does not match key algorithm {}",
                    alg, key_alg
                )));
            }
        }
        Ok(())
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenSet> {
        let response = self
            .http_client
            .execute(
                self.http_client
                    .inner()
                    .post(&self.discovery.token_endpoint)
                    .form(params),
            )
            .await
            .map_err(|e| match serde_json::from_str::<OAuthErrorResponse>(&e.body) {
                Ok(oauth) => FederaError::token_exchange(oauth.to_string()),
                Err(_) => FederaError::token_exchange(e.to_string()),
            })?;

        let token: TokenSet = response.json().await.map_err(|e| {
            FederaError::token_exchange(format!("failed to parse token response: {}", e))
        })?;

        if token.access_token.is_empty() {
            return Err(FederaError::token_exchange(
                "server response missing access_token",
            ));
        }

        Ok(token.with_expiry_from_now())
    }
}

#[async_trait]
impl TokenExchanger for OidcProvider {
    fn authorization_url(&self, state: &str, extra_params: &[(&str, &str)]) -> Result<String> {
        let mut url = format!(
            "{}?\
            client_id={}&\
            redirect_uri={}&\
            response_type=code&\
            scope={}&\
            state={}",
            self.discovery.authorization_endpoint,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scopes.join(" ")),
            urlencoding::encode(state),
        );

        for (key, value) in extra_params {
            url.push_str(&format!(
                "&{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            ));
        }

        Ok(url)
    }

    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        self.request_token(&params).await
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        self.request_token(&params).await
    }
}

#[async_trait]
impl IdTokenVerifier for OidcProvider {
    #[instrument(skip(self, raw_id_token))]
    async fn verify(&self, raw_id_token: &str) -> Result<VerifiedIdToken> {
        let (kid, alg) = extract_jwt_header(raw_id_token)?;

        let mut jwks = self
            .jwks_cache
            .get_or_fetch(&self.discovery.jwks_uri, &self.http_client)
            .await?;

        // Unknown kid usually means the provider rotated its keys
        if jwks.find_key(&kid).is_none() {
            debug!("Key {} not cached, refetching JWKS", kid);
            jwks = self
                .jwks_cache
                .refresh(&self.discovery.jwks_uri, &self.http_client)
                .await?;
        }

        self.check_algorithm(alg, jwks.find_key(&kid))?;
        let decoding_key = jwks.get_decoding_key(&kid)?;

        let issuers = self.accepted_issuers();
        let mut validation = Validation::new(alg);
        validation.set_issuer(issuers.as_slice());
        validation.set_audience(&[&self.client_id]);
        validation.validate_exp = true;
        validation.leeway = CLOCK_SKEW_SECS;

        let claims: serde_json::Value = validate_jwt(raw_id_token, &decoding_key, &validation)?;

        let subject = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FederaError::id_token_invalid("missing 'sub' claim"))?
            .to_string();
        let issuer = claims
            .get("iss")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(VerifiedIdToken {
            subject,
            issuer,
            claims,
        })
    }
}

fn parse_algorithm(name: &str) -> Option<Algorithm> {
    Algorithm::from_str(name).ok()
}

/// Error body returned by an OAuth2 token endpoint
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl std::fmt::Display for OAuthErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.error_description.as_deref().filter(|d| !d.is_empty()) {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}
