//! Common utilities and types for provider implementations

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;
use tracing::debug;

use federa_core::{FederaError, Result};

/// HTTP client wrapper.
///
/// Every request is sent exactly once; failures go back to the caller.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

/// A request that failed in transport or returned a non-success status
#[derive(Debug)]
pub struct HttpError {
    pub status: Option<u16>,
    pub body: String,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {} - {}", status, self.body),
            None => write!(f, "{}", self.body),
        }
    }
}

impl HttpClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FederaError::internal_error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send a request once and keep only successful responses
    pub async fn execute(
        &self,
        request_builder: reqwest::RequestBuilder,
    ) -> std::result::Result<reqwest::Response, HttpError> {
        let response = request_builder.send().await.map_err(|e| HttpError {
            status: None,
            body: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(HttpError {
            status: Some(status.as_u16()),
            body,
        })
    }
}

/// Cache for JWKS keys
pub struct JwksCache {
    keys: RwLock<HashMap<String, CachedJwks>>,
    ttl_secs: u64,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: DateTime<Utc>,
}

impl JwksCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub async fn get_or_fetch(&self, jwks_uri: &str, client: &HttpClient) -> Result<JwkSet> {
        // Check cache first
        {
            let cache = self.keys.read().await;
            if let Some(cached) = cache.get(jwks_uri) {
                let age = (Utc::now() - cached.fetched_at).num_seconds().max(0) as u64;
                if age < self.ttl_secs {
                    return Ok(cached.keys.clone());
                }
            }
        }

        self.refresh(jwks_uri, client).await
    }

    /// Fetch the key set unconditionally and replace the cached copy
    pub async fn refresh(&self, jwks_uri: &str, client: &HttpClient) -> Result<JwkSet> {
        debug!("Fetching JWKS from {}", jwks_uri);
        let response = client
            .execute(client.inner().get(jwks_uri))
            .await
            .map_err(|e| FederaError::id_token_invalid(format!("failed to fetch JWKS: {}", e)))?;

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| FederaError::id_token_invalid(format!("failed to parse JWKS: {}", e)))?;

        {
            let mut cache = self.keys.write().await;
            cache.insert(
                jwks_uri.to_string(),
                CachedJwks {
                    keys: jwks.clone(),
                    fetched_at: Utc::now(),
                },
            );
        }

        Ok(jwks)
    }
}

/// JSON Web Key Set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// JSON Web Key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
}

impl JwkSet {
    /// Find a key by kid
    pub fn find_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Get a decoding key for the given kid
    pub fn get_decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        let jwk = self.find_key(kid).ok_or_else(|| {
            FederaError::id_token_invalid(format!("key with kid '{}' not found in JWKS", kid))
        })?;

        match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_ref().ok_or_else(|| {
                    FederaError::id_token_invalid("RSA key missing 'n' parameter")
                })?;
                let e = jwk.e.as_ref().ok_or_else(|| {
                    FederaError::id_token_invalid("RSA key missing 'e' parameter")
                })?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| FederaError::id_token_invalid(format!("invalid RSA key: {}", e)))
            }
            "EC" => {
                let x = jwk.x.as_ref().ok_or_else(|| {
                    FederaError::id_token_invalid("EC key missing 'x' parameter")
                })?;
                let y = jwk.y.as_ref().ok_or_else(|| {
                    FederaError::id_token_invalid("EC key missing 'y' parameter")
                })?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| FederaError::id_token_invalid(format!("invalid EC key: {}", e)))
            }
            other => Err(FederaError::id_token_invalid(format!(
                "unsupported key type: {}",
                other
            ))),
        }
    }
}

/// OIDC Discovery document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcDiscovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,
}

impl OidcDiscovery {
    /// Fetch discovery document from well-known endpoint
    pub async fn fetch(issuer: &str, client: &HttpClient) -> Result<Self> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );

        debug!("Fetching OIDC discovery from {}", url);

        let response = client
            .execute(client.inner().get(&url))
            .await
            .map_err(|e| FederaError::config_error(format!("failed to get provider: {}", e)))?;

        let discovery: Self = response.json().await.map_err(|e| {
            FederaError::config_error(format!("failed to parse OIDC discovery: {}", e))
        })?;

        if discovery.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
            return Err(FederaError::config_error(format!(
                "issuer did not match the issuer returned by provider, expected {:?} got {:?}",
                issuer, discovery.issuer
            )));
        }

        Ok(discovery)
    }
}

/// Validate a JWT token
pub fn validate_jwt<T: for<'de> Deserialize<'de>>(
    token: &str,
    decoding_key: &DecodingKey,
    validation: &Validation,
) -> Result<T> {
    let token_data = decode::<T>(token, decoding_key, validation)
        .map_err(|e| FederaError::id_token_invalid(format!("token validation failed: {}", e)))?;
    Ok(token_data.claims)
}

/// Extract kid and algorithm from the JWT header
pub fn extract_jwt_header(token: &str) -> Result<(String, Algorithm)> {
    let header = decode_header(token)
        .map_err(|e| FederaError::id_token_invalid(format!("failed to decode JWT header: {}", e)))?;

    let kid = header
        .kid
        .ok_or_else(|| FederaError::id_token_invalid("JWT header missing 'kid'"))?;

    match header.alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Err(
            FederaError::id_token_invalid(format!("unsupported algorithm: {:?}", header.alg)),
        ),
        alg => Ok((kid, alg)),
    }
}

/// One page returned by a paginated API
#[derive(Debug, Clone)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Helper to collect all pages.
///
/// `fetch_page` receives the continuation token of the previous page (`None`
/// for the first). Paging stops at the first empty or absent token. Any page
/// error aborts the whole collection.
pub async fn collect_all_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<PaginatedResponse<T>>>,
{
    let mut all_items = Vec::new();
    let mut page_token = None;

    loop {
        let response = fetch_page(page_token.take()).await?;
        all_items.extend(response.items);

        match response.next_page_token.filter(|t| !t.is_empty()) {
            Some(next) => page_token = Some(next),
            None => break,
        }
    }

    Ok(all_items)
}
