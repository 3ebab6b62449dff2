//! Google Admin Directory client and service-account credentials
//!
//! The directory API is called with an access token obtained through a
//! signed JWT-bearer assertion. With domain-wide delegation the assertion
//! names a super-admin of the tenant as its subject, so the same service
//! account can list groups in several Workspace domains.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use federa_core::{
    ConnectorConfig, DirectoryClient, DirectoryClientFactory, FederaError, GroupPage, Result,
};

use super::common::*;

pub const DIRECTORY_BASE_URL: &str = "https://admin.googleapis.com";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const GROUP_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/admin.directory.group.readonly";

const HTTP_TIMEOUT_SECS: u64 = 30;
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens this close to expiry are replaced before use
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

// =============================================================================
// Credentials
// =============================================================================

/// Service account key file as downloaded from the cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let key: Self = serde_json::from_slice(json).map_err(|e| {
            FederaError::credentials(format!("unable to parse service account key: {}", e))
        })?;

        if key.key_type != "service_account" {
            return Err(FederaError::credentials(format!(
                "unsupported credentials type {:?}, a service account key is required",
                key.key_type
            )));
        }
        Ok(key)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read(path).map_err(|e| {
            FederaError::credentials(format!(
                "error reading credentials from {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Application default credentials: `GOOGLE_APPLICATION_CREDENTIALS`,
    /// then the gcloud well-known file.
    pub fn from_default_credentials() -> Result<Self> {
        if let Some(path) = std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS") {
            return Self::from_file(PathBuf::from(path));
        }

        let well_known = well_known_credentials_file().ok_or_else(|| {
            FederaError::credentials("failed to fetch application default credentials")
        })?;
        Self::from_file(well_known)
    }
}

fn well_known_credentials_file() -> Option<PathBuf> {
    let base = if cfg!(windows) {
        PathBuf::from(std::env::var_os("APPDATA")?)
    } else {
        PathBuf::from(std::env::var_os("HOME")?).join(".config")
    };
    Some(base.join("gcloud").join("application_default_credentials.json"))
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Clone)]
struct CachedAccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

// =============================================================================
// Directory client
// =============================================================================

/// Admin Directory client impersonating one administrative identity
pub struct AdminDirectoryClient {
    base_url: String,
    key: Arc<ServiceAccountKey>,
    subject: Option<String>,
    http_client: HttpClient,
    access_token: RwLock<Option<CachedAccessToken>>,
}

impl AdminDirectoryClient {
    pub fn new(
        key: Arc<ServiceAccountKey>,
        subject: Option<String>,
        base_url: impl Into<String>,
        http_client: HttpClient,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            key,
            subject: subject.filter(|s| !s.is_empty()),
            http_client,
            access_token: RwLock::new(None),
        }
    }

    /// Current access token, minting a new one when missing or about to expire
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.access_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at - Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) > Utc::now() {
                    return Ok(token.token.clone());
                }
            }
        }

        let fresh = self.fetch_access_token().await?;
        let token = fresh.token.clone();
        *self.access_token.write().await = Some(fresh);
        Ok(token)
    }

    async fn fetch_access_token(&self) -> Result<CachedAccessToken> {
        let now = Utc::now();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: GROUP_READONLY_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
            sub: self.subject.as_deref(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| FederaError::credentials(format!("invalid service account key: {}", e)))?;
        let assertion = encode(&header, &claims, &encoding_key)
            .map_err(|e| FederaError::credentials(format!("failed to sign assertion: {}", e)))?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .http_client
            .execute(self.http_client.inner().post(&self.key.token_uri).form(&params))
            .await
            .map_err(|e| FederaError::credentials(format!("failed to obtain access token: {}", e)))?;

        let token: AccessTokenResponse = response.json().await.map_err(|e| {
            FederaError::credentials(format!("failed to parse access token response: {}", e))
        })?;

        debug!(
            subject = ?self.subject,
            "Obtained directory access token for {}", self.key.client_email
        );

        Ok(CachedAccessToken {
            token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS)),
        })
    }
}

#[async_trait]
impl DirectoryClient for AdminDirectoryClient {
    #[instrument(skip(self), fields(subject = ?self.subject))]
    async fn list_groups(&self, member_key: &str, page_token: Option<&str>) -> Result<GroupPage> {
        let token = self
            .access_token()
            .await
            .map_err(|e| FederaError::directory_query(member_key, e.to_string()))?;

        let mut url = format!(
            "{}/admin/directory/v1/groups?userKey={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(member_key)
        );
        if let Some(pt) = page_token.filter(|t| !t.is_empty()) {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(pt)));
        }

        let response = self
            .http_client
            .execute(self.http_client.inner().get(&url).bearer_auth(&token))
            .await
            .map_err(|e| {
                FederaError::directory_query(member_key, format!("could not list groups: {}", e))
            })?;

        let page: GoogleGroupList = response.json().await.map_err(|e| {
            FederaError::directory_query(
                member_key,
                format!("failed to parse Admin SDK response: {}", e),
            )
        })?;

        Ok(GroupPage {
            groups: page.groups.into_iter().map(|g| g.email).collect(),
            next_page_token: page.next_page_token,
        })
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Creates directory clients for a service account, one per admin identity
pub struct ServiceAccountFactory {
    key: Arc<ServiceAccountKey>,
    base_url: String,
    http_client: HttpClient,
}

impl ServiceAccountFactory {
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        Ok(Self {
            key: Arc::new(key),
            base_url: DIRECTORY_BASE_URL.to_string(),
            http_client: HttpClient::new(HTTP_TIMEOUT_SECS)?,
        })
    }

    /// Use the configured key file, or application default credentials when
    /// none is set.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self> {
        let key = match config
            .service_account_file_path
            .as_deref()
            .filter(|p| !p.is_empty())
        {
            Some(path) => ServiceAccountKey::from_file(path)?,
            None => {
                warn!("the application default credential is used since the service account file path is not set");
                ServiceAccountKey::from_default_credentials()?
            }
        };
        Self::new(key)
    }

    /// Point clients at a different directory API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl DirectoryClientFactory for ServiceAccountFactory {
    async fn create(&self, admin_email: &str) -> Result<Arc<dyn DirectoryClient>> {
        Ok(Arc::new(AdminDirectoryClient::new(
            self.key.clone(),
            Some(admin_email.to_string()),
            self.base_url.clone(),
            self.http_client.clone(),
        )))
    }
}

// =============================================================================
// Google API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GoogleGroupList {
    #[serde(default)]
    groups: Vec<GoogleGroup>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleGroup {
    email: String,
}
