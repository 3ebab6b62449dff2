//! Connector configuration

use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use crate::error::{FederaError, Result};

/// Issuer used when none is configured
pub const GOOGLE_ISSUER_URL: &str = "https://accounts.google.com";

/// Reserved key of `domain_to_admin_email` used for any unmapped domain
pub const WILDCARD_DOMAIN: &str = "*";

pub const SCOPE_OPENID: &str = "openid";
pub const SCOPE_GROUPS: &str = "groups";

/// Configuration options for Google logins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectorConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub redirect_uri: String,

    #[serde(default = "default_issuer_url")]
    pub issuer_url: String,

    /// Defaults to "profile" and "email"
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Only users from a listed domain may log in, when non-empty
    #[serde(default)]
    pub hosted_domains: Vec<String>,

    /// Only users in a listed group may log in, when non-empty
    #[serde(default)]
    pub groups: Vec<String>,

    /// Service account key used for the directory API. When unset,
    /// application default credentials are used.
    #[serde(default)]
    pub service_account_file_path: Option<String>,

    /// Deprecated: use `domain_to_admin_email` with the `*` key
    #[serde(default)]
    pub admin_email: Option<String>,

    /// Workspace domain to the super-admin the service account impersonates
    /// when listing groups
    #[serde(default)]
    pub domain_to_admin_email: HashMap<String, String>,

    /// Expand nested group memberships
    #[serde(default)]
    pub fetch_transitive_group_membership: bool,
}

fn default_issuer_url() -> String {
    GOOGLE_ISSUER_URL.to_string()
}

impl ConnectorConfig {
    /// Load from an optional config file, then `FEDERA__*` environment
    /// variables (for example `FEDERA__CLIENT_ID`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("issuer_url", GOOGLE_ISSUER_URL)?
            .set_default("fetch_transitive_group_membership", false)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("FEDERA")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("scopes")
                    .with_list_parse_key("hosted_domains")
                    .with_list_parse_key("groups")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = config.try_deserialize()?;
        Ok(settings.normalize())
    }

    /// Parse from an in-memory document in the given format.
    pub fn from_source(source: &str, format: config::FileFormat) -> Result<Self> {
        let config = config::Config::builder()
            .set_default("issuer_url", GOOGLE_ISSUER_URL)?
            .add_source(config::File::from_str(source, format))
            .build()?;

        let settings: Self = config.try_deserialize()?;
        Ok(settings.normalize())
    }

    /// Fold the deprecated single admin email into the per-domain map under
    /// the wildcard key.
    pub fn normalize(mut self) -> Self {
        if let Some(admin_email) = self.admin_email.take().filter(|e| !e.is_empty()) {
            warn!(
                "admin_email is deprecated, use \"domain_to_admin_email.*: {}\" instead",
                admin_email
            );
            self.domain_to_admin_email
                .insert(WILDCARD_DOMAIN.to_string(), admin_email);
        }
        self
    }

    /// Scopes sent to the provider: `openid` followed by the configured
    /// scopes, or `profile` and `email` when none are set.
    pub fn effective_scopes(&self) -> Vec<String> {
        let mut scopes = vec![SCOPE_OPENID.to_string()];
        if self.scopes.is_empty() {
            scopes.push("profile".to_string());
            scopes.push("email".to_string());
        } else {
            scopes.extend(self.scopes.iter().cloned());
        }
        scopes
    }

    fn has_service_account(&self) -> bool {
        self.service_account_file_path
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }

    /// Whether directory routes must be built at construction. An empty
    /// domain map yields no routes, so groups are then never resolved.
    pub fn wants_directory(&self) -> bool {
        !self.domain_to_admin_email.is_empty()
            && (self.has_service_account()
                || self.effective_scopes().iter().any(|s| s == SCOPE_GROUPS))
    }

    /// Reject combinations the connector cannot serve.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(FederaError::config_error("client_id is required"));
        }
        if self.redirect_uri.is_empty() {
            return Err(FederaError::config_error("redirect_uri is required"));
        }

        if self.has_service_account() && self.domain_to_admin_email.is_empty() {
            return Err(FederaError::config_error(
                "directory service requires the domain_to_admin_email option to be configured",
            ));
        }
        Ok(())
    }
}
