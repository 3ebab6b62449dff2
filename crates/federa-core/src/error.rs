//! Error types for the Federa connector

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FederaError {
    #[error("Configuration mismatch: {message}")]
    ConfigMismatch { message: String },

    #[error("Provider denied login: {}", render_oauth_error(.error, .description))]
    ProviderDenied { error: String, description: String },

    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },

    #[error("No id_token in token response")]
    MissingIdToken,

    #[error("Invalid ID token: {message}")]
    IdTokenInvalid { message: String },

    #[error("Hosted domain not allowed: {domain:?}")]
    DomainNotAllowed { domain: String },

    #[error("No directory route for domain {domain} and no wildcard entry configured")]
    NoDirectoryRoute { domain: String },

    #[error("Directory query failed for member {member}: {message}")]
    DirectoryQueryFailed { member: String, message: String },

    #[error("Could not retrieve groups: {source}")]
    GroupResolutionFailed {
        #[source]
        source: Box<FederaError>,
    },

    #[error("User {user:?} is not in any of the required groups")]
    NoAuthorizedGroup { user: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Credentials error: {message}")]
    CredentialsError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn render_oauth_error(error: &str, description: &str) -> String {
    if description.is_empty() {
        error.to_string()
    } else {
        format!("{}: {}", error, description)
    }
}

impl FederaError {
    pub fn config_mismatch(message: impl Into<String>) -> Self {
        Self::ConfigMismatch {
            message: message.into(),
        }
    }

    pub fn provider_denied(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::ProviderDenied {
            error: error.into(),
            description: description.into(),
        }
    }

    pub fn token_exchange(message: impl Into<String>) -> Self {
        Self::TokenExchangeFailed {
            message: message.into(),
        }
    }

    pub fn id_token_invalid(message: impl Into<String>) -> Self {
        Self::IdTokenInvalid {
            message: message.into(),
        }
    }

    pub fn directory_query(member: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DirectoryQueryFailed {
            member: member.into(),
            message: message.into(),
        }
    }

    pub fn group_resolution(source: FederaError) -> Self {
        Self::GroupResolutionFailed {
            source: Box::new(source),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn credentials(message: impl Into<String>) -> Self {
        Self::CredentialsError {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for rejections made by login policy rather than by a failing
    /// system. The user authenticated, but is not entitled to log in.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            Self::DomainNotAllowed { .. } | Self::NoAuthorizedGroup { .. }
        )
    }
}

impl From<config::ConfigError> for FederaError {
    fn from(err: config::ConfigError) -> Self {
        Self::config_error(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FederaError>;
