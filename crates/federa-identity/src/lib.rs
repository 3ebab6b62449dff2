//! Federa Identity - Google login, directory routing and group resolution
//!
//! This crate provides:
//! - `GoogleConnector`: the OAuth2 / OIDC login flow, producing a verified
//!   `Identity`
//! - `GroupResolver`: transitive group-membership resolution over a
//!   possibly cyclic membership graph
//! - `DirectoryRoutes`: per-tenant directory clients with a wildcard fallback
//!
//! # Architecture
//!
//! The connector only talks to its peers through the capability traits of
//! `federa-core` (`TokenExchanger`, `IdTokenVerifier`, `DirectoryClient`).
//! The production peers live in `providers`: an OIDC provider discovered from
//! its issuer and a Google Admin Directory client authenticated with a
//! service account.

pub mod connector;
pub mod groups;
pub mod providers;
pub mod routing;


pub use connector::GoogleConnector;
pub use groups::{domain_of, filter_groups, GroupResolver};
pub use providers::{
    AdminDirectoryClient, OidcProvider, ServiceAccountFactory, ServiceAccountKey,
};
pub use routing::DirectoryRoutes;

// Re-export core types
pub use federa_core::*;
