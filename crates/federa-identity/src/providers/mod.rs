//! Production peers: the OIDC provider and the Google Admin Directory

pub mod directory;
pub mod oidc;

mod common;

pub use common::*;
pub use directory::{AdminDirectoryClient, ServiceAccountFactory, ServiceAccountKey};
pub use oidc::OidcProvider;
