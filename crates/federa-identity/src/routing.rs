//! Directory Routing Table - maps tenant domains to directory clients
//!
//! Built once when the connector opens and read-only afterwards, so any
//! number of logins can resolve routes concurrently. The reserved `*` entry
//! serves every domain without an entry of its own.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use federa_core::{DirectoryClient, DirectoryClientFactory, FederaError, Result, WILDCARD_DOMAIN};

/// Routing table from tenant domain to directory client
#[derive(Default)]
pub struct DirectoryRoutes {
    clients: HashMap<String, Arc<dyn DirectoryClient>>,
    /// Admin identity behind each route, for diagnostics
    admins: HashMap<String, String>,
}

impl DirectoryRoutes {
    /// A table with no routes; group resolution is skipped for it
    pub fn new() -> Self {
        Self::default()
    }

    /// Create one client per configured domain through `factory`
    #[instrument(skip(domain_to_admin_email, factory), fields(domains = domain_to_admin_email.len()))]
    pub async fn build(
        domain_to_admin_email: &HashMap<String, String>,
        factory: &dyn DirectoryClientFactory,
    ) -> Result<Self> {
        let mut routes = Self::new();

        for (domain, admin_email) in domain_to_admin_email {
            let client = factory.create(admin_email).await.map_err(|e| {
                FederaError::config_error(format!("could not create directory service: {}", e))
            })?;
            routes.insert(domain.clone(), admin_email.clone(), client);
        }

        info!("Built {} directory route(s)", routes.len());
        Ok(routes)
    }

    /// Add or replace the route for `domain`
    pub fn insert(
        &mut self,
        domain: impl Into<String>,
        admin_email: impl Into<String>,
        client: Arc<dyn DirectoryClient>,
    ) {
        let domain = domain.into();
        self.admins.insert(domain.clone(), admin_email.into());
        self.clients.insert(domain, client);
    }

    /// Exact lookup, without wildcard fallback
    pub fn route_for(&self, domain: &str) -> Option<Arc<dyn DirectoryClient>> {
        self.clients.get(domain).cloned()
    }

    /// Lookup with fallback to the wildcard route
    pub fn resolve(&self, domain: &str) -> Result<Arc<dyn DirectoryClient>> {
        if let Some(client) = self.route_for(domain) {
            return Ok(client);
        }

        if let Some(client) = self.route_for(WILDCARD_DOMAIN) {
            debug!(
                "using wildcard ({}) admin email to fetch groups for domain {}",
                self.admins
                    .get(WILDCARD_DOMAIN)
                    .map(String::as_str)
                    .unwrap_or_default(),
                domain
            );
            return Ok(client);
        }

        Err(FederaError::NoDirectoryRoute {
            domain: domain.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}
