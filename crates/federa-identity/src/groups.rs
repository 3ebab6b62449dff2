//! Group Resolution Engine
//!
//! Walks the group-membership graph depth-first, starting from a user (or
//! group) email. Each group is expanded at most once per resolution thanks to
//! the caller-owned visited set, which also makes cyclic graphs terminate.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use federa_core::{FederaError, Result, WILDCARD_DOMAIN};

use crate::providers::{collect_all_pages, PaginatedResponse};
use crate::routing::DirectoryRoutes;

/// Resolves group memberships through the directory routing table
#[derive(Clone)]
pub struct GroupResolver {
    routes: Arc<DirectoryRoutes>,
}

impl GroupResolver {
    pub fn new(routes: Arc<DirectoryRoutes>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &DirectoryRoutes {
        &self.routes
    }

    /// List the groups `member_email` belongs to.
    ///
    /// Groups already in `visited` are skipped; every group returned is added
    /// to it. With `transitive`, each newly found group is itself listed as a
    /// member right after it is found, so the result is in discovery order:
    /// page order, then depth-first expansion order.
    ///
    /// Fails with `NoDirectoryRoute` or `DirectoryQueryFailed`. Nothing is
    /// returned on failure, not even the groups found so far.
    #[instrument(skip(self, visited))]
    pub async fn resolve_groups(
        &self,
        member_email: &str,
        transitive: bool,
        visited: &mut HashSet<String>,
    ) -> Result<Vec<String>> {
        let mut resolved = Vec::new();
        let mut pending = vec![self.list_all_groups(member_email).await?.into_iter()];

        while let Some(groups) = pending.last_mut() {
            let Some(group) = groups.next() else {
                pending.pop();
                continue;
            };

            if !visited.insert(group.clone()) {
                continue;
            }
            resolved.push(group.clone());

            if transitive {
                let nested = self.list_all_groups(&group).await?;
                pending.push(nested.into_iter());
            }
        }

        debug!("Resolved {} group(s) for {}", resolved.len(), member_email);
        Ok(resolved)
    }

    /// Direct groups of `member`, across all pages
    async fn list_all_groups(&self, member: &str) -> Result<Vec<String>> {
        let client = self.routes.resolve(domain_of(member))?;

        collect_all_pages(|page_token| {
            let client = client.clone();
            async move {
                let page = client
                    .list_groups(member, page_token.as_deref())
                    .await
                    .map_err(|e| match e {
                        FederaError::DirectoryQueryFailed { .. } => e,
                        other => FederaError::directory_query(member, other.to_string()),
                    })?;

                Ok(PaginatedResponse {
                    items: page.groups,
                    next_page_token: page.next_page_token,
                })
            }
        })
        .await
    }
}

/// Domain part of an email (after the last `@`), or the wildcard domain when
/// there is no `@`.
pub fn domain_of(email: &str) -> &str {
    match email.rfind('@') {
        Some(at) => &email[at + 1..],
        None => WILDCARD_DOMAIN,
    }
}

/// Keep the groups of `resolved` that appear in `allowed`, in resolved order
pub fn filter_groups(resolved: Vec<String>, allowed: &[String]) -> Vec<String> {
    let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    resolved
        .into_iter()
        .filter(|g| allowed.contains(g.as_str()))
        .collect()
}
