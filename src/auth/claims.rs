// Authorization claims assembly
// Flattens an account's role memberships into role and permission names

use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{error::AuthError, models::RoleMembership, repository::RoleRepository};

/// Deduplicated role and permission names for one account
///
/// Backed by ordered sets so serialized tokens are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedClaims {
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl ResolvedClaims {
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().cloned().collect()
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.permissions.iter().cloned().collect()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Resolve role and permission names from memberships
///
/// Soft-deleted roles contribute nothing; soft-deleted permissions are skipped.
pub fn resolve_claims(memberships: &[RoleMembership]) -> ResolvedClaims {
    let mut claims = ResolvedClaims::default();

    for membership in memberships.iter().filter(|m| !m.role.is_deleted) {
        claims.roles.insert(membership.role.name.clone());
        claims.permissions.extend(
            membership
                .permissions
                .iter()
                .filter(|p| !p.is_deleted)
                .map(|p| p.name.clone()),
        );
    }

    claims
}

/// Loads memberships from the role store and resolves them
#[derive(Clone)]
pub struct ClaimsAssembler {
    roles: Arc<dyn RoleRepository>,
}

impl ClaimsAssembler {
    pub fn new(roles: Arc<dyn RoleRepository>) -> Self {
        Self { roles }
    }

    /// Current claims for an account
    pub async fn claims_for(&self, account_id: Uuid) -> Result<ResolvedClaims, AuthError> {
        let memberships = self.roles.memberships_for(account_id).await?;
        Ok(resolve_claims(&memberships))
    }
}
