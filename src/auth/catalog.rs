// Role and permission catalog
// Defines the seeded roles and the rules any catalog must satisfy

use std::collections::HashSet;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{Permission, Role},
};

pub const ADMINISTRATOR_ROLE: &str = "Administrator";
pub const USER_ROLE: &str = "User";

pub const USERS_READ: &str = "users.read";
pub const USERS_WRITE: &str = "users.write";
pub const USERS_DELETE: &str = "users.delete";

/// Roles, permissions, and the (role_id, permission_id) grants between them
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub grants: Vec<(Uuid, Uuid)>,
}

impl RoleCatalog {
    /// Administrator holds every user permission; User is the default role
    /// and may only read
    pub fn default_catalog() -> Self {
        let read = Permission::new("users", "read", "View user accounts");
        let write = Permission::new("users", "write", "Create and modify user accounts");
        let delete = Permission::new("users", "delete", "Delete user accounts");

        let administrator = Role::new(ADMINISTRATOR_ROLE, "Full administrative access", false);
        let user = Role::new(USER_ROLE, "Standard user access", true);

        let grants = vec![
            (administrator.id, read.id),
            (administrator.id, write.id),
            (administrator.id, delete.id),
            (user.id, read.id),
        ];

        Self {
            roles: vec![administrator, user],
            permissions: vec![read, write, delete],
            grants,
        }
    }

    pub fn default_role(&self) -> Option<&Role> {
        self.roles.iter().find(|r| r.is_default && !r.is_deleted)
    }
}

/// Reject catalogs with duplicate names or more than one live default role
pub fn validate_role_catalog(catalog: &RoleCatalog) -> Result<(), AuthError> {
    let mut role_names = HashSet::new();
    for role in &catalog.roles {
        if !role_names.insert(role.name.as_str()) {
            return Err(AuthError::ConfigError(format!(
                "Duplicate role name '{}'",
                role.name
            )));
        }
    }

    let mut permission_names = HashSet::new();
    for permission in &catalog.permissions {
        if !permission_names.insert(permission.name.as_str()) {
            return Err(AuthError::ConfigError(format!(
                "Duplicate permission name '{}'",
                permission.name
            )));
        }
    }

    let defaults = catalog
        .roles
        .iter()
        .filter(|r| r.is_default && !r.is_deleted)
        .count();
    if defaults > 1 {
        return Err(AuthError::ConfigError(format!(
            "Expected at most one default role, found {}",
            defaults
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = RoleCatalog::default_catalog();
        assert!(validate_role_catalog(&catalog).is_ok());
        assert_eq!(catalog.default_role().map(|r| r.name.as_str()), Some(USER_ROLE));

        let names: Vec<&str> = catalog.permissions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![USERS_READ, USERS_WRITE, USERS_DELETE]);
    }

    #[test]
    fn test_user_role_only_reads() {
        let catalog = RoleCatalog::default_catalog();
        let user = catalog.default_role().unwrap();
        let granted: Vec<&Uuid> = catalog
            .grants
            .iter()
            .filter(|(role_id, _)| *role_id == user.id)
            .map(|(_, permission_id)| permission_id)
            .collect();

        assert_eq!(granted.len(), 1);
        let read = catalog.permissions.iter().find(|p| &p.id == granted[0]).unwrap();
        assert_eq!(read.name, USERS_READ);
    }

    #[test]
    fn test_two_default_roles_rejected() {
        let mut catalog = RoleCatalog::default_catalog();
        catalog.roles.push(Role::new("Guest", "", true));

        let result = validate_role_catalog(&catalog);
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_deleted_default_role_does_not_count() {
        let mut catalog = RoleCatalog::default_catalog();
        let mut retired = Role::new("Guest", "", true);
        retired.is_deleted = true;
        catalog.roles.push(retired);

        assert!(validate_role_catalog(&catalog).is_ok());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut catalog = RoleCatalog::default_catalog();
        catalog.roles.push(Role::new(USER_ROLE, "", false));
        assert!(validate_role_catalog(&catalog).is_err());

        let mut catalog = RoleCatalog::default_catalog();
        catalog.permissions.push(Permission::new("users", "read", ""));
        assert!(validate_role_catalog(&catalog).is_err());
    }
}
