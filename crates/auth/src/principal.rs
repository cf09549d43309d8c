use std::collections::HashSet;

use harvest_core::{AggregateId, UserId};

use crate::{Permission, Role, role_permissions};

/// A fully resolved caller for authorization decisions.
///
/// Built per request from token claims plus the enterprises the user manages
/// (owner or manager), which the API looks up from the enterprise read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub managed_enterprises: HashSet<AggregateId>,
}

impl Principal {
    /// Resolve permissions from roles.
    pub fn new(
        user_id: UserId,
        roles: Vec<Role>,
        managed_enterprises: impl IntoIterator<Item = AggregateId>,
    ) -> Self {
        let mut permissions: Vec<Permission> = Vec::new();
        for role in &roles {
            for perm in role_permissions(role.as_str()) {
                if !permissions.contains(&perm) {
                    permissions.push(perm);
                }
            }
        }

        Self {
            user_id,
            roles,
            permissions,
            managed_enterprises: managed_enterprises.into_iter().collect(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    pub fn has_wildcard(&self) -> bool {
        self.permissions.iter().any(Permission::is_wildcard)
    }

    pub fn manages(&self, enterprise: AggregateId) -> bool {
        self.managed_enterprises.contains(&enterprise)
    }
}
