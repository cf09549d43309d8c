use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. `"catalog.read"`).
///
/// The wildcard `"*"` stands for "allow everything" and is only granted to
/// administrators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const ALL: Permission = Permission::from_static("*");

/// Browse variants, products and images.
pub const CATALOG_READ: Permission = Permission::from_static("catalog.read");

/// Create option types and properties (marketplace-wide catalog metadata).
pub const CATALOG_ADMIN: Permission = Permission::from_static("catalog.admin");

/// Read and edit one's own account.
pub const ACCOUNT_MANAGE: Permission = Permission::from_static("account.manage");

/// Register enterprises and assign their managers.
pub const ENTERPRISES_ADMIN: Permission = Permission::from_static("enterprises.admin");

/// Grant and revoke user roles.
pub const USERS_ADMIN: Permission = Permission::from_static("users.admin");
