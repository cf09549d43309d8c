use harvest_auth::Role;
use harvest_core::UserId;

/// Authenticated caller for a request (token subject + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    user_id: UserId,
    roles: Vec<Role>,
}

impl CurrentUser {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }
}

/// Caller on routes where signing in is optional (admin pages, account).
///
/// Always present in request extensions behind the optional auth layer;
/// `None` when no valid token was sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaybeUser(pub Option<CurrentUser>);
