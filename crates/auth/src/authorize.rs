use thiserror::Error;

use harvest_core::AggregateId;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: enterprise {0} is not managed by this user")]
    NotManaged(AggregateId),
}

/// Check a coarse permission. No IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.has_wildcard() || principal.permissions.iter().any(|p| p == required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Check the right to edit records belonging to a supplier enterprise.
///
/// Administrators may edit everything; everyone else only what is supplied by
/// an enterprise they own or manage.
pub fn authorize_supplier(principal: &Principal, supplier: AggregateId) -> Result<(), AuthzError> {
    if principal.has_wildcard() || principal.manages(supplier) {
        Ok(())
    } else {
        Err(AuthzError::NotManaged(supplier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, permissions};
    use harvest_core::UserId;

    fn user(managed: Vec<AggregateId>) -> Principal {
        Principal::new(UserId::new(), vec![Role::USER], managed)
    }

    #[test]
    fn plain_users_read_but_do_not_administer() {
        let p = user(vec![]);
        assert!(authorize(&p, &permissions::CATALOG_READ).is_ok());
        assert_eq!(
            authorize(&p, &permissions::CATALOG_ADMIN),
            Err(AuthzError::Forbidden("catalog.admin".to_string()))
        );
    }

    #[test]
    fn admins_pass_every_check() {
        let admin = Principal::new(UserId::new(), vec![Role::ADMIN], vec![]);
        assert!(authorize(&admin, &permissions::ENTERPRISES_ADMIN).is_ok());
        assert!(authorize_supplier(&admin, AggregateId::new()).is_ok());
    }

    #[test]
    fn supplier_rights_follow_management() {
        let managed = AggregateId::new();
        let other = AggregateId::new();
        let p = user(vec![managed]);

        assert!(authorize_supplier(&p, managed).is_ok());
        assert_eq!(authorize_supplier(&p, other), Err(AuthzError::NotManaged(other)));
    }
}
