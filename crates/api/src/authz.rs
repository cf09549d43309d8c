//! API-side authorization guards.
//!
//! Checks run at the command boundary, before dispatch, so domain aggregates
//! and infra stay auth-agnostic. Supplier rights come from the enterprises the
//! caller manages, resolved per request from the enterprise read model.

use harvest_auth::{AuthzError, Permission, Principal, authorize, authorize_supplier, permissions};
use harvest_catalog::Product;
use harvest_enterprises::EnterpriseId;

use crate::context::CurrentUser;

/// Build the principal for a caller managing the given enterprises.
pub fn principal_for(user: &CurrentUser, managed: impl IntoIterator<Item = EnterpriseId>) -> Principal {
    Principal::new(
        user.user_id(),
        user.roles().to_vec(),
        managed.into_iter().map(|id| id.0),
    )
}

pub fn require(principal: &Principal, permission: &Permission) -> Result<(), AuthzError> {
    authorize(principal, permission)
}

/// Editing a product needs management of its supplier.
///
/// A product without a supplier can only be edited by administrators.
pub fn authorize_product(principal: &Principal, product: &Product) -> Result<(), AuthzError> {
    match product.supplier() {
        Some(supplier) => authorize_supplier(principal, supplier.0),
        None => authorize(principal, &permissions::ALL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_auth::Role;
    use harvest_core::{AggregateId, UserId};

    #[test]
    fn managed_enterprises_become_principal_scope() {
        let enterprise = EnterpriseId::new(AggregateId::new());
        let user = CurrentUser::new(UserId::new(), vec![Role::USER]);
        let principal = principal_for(&user, [enterprise]);

        assert!(principal.manages(enterprise.0));
        assert!(require(&principal, &permissions::CATALOG_READ).is_ok());
        assert!(require(&principal, &permissions::CATALOG_ADMIN).is_err());
    }

    #[test]
    fn supplierless_products_are_admin_only() {
        let product = Product::empty(harvest_catalog::ProductId::new(AggregateId::new()));
        let user = principal_for(&CurrentUser::new(UserId::new(), vec![Role::USER]), []);
        let admin = principal_for(&CurrentUser::new(UserId::new(), vec![Role::ADMIN]), []);

        assert!(authorize_product(&user, &product).is_err());
        assert!(authorize_product(&admin, &product).is_ok());
    }
}
