//! Enterprises domain module (suppliers and distributors, event-sourced).
//!
//! An enterprise is the unit of ownership in the marketplace: products belong
//! to a supplier enterprise, orders are placed with a distributor, and users
//! edit catalog records only through the enterprises they manage.

pub mod enterprise;

pub use enterprise::{
    AddManager, Enterprise, EnterpriseCommand, EnterpriseEvent, EnterpriseId, EnterpriseRegistered,
    ManagerAdded, ManagerRemoved, RegisterEnterprise, RemoveManager, Sells,
};
