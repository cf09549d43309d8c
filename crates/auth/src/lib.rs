//! `harvest-auth`: identity and authorization for the marketplace.
//!
//! Decoupled from HTTP and storage: the API layer resolves who is calling and
//! which enterprises they manage, this crate decides what they may do.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, authorize, authorize_supplier};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use password::PasswordDigest;
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::{Role, role_permissions};
pub use user::{User, UserCommand, UserEvent, normalize_email, validate_email, validate_password};
