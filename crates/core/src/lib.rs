//! `harvest-core`: shared domain building blocks for the marketplace.
//!
//! Pure types only: identifiers, the aggregate contract, the domain error model
//! and a few value helpers (money, slugs). No IO lives here.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod slug;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, FieldErrors};
pub use id::{AggregateId, UserId};
pub use money::{format_minor_units, parse_minor_units};
pub use slug::slugify;
