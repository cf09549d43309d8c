//! Projections: read models rebuilt from committed events.
//!
//! Every projection tracks the last applied sequence number per aggregate, so
//! re-applying a batch is harmless and a gap is reported.

pub mod catalog;
pub mod snapshot;

use thiserror::Error;

pub use catalog::{CatalogProjection, PRODUCT_AGGREGATE_TYPE};
pub use snapshot::SnapshotProjection;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}
