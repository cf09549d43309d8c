//! Infrastructure layer: event storage, command dispatch, read models,
//! variant search and the attachment/cache collaborators the API wires in.

pub mod attachments;
pub mod command_dispatcher;
pub mod event_store;
pub mod products_cache;
pub mod projections;
pub mod read_model;
pub mod search;

pub use attachments::{AttachmentStore, InMemoryAttachmentStore, StoredAttachment};
pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use products_cache::{InMemoryProductsCache, ProductsCache};
pub use projections::{CatalogProjection, ProjectionError, SnapshotProjection, PRODUCT_AGGREGATE_TYPE};
pub use read_model::{InMemoryReadStore, ReadStore};
pub use search::{paginate, Page, Paginated, VariantSearch, DEFAULT_PER_PAGE, MAX_PER_PAGE};

#[cfg(test)]
mod integration_tests;
