//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate stream
//!   ↓
//! 2. Rehydrate (apply history in sequence order)
//!   ↓
//! 3. Handle (pure decision, produces events)
//!   ↓
//! 4. Append with an exact expected version
//! ```
//!
//! Committed events are returned to the caller, which feeds them to its
//! projections. Nothing here performs IO beyond the injected store.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use harvest_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, FieldErrors};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale stream version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// Duplicate creation or a domain-level conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A historical payload no longer matches the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(errors) => DispatchError::Validation(errors),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(FieldErrors::single("id", msg)),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// The aggregate factory (`make_aggregate`) lets callers decide how an empty
/// aggregate is built (`Product::empty(id)`), so the dispatcher stays generic.
/// Optimistic concurrency uses the stream revision observed at load time; a
/// concurrent append surfaces as [`DispatchError::Concurrency`].
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Load, rehydrate, handle and append. Returns the committed events, which
    /// is empty when the command decided nothing.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: harvest_events::Event + Serialize + DeserializeOwned,
    {
        let (aggregate, expected) = self.rehydrate(aggregate_id, make_aggregate)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type.clone(), Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        tracing::debug!(
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            events = committed.len(),
            "command dispatched"
        );
        Ok(committed)
    }

    /// Rehydrate an aggregate without handling a command.
    ///
    /// Returns `None` for a stream with no events.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Option<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let (aggregate, expected) = self.rehydrate(aggregate_id, make_aggregate)?;
        Ok((expected != ExpectedVersion::Exact(0)).then_some(aggregate))
    }

    fn rehydrate<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<(A, ExpectedVersion), DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok((aggregate, ExpectedVersion::Exact(stream_version(&history))))
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use chrono::Utc;
    use harvest_core::{AggregateRoot, UserId};
    use harvest_enterprises::{
        AddManager, Enterprise, EnterpriseCommand, EnterpriseId, RegisterEnterprise, Sells,
    };

    fn register(id: EnterpriseId, name: &str) -> EnterpriseCommand {
        EnterpriseCommand::Register(RegisterEnterprise {
            enterprise_id: id,
            name: name.to_string(),
            owner: UserId::new(),
            is_primary_producer: true,
            sells: Sells::Own,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_appends_and_load_rehydrates() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = EnterpriseId::new(AggregateId::new());

        let committed = dispatcher
            .dispatch(id.0, "enterprises.enterprise", register(id, "Green Farm"), |aid| {
                Enterprise::empty(EnterpriseId::new(aid))
            })
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);

        let loaded = dispatcher
            .load(id.0, |aid| Enterprise::empty(EnterpriseId::new(aid)))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name(), "Green Farm");
        assert_eq!(loaded.version(), 1);
    }

    #[test]
    fn load_of_unknown_stream_is_none() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let loaded = dispatcher
            .load(AggregateId::new(), |aid| Enterprise::empty(EnterpriseId::new(aid)))
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn domain_errors_map_to_dispatch_errors() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = EnterpriseId::new(AggregateId::new());
        let make = |aid| Enterprise::empty(EnterpriseId::new(aid));

        dispatcher.dispatch(id.0, "enterprises.enterprise", register(id, "Farm"), make).unwrap();
        let err = dispatcher
            .dispatch(id.0, "enterprises.enterprise", register(id, "Farm"), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));

        let blank = EnterpriseId::new(AggregateId::new());
        let err = dispatcher
            .dispatch(blank.0, "enterprises.enterprise", register(blank, " "), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn no_op_commands_append_nothing() {
        let store = InMemoryEventStore::new();
        let dispatcher = CommandDispatcher::new(store);
        let id = EnterpriseId::new(AggregateId::new());
        let make = |aid| Enterprise::empty(EnterpriseId::new(aid));

        dispatcher.dispatch(id.0, "enterprises.enterprise", register(id, "Farm"), make).unwrap();
        let loaded = dispatcher.load(id.0, make).unwrap().unwrap();
        let owner = loaded.owner().unwrap();

        let committed = dispatcher
            .dispatch(
                id.0,
                "enterprises.enterprise",
                EnterpriseCommand::AddManager(AddManager {
                    enterprise_id: id,
                    user: owner,
                    occurred_at: Utc::now(),
                }),
                make,
            )
            .unwrap();
        assert!(committed.is_empty());
        assert_eq!(dispatcher.store().load_stream(id.0).unwrap().len(), 1);
    }
}
