use std::collections::HashMap;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use harvest_core::{Aggregate, AggregateId};
use harvest_events::EventEnvelope;

use super::ProjectionError;
use crate::event_store::StoredEvent;
use crate::read_model::{InMemoryReadStore, ReadStore};

/// Latest state of every aggregate of one type, kept by folding committed
/// events into the aggregate itself.
///
/// Sequence numbers are tracked per aggregate: replays of already-applied
/// events are skipped, and a gap is an error.
pub struct SnapshotProjection<A, S = InMemoryReadStore<AggregateId, A>> {
    aggregate_type: &'static str,
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
    make: fn(AggregateId) -> A,
}

impl<A, S> core::fmt::Debug for SnapshotProjection<A, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SnapshotProjection")
            .field("aggregate_type", &self.aggregate_type)
            .finish_non_exhaustive()
    }
}

impl<A> SnapshotProjection<A>
where
    A: Clone + Send + Sync + 'static,
{
    pub fn in_memory(aggregate_type: &'static str, make: fn(AggregateId) -> A) -> Self {
        Self::new(aggregate_type, InMemoryReadStore::new(), make)
    }
}

impl<A, S> SnapshotProjection<A, S> {
    pub fn new(aggregate_type: &'static str, store: S, make: fn(AggregateId) -> A) -> Self {
        Self {
            aggregate_type,
            store,
            cursors: RwLock::new(HashMap::new()),
            make,
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => cursors.get(&aggregate_id).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(aggregate_id, sequence_number);
        }
    }
}

impl<A, S> SnapshotProjection<A, S>
where
    A: Aggregate + Clone,
    A::Event: DeserializeOwned,
    S: ReadStore<AggregateId, A>,
{
    pub fn get(&self, aggregate_id: AggregateId) -> Option<A> {
        self.store.get(&aggregate_id)
    }

    /// All snapshots in creation order.
    pub fn list(&self) -> Vec<A> {
        self.store.list()
    }

    /// Apply one committed event. Envelopes of other aggregate types are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Option<A>, ProjectionError> {
        if envelope.aggregate_type() != self.aggregate_type {
            return Ok(None);
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = self.cursor(aggregate_id);
        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(None);
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: A::Event = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let mut state = self.store.get(&aggregate_id).unwrap_or_else(|| (self.make)(aggregate_id));
        state.apply(&event);
        self.store.upsert(aggregate_id, state.clone());
        self.update_cursor(aggregate_id, seq);
        Ok(Some(state))
    }

    /// Apply a batch returned by the dispatcher.
    pub fn apply_committed(&self, committed: &[StoredEvent]) -> Result<(), ProjectionError> {
        for stored in committed {
            self.apply_envelope(&stored.to_envelope())?;
        }
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear();
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
