//! Domain event contract and the envelope committed events travel in.

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
