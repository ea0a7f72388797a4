//! Event records and the append-only store that holds them.

mod event_store;
mod record;

pub use event_store::{EventStore, EventStoreError};
pub use record::{
    ArgList, ArgValue, EventRecord, EventTime, ExternalCallBegin, ExternalCallEnd, HostAction,
    PropertyAttributes, PropertyEnumStep, SnapshotEntry,
};
pub use ttel_arena::Position;
