//! Append-only event stream: a [`BlockList`] of handles into a
//! [`SlabArena`] holding the actual [`EventRecord`]s.
//!
//! This is the pairing spec component 1 (SlabArena) and component 2
//! (EventList) describe as two separate concerns; they're kept as two
//! crate-level types composed here rather than merged, so a future second
//! arena (for property records / interned strings, see `ttel-log`) can
//! reuse `SlabArena` without dragging list bookkeeping along.

use crate::record::EventRecord;
use thiserror::Error;
use ttel_arena::{BlockList, Handle, Position, SlabArena};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventStoreError {
    #[error("no record at the requested position")]
    NotFound,
}

pub struct EventStore {
    arena: SlabArena<EventRecord>,
    list: BlockList<Handle>,
}

impl EventStore {
    pub fn new(block_capacity: usize) -> Self {
        Self {
            arena: SlabArena::new(),
            list: BlockList::new(block_capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Appends `record` to the tail. `event_time` must already be the
    /// strictly-increasing next value; the store does not mint it.
    pub fn append(&mut self, record: EventRecord) -> Position {
        let handle = self.arena.alloc(record);
        let pos = self.list.push_back(handle);
        tracing::trace!(target: "ttel.eventlist", len = self.list.len(), "appended event");
        pos
    }

    /// Removes the oldest record and frees its arena slot.
    pub fn pop_front(&mut self) -> Option<EventRecord> {
        let handle = self.list.pop_front()?;
        let record = self
            .arena
            .dealloc(handle)
            .expect("list handle always backed by a live arena slot");
        tracing::trace!(target: "ttel.eventlist", len = self.list.len(), "trimmed oldest event");
        Some(record)
    }

    pub fn front_position(&self) -> Option<Position> {
        self.list.front_position()
    }

    pub fn advance(&self, pos: Position) -> Option<Position> {
        self.list.advance(pos)
    }

    pub fn retreat(&self, pos: Position) -> Option<Position> {
        self.list.retreat(pos)
    }

    pub fn get(&self, pos: Position) -> Result<&EventRecord, EventStoreError> {
        let handle = self.list.get(pos).ok_or(EventStoreError::NotFound)?;
        self.arena.get(*handle).map_err(|_| EventStoreError::NotFound)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.list.iter().filter_map(|h| self.arena.get(*h).ok())
    }

    /// Walks backward from the tail, returning the first record with
    /// `event_time <= target` that is a snapshot or a root call carrying an
    /// inline snapshot — the selection rule for time-travel.
    pub fn find_restore_point(&self, target: i64) -> Option<(Position, i64)> {
        let mut pos = self.last_position()?;
        loop {
            let record = self.get(pos).ok()?;
            if record.event_time() <= target
                && (record.is_snapshot() || record.ready_to_run_snapshot().is_some())
            {
                return Some((pos, record.event_time()));
            }
            pos = self.retreat(pos)?;
        }
    }

    fn last_position(&self) -> Option<Position> {
        let mut pos = self.front_position()?;
        while let Some(next) = self.advance(pos) {
            pos = next;
        }
        Some(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SnapshotEntry;

    fn snap(event_time: i64) -> EventRecord {
        EventRecord::Snapshot {
            event_time,
            entry: SnapshotEntry {
                restore_event_time: event_time,
                payload: vec![],
                log_tag: 0,
                identity_tag: 0,
            },
        }
    }

    #[test]
    fn append_and_iterate_preserve_monotonic_order() {
        let mut store = EventStore::new(2);
        store.append(EventRecord::Double { event_time: 0, value: 1.0 });
        store.append(EventRecord::Double { event_time: 1, value: 2.0 });
        let times: Vec<_> = store.iter().map(|r| r.event_time()).collect();
        assert_eq!(times, vec![0, 1]);
    }

    #[test]
    fn head_trim_drops_oldest_and_count_decreases() {
        let mut store = EventStore::new(4);
        store.append(EventRecord::Double { event_time: 0, value: 1.0 });
        store.append(EventRecord::Double { event_time: 1, value: 2.0 });
        store.append(EventRecord::Double { event_time: 2, value: 3.0 });
        let popped = store.pop_front().unwrap();
        assert_eq!(popped.event_time(), 0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.iter().next().unwrap().event_time(), 1);
    }

    #[test]
    fn snapshot_selection_picks_closest_prior_point() {
        let mut store = EventStore::new(8);
        store.append(snap(10));
        store.append(EventRecord::Double { event_time: 20, value: 0.0 });
        store.append(EventRecord::HostAction {
            event_time: 25,
            action: crate::record::HostAction::CallFunctionBegin {
                is_root_call: true,
                host_callback_id: 0,
                cached_snapshot: Some(SnapshotEntry {
                    restore_event_time: 25,
                    payload: vec![],
                    log_tag: 0,
                    identity_tag: 0,
                }),
                args: Default::default(),
            },
        });
        store.append(snap(30));
        let (_, time) = store.find_restore_point(27).unwrap();
        assert_eq!(time, 25);
    }
}
