//! Replay cursor: a position into the event store plus a mirrored
//! `event_time` counter that must always agree with the record under it.

use crate::error::{DebuggerAbort, ReplayFailure, TtelError};
use ttel_record::{EventRecord, EventStore, EventTime, Position};

pub struct ReplayCursor {
    position: Option<Position>,
    event_time: EventTime,
}

impl Default for ReplayCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayCursor {
    pub fn new() -> Self {
        Self {
            position: None,
            event_time: 0,
        }
    }

    pub fn event_time(&self) -> EventTime {
        self.event_time
    }

    pub fn reset_at(&mut self, position: Option<Position>, event_time: EventTime) {
        self.position = position;
        self.event_time = event_time;
    }

    pub fn current<'a>(&self, store: &'a EventStore) -> Option<&'a EventRecord> {
        self.position.and_then(|p| store.get(p).ok())
    }

    /// Advances one record at a time, asserting the new record's own
    /// `event_time` matches the incremented counter. Exhaustion surfaces as
    /// `DebuggerAbort::EndOfLog`, never as an ordinary `TtelError`.
    pub fn advance(&mut self, store: &EventStore) -> Result<(), ReplayFailure> {
        let current = self
            .position
            .ok_or(ReplayFailure::Abort(DebuggerAbort::EndOfLog))?;
        let next = store
            .advance(current)
            .ok_or(ReplayFailure::Abort(DebuggerAbort::EndOfLog))?;
        let record = store
            .get(next)
            .map_err(|_| ReplayFailure::Abort(DebuggerAbort::EndOfLog))?;
        let expected = self.event_time + 1;
        if record.event_time() != expected {
            return Err(ReplayFailure::Fatal(TtelError::OutOfSync {
                expected,
                found: record.event_time(),
            }));
        }
        self.position = Some(next);
        self.event_time = expected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttel_record::EventRecord;

    #[test]
    fn advance_past_last_event_aborts_with_end_of_log() {
        let mut store = EventStore::new(4);
        store.append(EventRecord::Double { event_time: 0, value: 0.0 });
        let mut cursor = ReplayCursor::new();
        cursor.reset_at(store.front_position(), 0);
        match cursor.advance(&store) {
            Err(ReplayFailure::Abort(DebuggerAbort::EndOfLog)) => {}
            other => panic!("expected EndOfLog, got {other:?}"),
        }
    }

    #[test]
    fn mirrored_event_time_matches_each_consumed_record() {
        let mut store = EventStore::new(4);
        store.append(EventRecord::Double { event_time: 0, value: 0.0 });
        store.append(EventRecord::Double { event_time: 1, value: 1.0 });
        let mut cursor = ReplayCursor::new();
        cursor.reset_at(store.front_position(), 0);
        cursor.advance(&store).unwrap();
        assert_eq!(cursor.event_time(), 1);
        assert_eq!(cursor.current(&store).unwrap().event_time(), 1);
    }
}
