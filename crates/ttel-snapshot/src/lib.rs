//! Snapshot placement policy, restore-point selection, and the inflation
//! sequence that rebuilds engine state from a chosen snapshot.
//!
//! The in-memory retention rule ("keep only the most recently inflated
//! payload, unload everything else") is the same shape as `core-state`'s
//! `UndoEngine`, which caps its undo stack and evicts the oldest entry
//! rather than letting history grow without bound; here the bound is "at
//! most one," since every other snapshot is disk-referenced once inflated.

use std::collections::HashMap;
use thiserror::Error;
use ttel_clock::CallStack;
use ttel_record::{EventStore, EventTime, Position};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("no snapshot or root-call-with-inline-snapshot exists at or before event time {0}")]
    NoRestorePoint(EventTime),
}

/// Evacuates live engine state into an opaque payload; supplied by the host,
/// not defined here (see the out-of-scope note on the extractor/inflater).
pub trait SnapshotExtractor {
    fn extract(&mut self) -> (Vec<u8>, u64, u64);
}

/// Rebuilds engine state from a payload previously produced by a
/// `SnapshotExtractor`.
pub trait SnapshotInflater {
    fn force_gc(&mut self);
    fn inflate(&mut self, payload: &[u8], log_tag: u64, identity_tag: u64);
}

/// Where replay should resume after `inflate_at` completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePoint {
    pub position: Position,
    pub event_time: EventTime,
    /// True iff the chosen record is the snapshot itself, meaning the
    /// cursor must advance once more before replaying starts.
    pub is_snapshot_record: bool,
    pub needed_fresh_context: bool,
}

pub struct SnapshotCoordinator {
    threshold_ms: f64,
    elapsed_since_last_snapshot: f64,
    last_inflated_event_time: Option<EventTime>,
    retained_payload: Option<(EventTime, Vec<u8>, u64, u64)>,
    inflate_map: HashMap<u64, u64>,
}

impl SnapshotCoordinator {
    pub fn new(threshold_ms: f64) -> Self {
        Self {
            threshold_ms,
            elapsed_since_last_snapshot: 0.0,
            last_inflated_event_time: None,
            retained_payload: None,
            inflate_map: HashMap::new(),
        }
    }

    pub fn increment_elapsed_snapshot_time(&mut self, added: f64) {
        self.elapsed_since_last_snapshot += added;
    }

    /// True once elapsed execution since the last snapshot crosses the
    /// configured policy threshold.
    pub fn threshold_crossed(&self) -> bool {
        self.elapsed_since_last_snapshot >= self.threshold_ms
    }

    pub fn has_done_first_snapshot(&self) -> bool {
        self.retained_payload.is_some() || self.last_inflated_event_time.is_some()
    }

    /// Extracts and retains a fresh snapshot, resetting the elapsed clock
    /// and evicting whatever payload was previously retained.
    pub fn extract_snapshot(
        &mut self,
        event_time: EventTime,
        extractor: &mut impl SnapshotExtractor,
    ) -> (Vec<u8>, u64, u64) {
        let (payload, log_tag, identity_tag) = extractor.extract();
        self.retained_payload = Some((event_time, payload.clone(), log_tag, identity_tag));
        self.elapsed_since_last_snapshot = 0.0;
        tracing::info!(target: "ttel.snapshot", event_time, "snapshot extracted");
        (payload, log_tag, identity_tag)
    }

    /// Walks the event store backwards from the tail for the closest prior
    /// restore point, then runs the inflation sequence against it.
    pub fn inflate_at(
        &mut self,
        target: EventTime,
        store: &EventStore,
        call_stack: &mut CallStack,
        inflater: &mut impl SnapshotInflater,
    ) -> Result<RestorePoint, SnapshotError> {
        let (position, restore_time) = store
            .find_restore_point(target)
            .ok_or(SnapshotError::NoRestorePoint(target))?;
        let record = store.get(position).expect("selection always returns a live position");
        let is_snapshot_record = record.is_snapshot();

        let needed_fresh_context = self.last_inflated_event_time != Some(restore_time);

        // 1. force a full GC
        inflater.force_gc();

        // 2/3. locate + deserialize the chosen snapshot, reusing the
        // retained payload when it matches, else asking the extractor path
        // already ran earlier has populated `retained_payload` for this
        // exact restore time; if not, the caller is responsible for having
        // deserialized it onto disk-referenced storage before calling here.
        let (payload, log_tag, identity_tag) = match &self.retained_payload {
            Some((t, payload, log_tag, identity_tag)) if *t == restore_time => {
                (payload.clone(), *log_tag, *identity_tag)
            }
            _ => {
                let snapshot_entry = record
                    .ready_to_run_snapshot()
                    .cloned()
                    .or_else(|| match record {
                        ttel_record::EventRecord::Snapshot { entry, .. } => Some(entry.clone()),
                        _ => None,
                    })
                    .expect("selection guarantees a snapshot payload at this position");
                (
                    snapshot_entry.payload,
                    snapshot_entry.log_tag,
                    snapshot_entry.identity_tag,
                )
            }
        };

        if needed_fresh_context {
            self.inflate_map.clear();
        }

        // 4. reset tag counters and event_time, invoke the inflater.
        inflater.inflate(&payload, log_tag, identity_tag);

        // 5. eagerly unload every other in-memory snapshot payload.
        self.retained_payload = Some((restore_time, payload, log_tag, identity_tag));
        self.last_inflated_event_time = Some(restore_time);

        // 7. reset call stack for a new top-level call.
        call_stack.reset_for_new_root(restore_time);

        tracing::info!(
            target: "ttel.snapshot",
            target_time = target,
            restore_time,
            needed_fresh_context,
            "snapshot inflated"
        );

        Ok(RestorePoint {
            position,
            event_time: restore_time,
            is_snapshot_record,
            needed_fresh_context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttel_record::SnapshotEntry;

    struct NoopInflater;
    impl SnapshotInflater for NoopInflater {
        fn force_gc(&mut self) {}
        fn inflate(&mut self, _payload: &[u8], _log_tag: u64, _identity_tag: u64) {}
    }

    fn store_with_snapshots() -> EventStore {
        let mut store = EventStore::new(8);
        store.append(ttel_record::EventRecord::Snapshot {
            event_time: 10,
            entry: SnapshotEntry {
                restore_event_time: 10,
                payload: vec![1],
                log_tag: 0,
                identity_tag: 0,
            },
        });
        store.append(ttel_record::EventRecord::Double { event_time: 20, value: 0.0 });
        store.append(ttel_record::EventRecord::Snapshot {
            event_time: 30,
            entry: SnapshotEntry {
                restore_event_time: 30,
                payload: vec![3],
                log_tag: 0,
                identity_tag: 0,
            },
        });
        store
    }

    #[test]
    fn inflate_at_picks_closest_prior_snapshot_and_resets_call_stack() {
        let store = store_with_snapshots();
        let mut coordinator = SnapshotCoordinator::new(50.0);
        let mut call_stack = CallStack::new();
        call_stack.push_frame(Some(99));
        let mut inflater = NoopInflater;
        let restore = coordinator
            .inflate_at(25, &store, &mut call_stack, &mut inflater)
            .unwrap();
        assert_eq!(restore.event_time, 10);
        assert!(restore.is_snapshot_record);
        assert_eq!(call_stack.depth(), 0);
        assert_eq!(call_stack.top_level_callback_event_time(), 10);
    }

    #[test]
    fn idempotent_inflation_to_same_time_does_not_need_fresh_context_twice() {
        let store = store_with_snapshots();
        let mut coordinator = SnapshotCoordinator::new(50.0);
        let mut call_stack = CallStack::new();
        let mut inflater = NoopInflater;
        let first = coordinator
            .inflate_at(10, &store, &mut call_stack, &mut inflater)
            .unwrap();
        let second = coordinator
            .inflate_at(10, &store, &mut call_stack, &mut inflater)
            .unwrap();
        assert!(first.needed_fresh_context);
        assert!(!second.needed_fresh_context);
        assert_eq!(first.event_time, second.event_time);
    }

    #[test]
    fn threshold_crossing_follows_elapsed_time() {
        let mut coordinator = SnapshotCoordinator::new(10.0);
        assert!(!coordinator.threshold_crossed());
        coordinator.increment_elapsed_snapshot_time(11.0);
        assert!(coordinator.threshold_crossed());
    }
}
