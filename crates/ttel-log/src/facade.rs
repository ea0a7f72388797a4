//! The `EventLog` facade: orchestrates mode, clocks, the event store, and
//! snapshots, and is the only type the script engine calls into.
//!
//! Structurally this mirrors `core-state`'s `EditorState`, which does the
//! same job for its own subsystems (buffers, undo, selection): one struct
//! holding each collaborator, with methods that consult one before mutating
//! another, rather than the caller having to sequence them itself.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use ttel_clock::CallStack;
use ttel_config::TtelConfig;
use ttel_host::ExternalCallSink;
use ttel_mode::{BaseMode, ModeMachine};
use ttel_record::{
    ArgValue, EventRecord, EventStore, EventTime, ExternalCallBegin, ExternalCallEnd, HostAction,
    PropertyEnumStep, SnapshotEntry,
};
use ttel_snapshot::{SnapshotCoordinator, SnapshotExtractor, SnapshotInflater};

use crate::cursor::ReplayCursor;
use crate::error::{DebuggerAbort, ReplayFailure, TtelError};
use crate::stream::{self, EmitInput, PropertyRecordEntry};

pub struct EventLog {
    config: TtelConfig,
    mode: ModeMachine,
    store: EventStore,
    call_stack: CallStack,
    snapshots: SnapshotCoordinator,
    cursor: ReplayCursor,
    next_event_time: EventTime,
    property_pins: HashSet<u32>,
    property_records: HashMap<u32, PropertyRecordEntry>,
    script_exception_flag: bool,
}

impl EventLog {
    pub fn new(config: TtelConfig) -> Self {
        let snapshot_threshold = config.snapshot_threshold_ms;
        let block_size = config.block_size;
        Self {
            config,
            mode: ModeMachine::new(BaseMode::Detached),
            store: EventStore::new(block_size),
            call_stack: CallStack::new(),
            snapshots: SnapshotCoordinator::new(snapshot_threshold),
            cursor: ReplayCursor::new(),
            next_event_time: 0,
            property_pins: HashSet::new(),
            property_records: HashMap::new(),
            script_exception_flag: false,
        }
    }

    // ---- mode control ----------------------------------------------------

    pub fn attach(&mut self) {
        self.mode.set_base(BaseMode::Pending);
    }

    pub fn detach(&mut self) {
        self.mode.set_base(BaseMode::Detached);
    }

    pub fn push_excluded_execution(&mut self) {
        self.mode.push_excluded_execution();
    }

    pub fn pop_excluded_execution(&mut self) -> Result<(), TtelError> {
        self.mode.pop_excluded_execution().map_err(Into::into)
    }

    pub fn mode(&self) -> ttel_mode::EffectiveMode {
        self.mode.effective()
    }

    /// Opens the log for recording and pins every property id the caller
    /// currently knows about.
    pub fn init_for_record(&mut self, known_property_ids: impl IntoIterator<Item = u32>) {
        for id in known_property_ids {
            self.property_pins.insert(id);
        }
        self.mode.set_base(BaseMode::RecordEnabled);
    }

    /// Parses a log from `reader`, reinflates property pins, and positions
    /// the replay cursor at the first event.
    pub fn init_for_replay(&mut self, reader: &mut impl Read) -> Result<(), TtelError> {
        let parsed = stream::parse(reader, self.config.diag_enabled)?;
        for rec in &parsed.property_records {
            self.property_pins.insert(rec.id);
            self.property_records.insert(rec.id, rec.clone());
        }
        self.check_property_sequence_has_no_gap()?;
        for event in parsed.events {
            self.store.append(event);
        }
        self.cursor.reset_at(self.store.front_position(), 0);
        self.mode.set_base(BaseMode::DebuggingEnabled);
        Ok(())
    }

    /// Scans ids from the lowest pinned property id through the highest,
    /// failing on the first one not present in the reinflated set. A
    /// missing id in the middle of that range means the recorded property
    /// list itself was corrupt or truncated, not merely that no property in
    /// that range was ever touched.
    fn check_property_sequence_has_no_gap(&self) -> Result<(), TtelError> {
        let Some(&min_id) = self.property_pins.iter().min() else {
            return Ok(());
        };
        let max_id = *self.property_pins.iter().max().expect("min exists so max does too");
        for id in min_id..=max_id {
            self.check_property_known(id)?;
        }
        Ok(())
    }

    pub fn set_into_debugging_mode(&mut self) {
        self.mode.set_base(BaseMode::DebuggingEnabled);
        self.cursor.reset_at(self.store.front_position(), 0);
    }

    // ---- persistence -------------------------------------------------

    pub fn emit(&self, writer: &mut impl Write) -> Result<(), TtelError> {
        let property_records: Vec<_> = self.property_records.values().cloned().collect();
        stream::emit(
            writer,
            EmitInput {
                diag_enabled: self.config.diag_enabled,
                used_memory: (self.store.len() * std::mem::size_of::<EventRecord>()) as u64,
                reserved_memory: 0,
                events: self.store.iter().cloned().collect(),
                property_records: &property_records,
            },
        )
    }

    pub fn add_property_record(&mut self, entry: PropertyRecordEntry) {
        self.property_pins.insert(entry.id);
        self.property_records.insert(entry.id, entry);
    }

    fn check_property_known(&self, id: u32) -> Result<(), TtelError> {
        if self.property_pins.contains(&id) {
            Ok(())
        } else {
            Err(TtelError::PropertyGap(id))
        }
    }

    // ---- clocks ------------------------------------------------------

    fn advance_event_time(&mut self) -> EventTime {
        let t = self.next_event_time;
        self.next_event_time += 1;
        t
    }

    pub fn event_count(&self) -> usize {
        self.store.len()
    }

    pub fn snapshot_times(&self) -> Vec<EventTime> {
        self.store
            .iter()
            .filter_map(|r| match r {
                EventRecord::Snapshot { event_time, .. } => Some(*event_time),
                _ => None,
            })
            .collect()
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn call_stack_mut(&mut self) -> &mut CallStack {
        &mut self.call_stack
    }

    pub fn note_script_exception(&mut self, active: bool) {
        self.script_exception_flag = active;
    }

    // ---- record hooks --------------------------------------------------

    pub fn record_date_time(&mut self, time: f64) -> Result<(), TtelError> {
        if !self.mode.should_record() {
            return Err(TtelError::ModeMisuse("record_date_time called outside RecordEnabled"));
        }
        let et = self.advance_event_time();
        self.store.append(EventRecord::Double { event_time: et, value: time });
        Ok(())
    }

    pub fn record_string_value(&mut self, value: String) -> Result<(), TtelError> {
        if !self.mode.should_record() {
            return Err(TtelError::ModeMisuse("record_string_value called outside RecordEnabled"));
        }
        let et = self.advance_event_time();
        self.store.append(EventRecord::StringValue { event_time: et, value });
        Ok(())
    }

    pub fn record_random_seed(&mut self, seed0: u64, seed1: u64) -> Result<(), TtelError> {
        if !self.mode.should_record() {
            return Err(TtelError::ModeMisuse("record_random_seed called outside RecordEnabled"));
        }
        let et = self.advance_event_time();
        self.store.append(EventRecord::RandomSeed { event_time: et, seed0, seed1 });
        Ok(())
    }

    pub fn record_property_enum_step(&mut self, step: PropertyEnumStep) -> Result<(), TtelError> {
        if !self.mode.should_record() {
            return Err(TtelError::ModeMisuse("record_property_enum_step called outside RecordEnabled"));
        }
        let et = self.advance_event_time();
        self.store.append(EventRecord::PropertyEnum { event_time: et, step });
        Ok(())
    }

    pub fn record_symbol_creation(&mut self, property_id: u32) -> Result<(), TtelError> {
        if !self.mode.should_record() {
            return Err(TtelError::ModeMisuse("record_symbol_creation called outside RecordEnabled"));
        }
        let et = self.advance_event_time();
        self.store.append(EventRecord::SymbolCreation { event_time: et, property_id });
        Ok(())
    }

    /// Records any host-API action. The tagged `HostAction` enum already
    /// carries each call's distinct payload, so one entry point suffices
    /// instead of twenty near-identical wrappers.
    pub fn record_host_action(&mut self, action: HostAction) -> Result<(), TtelError> {
        if !self.mode.should_record() {
            return Err(TtelError::ModeMisuse("record_host_action called outside RecordEnabled"));
        }
        let et = self.advance_event_time();
        self.store.append(EventRecord::HostAction { event_time: et, action });
        Ok(())
    }

    // ---- replay hooks ----------------------------------------------------

    fn ensure_should_replay(&self) -> Result<(), TtelError> {
        if self.mode.should_replay() {
            Ok(())
        } else {
            Err(TtelError::ModeMisuse("replay hook called outside DebuggingEnabled"))
        }
    }

    fn consume_matching<T>(
        &mut self,
        extract: impl FnOnce(&EventRecord) -> Option<T>,
    ) -> Result<T, ReplayFailure> {
        self.ensure_should_replay()?;
        let record = self
            .cursor
            .current(&self.store)
            .ok_or(ReplayFailure::Abort(DebuggerAbort::EndOfLog))?;
        let event_time = record.event_time();
        let value = extract(record).ok_or_else(|| {
            ReplayFailure::Fatal(TtelError::ModeMisuse("event kind mismatch during replay"))
        })?;
        self.cursor.advance(&self.store)?;
        tracing::trace!(target: "ttel.replay", event_time, "consumed record");
        Ok(value)
    }

    pub fn replay_date_time(&mut self) -> Result<f64, ReplayFailure> {
        self.consume_matching(|r| match r {
            EventRecord::Double { value, .. } => Some(*value),
            _ => None,
        })
    }

    pub fn replay_string_value(&mut self) -> Result<String, ReplayFailure> {
        self.consume_matching(|r| match r {
            EventRecord::StringValue { value, .. } => Some(value.clone()),
            _ => None,
        })
    }

    pub fn replay_random_seed(&mut self) -> Result<(u64, u64), ReplayFailure> {
        self.consume_matching(|r| match r {
            EventRecord::RandomSeed { seed0, seed1, .. } => Some((*seed0, *seed1)),
            _ => None,
        })
    }

    pub fn replay_property_enum_step(&mut self) -> Result<PropertyEnumStep, ReplayFailure> {
        let step = self.consume_matching(|r| match r {
            EventRecord::PropertyEnum { step, .. } => Some(step.clone()),
            _ => None,
        })?;
        self.check_property_known(step.property_id)
            .map_err(ReplayFailure::Fatal)?;
        Ok(step)
    }

    pub fn replay_symbol_creation(&mut self) -> Result<u32, ReplayFailure> {
        self.consume_matching(|r| match r {
            EventRecord::SymbolCreation { property_id, .. } => Some(*property_id),
            _ => None,
        })
    }

    /// Consumes the next `HostAction` record and hands it to `host` to
    /// execute, without advancing to any further record.
    pub fn replay_host_action(
        &mut self,
        host: &mut impl ttel_host::ScriptHost,
    ) -> Result<(), ReplayFailure> {
        let action = self.consume_matching(|r| match r {
            EventRecord::HostAction { action, .. } => Some(action.clone()),
            _ => None,
        })?;
        if let Some(id) = property_id_of(&action) {
            self.check_property_known(id).map_err(ReplayFailure::Fatal)?;
        }
        host.execute_host_action(&action);
        Ok(())
    }

    // ---- time-travel -------------------------------------------------

    pub fn find_snap_time_for_event_time(&self, target: EventTime) -> Option<EventTime> {
        self.store.find_restore_point(target).map(|(_, t)| t)
    }

    pub fn has_done_first_snapshot(&self) -> bool {
        self.snapshots.has_done_first_snapshot()
    }

    /// True once elapsed execution since the last snapshot has crossed the
    /// configured policy threshold; callers driving a host loop should take
    /// a fresh snapshot via `extract_snapshot` when this flips true.
    pub fn snapshot_threshold_crossed(&self) -> bool {
        self.snapshots.threshold_crossed()
    }

    pub fn extract_snapshot(
        &mut self,
        extractor: &mut impl SnapshotExtractor,
    ) -> Result<(), TtelError> {
        if !self.mode.should_record() && !self.mode.should_replay() {
            return Err(TtelError::ModeMisuse("extract_snapshot called while inactive"));
        }
        self.push_excluded_execution();
        let et = self.advance_event_time();
        let (payload, log_tag, identity_tag) = self.snapshots.extract_snapshot(et, extractor);
        self.store.append(EventRecord::Snapshot {
            event_time: et,
            entry: SnapshotEntry {
                restore_event_time: et,
                payload,
                log_tag,
                identity_tag,
            },
        });
        self.pop_excluded_execution()?;
        Ok(())
    }

    pub fn inflate_snapshot_at(
        &mut self,
        target: EventTime,
        inflater: &mut impl SnapshotInflater,
    ) -> Result<EventTime, TtelError> {
        self.push_excluded_execution();
        let outcome =
            self.snapshots
                .inflate_at(target, &self.store, &mut self.call_stack, inflater);
        let restore = match outcome {
            Ok(r) => r,
            Err(e) => {
                self.pop_excluded_execution()?;
                return Err(e.into());
            }
        };
        let mut pos = Some(restore.position);
        let mut event_time = restore.event_time;
        if restore.is_snapshot_record
            && let Some(p) = pos
        {
            pos = self.store.advance(p);
            event_time += 1;
        }
        self.cursor.reset_at(pos, event_time);
        self.pop_excluded_execution()?;
        Ok(event_time)
    }

    pub fn replay_single_entry(
        &mut self,
        host: &mut impl ttel_host::ScriptHost,
    ) -> Result<(), ReplayFailure> {
        self.ensure_should_replay()?;
        let record = self
            .cursor
            .current(&self.store)
            .cloned()
            .ok_or(ReplayFailure::Abort(DebuggerAbort::EndOfLog))?;
        let event_time = record.event_time();
        if let EventRecord::HostAction { action, .. } = &record {
            if let Some(id) = property_id_of(action) {
                self.check_property_known(id).map_err(ReplayFailure::Fatal)?;
            }
            host.execute_host_action(action);
        }
        self.cursor.advance(&self.store)?;
        tracing::trace!(target: "ttel.replay", event_time, "advanced replay cursor");
        Ok(())
    }

    pub fn replay_to_time(
        &mut self,
        target: EventTime,
        host: &mut impl ttel_host::ScriptHost,
    ) -> Result<(), ReplayFailure> {
        while self.cursor.event_time() < target {
            self.replay_single_entry(host)?;
        }
        Ok(())
    }

    pub fn replay_full_trace(
        &mut self,
        host: &mut impl ttel_host::ScriptHost,
    ) -> Result<(), ReplayFailure> {
        loop {
            match self.replay_single_entry(host) {
                Ok(()) => continue,
                Err(ReplayFailure::Abort(DebuggerAbort::EndOfLog)) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

fn property_id_of(action: &HostAction) -> Option<u32> {
    match action {
        HostAction::GetProperty { property_id, .. }
        | HostAction::SetProperty { property_id, .. }
        | HostAction::DeleteProperty { property_id, .. }
        | HostAction::DefineProperty { property_id, .. }
        | HostAction::GetOwnPropertyInfo { property_id, .. } => Some(*property_id),
        _ => None,
    }
}

impl ExternalCallSink for EventLog {
    fn record_external_call_begin(&mut self, host_callback_id: i64) -> (EventTime, i32) {
        let depth = self.call_stack.depth() as i32;
        let et = self.advance_event_time();
        self.store.append(EventRecord::ExternalCallBegin {
            event_time: et,
            begin: ExternalCallBegin {
                root_nesting_depth: depth,
                begin_wall_time: 0.0,
                host_callback_id,
            },
        });
        (et, depth)
    }

    fn record_external_call_end(
        &mut self,
        matching_begin_time: EventTime,
        root_nesting_depth: i32,
        has_script_exception: bool,
        has_terminating_exception: bool,
        return_value: ArgValue,
    ) {
        let et = self.advance_event_time();
        self.store.append(EventRecord::ExternalCallEnd {
            event_time: et,
            end: ExternalCallEnd {
                matching_begin_time,
                root_nesting_depth,
                end_wall_time: 0.0,
                has_script_exception,
                has_terminating_exception,
                return_value,
            },
        });
    }

    fn has_immediate_exception_frame(&self) -> bool {
        self.call_stack.has_immediate_exception_frame()
    }

    fn has_recorded_exception(&self) -> bool {
        self.script_exception_flag
    }

    fn now(&self) -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    fn increment_elapsed_snapshot_time(&mut self, added: f64) {
        self.snapshots.increment_elapsed_snapshot_time(added);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttel_host::ExternalCallGuard;

    struct NoopHost;
    impl ttel_host::ScriptHost for NoopHost {}

    struct NoopExtractor;
    impl SnapshotExtractor for NoopExtractor {
        fn extract(&mut self) -> (Vec<u8>, u64, u64) {
            (vec![], 0, 0)
        }
    }
    struct NoopInflater;
    impl SnapshotInflater for NoopInflater {
        fn force_gc(&mut self) {}
        fn inflate(&mut self, _payload: &[u8], _log_tag: u64, _identity_tag: u64) {}
    }

    #[test]
    fn deterministic_date_now_replays_same_value() {
        let mut log = EventLog::new(TtelConfig::default());
        log.init_for_record([]);
        log.record_date_time(17.0).unwrap();

        let mut buf = Vec::new();
        log.emit(&mut buf).unwrap();

        let mut replay = EventLog::new(TtelConfig::default());
        replay.init_for_replay(&mut buf.as_slice()).unwrap();
        let value = replay.replay_date_time().unwrap();
        assert_eq!(value, 17.0);
        assert_eq!(replay.cursor.event_time(), 1);
    }

    #[test]
    fn paired_external_call_round_trips_through_the_guard() {
        let mut log = EventLog::new(TtelConfig::default());
        log.init_for_record([]);
        let guard = ExternalCallGuard::begin(&mut log, 0);
        guard.normal_return(ArgValue::Str("x".into()));

        let times: Vec<_> = log.store.iter().map(|r| r.event_time()).collect();
        assert_eq!(times, vec![0, 1]);
        let begin = log.store.iter().next().unwrap().as_external_call_begin().unwrap();
        assert_eq!(begin.root_nesting_depth, 0);
        let end = log.store.iter().nth(1).unwrap().as_external_call_end().unwrap();
        assert_eq!(end.matching_begin_time, 0);
        assert_eq!(end.root_nesting_depth, 0);
        assert!(!end.has_script_exception);
    }

    #[test]
    fn mode_misuse_replay_hook_in_record_mode_errors() {
        let mut log = EventLog::new(TtelConfig::default());
        log.init_for_record([]);
        match log.replay_date_time() {
            Err(ReplayFailure::Fatal(TtelError::ModeMisuse(_))) => {}
            other => panic!("expected ModeMisuse, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_selection_via_facade_matches_store_level_selection() {
        let mut log = EventLog::new(TtelConfig::default());
        log.init_for_record([]);
        log.extract_snapshot(&mut NoopExtractor).unwrap(); // t=0 snapshot (excluded execution brackets it)
        log.record_date_time(1.0).unwrap(); // t=1
        assert_eq!(log.find_snap_time_for_event_time(1), Some(0));
    }

    #[test]
    fn property_gap_is_detected_on_replay() {
        let mut log = EventLog::new(TtelConfig::default());
        log.init_for_record([]); // no property ids pinned
        log.record_host_action(HostAction::GetProperty {
            target: ArgValue::ObjectRef(1),
            property_id: 42,
        })
        .unwrap();
        let mut buf = Vec::new();
        log.emit(&mut buf).unwrap();

        let mut replay = EventLog::new(TtelConfig::default());
        replay.init_for_replay(&mut buf.as_slice()).unwrap();
        let mut host = NoopHost;
        match replay.replay_host_action(&mut host) {
            Err(ReplayFailure::Fatal(TtelError::PropertyGap(id))) => assert_eq!(id, 42),
            other => panic!("expected PropertyGap, got {other:?}"),
        }
    }

    #[test]
    fn property_id_gap_is_caught_eagerly_at_replay_init() {
        let mut log = EventLog::new(TtelConfig::default());
        log.init_for_record([]);
        log.add_property_record(PropertyRecordEntry {
            id: 5,
            is_numeric: false,
            is_bound: false,
            is_symbol: false,
            name: "a".into(),
        });
        log.add_property_record(PropertyRecordEntry {
            id: 7,
            is_numeric: false,
            is_bound: false,
            is_symbol: false,
            name: "b".into(),
        });
        let mut buf = Vec::new();
        log.emit(&mut buf).unwrap();

        let mut replay = EventLog::new(TtelConfig::default());
        match replay.init_for_replay(&mut buf.as_slice()) {
            Err(TtelError::PropertyGap(6)) => {}
            other => panic!("expected PropertyGap(6), got {other:?}"),
        }
    }

    #[test]
    fn replay_full_trace_stops_cleanly_at_end_of_log() {
        let mut log = EventLog::new(TtelConfig::default());
        log.init_for_record([]);
        log.record_date_time(1.0).unwrap();
        log.record_date_time(2.0).unwrap();
        let mut buf = Vec::new();
        log.emit(&mut buf).unwrap();

        let mut replay = EventLog::new(TtelConfig::default());
        replay.init_for_replay(&mut buf.as_slice()).unwrap();
        let mut host = NoopHost;
        replay.replay_full_trace(&mut host).unwrap();
        assert_eq!(replay.cursor.event_time(), 2);
    }
}
