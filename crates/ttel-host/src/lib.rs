//! External-call scope guards and the script-host contract they drive.
//!
//! The guard types below are the RAII analogue of the poppers in the
//! original implementation, and are built the same way `core-terminal`'s
//! `TerminalGuard` guarantees `leave()` fires on every exit path: an `active`
//! flag consumed by the "happy path" method, checked unconditionally by
//! `Drop`.

use ttel_record::{ArgValue, EventTime};

/// What a `ScopeGuard` needs from whatever owns the event log, kept as a
/// trait (à la `core-plugin`'s `PluginHost`) so this crate never depends on
/// the facade crate that implements it.
pub trait ExternalCallSink {
    /// Appends a `…Begin` event and returns `(matching_begin_time,
    /// root_nesting_depth)` for the caller to hand back on completion.
    fn record_external_call_begin(&mut self, host_callback_id: i64) -> (EventTime, i32);

    fn record_external_call_end(
        &mut self,
        matching_begin_time: EventTime,
        root_nesting_depth: i32,
        has_script_exception: bool,
        has_terminating_exception: bool,
        return_value: ArgValue,
    );

    fn has_immediate_exception_frame(&self) -> bool;
    fn has_recorded_exception(&self) -> bool;
    fn now(&self) -> f64;
    fn increment_elapsed_snapshot_time(&mut self, added: f64);
}

/// Script-engine contract `ttel-log` drives replay through. Every method has
/// a default no-op so a test harness can implement only what a given
/// scenario exercises, the same default-method pattern `core-events`'
/// `EventHooks` trait uses.
pub trait ScriptHost {
    fn execute_host_action(&mut self, _action: &ttel_record::HostAction) {}
    fn date_now(&self) -> f64 {
        0.0
    }
}

/// Guards the script-invoking-host call boundary (`ExternalCall…`).
pub struct ExternalCallGuard<'a, S: ExternalCallSink> {
    sink: &'a mut S,
    matching_begin_time: EventTime,
    root_nesting_depth: i32,
    active: bool,
}

impl<'a, S: ExternalCallSink> ExternalCallGuard<'a, S> {
    pub fn begin(sink: &'a mut S, host_callback_id: i64) -> Self {
        let (matching_begin_time, root_nesting_depth) =
            sink.record_external_call_begin(host_callback_id);
        tracing::trace!(target: "ttel.host", matching_begin_time, root_nesting_depth, "external call begin");
        Self {
            sink,
            matching_begin_time,
            root_nesting_depth,
            active: true,
        }
    }

    /// Normal completion: appends the matching `…End` with the real return
    /// value, then disarms so `Drop` is a no-op.
    pub fn normal_return(mut self, return_value: ArgValue) {
        let has_script_exception = self.sink.has_recorded_exception();
        self.sink.record_external_call_end(
            self.matching_begin_time,
            self.root_nesting_depth,
            has_script_exception,
            false,
            return_value,
        );
        self.active = false;
    }
}

impl<'a, S: ExternalCallSink> Drop for ExternalCallGuard<'a, S> {
    fn drop(&mut self) {
        if self.active {
            tracing::trace!(target: "ttel.host", matching_begin_time = self.matching_begin_time, "external call unwound without normal_return");
            self.sink.record_external_call_end(
                self.matching_begin_time,
                self.root_nesting_depth,
                true,
                false,
                ArgValue::Undefined,
            );
        }
    }
}

/// Guards the host-invoking-script call boundary (`JsRTCallFunction…`). The
/// fallback path differs from `ExternalCallGuard`'s in two ways that mirror
/// the source: the exception flag is unconditionally `true` (a fallback
/// drop here only ever means "no normal return happened"), and the elapsed
/// time since entry feeds the snapshot-policy clock.
pub struct JsrtCallGuard<'a, S: ExternalCallSink> {
    sink: &'a mut S,
    matching_begin_time: EventTime,
    root_nesting_depth: i32,
    start_time: f64,
    active: bool,
}

impl<'a, S: ExternalCallSink> JsrtCallGuard<'a, S> {
    pub fn begin(sink: &'a mut S, host_callback_id: i64) -> Self {
        let start_time = sink.now();
        let (matching_begin_time, root_nesting_depth) =
            sink.record_external_call_begin(host_callback_id);
        Self {
            sink,
            matching_begin_time,
            root_nesting_depth,
            start_time,
            active: true,
        }
    }

    pub fn normal_return(mut self, return_value: ArgValue, has_script_exception: bool) {
        self.sink.record_external_call_end(
            self.matching_begin_time,
            self.root_nesting_depth,
            has_script_exception,
            false,
            return_value,
        );
        self.sink
            .increment_elapsed_snapshot_time(self.sink.now() - self.start_time);
        self.active = false;
    }
}

impl<'a, S: ExternalCallSink> Drop for JsrtCallGuard<'a, S> {
    fn drop(&mut self) {
        if self.active {
            self.sink.record_external_call_end(
                self.matching_begin_time,
                self.root_nesting_depth,
                true,
                false,
                ArgValue::Undefined,
            );
            self.sink
                .increment_elapsed_snapshot_time(self.sink.now() - self.start_time);
        }
    }
}
