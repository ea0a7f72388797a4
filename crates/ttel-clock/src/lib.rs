//! Monotonic call-stack clocks: `function_time`, per-frame `loop_time`, and
//! the statement-transition bookkeeping that rides on top of them.
//!
//! The frame stack itself follows the same shape as `core-model`'s view
//! list (a `Vec` plus bookkeeping about the active entry) and the advancing
//! cycle counter follows `miden-vm`'s `System::advance_clock`: a counter
//! that only ever moves forward, with push/pop as the two mutation points.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementMark {
    pub bytecode_offset: u32,
    pub loop_time_at_statement: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytecodeSpan {
    pub start: u32,
    pub end: u32,
}

impl BytecodeSpan {
    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end
    }
}

#[derive(Debug, Clone)]
pub struct CallFrame {
    pub function_time: i64,
    pub loop_time: i64,
    pub current_statement: Option<StatementMark>,
    pub last_statement: Option<StatementMark>,
    pub current_span: Option<BytecodeSpan>,
}

impl CallFrame {
    fn new(function_time: i64) -> Self {
        Self {
            function_time,
            loop_time: 0,
            current_statement: None,
            last_statement: None,
            current_span: None,
        }
    }
}

/// Owns the live call frames plus the two derived "last frame" snapshots the
/// debugger queries: the most recent normal return, and the most recent
/// exception unwind. A normal pop only updates the return snapshot while no
/// exception frame is active, so a propagating exception's origin frame is
/// never overwritten by the unwinding pops above it.
pub struct CallStack {
    frames: Vec<CallFrame>,
    function_time: i64,
    top_level_callback_event_time: i64,
    last_return_frame: Option<CallFrame>,
    last_exception_frame: Option<CallFrame>,
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStack {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            function_time: 0,
            top_level_callback_event_time: -1,
            last_return_frame: None,
            last_exception_frame: None,
        }
    }

    pub fn function_time(&self) -> i64 {
        self.function_time
    }

    pub fn top_level_callback_event_time(&self) -> i64 {
        self.top_level_callback_event_time
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Pushes a new frame, advancing `function_time`. `root_event_time`, if
    /// given, marks this push as the outermost root call.
    pub fn push_frame(&mut self, root_event_time: Option<i64>) -> i64 {
        self.function_time += 1;
        self.frames.push(CallFrame::new(self.function_time));
        if let Some(t) = root_event_time {
            self.top_level_callback_event_time = t;
        }
        tracing::trace!(target: "ttel.clock", depth = self.frames.len(), function_time = self.function_time, "push call frame");
        self.function_time
    }

    /// Pops the top frame on a normal return.
    pub fn pop_frame_normal(&mut self) -> Option<CallFrame> {
        self.function_time += 1;
        let frame = self.frames.pop()?;
        if self.last_exception_frame.is_none() {
            self.last_return_frame = Some(frame.clone());
        }
        tracing::trace!(target: "ttel.clock", depth = self.frames.len(), "pop call frame (normal)");
        Some(frame)
    }

    /// Pops the top frame during exception unwinding.
    pub fn pop_frame_exception(&mut self) -> Option<CallFrame> {
        self.function_time += 1;
        let frame = self.frames.pop()?;
        self.last_exception_frame = Some(frame.clone());
        tracing::trace!(target: "ttel.clock", depth = self.frames.len(), "pop call frame (exception)");
        Some(frame)
    }

    pub fn has_immediate_exception_frame(&self) -> bool {
        self.last_exception_frame.is_some()
    }

    pub fn clear_return_frame(&mut self) {
        self.last_return_frame = None;
    }

    pub fn clear_exception_frame(&mut self) {
        self.last_exception_frame = None;
    }

    pub fn last_return_frame(&self) -> Option<&CallFrame> {
        self.last_return_frame.as_ref()
    }

    pub fn last_exception_frame(&self) -> Option<&CallFrame> {
        self.last_exception_frame.as_ref()
    }

    /// Advances the top frame's loop clock on a loop back-edge.
    pub fn advance_loop(&mut self) -> Option<i64> {
        let frame = self.frames.last_mut()?;
        frame.loop_time += 1;
        Some(frame.loop_time)
    }

    /// Updates statement tracking for the top frame. Returns `true` iff the
    /// bytecode offset landed in a new statement (rotating current → last).
    pub fn update_statement(&mut self, bytecode_offset: u32, span: BytecodeSpan) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        let is_new = !span.contains(bytecode_offset)
            || frame
                .current_statement
                .is_none_or(|cur| cur.bytecode_offset != span.start);
        if is_new && span.contains(bytecode_offset) {
            frame.last_statement = frame.current_statement;
            frame.current_statement = Some(StatementMark {
                bytecode_offset: span.start,
                loop_time_at_statement: frame.loop_time,
            });
            frame.current_span = Some(span);
            true
        } else {
            false
        }
    }

    /// Resets call-stack state for a freshly inflated top-level call,
    /// preserving `function_time` as a monotonic counter across the reset.
    pub fn reset_for_new_root(&mut self, top_level_callback_event_time: i64) {
        self.frames.clear();
        self.top_level_callback_event_time = top_level_callback_event_time;
        self.last_return_frame = None;
        self.last_exception_frame = None;
        tracing::info!(target: "ttel.clock", top_level_callback_event_time, "call stack reset for new root");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_time_strictly_increases_across_push_and_pop() {
        let mut stack = CallStack::new();
        let t1 = stack.push_frame(Some(0));
        let t2 = stack.push_frame(None);
        assert!(t2 > t1);
        let t3 = stack.pop_frame_normal().map(|_| stack.function_time()).unwrap();
        assert!(t3 > t2);
    }

    #[test]
    fn exception_frame_is_not_overwritten_by_later_normal_pops() {
        let mut stack = CallStack::new();
        stack.push_frame(Some(0));
        stack.push_frame(None);
        stack.pop_frame_exception();
        assert!(stack.has_immediate_exception_frame());
        stack.pop_frame_normal();
        assert!(stack.last_exception_frame().is_some());
        assert!(stack.last_return_frame().is_none());
    }

    #[test]
    fn loop_time_increases_within_a_frame_only() {
        let mut stack = CallStack::new();
        stack.push_frame(Some(0));
        assert_eq!(stack.advance_loop(), Some(1));
        assert_eq!(stack.advance_loop(), Some(2));
        stack.push_frame(None);
        assert_eq!(stack.top().unwrap().loop_time, 0);
    }

    #[test]
    fn statement_transition_rotates_current_to_last() {
        let mut stack = CallStack::new();
        stack.push_frame(Some(0));
        let span_a = BytecodeSpan { start: 0, end: 10 };
        let span_b = BytecodeSpan { start: 10, end: 20 };
        assert!(stack.update_statement(0, span_a));
        assert!(!stack.update_statement(5, span_a));
        assert!(stack.update_statement(10, span_b));
        let frame = stack.top().unwrap();
        assert_eq!(frame.last_statement.unwrap().bytecode_offset, 0);
        assert_eq!(frame.current_statement.unwrap().bytecode_offset, 10);
    }
}
