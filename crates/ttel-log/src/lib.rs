//! Time-travel event log facade: wires mode, clocks, the event store, and
//! snapshot inflation into the single `EventLog` entry point the rest of the
//! runtime drives.

mod cursor;
mod error;
mod facade;
mod stream;

pub use cursor::ReplayCursor;
pub use error::{DebuggerAbort, ReplayFailure, TtelError};
pub use facade::EventLog;
pub use stream::{host_arch, EmitInput, ParsedLog, PropertyRecordEntry};

pub use ttel_clock::{BytecodeSpan, CallFrame, CallStack, StatementMark};
pub use ttel_host::{ExternalCallGuard, ExternalCallSink, JsrtCallGuard, ScriptHost};
pub use ttel_mode::{BaseMode, EffectiveMode};
pub use ttel_record::{
    ArgList, ArgValue, EventRecord, EventTime, ExternalCallBegin, ExternalCallEnd, HostAction,
    Position, PropertyAttributes, PropertyEnumStep, SnapshotEntry,
};
pub use ttel_snapshot::{RestorePoint, SnapshotExtractor, SnapshotInflater};
