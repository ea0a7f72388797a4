//! Tagged-variant event records.
//!
//! The original source discriminates event kinds through a class hierarchy
//! and a runtime downcast (`EventRecord::As<T>`). Here every kind is a
//! variant of one sum type; a consumer that expects a particular kind uses
//! `matches!`/`if let` and gets a compile-time-checked extraction instead of
//! a cast that can fail at runtime.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub type EventTime = i64;

bitflags! {
    /// Attributes recorded alongside a property-enumeration step. Named and
    /// shaped after `core-events`'s `ModMask`/`KeyModifiers` bitflags, which
    /// is this codebase's idiom for a small OR-able attribute set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PropertyAttributes: u8 {
        const WRITABLE = 0b001;
        const ENUMERABLE = 0b010;
        const CONFIGURABLE = 0b100;
    }
}

/// A value passed to or returned from a host-API action. Deliberately
/// small: object/symbol identities are recorded as opaque reference ids,
/// never as the objects themselves, since the object graph is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    Undefined,
    Bool(bool),
    Number(f64),
    Str(String),
    ObjectRef(u64),
    SymbolRef(u64),
    PropertyId(u32),
}

/// Host-API argument lists are almost always short; `SmallVec` avoids a heap
/// allocation for the common case the way `core-keymap`'s edge lists do.
pub type ArgList = SmallVec<[ArgValue; 4]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEnumStep {
    pub return_code: bool,
    pub property_id: u32,
    pub attributes: PropertyAttributes,
    /// Present iff diagnostics are enabled or `property_id` alone can't
    /// identify the property (see `ttel-config`'s `diag_enabled`).
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCallBegin {
    pub root_nesting_depth: i32,
    pub begin_wall_time: f64,
    pub host_callback_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCallEnd {
    pub matching_begin_time: EventTime,
    pub root_nesting_depth: i32,
    pub end_wall_time: f64,
    pub has_script_exception: bool,
    pub has_terminating_exception: bool,
    pub return_value: ArgValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub restore_event_time: EventTime,
    pub payload: Vec<u8>,
    pub log_tag: u64,
    pub identity_tag: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostAction {
    AllocateNumber { value: f64 },
    AllocateString { value: String },
    AllocateSymbol { description: ArgValue },
    AllocateBasicObject { is_regular_object: bool },
    AllocateBasicClearArray { array_type: u32, length: u32 },
    AllocateArrayBuffer { size: u32 },
    AllocateFunction { is_named: bool, name: ArgValue },
    GetProperty { target: ArgValue, property_id: u32 },
    SetProperty { target: ArgValue, property_id: u32, value: ArgValue, use_strict: bool },
    DeleteProperty { target: ArgValue, property_id: u32, use_strict: bool },
    GetIndex { target: ArgValue, index: ArgValue },
    SetIndex { target: ArgValue, index: ArgValue, value: ArgValue },
    GetOwnPropertyInfo { target: ArgValue, property_id: u32 },
    GetOwnPropertiesInfo { target: ArgValue, is_get_names: bool },
    DefineProperty { target: ArgValue, property_id: u32, descriptor: ArgValue },
    SetPrototype { target: ArgValue, prototype: ArgValue },
    GetTypedArrayInfo { target: ArgValue, returns_array_buffer: bool },
    ConstructCall { callee: ArgValue, args: ArgList },
    CallbackOp { is_register: bool, is_cancel: bool, callback_id: i64 },
    CodeParse { source_id: u32, body: String },
    CallFunctionBegin {
        is_root_call: bool,
        host_callback_id: i64,
        cached_snapshot: Option<SnapshotEntry>,
        args: ArgList,
    },
    CallFunctionEnd {
        matching_begin_time: EventTime,
        result: ArgValue,
    },
    GetAndClearException,
    VarConvert {
        target: ArgValue,
        to_bool: bool,
        to_number: bool,
        to_string: bool,
        to_object: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventRecord {
    Double {
        event_time: EventTime,
        value: f64,
    },
    StringValue {
        event_time: EventTime,
        value: String,
    },
    RandomSeed {
        event_time: EventTime,
        seed0: u64,
        seed1: u64,
    },
    SymbolCreation {
        event_time: EventTime,
        property_id: u32,
    },
    PropertyEnum {
        event_time: EventTime,
        step: PropertyEnumStep,
    },
    ExternalCallBegin {
        event_time: EventTime,
        begin: ExternalCallBegin,
    },
    ExternalCallEnd {
        event_time: EventTime,
        end: ExternalCallEnd,
    },
    Snapshot {
        event_time: EventTime,
        entry: SnapshotEntry,
    },
    HostAction {
        event_time: EventTime,
        action: HostAction,
    },
}

impl EventRecord {
    pub fn event_time(&self) -> EventTime {
        match self {
            EventRecord::Double { event_time, .. }
            | EventRecord::StringValue { event_time, .. }
            | EventRecord::RandomSeed { event_time, .. }
            | EventRecord::SymbolCreation { event_time, .. }
            | EventRecord::PropertyEnum { event_time, .. }
            | EventRecord::ExternalCallBegin { event_time, .. }
            | EventRecord::ExternalCallEnd { event_time, .. }
            | EventRecord::Snapshot { event_time, .. }
            | EventRecord::HostAction { event_time, .. } => *event_time,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, EventRecord::Snapshot { .. })
    }

    /// True for a `CallFunctionBegin` host action flagged as a root call
    /// that also carries an inline snapshot ready to resume from.
    pub fn ready_to_run_snapshot(&self) -> Option<&SnapshotEntry> {
        match self {
            EventRecord::HostAction {
                action:
                    HostAction::CallFunctionBegin {
                        is_root_call: true,
                        cached_snapshot: Some(snap),
                        ..
                    },
                ..
            } => Some(snap),
            _ => None,
        }
    }

    pub fn as_external_call_begin(&self) -> Option<&ExternalCallBegin> {
        match self {
            EventRecord::ExternalCallBegin { begin, .. } => Some(begin),
            _ => None,
        }
    }

    pub fn as_external_call_end(&self) -> Option<&ExternalCallEnd> {
        match self {
            EventRecord::ExternalCallEnd { end, .. } => Some(end),
            _ => None,
        }
    }
}
