//! Pluggable stream interface and the on-disk logical record shape.
//!
//! The concrete transport is whatever the host hands back from
//! `get_stream(dir, read, write)`; this crate only needs something
//! `Read`/`Write`, so any `File`, in-memory buffer, or test double works
//! without a bespoke trait.

use crate::error::TtelError;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use ttel_record::EventRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyRecordEntry {
    pub id: u32,
    pub is_numeric: bool,
    pub is_bound: bool,
    pub is_symbol: bool,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedLog {
    arch: String,
    diag_enabled: bool,
    used_memory: u64,
    reserved_memory: u64,
    events: Vec<EventRecord>,
    property_records: Vec<PropertyRecordEntry>,
}

pub fn host_arch() -> String {
    std::env::consts::ARCH.to_string()
}

pub struct EmitInput<'a> {
    pub diag_enabled: bool,
    pub used_memory: u64,
    pub reserved_memory: u64,
    pub events: Vec<EventRecord>,
    pub property_records: &'a [PropertyRecordEntry],
}

pub fn emit(writer: &mut impl Write, input: EmitInput<'_>) -> Result<(), TtelError> {
    let persisted = PersistedLog {
        arch: host_arch(),
        diag_enabled: input.diag_enabled,
        used_memory: input.used_memory,
        reserved_memory: input.reserved_memory,
        events: input.events,
        property_records: input.property_records.to_vec(),
    };
    let event_count = persisted.events.len();
    serde_json::to_writer(writer, &persisted)?;
    tracing::info!(target: "ttel.stream", event_count, "emitted log");
    Ok(())
}

#[derive(Debug)]
pub struct ParsedLog {
    pub events: Vec<EventRecord>,
    pub property_records: Vec<PropertyRecordEntry>,
}

/// Parses a log, asserting the recorded architecture and diagnostics flag
/// agree with the replaying environment before handing back the events.
pub fn parse(reader: &mut impl Read, diag_enabled: bool) -> Result<ParsedLog, TtelError> {
    let persisted: PersistedLog = serde_json::from_reader(reader)?;
    let current = host_arch();
    if persisted.arch != current {
        tracing::error!(
            target: "ttel.stream",
            recorded = %persisted.arch,
            current = %current,
            "architecture mismatch, refusing to replay"
        );
        return Err(TtelError::ArchMismatch {
            recorded: persisted.arch,
            current,
        });
    }
    if persisted.diag_enabled != diag_enabled {
        tracing::error!(
            target: "ttel.stream",
            recorded = persisted.diag_enabled,
            current = diag_enabled,
            "diagnostics flag mismatch, refusing to replay"
        );
        return Err(TtelError::DiagMismatch {
            recorded: persisted.diag_enabled,
            current: diag_enabled,
        });
    }
    tracing::info!(target: "ttel.stream", event_count = persisted.events.len(), "parsed log");
    Ok(ParsedLog {
        events: persisted.events,
        property_records: persisted.property_records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttel_record::EventRecord;

    #[test]
    fn emit_then_parse_round_trips_events_and_property_records() {
        let mut buf = Vec::new();
        let events = vec![
            EventRecord::Double { event_time: 0, value: 1.5 },
            EventRecord::StringValue { event_time: 1, value: "hi".into() },
        ];
        let props = vec![PropertyRecordEntry {
            id: 7,
            is_numeric: false,
            is_bound: false,
            is_symbol: false,
            name: "length".into(),
        }];
        emit(
            &mut buf,
            EmitInput {
                diag_enabled: true,
                used_memory: 128,
                reserved_memory: 256,
                events: events.clone(),
                property_records: &props,
            },
        )
        .unwrap();

        let parsed = parse(&mut buf.as_slice(), true).unwrap();
        assert_eq!(parsed.events, events);
        assert_eq!(parsed.property_records, props);
    }

    #[test]
    fn diag_mismatch_on_parse_is_rejected() {
        let mut buf = Vec::new();
        emit(
            &mut buf,
            EmitInput {
                diag_enabled: true,
                used_memory: 0,
                reserved_memory: 0,
                events: vec![],
                property_records: &[],
            },
        )
        .unwrap();
        let err = parse(&mut buf.as_slice(), false).unwrap_err();
        assert!(matches!(err, TtelError::DiagMismatch { .. }));
    }
}
