//! Stored entry types.
use std::fmt;

use thiserror::Error;

use crate::config::FreezeFrameKind;
use crate::dtc::EventId;

/// Persisting an entry change to non-volatile memory failed.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("NV Write Failed")]
pub struct NvError;

/// A stored snapshot record
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotRecord {
    /// Configured record number, ignored with calculated numbering
    pub number: u8,
    pub data: Vec<u8>,
}

impl SnapshotRecord {
    pub fn new(number: u8, data: &[u8]) -> Self {
        Self {
            number,
            data: data.to_vec(),
        }
    }
}

impl fmt::Debug for SnapshotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotRecord")
            .field("number", &format_args!("0x{:02x}", self.number))
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

/// A stored extended data record
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtendedDataRecord {
    pub number: u8,
    pub data: Vec<u8>,
}

impl ExtendedDataRecord {
    pub fn new(number: u8, data: &[u8]) -> Self {
        Self {
            number,
            data: data.to_vec(),
        }
    }
}

impl fmt::Debug for ExtendedDataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedDataRecord")
            .field("number", &format_args!("0x{:02x}", self.number))
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

/// An event memory entry
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventEntry {
    pub event_id: EventId,
    pub occurrence_counter: u8,
    /// Snapshot records in slot order
    pub snapshot_records: Vec<SnapshotRecord>,
    pub global_snapshot: Option<Vec<u8>>,
    pub extended_records: Vec<ExtendedDataRecord>,
    pub j1939_freeze_frame: Option<Vec<u8>>,
    pub j1939_expanded_freeze_frame: Option<Vec<u8>>,
}

impl EventEntry {
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            occurrence_counter: 1,
            snapshot_records: vec![],
            global_snapshot: None,
            extended_records: vec![],
            j1939_freeze_frame: None,
            j1939_expanded_freeze_frame: None,
        }
    }

    pub fn freeze_frame(&self, kind: FreezeFrameKind) -> Option<&[u8]> {
        match kind {
            FreezeFrameKind::FreezeFrame => self.j1939_freeze_frame.as_deref(),
            FreezeFrameKind::ExpandedFreezeFrame => self.j1939_expanded_freeze_frame.as_deref(),
        }
    }
}

/// OBD freeze frame kept in the OBD-on-UDS shadow memory
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObdFreezeFrame {
    pub event_id: EventId,
    pub data: Vec<u8>,
}

impl fmt::Debug for ObdFreezeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObdFreezeFrame")
            .field("event_id", &self.event_id)
            .field("data", &hex::encode(&self.data))
            .finish()
    }
}

/// Recording progress of one sampling profile
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleSet {
    pub profile: usize,
    pub future_recorded: u8,
    /// Samples already overwritten by newer data
    pub evicted: u8,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSeriesEntry {
    pub event_id: EventId,
    pub sample_sets: Vec<SampleSet>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CustomTriggerEntry {
    pub event_id: EventId,
    pub snapshot: Option<Vec<u8>>,
    pub samples: Vec<Vec<u8>>,
}

/// Global diagnostic counters used for readiness reporting.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObdCounters {
    /// km
    pub distance_with_mil_on: u16,
    pub minutes_with_mil_on: u16,
    /// km
    pub distance_since_clear: u16,
    pub minutes_since_clear: u16,
    pub warm_ups_since_clear: u8,
    /// seconds
    pub time_since_engine_start: u16,
    /// Readiness groups whose monitors completed since the last clear, see [`crate::config::ReadinessGroup::mask`]
    pub completed_groups: u32,
    pub disabled_this_cycle: u32,
    pub completed_this_cycle: u32,
}
