//! Configuration table element types.
use strum_macros::EnumIter;

use crate::dtc::{DtcMapping, EventId, NodeIndex};

/// Significance of an event.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Significance {
    #[default]
    Fault,
    Occurrence,
}

/// How snapshot record numbers are assigned.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SnapshotNumbering {
    /// Records carry the configured record number
    #[default]
    Configured,
    /// Records are numbered 1..=n in storage order
    Calculated,
}

/// Kind of J1939 freeze frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FreezeFrameKind {
    /// DM04 freeze frame
    FreezeFrame,
    /// DM25 expanded freeze frame
    ExpandedFreezeFrame,
}

/// Build variant capabilities. Tiers and policies that are not enabled here are skipped at runtime.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capabilities {
    /// Global snapshot records shared across events
    pub global_snapshot: bool,
    /// OBD freeze frames are also reported through the UDS snapshot interface
    pub obd_on_uds: bool,
    /// Time series powertrain records
    pub time_series_powertrain: bool,
    /// Variant records time series for powertrain diagnostics only, they are not reported as UDS records
    pub powertrain_only: bool,
    /// Application triggered snapshot and time series records
    pub custom_triggers: bool,
    /// Hide OBD relevant events with occurrence significance
    pub hide_obd_occurrences: bool,
}

/// Events sharing one externally visible DTC.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CombinedGroup {
    pub dtc: DtcMapping,
    /// The first member represents the group
    pub members: Vec<EventId>,
}

/// UDS DTC group, used for group selection and clear.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DtcGroup {
    pub dtc: u32,
    /// Events with `group_mask & mask != 0` belong to the group
    pub mask: u8,
}

/// Capabilities of one diagnostic client. Disabled capabilities make the corresponding APIs return [`crate::Error::NotSupported`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    pub dtc_selector: bool,
    pub filter: bool,
    pub freeze_frame_iterator: bool,
    /// Readout buffer including freeze frame and extended data selections
    pub readout_buffer: bool,
    pub clear_dtc: bool,
    pub j1939_node: Option<NodeIndex>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            dtc_selector: true,
            filter: true,
            freeze_frame_iterator: true,
            readout_buffer: true,
            clear_dtc: true,
            j1939_node: None,
        }
    }

    pub fn j1939(node: NodeIndex) -> Self {
        Self {
            j1939_node: Some(node),
            ..Self::new()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Time series sampling profile.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplingProfile {
    pub past_samples: u8,
    pub future_samples: u8,
}

/// Custom triggered records of an event.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CustomTriggerConfig {
    pub snapshot_record: Option<u8>,
    /// Record number of the first time series sample, following samples count up
    pub first_sample_record: u8,
    pub max_samples: u8,
}

/// Suspect parameter number reported in the expanded freeze frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpnDescriptor {
    pub spn: u32,
    pub data_length: u8,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct J1939Node {
    pub address: u8,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct J1939Config {
    pub nodes: Vec<J1939Node>,
    /// Fixed size of a DM04 record
    pub freeze_frame_size: usize,
    /// Fixed size of a DM25 record
    pub expanded_freeze_frame_size: usize,
    pub spns: Vec<SpnDescriptor>,
}

impl J1939Config {
    pub fn record_size(&self, kind: FreezeFrameKind) -> usize {
        match kind {
            FreezeFrameKind::FreezeFrame => self.freeze_frame_size,
            FreezeFrameKind::ExpandedFreezeFrame => self.expanded_freeze_frame_size,
        }
    }
}

impl Default for J1939Config {
    fn default() -> Self {
        Self {
            nodes: vec![],
            freeze_frame_size: 8,
            expanded_freeze_frame_size: 16,
            spns: vec![],
        }
    }
}

/// OBD readiness groups. The first three are continuously monitored.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ReadinessGroup {
    Misfire = 0,
    FuelSystem = 1,
    ComprehensiveComponent = 2,
    Catalyst = 3,
    HeatedCatalyst = 4,
    EvaporativeSystem = 5,
    SecondaryAirSystem = 6,
    AcSystemRefrigerant = 7,
    ExhaustGasSensor = 8,
    ExhaustGasSensorHeater = 9,
    EgrVvtSystem = 10,
    ColdStartAidSystem = 11,
    BoostPressureControlSystem = 12,
    DieselParticulateFilter = 13,
    NoxConverterCatalyst = 14,
    NmhcConverterCatalyst = 15,
}

impl ReadinessGroup {
    /// Bit of this group in the memory's readiness bitmasks
    pub fn mask(self) -> u32 {
        1 << (self as u8)
    }

    pub fn is_continuous(self) -> bool {
        (self as u8) < 3
    }

    /// Bit position in the DM05/DM26 monitor fields
    pub fn monitor_bit(self) -> u8 {
        if self.is_continuous() {
            self as u8
        } else {
            self as u8 - 3
        }
    }
}

/// Readiness reporting support. Values that are not supported are reported as not available.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadinessConfig {
    pub supported_groups: Vec<ReadinessGroup>,
    pub obd_compliance: u8,
    pub distance_with_mil_on: bool,
    pub minutes_with_mil_on: bool,
    pub distance_since_clear: bool,
    pub minutes_since_clear: bool,
    pub warm_ups_since_clear: bool,
    pub time_since_engine_start: bool,
}

impl ReadinessConfig {
    pub fn supports(&self, group: ReadinessGroup) -> bool {
        self.supported_groups.contains(&group)
    }
}
