//! Generated configuration tables. The tables are read-only at runtime and indexed by [`EventId`] or small integer handles.
//!
//! ## Example
//! ```rust
//! use automotive_dem::config::{Config, EventConfig};
//! use automotive_dem::dtc::{DtcFormat, DtcMapping};
//!
//! let mut config = Config::new();
//! let event_id = config.add_event(EventConfig::new(DtcMapping::uds(0x123456)));
//! assert_eq!(config.dtc(event_id, DtcFormat::Uds), Some(0x123456));
//! assert!(config.validate().is_ok());
//! ```

pub mod error;
mod types;

pub use types::*;

use crate::dtc::{DtcFormat, DtcMapping, DtcOrigin, EventId, NodeIndex, ALL_DTCS, INVALID_EVENT};
use crate::freeze_frame::constants::GLOBAL_SNAPSHOT_RECORD;
use crate::freeze_frame::MAX_COMBINED_GROUPS;

/// Configuration of a single event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventConfig {
    /// DTC numbers, ignored for members of a combined group
    pub dtc: DtcMapping,
    pub combined_group: Option<usize>,
    /// Memory the event is stored in
    pub origin: DtcOrigin,
    pub obd_related: bool,
    pub significance: Significance,
    pub severity: u8,
    pub group_mask: u8,
    /// Configured snapshot record numbers, one per storage slot
    pub snapshot_records: Vec<u8>,
    pub global_snapshot: bool,
    pub extended_records: Vec<u8>,
    /// Sampling profiles used for time series powertrain records
    pub time_series_profiles: Vec<usize>,
    pub custom_trigger: Option<CustomTriggerConfig>,
    pub j1939_freeze_frame: bool,
    pub j1939_expanded_freeze_frame: bool,
    pub j1939_nodes: Vec<NodeIndex>,
    pub clear_allowed: bool,
}

impl EventConfig {
    pub fn new(dtc: DtcMapping) -> Self {
        Self {
            dtc,
            combined_group: None,
            origin: DtcOrigin::PrimaryMemory,
            obd_related: false,
            significance: Significance::Fault,
            severity: 0,
            group_mask: 0,
            snapshot_records: vec![],
            global_snapshot: false,
            extended_records: vec![],
            time_series_profiles: vec![],
            custom_trigger: None,
            j1939_freeze_frame: false,
            j1939_expanded_freeze_frame: false,
            j1939_nodes: vec![],
            clear_allowed: true,
        }
    }

    /// Record number reported for the snapshot stored in `slot`. Returns `None` for slots the numbering does not cover.
    pub fn snapshot_record_number(&self, numbering: SnapshotNumbering, slot: usize, stored_number: u8) -> Option<u8> {
        match numbering {
            SnapshotNumbering::Configured => self.snapshot_records.contains(&stored_number).then_some(stored_number),
            SnapshotNumbering::Calculated => {
                if slot < self.snapshot_records.len() {
                    u8::try_from(slot + 1).ok()
                } else {
                    None
                }
            }
        }
    }

    /// Whether `number` addresses a snapshot record of this event.
    pub fn is_snapshot_record_configured(&self, numbering: SnapshotNumbering, global_snapshot: bool, number: u8) -> bool {
        if number == GLOBAL_SNAPSHOT_RECORD && global_snapshot && self.global_snapshot {
            return true;
        }
        match numbering {
            SnapshotNumbering::Configured => self.snapshot_records.contains(&number),
            SnapshotNumbering::Calculated => number >= 1 && (number as usize) <= self.snapshot_records.len(),
        }
    }

    pub fn has_freeze_frame(&self, kind: FreezeFrameKind) -> bool {
        match kind {
            FreezeFrameKind::FreezeFrame => self.j1939_freeze_frame,
            FreezeFrameKind::ExpandedFreezeFrame => self.j1939_expanded_freeze_frame,
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self::new(DtcMapping::default())
    }
}

/// All generated tables of one configuration variant.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Indexed by event id, element 0 is the reserved invalid event
    pub events: Vec<EventConfig>,
    pub combined_groups: Vec<CombinedGroup>,
    pub dtc_groups: Vec<DtcGroup>,
    pub clients: Vec<ClientConfig>,
    /// Memories that can be selected as DTC origin
    pub memories: Vec<DtcOrigin>,
    pub capabilities: Capabilities,
    pub snapshot_numbering: SnapshotNumbering,
    pub sampling_profiles: Vec<SamplingProfile>,
    pub j1939: J1939Config,
    pub readiness: ReadinessConfig,
    pub status_availability_mask: u8,
}

impl Config {
    pub fn new() -> Self {
        Self {
            events: vec![EventConfig::default()],
            combined_groups: vec![],
            dtc_groups: vec![],
            clients: vec![],
            memories: vec![DtcOrigin::PrimaryMemory],
            capabilities: Capabilities::default(),
            snapshot_numbering: SnapshotNumbering::Configured,
            sampling_profiles: vec![],
            j1939: J1939Config::default(),
            readiness: ReadinessConfig::default(),
            status_availability_mask: 0xff,
        }
    }

    /// Appends an event and returns its id.
    pub fn add_event(&mut self, event: EventConfig) -> EventId {
        self.events.push(event);
        (self.events.len() - 1) as EventId
    }

    /// Combines the given events into one group reporting `dtc`. Returns the group index.
    pub fn add_combined_group(&mut self, dtc: DtcMapping, members: &[EventId]) -> usize {
        let group = self.combined_groups.len();
        for &member in members {
            if let Some(event) = self.events.get_mut(member as usize) {
                event.combined_group = Some(group);
            }
        }
        self.combined_groups.push(CombinedGroup {
            dtc,
            members: members.to_vec(),
        });
        group
    }

    pub fn event(&self, event_id: EventId) -> Option<&EventConfig> {
        if event_id == INVALID_EVENT {
            return None;
        }
        self.events.get(event_id as usize)
    }

    /// All valid event ids in ascending order
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> {
        1..self.events.len() as EventId
    }

    pub fn combined_group(&self, event_id: EventId) -> Option<&CombinedGroup> {
        self.event(event_id)
            .and_then(|event| event.combined_group)
            .and_then(|group| self.combined_groups.get(group))
    }

    /// Events that share the DTC of `event_id`, including itself.
    pub fn group_members(&self, event_id: EventId) -> Vec<EventId> {
        match self.combined_group(event_id) {
            Some(group) => group.members.clone(),
            None => vec![event_id],
        }
    }

    /// Whether the event represents its DTC. Non-combined events always do, combined groups are represented by their first member.
    pub fn is_group_master(&self, event_id: EventId) -> bool {
        match self.combined_group(event_id) {
            Some(group) => group.members.first() == Some(&event_id),
            None => true,
        }
    }

    pub fn dtc_mapping(&self, event_id: EventId) -> Option<&DtcMapping> {
        match self.combined_group(event_id) {
            Some(group) => Some(&group.dtc),
            None => self.event(event_id).map(|event| &event.dtc),
        }
    }

    pub fn dtc(&self, event_id: EventId, format: DtcFormat) -> Option<u32> {
        self.dtc_mapping(event_id).and_then(|mapping| mapping.dtc(format))
    }

    /// Finds the event reporting `dtc`. For combined groups the group master is returned.
    pub fn find_event(&self, dtc: u32, format: DtcFormat) -> Option<EventId> {
        self.event_ids()
            .find(|&event_id| self.dtc(event_id, format) == Some(dtc))
            .map(|event_id| match self.combined_group(event_id) {
                Some(group) => group.members.first().copied().unwrap_or(event_id),
                None => event_id,
            })
    }

    pub fn dtc_group(&self, dtc: u32) -> Option<&DtcGroup> {
        if dtc == ALL_DTCS {
            return None;
        }
        self.dtc_groups.iter().find(|group| group.dtc == dtc)
    }

    pub fn supports_origin(&self, origin: DtcOrigin) -> bool {
        self.memories.contains(&origin)
    }

    pub fn is_assigned_to_node(&self, event_id: EventId, node: NodeIndex) -> bool {
        self.event(event_id)
            .map(|event| event.j1939_nodes.contains(&node))
            .unwrap_or(false)
    }

    /// Checks the invariants the runtime relies on.
    pub fn validate(&self) -> Result<(), error::Error> {
        if self.events.is_empty() {
            return Err(error::Error::MissingReservedEvent);
        }
        if self.combined_groups.len() > MAX_COMBINED_GROUPS {
            return Err(error::Error::TooManyCombinedGroups(self.combined_groups.len()));
        }
        if self.clients.len() > u8::MAX as usize + 1 {
            return Err(error::Error::TooManyClients(self.clients.len()));
        }

        for (group_index, group) in self.combined_groups.iter().enumerate() {
            for &member in &group.members {
                match self.event(member) {
                    Some(event) if event.combined_group == Some(group_index) => {}
                    _ => {
                        return Err(error::Error::InvalidGroupMember {
                            group: group_index,
                            event: member,
                        })
                    }
                }
            }
        }

        for event_id in self.event_ids() {
            let event = &self.events[event_id as usize];
            if let Some(group) = event.combined_group {
                if group >= self.combined_groups.len() {
                    return Err(error::Error::UnknownCombinedGroup { event: event_id, group });
                }
            }
            if let Some(&profile) = event
                .time_series_profiles
                .iter()
                .find(|&&profile| profile >= self.sampling_profiles.len())
            {
                return Err(error::Error::UnknownSamplingProfile { event: event_id, profile });
            }
            if let Some(&node) = event.j1939_nodes.iter().find(|&&node| self.j1939.nodes.len() <= node as usize) {
                return Err(error::Error::UnknownNode(node));
            }
        }

        for client in &self.clients {
            if let Some(node) = client.j1939_node {
                if node as usize >= self.j1939.nodes.len() {
                    return Err(error::Error::UnknownNode(node));
                }
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_group_shares_dtc() {
        let mut config = Config::new();
        let a = config.add_event(EventConfig::new(DtcMapping::uds(0x111111)));
        let b = config.add_event(EventConfig::new(DtcMapping::uds(0x222222)));
        config.add_combined_group(DtcMapping::uds(0x333333), &[a, b]);

        assert_eq!(config.dtc(a, DtcFormat::Uds), Some(0x333333));
        assert_eq!(config.dtc(b, DtcFormat::Uds), Some(0x333333));
        assert_eq!(config.find_event(0x333333, DtcFormat::Uds), Some(a));
        assert_eq!(config.find_event(0x111111, DtcFormat::Uds), None);
        assert!(config.is_group_master(a));
        assert!(!config.is_group_master(b));
        assert_eq!(config.group_members(b), vec![a, b]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reserved_event_is_invalid() {
        let config = Config::new();
        assert_eq!(config.event(INVALID_EVENT), None);
        assert_eq!(config.event_ids().count(), 0);
    }

    #[test]
    fn validate_rejects_dangling_references() {
        let mut config = Config::new();
        config.add_event(EventConfig {
            time_series_profiles: vec![3],
            ..EventConfig::default()
        });
        assert_eq!(
            config.validate(),
            Err(error::Error::UnknownSamplingProfile { event: 1, profile: 3 })
        );

        let mut config = Config::new();
        config.clients.push(ClientConfig::j1939(2));
        assert_eq!(config.validate(), Err(error::Error::UnknownNode(2)));

        let mut config = Config::new();
        config.events.clear();
        assert_eq!(config.validate(), Err(error::Error::MissingReservedEvent));
    }

    #[test]
    fn snapshot_numbering() {
        let event = EventConfig {
            snapshot_records: vec![0x10, 0x20],
            global_snapshot: true,
            ..EventConfig::default()
        };

        assert_eq!(event.snapshot_record_number(SnapshotNumbering::Configured, 0, 0x20), Some(0x20));
        assert_eq!(event.snapshot_record_number(SnapshotNumbering::Configured, 0, 0x30), None);
        assert_eq!(event.snapshot_record_number(SnapshotNumbering::Calculated, 1, 0x20), Some(2));
        assert_eq!(event.snapshot_record_number(SnapshotNumbering::Calculated, 2, 0x20), None);

        assert!(event.is_snapshot_record_configured(SnapshotNumbering::Calculated, false, 2));
        assert!(!event.is_snapshot_record_configured(SnapshotNumbering::Configured, false, 2));
        assert!(event.is_snapshot_record_configured(SnapshotNumbering::Configured, true, GLOBAL_SNAPSHOT_RECORD));
        assert!(!event.is_snapshot_record_configured(SnapshotNumbering::Configured, false, GLOBAL_SNAPSHOT_RECORD));
    }
}
