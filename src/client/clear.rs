//! Clear DTC requests. A client queues a request, the request is executed by the next `main_function` call and the client polls for the result.
use tracing::{info, warn};

use crate::config::Config;
use crate::dtc::{ClientId, DtcFormat, DtcOrigin, EventId, NodeIndex};
use crate::memory::EventMemory;

use super::filter::{combined_status, is_active, is_previously_active};

/// State of a client's clear request.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClearDtcStatus {
    #[default]
    Idle,
    Pending,
    Done,
    /// At least one event refused the clear
    Failed,
    /// The memory was cleared but could not be persisted
    NvError,
}

/// DTCs removed by a J1939 clear request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum J1939ClearFilter {
    /// DM11
    Active,
    /// DM03
    PreviouslyActive,
}

/// Status a DTC must have to be cleared by a single DTC J1939 clear request (DM22).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum J1939DtcTypeFilter {
    Active,
    PreviouslyActive,
    ActiveOrPreviouslyActive,
}

impl J1939DtcTypeFilter {
    pub fn matches(self, status: u8) -> bool {
        match self {
            J1939DtcTypeFilter::Active => is_active(status),
            J1939DtcTypeFilter::PreviouslyActive => is_previously_active(status),
            J1939DtcTypeFilter::ActiveOrPreviouslyActive => is_active(status) || is_previously_active(status),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum ClearScope {
    /// A single DTC, clears all members of a combined group
    Event(EventId),
    Group(u8),
    All,
    J1939 { filter: J1939ClearFilter, node: NodeIndex },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct ClearRequest {
    pub(crate) client: ClientId,
    pub(crate) origin: DtcOrigin,
    pub(crate) scope: ClearScope,
}

impl ClearRequest {
    fn targets(&self, config: &Config, memory: &dyn EventMemory) -> Vec<EventId> {
        let in_origin = |event_id: EventId| {
            config
                .event(event_id)
                .map(|event| event.origin.physical() == self.origin)
                .unwrap_or(false)
                || memory.find_entry(self.origin, event_id).is_some()
        };

        match self.scope {
            ClearScope::Event(event_id) => config.group_members(event_id),
            ClearScope::Group(mask) => config
                .event_ids()
                .filter(|&event_id| in_origin(event_id))
                .filter(|&event_id| config.event(event_id).is_some_and(|event| event.group_mask & mask != 0))
                .collect(),
            ClearScope::All => config.event_ids().filter(|&event_id| in_origin(event_id)).collect(),
            ClearScope::J1939 { filter, node } => config
                .event_ids()
                .filter(|&event_id| config.dtc(event_id, DtcFormat::J1939).is_some())
                .filter(|&event_id| config.is_assigned_to_node(event_id, node))
                .filter(|&event_id| {
                    let status = combined_status(config, memory, event_id);
                    match filter {
                        J1939ClearFilter::Active => is_active(status),
                        J1939ClearFilter::PreviouslyActive => is_previously_active(status),
                    }
                })
                .flat_map(|event_id| config.group_members(event_id))
                .collect(),
        }
    }

    /// Clears all targeted events. A single DTC request fails as a whole if any member refuses the clear, group requests skip refusing events.
    pub(crate) fn execute(&self, config: &Config, memory: &mut dyn EventMemory) -> ClearDtcStatus {
        let mut targets = self.targets(config, memory);
        targets.sort_unstable();
        targets.dedup();

        let allowed = |event_id: &EventId| config.event(*event_id).is_some_and(|event| event.clear_allowed);
        if matches!(self.scope, ClearScope::Event(_)) && !targets.iter().all(allowed) {
            warn!("Clear of {:?} refused", self.scope);
            return ClearDtcStatus::Failed;
        }

        let mut status = ClearDtcStatus::Done;
        for event_id in targets.into_iter().filter(allowed) {
            if memory.clear_event(self.origin, event_id).is_err() {
                warn!("Persisting clear of event {} failed", event_id);
                status = ClearDtcStatus::NvError;
            }
        }
        info!("Clear {:?} in {:?} for client {} finished: {:?}", self.scope, self.origin, self.client, status);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;
    use crate::dtc::{status_bit, DtcMapping};
    use crate::memory::{EventEntry, MemoryStore};

    #[test]
    fn refused_single_clear_keeps_entry() {
        let mut config = Config::new();
        let event_id = config.add_event(EventConfig {
            clear_allowed: false,
            ..EventConfig::new(DtcMapping::uds(0x010203))
        });
        let mut memory = MemoryStore::new(&config, 2);
        memory.store_primary_entry(EventEntry::new(event_id));

        let request = ClearRequest {
            client: 0,
            origin: DtcOrigin::PrimaryMemory,
            scope: ClearScope::Event(event_id),
        };
        assert_eq!(request.execute(&config, &mut memory), ClearDtcStatus::Failed);
        assert!(memory.find_entry(DtcOrigin::PrimaryMemory, event_id).is_some());

        let request = ClearRequest {
            scope: ClearScope::All,
            ..request
        };
        assert_eq!(request.execute(&config, &mut memory), ClearDtcStatus::Done);
        assert!(memory.find_entry(DtcOrigin::PrimaryMemory, event_id).is_some());
    }

    #[test]
    fn group_clear_uses_mask() {
        let mut config = Config::new();
        let a = config.add_event(EventConfig {
            group_mask: 0x01,
            ..EventConfig::new(DtcMapping::uds(0x010000))
        });
        let b = config.add_event(EventConfig {
            group_mask: 0x02,
            ..EventConfig::new(DtcMapping::uds(0x020000))
        });
        let mut memory = MemoryStore::new(&config, 2);
        memory.store_primary_entry(EventEntry::new(a));
        memory.store_primary_entry(EventEntry::new(b));
        memory.set_event_status(b, status_bit::CONFIRMED_DTC);

        let request = ClearRequest {
            client: 0,
            origin: DtcOrigin::PrimaryMemory,
            scope: ClearScope::Group(0x01),
        };
        assert_eq!(request.execute(&config, &mut memory), ClearDtcStatus::Done);
        assert!(memory.find_entry(DtcOrigin::PrimaryMemory, a).is_none());
        assert!(memory.find_entry(DtcOrigin::PrimaryMemory, b).is_some());
        assert_eq!(memory.event_status(b), status_bit::CONFIRMED_DTC);
    }
}
