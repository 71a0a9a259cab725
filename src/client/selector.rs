//! DTC selection used by clear, suppression and readout requests.
use crate::config::Config;
use crate::dtc::{DtcFormat, DtcOrigin, EventId, ALL_DTCS};

/// Outcome of the last `select_dtc` call of a client.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectionResult {
    /// Nothing selected yet
    #[default]
    Init,
    /// A single DTC, represented by its event (group master for combined DTCs)
    Dtc(EventId),
    /// A UDS DTC group, events match through their group mask
    Group(u8),
    AllDtcs,
    /// No event reports the DTC in the selected memory
    NoMatch,
    /// The selected memory does not exist
    WrongOrigin,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DtcSelection {
    pub dtc: u32,
    pub format: DtcFormat,
    pub origin: DtcOrigin,
    pub result: SelectionResult,
}

impl DtcSelection {
    /// Resolves a DTC request. `origin` must already be mapped to the physical memory.
    pub fn select(config: &Config, dtc: u32, format: DtcFormat, origin: DtcOrigin) -> Self {
        let result = if !config.supports_origin(origin) {
            SelectionResult::WrongOrigin
        } else if dtc == ALL_DTCS && format != DtcFormat::J1939 {
            SelectionResult::AllDtcs
        } else if let Some(group) = config.dtc_group(dtc).filter(|_| format == DtcFormat::Uds) {
            SelectionResult::Group(group.mask)
        } else {
            match config.find_event(dtc, format) {
                Some(event_id) if is_stored_in(config, event_id, origin) => SelectionResult::Dtc(event_id),
                _ => SelectionResult::NoMatch,
            }
        };

        Self {
            dtc,
            format,
            origin,
            result,
        }
    }
}

/// Mirror and permanent memories can hold any event, all other memories only hold their configured events.
fn is_stored_in(config: &Config, event_id: EventId, origin: DtcOrigin) -> bool {
    match origin {
        DtcOrigin::MirrorMemory | DtcOrigin::PermanentMemory => true,
        origin => config
            .event(event_id)
            .map(|event| event.origin.physical() == origin)
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DtcGroup, EventConfig};
    use crate::dtc::DtcMapping;

    fn config() -> (Config, EventId, EventId) {
        let mut config = Config::new();
        config.memories.push(DtcOrigin::UserDefinedMemory(1));
        config.dtc_groups.push(DtcGroup { dtc: 0xaa0000, mask: 0x01 });
        let primary = config.add_event(EventConfig::new(DtcMapping::uds(0x100000)));
        let user = config.add_event(EventConfig {
            origin: DtcOrigin::UserDefinedMemory(1),
            ..EventConfig::new(DtcMapping::uds(0x200000))
        });
        (config, primary, user)
    }

    #[test]
    fn selection_results() {
        let (config, primary, user) = config();
        let select = |dtc, origin| DtcSelection::select(&config, dtc, DtcFormat::Uds, origin).result;

        assert_eq!(select(0x100000, DtcOrigin::PrimaryMemory), SelectionResult::Dtc(primary));
        assert_eq!(select(0x200000, DtcOrigin::UserDefinedMemory(1)), SelectionResult::Dtc(user));
        assert_eq!(select(0x200000, DtcOrigin::PrimaryMemory), SelectionResult::NoMatch);
        assert_eq!(select(0x300000, DtcOrigin::PrimaryMemory), SelectionResult::NoMatch);
        assert_eq!(select(0xaa0000, DtcOrigin::PrimaryMemory), SelectionResult::Group(0x01));
        assert_eq!(select(ALL_DTCS, DtcOrigin::PrimaryMemory), SelectionResult::AllDtcs);
        assert_eq!(select(0x100000, DtcOrigin::MirrorMemory), SelectionResult::WrongOrigin);
    }
}
