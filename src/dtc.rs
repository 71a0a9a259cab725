//! DTC values, formats and origins shared by all modules.
use strum_macros::FromRepr;

/// Internal identifier of a fault condition. Event 0 is reserved and never valid.
pub type EventId = u16;

/// Index of a configured diagnostic client.
pub type ClientId = u8;

/// Index into the configured J1939 node table.
pub type NodeIndex = u8;

pub const INVALID_EVENT: EventId = 0;

/// Group of all DTCs as used by selection and clear requests.
pub const ALL_DTCS: u32 = 0xff_ffff;

/// DTC status byte bit definitions per ISO 14229-1
pub mod status_bit {
    pub const TEST_FAILED: u8 = 0x01;
    pub const TEST_FAILED_THIS_OPERATION_CYCLE: u8 = 0x02;
    pub const PENDING_DTC: u8 = 0x04;
    pub const CONFIRMED_DTC: u8 = 0x08;
    pub const TEST_NOT_COMPLETED_SINCE_LAST_CLEAR: u8 = 0x10;
    pub const TEST_FAILED_SINCE_LAST_CLEAR: u8 = 0x20;
    pub const TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE: u8 = 0x40;
    pub const WARNING_INDICATOR_REQUESTED: u8 = 0x80;

    /// Status of an event directly after it was cleared
    pub const CLEARED: u8 = TEST_NOT_COMPLETED_SINCE_LAST_CLEAR | TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE;
}

/// DTC output formats. Values match the AUTOSAR `Dem_DTCFormatType`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DtcFormat {
    /// 2 byte OBD DTC, reported in the upper two bytes of a 3 byte value
    Obd = 0x00,
    /// 3 byte UDS DTC
    Uds = 0x01,
    /// J1939 DTC (SPN + FMI)
    J1939 = 0x02,
}

/// Formats accepted by the freeze frame record filter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecordFilterFormat {
    Uds,
    Obd,
}

impl From<RecordFilterFormat> for DtcFormat {
    fn from(format: RecordFilterFormat) -> DtcFormat {
        match format {
            RecordFilterFormat::Uds => DtcFormat::Uds,
            RecordFilterFormat::Obd => DtcFormat::Obd,
        }
    }
}

/// Event memory a DTC is stored in.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DtcOrigin {
    PrimaryMemory,
    MirrorMemory,
    PermanentMemory,
    /// Alias of the primary memory for OBD relevant DTCs, there is no separate store
    ObdRelevantMemory,
    UserDefinedMemory(u8),
}

impl DtcOrigin {
    /// Maps aliases to the memory that physically stores the entries.
    pub fn physical(self) -> DtcOrigin {
        match self {
            DtcOrigin::ObdRelevantMemory => DtcOrigin::PrimaryMemory,
            origin => origin,
        }
    }
}

/// The configured DTC numbers of an event (or combined group) in all supported formats.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DtcMapping {
    pub uds: Option<u32>,
    pub obd: Option<u16>,
    pub j1939: Option<u32>,
}

impl DtcMapping {
    pub fn uds(dtc: u32) -> Self {
        Self {
            uds: Some(dtc),
            ..Default::default()
        }
    }

    /// Returns the DTC value in the requested format. OBD codes are shifted into the upper two bytes of the 3 byte DTC.
    pub fn dtc(&self, format: DtcFormat) -> Option<u32> {
        match format {
            DtcFormat::Uds => self.uds,
            DtcFormat::Obd => self.obd.map(|code| (code as u32) << 8),
            DtcFormat::J1939 => self.j1939,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obd_format_is_shifted() {
        let mapping = DtcMapping {
            uds: Some(0x123456),
            obd: Some(0xab12),
            j1939: None,
        };

        assert_eq!(mapping.dtc(DtcFormat::Obd), Some(0xab1200));
        assert_eq!(mapping.dtc(DtcFormat::Uds), Some(0x123456));
        assert_eq!(mapping.dtc(DtcFormat::J1939), None);
    }

    #[test]
    fn obd_relevant_memory_is_alias() {
        assert_eq!(DtcOrigin::ObdRelevantMemory.physical(), DtcOrigin::PrimaryMemory);
        assert_eq!(DtcOrigin::MirrorMemory.physical(), DtcOrigin::MirrorMemory);
        assert_eq!(DtcFormat::from_repr(0x02), Some(DtcFormat::J1939));
    }
}
