//! Reserved record numbers.

/// OBD freeze frame reported through the UDS snapshot interface
pub const OBD_FREEZE_FRAME_RECORD: u8 = 0x00;
/// OBD-on-UDS freeze frame, reported right after [`OBD_FREEZE_FRAME_RECORD`] for the same shadow entry
pub const OBD_ON_UDS_FREEZE_FRAME_RECORD: u8 = 0xf0;
/// Global snapshot record shared across events
pub const GLOBAL_SNAPSHOT_RECORD: u8 = 0xf1;
/// Time series powertrain record, one per event
pub const TIME_SERIES_POWERTRAIN_RECORD: u8 = 0xf2;

/// Selects all OBD extended data records
pub const ALL_OBD_EXTENDED_RECORDS: u8 = 0xfe;
/// Selects all records
pub const ALL_RECORDS: u8 = 0xff;

pub const FIRST_OBD_EXTENDED_RECORD: u8 = 0x90;
pub const LAST_OBD_EXTENDED_RECORD: u8 = 0xef;

/// Fill byte for fixed size records that are longer than the stored data
pub const PADDING: u8 = 0xff;
