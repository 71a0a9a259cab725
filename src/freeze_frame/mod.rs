//! Freeze frame record iterator. Walks all stored snapshot record tiers of the event memory and produces one (DTC, record number) pair per call. The iterator keeps a cursor for every tier, so iteration resumes at the same position on the next call.
//!
//! Tiers are visited in a fixed order:
//!  1. Snapshot records and global snapshot records of the primary memory
//!  2. OBD-on-UDS shadow freeze frames (records 0x00 and 0xF0)
//!  3. Time series powertrain records
//!  4. Custom triggered snapshot and time series sample records
//!
//! Tiers that are not enabled in [`crate::config::Capabilities`] are skipped.
//!
//! ## Example
//! ```rust
//! use automotive_dem::config::{Config, EventConfig};
//! use automotive_dem::det::NoOpDevErrorHook;
//! use automotive_dem::dtc::{DtcMapping, RecordFilterFormat};
//! use automotive_dem::freeze_frame::{FreezeFrameIterator, RecordContext};
//! use automotive_dem::memory::{EventEntry, MemoryStore, SnapshotRecord};
//!
//! let mut config = Config::new();
//! let event_id = config.add_event(EventConfig {
//!     snapshot_records: vec![1],
//!     ..EventConfig::new(DtcMapping::uds(0x123456))
//! });
//! let mut memory = MemoryStore::new(&config, 4);
//! let mut entry = EventEntry::new(event_id);
//! entry.snapshot_records.push(SnapshotRecord::new(1, &[0xaa]));
//! memory.store_primary_entry(entry);
//!
//! let ctx = RecordContext::new(&config, &memory, &NoOpDevErrorHook);
//! let mut iterator = FreezeFrameIterator::new();
//! iterator.start(RecordFilterFormat::Uds);
//! assert_eq!(iterator.count(&ctx), 1);
//! while let Some(record) = iterator.next_record(&ctx) {
//!     println!("{:06x} {:02x}", record.dtc, record.record_number);
//! }
//! ```

pub mod constants;
mod expanded;
mod j1939;
mod tiers;

pub use j1939::{J1939FilterState, J1939FreezeFrame, Spn};

use tracing::debug;

use crate::config::{Config, EventConfig, Significance};
use crate::det::{checked_get, ApiId, DetError, DevErrorHook};
use crate::dtc::{DtcFormat, EventId, RecordFilterFormat, INVALID_EVENT};
use crate::memory::EventMemory;

/// Capacity of the combined group bitset
pub const MAX_COMBINED_GROUPS: usize = 256;

/// Fixed size bitset of combined DTC groups already reported in the current pass.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ProcessedGroups([u32; MAX_COMBINED_GROUPS / 32]);

impl ProcessedGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, group: usize) -> bool {
        self.0
            .get(group / 32)
            .map(|word| word & (1 << (group % 32)) != 0)
            .unwrap_or(false)
    }

    pub fn insert(&mut self, group: usize) {
        if let Some(word) = self.0.get_mut(group / 32) {
            *word |= 1 << (group % 32);
        }
    }
}

/// Address of one reported record
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FreezeFrameRecord {
    /// DTC in the requested format
    pub dtc: u32,
    pub record_number: u8,
}

/// Everything the iterator reads: configuration, event memory and the development error hook.
#[derive(Clone, Copy)]
pub struct RecordContext<'a> {
    pub(crate) config: &'a Config,
    pub(crate) memory: &'a dyn EventMemory,
    pub(crate) det: &'a dyn DevErrorHook,
}

impl<'a> RecordContext<'a> {
    pub fn new(config: &'a Config, memory: &'a dyn EventMemory, det: &'a dyn DevErrorHook) -> Self {
        Self { config, memory, det }
    }

    /// Event configuration. Out of range ids are reported and resolve to the reserved event.
    pub(crate) fn event(&self, event_id: EventId) -> Option<&'a EventConfig> {
        if event_id == INVALID_EVENT {
            return None;
        }
        checked_get(&self.config.events, event_id as usize, self.det, ApiId::Internal)
    }

    /// Whether records of an event may be reported in `format`. Shared by all tiers and DTC filters.
    pub(crate) fn is_visible(&self, event_id: EventId, format: DtcFormat) -> bool {
        let Some(event) = self.event(event_id) else {
            return false;
        };
        if !self.memory.is_event_available(event_id) || self.memory.is_dtc_suppressed(event_id) {
            return false;
        }
        if self.config.capabilities.hide_obd_occurrences
            && event.obd_related
            && event.significance == Significance::Occurrence
        {
            return false;
        }
        self.config.dtc(event_id, format).is_some()
    }
}

/// Cursors of all record tiers
#[derive(Debug, Clone, Default)]
struct FilterState {
    snapshot: tiers::SnapshotCursor,
    obd_on_uds: tiers::ObdOnUdsCursor,
    time_series: tiers::TimeSeriesCursor,
    custom_trigger: tiers::CustomTriggerCursor,
}

/// Per-client freeze frame filter. Create one per client and restart it for every request.
#[derive(Debug, Clone)]
pub struct FreezeFrameIterator {
    format: Option<RecordFilterFormat>,
    state: FilterState,
    j1939: j1939::J1939Filter,
}

impl FreezeFrameIterator {
    pub fn new() -> Self {
        Self {
            format: None,
            state: FilterState::default(),
            j1939: j1939::J1939Filter::default(),
        }
    }

    /// Drops all progress and any active filter
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Starts a new pass over all tiers reporting DTCs in `format`.
    pub fn start(&mut self, format: RecordFilterFormat) {
        debug!("Start freeze frame filter, format {:?}", format);
        self.format = Some(format);
        self.state = FilterState::default();
    }

    /// Format of the active filter, `None` if no filter was started
    pub fn format(&self) -> Option<RecordFilterFormat> {
        self.format
    }

    /// Returns the next record, or `None` once all tiers are exhausted.
    pub fn next_record(&mut self, ctx: &RecordContext<'_>) -> Option<FreezeFrameRecord> {
        let Some(format) = self.format else {
            ctx.det.report(ApiId::GetNextFilteredRecord, DetError::Uninit);
            return None;
        };
        let format = DtcFormat::from(format);
        let state = &mut self.state;

        tiers::enabled(&ctx.config.capabilities).find_map(|tier| tier.next(ctx, format, state))
    }

    /// Number of records a full pass reports. Does not touch the cursors.
    pub fn count(&self, ctx: &RecordContext<'_>) -> u16 {
        let Some(format) = self.format else {
            ctx.det.report(ApiId::SetFreezeFrameRecordFilter, DetError::Uninit);
            return 0;
        };
        let format = DtcFormat::from(format);

        let total: usize = tiers::enabled(&ctx.config.capabilities)
            .map(|tier| tier.count(ctx, format))
            .sum();
        u16::try_from(total).unwrap_or(u16::MAX)
    }
}

impl Default for FreezeFrameIterator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_groups() {
        let mut groups = ProcessedGroups::new();
        assert!(!groups.contains(0));

        groups.insert(0);
        groups.insert(33);
        groups.insert(MAX_COMBINED_GROUPS);

        assert!(groups.contains(0));
        assert!(groups.contains(33));
        assert!(!groups.contains(1));
        assert!(!groups.contains(32));
        assert!(!groups.contains(MAX_COMBINED_GROUPS));
    }
}
