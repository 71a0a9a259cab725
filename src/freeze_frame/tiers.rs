//! Record tiers. Each tier walks one storage area of the event memory and keeps its own cursor in [`FilterState`].
use crate::config::{Capabilities, CustomTriggerConfig, EventConfig};
use crate::det::{checked_get, ApiId};
use crate::dtc::{DtcFormat, DtcOrigin};
use crate::memory::{CustomTriggerEntry, EventEntry};

use super::constants::{
    GLOBAL_SNAPSHOT_RECORD, OBD_FREEZE_FRAME_RECORD, OBD_ON_UDS_FREEZE_FRAME_RECORD, TIME_SERIES_POWERTRAIN_RECORD,
};
use super::{FilterState, FreezeFrameRecord, ProcessedGroups, RecordContext};

pub(super) trait RecordTier: Sync {
    fn is_enabled(&self, capabilities: &Capabilities) -> bool;

    /// Advances the tier's cursor to the next record. Returns `None` once the tier is exhausted, the cursor then stays at the end.
    fn next(&self, ctx: &RecordContext<'_>, format: DtcFormat, state: &mut FilterState) -> Option<FreezeFrameRecord>;

    /// Number of records [`RecordTier::next`] reports in a full pass.
    fn count(&self, ctx: &RecordContext<'_>, format: DtcFormat) -> usize;
}

static TIERS: [&dyn RecordTier; 4] = [&SnapshotTier, &ObdOnUdsTier, &TimeSeriesTier, &CustomTriggerTier];

/// Enabled tiers in reporting order
pub(super) fn enabled(capabilities: &Capabilities) -> impl Iterator<Item = &'static dyn RecordTier> + '_ {
    TIERS.iter().copied().filter(move |tier| tier.is_enabled(capabilities))
}

fn record(dtc: u32, record_number: u8) -> FreezeFrameRecord {
    FreezeFrameRecord { dtc, record_number }
}

/// Combined groups are reported by the first member found in a tier, later members are skipped.
fn is_processed(event: &EventConfig, processed: &ProcessedGroups) -> bool {
    event.combined_group.is_some_and(|group| processed.contains(group))
}

fn mark_processed(event: &EventConfig, processed: &mut ProcessedGroups) {
    if let Some(group) = event.combined_group {
        processed.insert(group);
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub(super) struct SnapshotCursor {
    entry: usize,
    slot: usize,
    global_reported: bool,
    processed: ProcessedGroups,
}

impl SnapshotCursor {
    fn advance(&mut self) {
        self.entry += 1;
        self.slot = 0;
        self.global_reported = false;
    }
}

/// Event specific snapshot records followed by the global snapshot record of each primary entry.
struct SnapshotTier;

impl SnapshotTier {
    fn candidate<'a>(
        ctx: &RecordContext<'a>,
        format: DtcFormat,
        index: usize,
        processed: &ProcessedGroups,
    ) -> Option<(&'a EventEntry, &'a EventConfig, u32)> {
        let memory = ctx.memory;
        let entry = memory.entry(DtcOrigin::PrimaryMemory, index)?;
        if !ctx.is_visible(entry.event_id, format) {
            return None;
        }
        let event = ctx.event(entry.event_id)?;
        if is_processed(event, processed) {
            return None;
        }
        let dtc = ctx.config.dtc(entry.event_id, format)?;
        Some((entry, event, dtc))
    }

    fn record_number(ctx: &RecordContext<'_>, event: &EventConfig, entry: &EventEntry, slot: usize) -> Option<u8> {
        let stored = entry.snapshot_records.get(slot)?;
        event.snapshot_record_number(ctx.config.snapshot_numbering, slot, stored.number)
    }

    fn has_global(ctx: &RecordContext<'_>, event: &EventConfig, entry: &EventEntry) -> bool {
        ctx.config.capabilities.global_snapshot && event.global_snapshot && entry.global_snapshot.is_some()
    }
}

impl RecordTier for SnapshotTier {
    fn is_enabled(&self, _capabilities: &Capabilities) -> bool {
        true
    }

    fn next(&self, ctx: &RecordContext<'_>, format: DtcFormat, state: &mut FilterState) -> Option<FreezeFrameRecord> {
        let cursor = &mut state.snapshot;

        while cursor.entry < ctx.memory.entry_count(DtcOrigin::PrimaryMemory) {
            if let Some((entry, event, dtc)) = Self::candidate(ctx, format, cursor.entry, &cursor.processed) {
                while cursor.slot < entry.snapshot_records.len() {
                    let slot = cursor.slot;
                    cursor.slot += 1;
                    if let Some(number) = Self::record_number(ctx, event, entry, slot) {
                        return Some(record(dtc, number));
                    }
                }

                if !cursor.global_reported && Self::has_global(ctx, event, entry) {
                    cursor.global_reported = true;
                    return Some(record(dtc, GLOBAL_SNAPSHOT_RECORD));
                }

                mark_processed(event, &mut cursor.processed);
            }
            cursor.advance();
        }
        None
    }

    fn count(&self, ctx: &RecordContext<'_>, format: DtcFormat) -> usize {
        let mut processed = ProcessedGroups::new();
        let mut total = 0;
        for index in 0..ctx.memory.entry_count(DtcOrigin::PrimaryMemory) {
            let Some((entry, event, _)) = Self::candidate(ctx, format, index, &processed) else {
                continue;
            };
            total += (0..entry.snapshot_records.len())
                .filter(|&slot| Self::record_number(ctx, event, entry, slot).is_some())
                .count();
            if Self::has_global(ctx, event, entry) {
                total += 1;
            }
            mark_processed(event, &mut processed);
        }
        total
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub(super) struct ObdOnUdsCursor {
    slot: usize,
    obd_record_reported: bool,
    processed: ProcessedGroups,
}

impl ObdOnUdsCursor {
    fn advance(&mut self) {
        self.slot += 1;
        self.obd_record_reported = false;
    }
}

/// OBD freeze frames, reported twice: as record 0x00 and as the OBD-on-UDS record 0xF0.
struct ObdOnUdsTier;

impl ObdOnUdsTier {
    fn candidate<'a>(
        ctx: &RecordContext<'a>,
        format: DtcFormat,
        slot: usize,
        processed: &ProcessedGroups,
    ) -> Option<(&'a EventConfig, u32)> {
        let memory = ctx.memory;
        let frame = memory.obd_freeze_frame(slot)?;
        if !ctx.is_visible(frame.event_id, format) {
            return None;
        }
        let event = ctx.event(frame.event_id)?;
        if is_processed(event, processed) {
            return None;
        }
        Some((event, ctx.config.dtc(frame.event_id, format)?))
    }
}

impl RecordTier for ObdOnUdsTier {
    fn is_enabled(&self, capabilities: &Capabilities) -> bool {
        capabilities.obd_on_uds
    }

    fn next(&self, ctx: &RecordContext<'_>, format: DtcFormat, state: &mut FilterState) -> Option<FreezeFrameRecord> {
        let cursor = &mut state.obd_on_uds;

        while cursor.slot < ctx.memory.obd_freeze_frame_count() {
            if let Some((event, dtc)) = Self::candidate(ctx, format, cursor.slot, &cursor.processed) {
                if !cursor.obd_record_reported {
                    cursor.obd_record_reported = true;
                    return Some(record(dtc, OBD_FREEZE_FRAME_RECORD));
                }
                mark_processed(event, &mut cursor.processed);
                cursor.advance();
                return Some(record(dtc, OBD_ON_UDS_FREEZE_FRAME_RECORD));
            }
            cursor.advance();
        }
        None
    }

    fn count(&self, ctx: &RecordContext<'_>, format: DtcFormat) -> usize {
        let mut processed = ProcessedGroups::new();
        let mut slots = 0;
        for slot in 0..ctx.memory.obd_freeze_frame_count() {
            if let Some((event, _)) = Self::candidate(ctx, format, slot, &processed) {
                mark_processed(event, &mut processed);
                slots += 1;
            }
        }
        slots * 2
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub(super) struct TimeSeriesCursor {
    entry: usize,
    processed: ProcessedGroups,
}

/// One time series powertrain record per entry that still holds samples.
struct TimeSeriesTier;

impl TimeSeriesTier {
    fn candidate<'a>(
        ctx: &RecordContext<'a>,
        format: DtcFormat,
        index: usize,
        processed: &ProcessedGroups,
    ) -> Option<(&'a EventConfig, u32)> {
        let memory = ctx.memory;
        let entry = memory.time_series_entry(index)?;
        if !ctx.is_visible(entry.event_id, format) {
            return None;
        }
        let event = ctx.event(entry.event_id)?;
        if is_processed(event, processed) {
            return None;
        }

        let has_samples = entry
            .sample_sets
            .iter()
            .filter(|set| event.time_series_profiles.contains(&set.profile))
            .any(|set| {
                checked_get(&ctx.config.sampling_profiles, set.profile, ctx.det, ApiId::Internal)
                    .map(|profile| {
                        let recorded = profile.past_samples as u16 + set.future_recorded.min(profile.future_samples) as u16;
                        recorded > set.evicted as u16
                    })
                    .unwrap_or(false)
            });
        if !has_samples {
            return None;
        }
        Some((event, ctx.config.dtc(entry.event_id, format)?))
    }
}

impl RecordTier for TimeSeriesTier {
    fn is_enabled(&self, capabilities: &Capabilities) -> bool {
        capabilities.time_series_powertrain && !capabilities.powertrain_only
    }

    fn next(&self, ctx: &RecordContext<'_>, format: DtcFormat, state: &mut FilterState) -> Option<FreezeFrameRecord> {
        let cursor = &mut state.time_series;

        while cursor.entry < ctx.memory.time_series_entry_count() {
            let index = cursor.entry;
            cursor.entry += 1;
            if let Some((event, dtc)) = Self::candidate(ctx, format, index, &cursor.processed) {
                mark_processed(event, &mut cursor.processed);
                return Some(record(dtc, TIME_SERIES_POWERTRAIN_RECORD));
            }
        }
        None
    }

    fn count(&self, ctx: &RecordContext<'_>, format: DtcFormat) -> usize {
        let mut processed = ProcessedGroups::new();
        let mut total = 0;
        for index in 0..ctx.memory.time_series_entry_count() {
            if let Some((event, _)) = Self::candidate(ctx, format, index, &processed) {
                mark_processed(event, &mut processed);
                total += 1;
            }
        }
        total
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub(super) struct CustomTriggerCursor {
    entry: usize,
    snapshot_reported: bool,
    sample: usize,
    processed: ProcessedGroups,
}

impl CustomTriggerCursor {
    fn advance(&mut self) {
        self.entry += 1;
        self.snapshot_reported = false;
        self.sample = 0;
    }
}

/// Custom triggered snapshot record followed by the stored time series samples.
struct CustomTriggerTier;

impl CustomTriggerTier {
    fn candidate<'a>(
        ctx: &RecordContext<'a>,
        format: DtcFormat,
        index: usize,
        processed: &ProcessedGroups,
    ) -> Option<(&'a CustomTriggerEntry, &'a EventConfig, CustomTriggerConfig, u32)> {
        let memory = ctx.memory;
        let entry = memory.custom_trigger_entry(index)?;
        if !ctx.is_visible(entry.event_id, format) {
            return None;
        }
        let event = ctx.event(entry.event_id)?;
        if is_processed(event, processed) {
            return None;
        }
        let trigger = event.custom_trigger?;
        let dtc = ctx.config.dtc(entry.event_id, format)?;
        Some((entry, event, trigger, dtc))
    }

    fn snapshot_record(trigger: &CustomTriggerConfig, entry: &CustomTriggerEntry) -> Option<u8> {
        entry.snapshot.as_ref().and(trigger.snapshot_record)
    }

    fn sample_record(trigger: &CustomTriggerConfig, entry: &CustomTriggerEntry, sample: usize) -> Option<u8> {
        if sample >= entry.samples.len() || sample >= trigger.max_samples as usize {
            return None;
        }
        trigger.first_sample_record.checked_add(sample as u8)
    }
}

impl RecordTier for CustomTriggerTier {
    fn is_enabled(&self, capabilities: &Capabilities) -> bool {
        capabilities.custom_triggers
    }

    fn next(&self, ctx: &RecordContext<'_>, format: DtcFormat, state: &mut FilterState) -> Option<FreezeFrameRecord> {
        let cursor = &mut state.custom_trigger;

        while cursor.entry < ctx.memory.custom_trigger_entry_count() {
            if let Some((entry, event, trigger, dtc)) = Self::candidate(ctx, format, cursor.entry, &cursor.processed) {
                if !cursor.snapshot_reported {
                    cursor.snapshot_reported = true;
                    if let Some(number) = Self::snapshot_record(&trigger, entry) {
                        return Some(record(dtc, number));
                    }
                }
                if let Some(number) = Self::sample_record(&trigger, entry, cursor.sample) {
                    cursor.sample += 1;
                    return Some(record(dtc, number));
                }
                mark_processed(event, &mut cursor.processed);
            }
            cursor.advance();
        }
        None
    }

    fn count(&self, ctx: &RecordContext<'_>, format: DtcFormat) -> usize {
        let mut processed = ProcessedGroups::new();
        let mut total = 0;
        for index in 0..ctx.memory.custom_trigger_entry_count() {
            let Some((entry, event, trigger, _)) = Self::candidate(ctx, format, index, &processed) else {
                continue;
            };
            mark_processed(event, &mut processed);
            if Self::snapshot_record(&trigger, entry).is_some() {
                total += 1;
            }
            total += (0..entry.samples.len())
                .take_while(|&sample| Self::sample_record(&trigger, entry, sample).is_some())
                .count();
        }
        total
    }
}
