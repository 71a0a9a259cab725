//! Readout buffer. While record update is disabled, reads of freeze frame and extended data records are served from a private copy of the selected DTC's records, so a multi-frame response stays consistent.
//!
//! A combined DTC is copied from the first group member holding an entry. Primary memory copies also carry the OBD
//! freeze frame (records 0x00 and 0xF0) and the custom triggered records of the DTC. Time series powertrain records
//! (0xF2) hold no payload in the event memory and cannot be selected.
use tracing::debug;

use crate::buffer::DestinationBuffer;
use crate::client::error::Error as ClientError;
use crate::config::EventConfig;
use crate::dtc::{DtcOrigin, EventId};
use crate::freeze_frame::constants::{
    ALL_OBD_EXTENDED_RECORDS, ALL_RECORDS, FIRST_OBD_EXTENDED_RECORD, GLOBAL_SNAPSHOT_RECORD, LAST_OBD_EXTENDED_RECORD,
    OBD_FREEZE_FRAME_RECORD, OBD_ON_UDS_FREEZE_FRAME_RECORD,
};
use crate::freeze_frame::RecordContext;
use crate::memory::EventEntry;
use crate::{Error, Result};

#[derive(Clone, PartialEq)]
struct StoredRecord {
    number: u8,
    data: Vec<u8>,
}

impl StoredRecord {
    fn new(number: u8, data: &[u8]) -> Self {
        Self {
            number,
            data: data.to_vec(),
        }
    }
}

impl std::fmt::Debug for StoredRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}: {}", self.number, hex::encode(&self.data))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ReadoutCopy {
    /// Selected event, the group master for combined DTCs
    event_id: EventId,
    origin: DtcOrigin,
    /// Group member the entry was copied from
    source: EventId,
    snapshots: Vec<StoredRecord>,
    extended: Vec<StoredRecord>,
}

impl ReadoutCopy {
    /// Copies the records of an event or its combined group. Nothing stored yields an empty copy.
    fn from_memory(ctx: &RecordContext<'_>, event_id: EventId, origin: DtcOrigin) -> Self {
        let mut copy = Self {
            event_id,
            origin,
            source: event_id,
            snapshots: vec![],
            extended: vec![],
        };
        let members = ctx.config.group_members(event_id);
        let memory = ctx.memory;

        let stored = members.iter().find_map(|&member| {
            let (_, entry) = memory.find_entry(origin, member)?;
            Some((ctx.event(member)?, entry))
        });
        if let Some((event, entry)) = stored {
            copy.source = entry.event_id;
            copy.copy_entry(ctx, event, entry);
        }
        if origin == DtcOrigin::PrimaryMemory {
            copy.copy_obd_freeze_frame(ctx, &members);
            copy.copy_custom_trigger(ctx, &members);
        }
        copy
    }

    fn copy_entry(&mut self, ctx: &RecordContext<'_>, event: &EventConfig, entry: &EventEntry) {
        for (slot, record) in entry.snapshot_records.iter().enumerate() {
            if let Some(number) = event.snapshot_record_number(ctx.config.snapshot_numbering, slot, record.number) {
                self.snapshots.push(StoredRecord::new(number, &record.data));
            }
        }
        if let Some(data) = entry
            .global_snapshot
            .as_ref()
            .filter(|_| ctx.config.capabilities.global_snapshot && event.global_snapshot)
        {
            self.snapshots.push(StoredRecord::new(GLOBAL_SNAPSHOT_RECORD, data));
        }
        self.extended = entry
            .extended_records
            .iter()
            .filter(|record| event.extended_records.contains(&record.number))
            .map(|record| StoredRecord::new(record.number, &record.data))
            .collect();
    }

    /// The shadow entry is readable both as the OBD record and as the OBD-on-UDS record.
    fn copy_obd_freeze_frame(&mut self, ctx: &RecordContext<'_>, members: &[EventId]) {
        if !ctx.config.capabilities.obd_on_uds {
            return;
        }
        let memory = ctx.memory;
        let frame = (0..memory.obd_freeze_frame_count())
            .filter_map(|slot| memory.obd_freeze_frame(slot))
            .find(|frame| members.contains(&frame.event_id));
        if let Some(frame) = frame {
            self.snapshots.push(StoredRecord::new(OBD_FREEZE_FRAME_RECORD, &frame.data));
            self.snapshots.push(StoredRecord::new(OBD_ON_UDS_FREEZE_FRAME_RECORD, &frame.data));
        }
    }

    fn copy_custom_trigger(&mut self, ctx: &RecordContext<'_>, members: &[EventId]) {
        if !ctx.config.capabilities.custom_triggers {
            return;
        }
        let memory = ctx.memory;
        let stored = (0..memory.custom_trigger_entry_count())
            .filter_map(|index| memory.custom_trigger_entry(index))
            .filter(|entry| members.contains(&entry.event_id))
            .find_map(|entry| Some((entry, ctx.event(entry.event_id)?.custom_trigger?)));
        let Some((entry, trigger)) = stored else {
            return;
        };

        if let (Some(number), Some(data)) = (trigger.snapshot_record, &entry.snapshot) {
            self.snapshots.push(StoredRecord::new(number, data));
        }
        for (sample, data) in entry.samples.iter().take(trigger.max_samples as usize).enumerate() {
            let Some(number) = trigger.first_sample_record.checked_add(sample as u8) else {
                break;
            };
            self.snapshots.push(StoredRecord::new(number, data));
        }
    }

    fn holds_snapshot(&self, record_number: u8) -> bool {
        self.snapshots.iter().any(|record| record.number == record_number)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum RecordSelector {
    All,
    ObdExtended,
    Single(u8),
}

impl RecordSelector {
    fn selects(self, number: u8) -> bool {
        match self {
            RecordSelector::All => true,
            RecordSelector::ObdExtended => (FIRST_OBD_EXTENDED_RECORD..=LAST_OBD_EXTENDED_RECORD).contains(&number),
            RecordSelector::Single(selected) => selected == number,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct RecordSelection {
    selector: RecordSelector,
    position: usize,
}

impl RecordSelection {
    fn new(selector: RecordSelector) -> Self {
        Self { selector, position: 0 }
    }

    /// Writes the next selected record as `[number, data..]` and returns the number of bytes written.
    fn next(&mut self, records: &[StoredRecord], dest: &mut [u8]) -> Result<Option<usize>> {
        let Some((offset, record)) = records
            .iter()
            .enumerate()
            .skip(self.position)
            .find(|(_, record)| self.selector.selects(record.number))
        else {
            self.position = records.len();
            return Ok(None);
        };

        let mut buffer = DestinationBuffer::new(dest);
        if !buffer.has_space(1 + record.data.len()) {
            return Err(Error::BufferTooSmall);
        }
        buffer.write_u8(record.number)?;
        buffer.write_bytes(&record.data)?;

        self.position = offset + 1;
        Ok(Some(buffer.write_index()))
    }

    fn size(&self, records: &[StoredRecord]) -> usize {
        records
            .iter()
            .filter(|record| self.selector.selects(record.number))
            .map(|record| 1 + record.data.len())
            .sum()
    }
}

/// Per-client readout buffer.
#[derive(Debug, Clone, Default)]
pub struct ReadoutBuffer {
    copy: Option<ReadoutCopy>,
    freeze_frame: Option<RecordSelection>,
    extended: Option<RecordSelection>,
}

impl ReadoutBuffer {
    pub fn is_locked(&self) -> bool {
        self.copy.is_some()
    }

    /// Copies the event's records. Locking the already locked event keeps the existing copy.
    pub(crate) fn lock(&mut self, ctx: &RecordContext<'_>, event_id: EventId, origin: DtcOrigin) -> Result<()> {
        if matches!(&self.copy, Some(copy) if copy.event_id == event_id && copy.origin == origin) {
            return Ok(());
        }

        let members = ctx.config.group_members(event_id);
        let update_states = || -> Vec<u8> {
            members
                .iter()
                .map(|&member| ctx.memory.update_state(member))
                .collect()
        };

        let before = update_states();
        let copy = ReadoutCopy::from_memory(ctx, event_id, origin);
        let after = update_states();
        if before != after {
            debug!("Event {} modified while locking readout buffer", event_id);
            return Err(Error::Pending);
        }

        debug!("Locked readout buffer for event {} in {:?}", event_id, origin);
        *self = Self {
            copy: Some(copy),
            freeze_frame: None,
            extended: None,
        };
        Ok(())
    }

    pub fn release(&mut self) {
        if let Some(copy) = &self.copy {
            debug!("Released readout buffer for event {}", copy.event_id);
        }
        *self = Self::default();
    }

    pub(crate) fn select_freeze_frame(&mut self, ctx: &RecordContext<'_>, record_number: u8) -> Result<()> {
        let copy = self.copy.as_ref().ok_or(Error::WrongCondition)?;
        let selector = if record_number == ALL_RECORDS {
            RecordSelector::All
        } else {
            let configured = ctx
                .event(copy.source)
                .map(|event| {
                    event.is_snapshot_record_configured(
                        ctx.config.snapshot_numbering,
                        ctx.config.capabilities.global_snapshot,
                        record_number,
                    )
                })
                .unwrap_or(false);
            if !configured && !copy.holds_snapshot(record_number) {
                return Err(ClientError::WrongRecordNumber.into());
            }
            RecordSelector::Single(record_number)
        };
        self.freeze_frame = Some(RecordSelection::new(selector));
        Ok(())
    }

    pub(crate) fn next_freeze_frame(&mut self, dest: &mut [u8]) -> Result<Option<usize>> {
        let copy = self.copy.as_ref().ok_or(Error::WrongCondition)?;
        let selection = self.freeze_frame.as_mut().ok_or(Error::WrongCondition)?;
        selection.next(&copy.snapshots, dest)
    }

    pub(crate) fn freeze_frame_selection_size(&self) -> Result<usize> {
        let copy = self.copy.as_ref().ok_or(Error::WrongCondition)?;
        let selection = self.freeze_frame.as_ref().ok_or(Error::WrongCondition)?;
        Ok(selection.size(&copy.snapshots))
    }

    pub(crate) fn select_extended_record(&mut self, ctx: &RecordContext<'_>, record_number: u8) -> Result<()> {
        let copy = self.copy.as_ref().ok_or(Error::WrongCondition)?;
        let selector = match record_number {
            ALL_RECORDS => RecordSelector::All,
            ALL_OBD_EXTENDED_RECORDS => RecordSelector::ObdExtended,
            number => {
                let configured = ctx
                    .event(copy.source)
                    .map(|event| event.extended_records.contains(&number))
                    .unwrap_or(false);
                if !configured {
                    return Err(ClientError::WrongRecordNumber.into());
                }
                RecordSelector::Single(number)
            }
        };
        self.extended = Some(RecordSelection::new(selector));
        Ok(())
    }

    pub(crate) fn next_extended_record(&mut self, dest: &mut [u8]) -> Result<Option<usize>> {
        let copy = self.copy.as_ref().ok_or(Error::WrongCondition)?;
        let selection = self.extended.as_mut().ok_or(Error::WrongCondition)?;
        selection.next(&copy.extended, dest)
    }

    pub(crate) fn extended_selection_size(&self) -> Result<usize> {
        let copy = self.copy.as_ref().ok_or(Error::WrongCondition)?;
        let selection = self.extended.as_ref().ok_or(Error::WrongCondition)?;
        Ok(selection.size(&copy.extended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<StoredRecord> {
        vec![
            StoredRecord {
                number: 0x01,
                data: vec![0xaa, 0xbb],
            },
            StoredRecord {
                number: 0x91,
                data: vec![0xcc],
            },
        ]
    }

    #[test]
    fn selection_writes_number_and_data() {
        let records = records();
        let mut selection = RecordSelection::new(RecordSelector::All);
        let mut dest = [0u8; 8];

        assert_eq!(selection.size(&records), 5);
        assert_eq!(selection.next(&records, &mut dest).unwrap(), Some(3));
        assert_eq!(dest[..3], [0x01, 0xaa, 0xbb]);
        assert_eq!(selection.next(&records, &mut dest).unwrap(), Some(2));
        assert_eq!(dest[..2], [0x91, 0xcc]);
        assert_eq!(selection.next(&records, &mut dest).unwrap(), None);
    }

    #[test]
    fn small_buffer_keeps_position() {
        let records = records();
        let mut selection = RecordSelection::new(RecordSelector::Single(0x01));
        let mut dest = [0u8; 2];

        assert_eq!(selection.next(&records, &mut dest), Err(Error::BufferTooSmall));
        assert_eq!(selection.position, 0);

        let mut dest = [0u8; 3];
        assert_eq!(selection.next(&records, &mut dest).unwrap(), Some(3));
    }

    #[test]
    fn obd_extended_range() {
        let records = records();
        let selection = RecordSelection::new(RecordSelector::ObdExtended);
        assert_eq!(selection.size(&records), 2);
    }
}
