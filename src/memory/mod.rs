//! Event memory accessors. The event memory is owned by the embedding application and shared with writers running at higher priority, so readers never lock it. Instead every mutation of an event's data increments the event's update state, and readers compare the update state before and after copying.
//!
//! [`MemoryStore`] is a complete in-memory implementation of [`EventMemory`].

mod types;

pub use types::*;

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

use crate::config::{Config, FreezeFrameKind};
use crate::dtc::{status_bit, DtcOrigin, EventId};

/// Read access to stored event data, plus the few mutations requested through the client API.
pub trait EventMemory {
    /// Number of entry slots of a memory, 0 for unknown memories
    fn entry_count(&self, origin: DtcOrigin) -> usize;
    /// Entry in a slot, `None` for free slots
    fn entry(&self, origin: DtcOrigin, index: usize) -> Option<&EventEntry>;
    /// Update sequence marker of an event, changes on every modification of the event's stored data
    fn update_state(&self, event_id: EventId) -> u8;
    /// UDS status byte of an event
    fn event_status(&self, event_id: EventId) -> u8;
    fn is_dtc_suppressed(&self, event_id: EventId) -> bool;
    fn is_event_available(&self, event_id: EventId) -> bool;

    fn obd_freeze_frame_count(&self) -> usize;
    fn obd_freeze_frame(&self, slot: usize) -> Option<&ObdFreezeFrame>;
    /// Slot currently selected for OBD Mode 02. Can change at any time.
    fn mode02_slot(&self) -> Option<usize>;

    fn time_series_entry_count(&self) -> usize;
    fn time_series_entry(&self, index: usize) -> Option<&TimeSeriesEntry>;

    fn custom_trigger_entry_count(&self) -> usize;
    fn custom_trigger_entry(&self, index: usize) -> Option<&CustomTriggerEntry>;

    fn obd_counters(&self) -> ObdCounters;

    /// Removes all stored data of an event from a memory and resets its status.
    fn clear_event(&mut self, origin: DtcOrigin, event_id: EventId) -> Result<(), NvError>;
    fn set_dtc_suppression(&mut self, event_id: EventId, suppressed: bool);

    /// Locates the entry of an event.
    fn find_entry(&self, origin: DtcOrigin, event_id: EventId) -> Option<(usize, &EventEntry)> {
        (0..self.entry_count(origin))
            .filter_map(|index| self.entry(origin, index).map(|entry| (index, entry)))
            .find(|(_, entry)| entry.event_id == event_id)
    }

    /// Raw J1939 freeze frame bytes of a primary memory entry.
    fn j1939_freeze_frame(&self, index: usize, kind: FreezeFrameKind) -> Option<&[u8]> {
        self.entry(DtcOrigin::PrimaryMemory, index)
            .and_then(|entry| entry.freeze_frame(kind))
    }

    /// Raw bytes of an OBD freeze frame slot.
    fn obd_freeze_frame_data(&self, slot: usize) -> Option<&[u8]> {
        self.obd_freeze_frame(slot).map(|frame| frame.data.as_slice())
    }
}

struct MemoryBank {
    origin: DtcOrigin,
    entries: Vec<Option<EventEntry>>,
}

/// In-memory event memory with a fixed number of slots per memory.
pub struct MemoryStore {
    banks: Vec<MemoryBank>,
    obd_freeze_frames: Vec<Option<ObdFreezeFrame>>,
    mode02_slot: Option<usize>,
    time_series: Vec<Option<TimeSeriesEntry>>,
    custom_triggers: Vec<Option<CustomTriggerEntry>>,
    update_states: Vec<AtomicU8>,
    statuses: Vec<u8>,
    suppressed: Vec<bool>,
    available: Vec<bool>,
    counters: ObdCounters,
    nv_failure: bool,
}

impl MemoryStore {
    /// Creates a store for all events of `config` with `primary_size` primary memory slots.
    pub fn new(config: &Config, primary_size: usize) -> Self {
        let event_count = config.events.len();
        Self {
            banks: vec![MemoryBank {
                origin: DtcOrigin::PrimaryMemory,
                entries: vec![None; primary_size],
            }],
            obd_freeze_frames: vec![],
            mode02_slot: None,
            time_series: vec![],
            custom_triggers: vec![],
            update_states: (0..event_count).map(|_| AtomicU8::new(0)).collect(),
            statuses: vec![0; event_count],
            suppressed: vec![false; event_count],
            available: vec![true; event_count],
            counters: ObdCounters::default(),
            nv_failure: false,
        }
    }

    /// Adds a secondary memory such as the mirror or a user defined memory.
    pub fn add_memory(&mut self, origin: DtcOrigin, size: usize) {
        let origin = origin.physical();
        if self.bank(origin).is_none() {
            self.banks.push(MemoryBank {
                origin,
                entries: vec![None; size],
            });
        }
    }

    fn bank(&self, origin: DtcOrigin) -> Option<&MemoryBank> {
        let origin = origin.physical();
        self.banks.iter().find(|bank| bank.origin == origin)
    }

    fn bank_mut(&mut self, origin: DtcOrigin) -> Option<&mut MemoryBank> {
        let origin = origin.physical();
        self.banks.iter_mut().find(|bank| bank.origin == origin)
    }

    /// Signals a modification of the event's data. Safe to call through a shared reference from a concurrent writer.
    pub fn mark_modified(&self, event_id: EventId) {
        if let Some(state) = self.update_states.get(event_id as usize) {
            state.fetch_add(1, Ordering::Release);
        }
    }

    /// Stores an entry, replacing an existing entry of the same event. Returns the slot, or `None` when the memory is full.
    pub fn store_entry(&mut self, origin: DtcOrigin, entry: EventEntry) -> Option<usize> {
        let event_id = entry.event_id;
        let bank = self.bank_mut(origin)?;
        let slot = bank
            .entries
            .iter()
            .position(|slot| matches!(slot, Some(stored) if stored.event_id == event_id))
            .or_else(|| bank.entries.iter().position(|slot| slot.is_none()))?;
        bank.entries[slot] = Some(entry);
        self.mark_modified(event_id);
        Some(slot)
    }

    pub fn store_primary_entry(&mut self, entry: EventEntry) -> Option<usize> {
        self.store_entry(DtcOrigin::PrimaryMemory, entry)
    }

    /// Mutable access to a stored entry. Counts as a modification.
    pub fn entry_mut(&mut self, origin: DtcOrigin, event_id: EventId) -> Option<&mut EventEntry> {
        self.mark_modified(event_id);
        self.bank_mut(origin)?
            .entries
            .iter_mut()
            .flatten()
            .find(|entry| entry.event_id == event_id)
    }

    pub fn set_event_status(&mut self, event_id: EventId, status: u8) {
        if let Some(stored) = self.statuses.get_mut(event_id as usize) {
            *stored = status;
        }
    }

    pub fn set_event_available(&mut self, event_id: EventId, available: bool) {
        if let Some(stored) = self.available.get_mut(event_id as usize) {
            *stored = available;
        }
    }

    /// Stores an OBD freeze frame in the first free shadow slot and returns the slot.
    pub fn store_obd_freeze_frame(&mut self, event_id: EventId, data: &[u8]) -> usize {
        let frame = ObdFreezeFrame {
            event_id,
            data: data.to_vec(),
        };
        self.mark_modified(event_id);
        store_in_free_slot(&mut self.obd_freeze_frames, frame)
    }

    pub fn set_mode02_slot(&mut self, slot: Option<usize>) {
        self.mode02_slot = slot;
    }

    pub fn store_time_series_entry(&mut self, entry: TimeSeriesEntry) -> usize {
        self.mark_modified(entry.event_id);
        store_in_free_slot(&mut self.time_series, entry)
    }

    pub fn store_custom_trigger_entry(&mut self, entry: CustomTriggerEntry) -> usize {
        self.mark_modified(entry.event_id);
        store_in_free_slot(&mut self.custom_triggers, entry)
    }

    pub fn counters_mut(&mut self) -> &mut ObdCounters {
        &mut self.counters
    }

    /// Makes subsequent clears report an NV write failure.
    pub fn set_nv_failure(&mut self, failure: bool) {
        self.nv_failure = failure;
    }
}

fn store_in_free_slot<T>(slots: &mut Vec<Option<T>>, value: T) -> usize {
    match slots.iter().position(|slot| slot.is_none()) {
        Some(index) => {
            slots[index] = Some(value);
            index
        }
        None => {
            slots.push(Some(value));
            slots.len() - 1
        }
    }
}

impl EventMemory for MemoryStore {
    fn entry_count(&self, origin: DtcOrigin) -> usize {
        self.bank(origin).map(|bank| bank.entries.len()).unwrap_or(0)
    }

    fn entry(&self, origin: DtcOrigin, index: usize) -> Option<&EventEntry> {
        self.bank(origin)?.entries.get(index)?.as_ref()
    }

    fn update_state(&self, event_id: EventId) -> u8 {
        self.update_states
            .get(event_id as usize)
            .map(|state| state.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    fn event_status(&self, event_id: EventId) -> u8 {
        self.statuses.get(event_id as usize).copied().unwrap_or(0)
    }

    fn is_dtc_suppressed(&self, event_id: EventId) -> bool {
        self.suppressed.get(event_id as usize).copied().unwrap_or(false)
    }

    fn is_event_available(&self, event_id: EventId) -> bool {
        self.available.get(event_id as usize).copied().unwrap_or(false)
    }

    fn obd_freeze_frame_count(&self) -> usize {
        self.obd_freeze_frames.len()
    }

    fn obd_freeze_frame(&self, slot: usize) -> Option<&ObdFreezeFrame> {
        self.obd_freeze_frames.get(slot)?.as_ref()
    }

    fn mode02_slot(&self) -> Option<usize> {
        self.mode02_slot
    }

    fn time_series_entry_count(&self) -> usize {
        self.time_series.len()
    }

    fn time_series_entry(&self, index: usize) -> Option<&TimeSeriesEntry> {
        self.time_series.get(index)?.as_ref()
    }

    fn custom_trigger_entry_count(&self) -> usize {
        self.custom_triggers.len()
    }

    fn custom_trigger_entry(&self, index: usize) -> Option<&CustomTriggerEntry> {
        self.custom_triggers.get(index)?.as_ref()
    }

    fn obd_counters(&self) -> ObdCounters {
        self.counters
    }

    fn clear_event(&mut self, origin: DtcOrigin, event_id: EventId) -> Result<(), NvError> {
        let origin = origin.physical();
        if let Some(bank) = self.bank_mut(origin) {
            for slot in bank.entries.iter_mut() {
                if matches!(slot, Some(entry) if entry.event_id == event_id) {
                    *slot = None;
                }
            }
        }

        if origin == DtcOrigin::PrimaryMemory {
            for (index, slot) in self.obd_freeze_frames.iter_mut().enumerate() {
                if matches!(slot, Some(frame) if frame.event_id == event_id) {
                    *slot = None;
                    if self.mode02_slot == Some(index) {
                        self.mode02_slot = None;
                    }
                }
            }
            for slot in self.time_series.iter_mut() {
                if matches!(slot, Some(entry) if entry.event_id == event_id) {
                    *slot = None;
                }
            }
            for slot in self.custom_triggers.iter_mut() {
                if matches!(slot, Some(entry) if entry.event_id == event_id) {
                    *slot = None;
                }
            }
            self.set_event_status(event_id, status_bit::CLEARED);
        }

        self.mark_modified(event_id);
        debug!("Cleared event {} from {:?}", event_id, origin);

        if self.nv_failure {
            return Err(NvError);
        }
        Ok(())
    }

    fn set_dtc_suppression(&mut self, event_id: EventId, suppressed: bool) {
        if let Some(stored) = self.suppressed.get_mut(event_id as usize) {
            *stored = suppressed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;
    use crate::dtc::DtcMapping;

    fn store() -> (MemoryStore, EventId, EventId) {
        let mut config = Config::new();
        let a = config.add_event(EventConfig::new(DtcMapping::uds(0x010101)));
        let b = config.add_event(EventConfig::new(DtcMapping::uds(0x020202)));
        (MemoryStore::new(&config, 2), a, b)
    }

    #[test]
    fn entries_use_fixed_slots() {
        let (mut memory, a, b) = store();

        assert_eq!(memory.store_primary_entry(EventEntry::new(a)), Some(0));
        assert_eq!(memory.store_primary_entry(EventEntry::new(b)), Some(1));
        assert_eq!(memory.store_primary_entry(EventEntry::new(a)), Some(0));
        assert_eq!(memory.store_primary_entry(EventEntry::new(3)), None);

        assert_eq!(memory.find_entry(DtcOrigin::PrimaryMemory, b).map(|(index, _)| index), Some(1));
        assert_eq!(memory.entry_count(DtcOrigin::MirrorMemory), 0);
    }

    #[test]
    fn modifications_change_update_state() {
        let (mut memory, a, _) = store();
        let before = memory.update_state(a);

        memory.store_primary_entry(EventEntry::new(a));
        assert_ne!(memory.update_state(a), before);

        let before = memory.update_state(a);
        memory.mark_modified(a);
        assert_ne!(memory.update_state(a), before);
    }

    #[test]
    fn clear_removes_all_tiers() {
        let (mut memory, a, b) = store();
        memory.store_primary_entry(EventEntry::new(a));
        let slot = memory.store_obd_freeze_frame(a, &[0x01]);
        memory.set_mode02_slot(Some(slot));
        memory.store_custom_trigger_entry(CustomTriggerEntry {
            event_id: a,
            snapshot: None,
            samples: vec![],
        });
        memory.store_obd_freeze_frame(b, &[0x02]);
        memory.set_event_status(a, status_bit::CONFIRMED_DTC);

        memory.clear_event(DtcOrigin::PrimaryMemory, a).unwrap();

        assert!(memory.find_entry(DtcOrigin::PrimaryMemory, a).is_none());
        assert!(memory.obd_freeze_frame(slot).is_none());
        assert!(memory.obd_freeze_frame(1).is_some());
        assert_eq!(memory.mode02_slot(), None);
        assert!(memory.custom_trigger_entry(0).is_none());
        assert_eq!(memory.event_status(a), status_bit::CLEARED);

        memory.set_nv_failure(true);
        assert_eq!(memory.clear_event(DtcOrigin::PrimaryMemory, b), Err(NvError));
    }
}
