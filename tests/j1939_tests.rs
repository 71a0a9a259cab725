use std::cell::{Cell, RefCell};

use automotive_dem::config::{Config, EventConfig, FreezeFrameKind, J1939Node, SpnDescriptor};
use automotive_dem::det::{ApiId, DetError, DevErrorHook, NoOpDevErrorHook};
use automotive_dem::dtc::{DtcMapping, DtcOrigin, EventId};
use automotive_dem::freeze_frame::{FreezeFrameIterator, J1939FilterState, J1939FreezeFrame, RecordContext, Spn};
use automotive_dem::memory::{
    CustomTriggerEntry, EventEntry, EventMemory, MemoryStore, NvError, ObdCounters, ObdFreezeFrame, TimeSeriesEntry,
};
use automotive_dem::Error;

const ACTIVE_DTC: u32 = 0x0102_03;
const MODE02_DTC: u32 = 0x0a0b_0c;

/// Memory that simulates a writer running in the middle of a copy.
struct TornMemory {
    inner: MemoryStore,
    tears: Cell<u8>,
}

impl TornMemory {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            tears: Cell::new(0),
        }
    }

    fn tear(&self, event_id: EventId) {
        if self.tears.get() > 0 {
            self.tears.set(self.tears.get() - 1);
            self.inner.mark_modified(event_id);
        }
    }
}

impl EventMemory for TornMemory {
    fn entry_count(&self, origin: DtcOrigin) -> usize {
        self.inner.entry_count(origin)
    }
    fn entry(&self, origin: DtcOrigin, index: usize) -> Option<&EventEntry> {
        self.inner.entry(origin, index)
    }
    fn update_state(&self, event_id: EventId) -> u8 {
        self.inner.update_state(event_id)
    }
    fn event_status(&self, event_id: EventId) -> u8 {
        self.inner.event_status(event_id)
    }
    fn is_dtc_suppressed(&self, event_id: EventId) -> bool {
        self.inner.is_dtc_suppressed(event_id)
    }
    fn is_event_available(&self, event_id: EventId) -> bool {
        self.inner.is_event_available(event_id)
    }
    fn obd_freeze_frame_count(&self) -> usize {
        self.inner.obd_freeze_frame_count()
    }
    fn obd_freeze_frame(&self, slot: usize) -> Option<&ObdFreezeFrame> {
        self.inner.obd_freeze_frame(slot)
    }
    fn mode02_slot(&self) -> Option<usize> {
        self.inner.mode02_slot()
    }
    fn time_series_entry_count(&self) -> usize {
        self.inner.time_series_entry_count()
    }
    fn time_series_entry(&self, index: usize) -> Option<&TimeSeriesEntry> {
        self.inner.time_series_entry(index)
    }
    fn custom_trigger_entry_count(&self) -> usize {
        self.inner.custom_trigger_entry_count()
    }
    fn custom_trigger_entry(&self, index: usize) -> Option<&CustomTriggerEntry> {
        self.inner.custom_trigger_entry(index)
    }
    fn obd_counters(&self) -> ObdCounters {
        self.inner.obd_counters()
    }
    fn clear_event(&mut self, origin: DtcOrigin, event_id: EventId) -> Result<(), NvError> {
        self.inner.clear_event(origin, event_id)
    }
    fn set_dtc_suppression(&mut self, event_id: EventId, suppressed: bool) {
        self.inner.set_dtc_suppression(event_id, suppressed)
    }

    fn j1939_freeze_frame(&self, index: usize, kind: FreezeFrameKind) -> Option<&[u8]> {
        let entry = self.inner.entry(DtcOrigin::PrimaryMemory, index)?;
        self.tear(entry.event_id);
        entry.freeze_frame(kind)
    }

    fn obd_freeze_frame_data(&self, slot: usize) -> Option<&[u8]> {
        let frame = self.inner.obd_freeze_frame(slot)?;
        self.tear(frame.event_id);
        Some(frame.data.as_slice())
    }
}

#[derive(Default)]
struct Recorder(RefCell<Vec<(ApiId, DetError)>>);
impl DevErrorHook for Recorder {
    fn report(&self, api: ApiId, error: DetError) {
        self.0.borrow_mut().push((api, error));
    }
}

fn j1939_dtc(dtc: u32) -> DtcMapping {
    DtcMapping {
        j1939: Some(dtc),
        ..Default::default()
    }
}

/// Event 1 stores a DM04 and a DM25 frame for node 0, event 2 belongs to node 1, event 3 owns the Mode 02 OBD freeze frame.
fn setup() -> (Config, TornMemory) {
    let mut config = Config::new();
    config.j1939.nodes = vec![J1939Node { address: 0x00 }, J1939Node { address: 0x17 }];
    config.j1939.spns = vec![
        SpnDescriptor {
            spn: 190,
            data_length: 2,
        },
        SpnDescriptor {
            spn: 110,
            data_length: 1,
        },
    ];
    config.capabilities.obd_on_uds = true;

    let active = config.add_event(EventConfig {
        j1939_freeze_frame: true,
        j1939_expanded_freeze_frame: true,
        j1939_nodes: vec![0],
        ..EventConfig::new(j1939_dtc(ACTIVE_DTC))
    });
    let other_node = config.add_event(EventConfig {
        j1939_freeze_frame: true,
        j1939_nodes: vec![1],
        ..EventConfig::new(j1939_dtc(0x0f0f0f))
    });
    let mode02 = config.add_event(EventConfig {
        obd_related: true,
        ..EventConfig::new(j1939_dtc(MODE02_DTC))
    });

    let mut memory = MemoryStore::new(&config, 4);
    let mut entry = EventEntry::new(other_node);
    entry.j1939_freeze_frame = Some(vec![0xee; 8]);
    memory.store_primary_entry(entry);

    let mut entry = EventEntry::new(active);
    entry.occurrence_counter = 5;
    entry.j1939_freeze_frame = Some(vec![0x01, 0x02, 0x03]);
    entry.j1939_expanded_freeze_frame = Some(vec![0x11; 10]);
    memory.store_primary_entry(entry);

    let slot = memory.store_obd_freeze_frame(mode02, &[0xaa, 0xbb]);
    memory.set_mode02_slot(Some(slot));

    (config, TornMemory::new(memory))
}

#[test]
fn freeze_frame_is_padded_to_record_size() {
    let (config, memory) = setup();
    let ctx = RecordContext::new(&config, &memory, &NoOpDevErrorHook);
    let mut iterator = FreezeFrameIterator::new();
    iterator.start_j1939(FreezeFrameKind::FreezeFrame, 0);
    assert_eq!(iterator.j1939_state(), J1939FilterState::Used);

    let mut dest = [0u8; 12];
    let frame = iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap();

    assert_eq!(
        frame,
        Some(J1939FreezeFrame {
            dtc: ACTIVE_DTC,
            occurrence_counter: 5,
            length: 8,
        })
    );
    assert_eq!(dest, [0x01, 0x02, 0x03, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00]);

    assert_eq!(iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap(), None);
    assert_eq!(iterator.j1939_state(), J1939FilterState::Finished);
    assert_eq!(iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap(), None);
}

#[test]
fn small_buffer_is_not_written() {
    let (config, memory) = setup();
    let ctx = RecordContext::new(&config, &memory, &NoOpDevErrorHook);
    let mut iterator = FreezeFrameIterator::new();
    iterator.start_j1939(FreezeFrameKind::FreezeFrame, 0);

    let mut small = [0u8; 4];
    assert_eq!(iterator.next_j1939_freeze_frame(&ctx, &mut small), Err(Error::BufferTooSmall));
    assert_eq!(small, [0u8; 4]);

    let mut dest = [0u8; 8];
    let frame = iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap();
    assert_eq!(frame.map(|frame| frame.dtc), Some(ACTIVE_DTC));
}

#[test]
fn concurrent_modification_is_retried() {
    let (config, memory) = setup();
    let ctx = RecordContext::new(&config, &memory, &NoOpDevErrorHook);
    let mut iterator = FreezeFrameIterator::new();
    iterator.start_j1939(FreezeFrameKind::FreezeFrame, 0);

    memory.tears.set(1);
    let mut dest = [0u8; 8];
    assert_eq!(iterator.next_j1939_freeze_frame(&ctx, &mut dest), Err(Error::Pending));
    assert_eq!(dest, [0u8; 8]);

    let frame = iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap();
    assert_eq!(frame.map(|frame| frame.occurrence_counter), Some(5));
    assert_eq!(dest[..3], [0x01, 0x02, 0x03]);
}

#[test]
fn expanded_walk_ends_with_mode02_frame() {
    let (config, memory) = setup();
    let ctx = RecordContext::new(&config, &memory, &NoOpDevErrorHook);
    let mut iterator = FreezeFrameIterator::new();
    iterator.start_j1939(FreezeFrameKind::ExpandedFreezeFrame, 0);

    let mut dest = [0u8; 16];
    let frame = iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap();
    assert_eq!(frame.map(|frame| (frame.dtc, frame.length)), Some((ACTIVE_DTC, 16)));
    assert_eq!(dest[..10], [0x11; 10]);
    assert_eq!(dest[10..], [0xff; 6]);

    let frame = iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap();
    assert_eq!(
        frame,
        Some(J1939FreezeFrame {
            dtc: MODE02_DTC,
            occurrence_counter: 0,
            length: 16,
        })
    );
    assert_eq!(dest[..3], [0xaa, 0xbb, 0xff]);
    assert_eq!(iterator.j1939_state(), J1939FilterState::Finished);
    assert_eq!(iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap(), None);
}

#[test]
fn mode02_frame_is_retried_after_modification() {
    let (config, memory) = setup();
    let ctx = RecordContext::new(&config, &memory, &NoOpDevErrorHook);
    let mut iterator = FreezeFrameIterator::new();
    iterator.start_j1939(FreezeFrameKind::ExpandedFreezeFrame, 0);

    let mut dest = [0u8; 16];
    iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap();

    memory.tears.set(1);
    assert_eq!(iterator.next_j1939_freeze_frame(&ctx, &mut dest), Err(Error::Pending));
    assert_eq!(iterator.j1939_state(), J1939FilterState::Used);

    let frame = iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap();
    assert_eq!(frame.map(|frame| frame.dtc), Some(MODE02_DTC));
}

#[test]
fn mode02_frame_requires_obd_on_uds() {
    let (mut config, memory) = setup();
    config.capabilities.obd_on_uds = false;
    let ctx = RecordContext::new(&config, &memory, &NoOpDevErrorHook);
    let mut iterator = FreezeFrameIterator::new();
    iterator.start_j1939(FreezeFrameKind::ExpandedFreezeFrame, 0);

    let mut dest = [0u8; 16];
    assert!(iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap().is_some());
    assert_eq!(iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap(), None);
}

#[test]
fn frames_are_filtered_by_node() {
    let (config, memory) = setup();
    let ctx = RecordContext::new(&config, &memory, &NoOpDevErrorHook);
    let mut iterator = FreezeFrameIterator::new();
    iterator.start_j1939(FreezeFrameKind::FreezeFrame, 1);

    let mut dest = [0u8; 8];
    let frame = iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap();
    assert_eq!(frame.map(|frame| frame.dtc), Some(0x0f0f0f));
    assert_eq!(dest, [0xee; 8]);
    assert_eq!(iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap(), None);
}

#[test]
fn spn_walk() {
    let (config, memory) = setup();
    let hook = Recorder::default();
    let ctx = RecordContext::new(&config, &memory, &hook);
    let mut iterator = FreezeFrameIterator::new();

    assert_eq!(iterator.next_spn(&config, &hook), None);
    let mut dest = [0u8; 8];
    assert_eq!(iterator.next_j1939_freeze_frame(&ctx, &mut dest).unwrap(), None);
    assert_eq!(
        hook.0.borrow().as_slice(),
        &[
            (ApiId::J1939GetNextSpnInFreezeFrame, DetError::Uninit),
            (ApiId::J1939GetNextFreezeFrame, DetError::Uninit),
        ]
    );

    iterator.start_j1939(FreezeFrameKind::ExpandedFreezeFrame, 0);
    assert_eq!(
        iterator.next_spn(&config, &hook),
        Some(Spn {
            spn: 190,
            data_length: 2
        })
    );
    assert_eq!(
        iterator.next_spn(&config, &hook),
        Some(Spn {
            spn: 110,
            data_length: 1
        })
    );
    assert_eq!(iterator.next_spn(&config, &hook), None);
}
