//! Expanded freeze frame built from the OBD freeze frame selected for Mode 02.
use tracing::debug;

use crate::dtc::{DtcFormat, DtcOrigin};
use crate::{Error, Result};

use super::constants::PADDING;
use super::j1939::{write_padded, J1939FreezeFrame};
use super::RecordContext;

/// Copies the Mode 02 freeze frame into `dest`. The frame is not bound to a J1939 node.
pub(super) fn read_mode02_frame(
    ctx: &RecordContext<'_>,
    size: usize,
    dest: &mut [u8],
) -> Result<Option<J1939FreezeFrame>> {
    let Some(slot) = ctx.memory.mode02_slot() else {
        return Ok(None);
    };
    let Some(event_id) = ctx.memory.obd_freeze_frame(slot).map(|frame| frame.event_id) else {
        return Ok(None);
    };
    if !ctx.is_visible(event_id, DtcFormat::J1939) {
        return Ok(None);
    }
    let Some(dtc) = ctx.config.dtc(event_id, DtcFormat::J1939) else {
        return Ok(None);
    };
    if dest.len() < size {
        return Err(Error::BufferTooSmall);
    }

    let mut staged = vec![PADDING; size];
    let before = ctx.memory.update_state(event_id);
    let data = ctx.memory.obd_freeze_frame_data(slot).ok_or(Error::Pending)?;
    write_padded(&mut staged, data)?;

    let occurrence_counter = ctx
        .memory
        .find_entry(DtcOrigin::PrimaryMemory, event_id)
        .map(|(_, entry)| entry.occurrence_counter)
        .unwrap_or(0);
    let slot_event = ctx.memory.obd_freeze_frame(slot).map(|frame| frame.event_id);
    let after = ctx.memory.update_state(event_id);

    if before != after || slot_event != Some(event_id) {
        debug!("Mode 02 freeze frame of event {} changed during copy", event_id);
        return Err(Error::Pending);
    }

    dest[..size].copy_from_slice(&staged);
    Ok(Some(J1939FreezeFrame {
        dtc,
        occurrence_counter,
        length: size,
    }))
}
