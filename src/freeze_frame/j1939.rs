//! J1939 freeze frame (DM04) and expanded freeze frame (DM25) iteration.
use tracing::debug;

use crate::buffer::DestinationBuffer;
use crate::config::{Config, FreezeFrameKind};
use crate::det::{ApiId, DetError, DevErrorHook};
use crate::dtc::{DtcFormat, DtcOrigin, EventId, NodeIndex};
use crate::{Error, Result};

use super::constants::PADDING;
use super::{expanded, FreezeFrameIterator, RecordContext};

/// Lifecycle of the J1939 freeze frame filter.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum J1939FilterState {
    #[default]
    Unused,
    Used,
    /// All entries including the OBD Mode 02 frame were reported
    Finished,
}

#[derive(Debug, Copy, Clone)]
pub(super) struct J1939Filter {
    pub(super) state: J1939FilterState,
    kind: FreezeFrameKind,
    node: NodeIndex,
    entry: usize,
    spn: usize,
}

impl Default for J1939Filter {
    fn default() -> Self {
        Self {
            state: J1939FilterState::Unused,
            kind: FreezeFrameKind::FreezeFrame,
            node: 0,
            entry: 0,
            spn: 0,
        }
    }
}

/// A J1939 freeze frame copied into the caller's buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct J1939FreezeFrame {
    pub dtc: u32,
    pub occurrence_counter: u8,
    /// Number of bytes written, always the configured record size
    pub length: usize,
}

/// SPN contained in the expanded freeze frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Spn {
    pub spn: u32,
    pub data_length: u8,
}

/// Copies `data` to the start of `dest` and fills the rest with [`PADDING`].
pub(super) fn write_padded(dest: &mut [u8], data: &[u8]) -> Result<()> {
    let mut buffer = DestinationBuffer::new(dest);
    let length = data.len().min(buffer.capacity());
    buffer.write_bytes(&data[..length])?;
    let remaining = buffer.remaining();
    buffer.fill(PADDING, remaining)
}

impl FreezeFrameIterator {
    /// Starts a J1939 freeze frame filter for `node`.
    pub fn start_j1939(&mut self, kind: FreezeFrameKind, node: NodeIndex) {
        debug!("Start J1939 freeze frame filter, {:?} node {}", kind, node);
        self.j1939 = J1939Filter {
            state: J1939FilterState::Used,
            kind,
            node,
            entry: 0,
            spn: 0,
        };
    }

    pub fn j1939_state(&self) -> J1939FilterState {
        self.j1939.state
    }

    /// Copies the next matching freeze frame into `dest`. Returns `Ok(None)` once all entries were reported.
    ///
    /// On [`Error::BufferTooSmall`] and [`Error::Pending`] the filter does not advance, so the call can be repeated.
    pub fn next_j1939_freeze_frame(
        &mut self,
        ctx: &RecordContext<'_>,
        dest: &mut [u8],
    ) -> Result<Option<J1939FreezeFrame>> {
        let filter = self.j1939;
        match filter.state {
            J1939FilterState::Unused => {
                ctx.det.report(ApiId::J1939GetNextFreezeFrame, DetError::Uninit);
                return Ok(None);
            }
            J1939FilterState::Finished => return Ok(None),
            J1939FilterState::Used => {}
        }

        let size = ctx.config.j1939.record_size(filter.kind);
        while self.j1939.entry < ctx.memory.entry_count(DtcOrigin::PrimaryMemory) {
            let index = self.j1939.entry;
            if let Some((event_id, dtc)) = candidate(ctx, &filter, index) {
                if dest.len() < size {
                    return Err(Error::BufferTooSmall);
                }
                let occurrence_counter = copy_entry_frame(ctx, index, event_id, filter.kind, &mut dest[..size])?;
                self.j1939.entry += 1;
                return Ok(Some(J1939FreezeFrame {
                    dtc,
                    occurrence_counter,
                    length: size,
                }));
            }
            self.j1939.entry += 1;
        }

        if filter.kind == FreezeFrameKind::ExpandedFreezeFrame && ctx.config.capabilities.obd_on_uds {
            let frame = expanded::read_mode02_frame(ctx, size, dest)?;
            self.j1939.state = J1939FilterState::Finished;
            return Ok(frame);
        }

        self.j1939.state = J1939FilterState::Finished;
        Ok(None)
    }

    /// Returns the next SPN of the expanded freeze frame layout.
    pub fn next_spn(&mut self, config: &Config, det: &dyn DevErrorHook) -> Option<Spn> {
        if self.j1939.state == J1939FilterState::Unused {
            det.report(ApiId::J1939GetNextSpnInFreezeFrame, DetError::Uninit);
            return None;
        }
        let descriptor = config.j1939.spns.get(self.j1939.spn)?;
        self.j1939.spn += 1;
        Some(Spn {
            spn: descriptor.spn,
            data_length: descriptor.data_length,
        })
    }
}

fn candidate(ctx: &RecordContext<'_>, filter: &J1939Filter, index: usize) -> Option<(EventId, u32)> {
    let entry = ctx.memory.entry(DtcOrigin::PrimaryMemory, index)?;
    let event_id = entry.event_id;
    if !ctx.is_visible(event_id, DtcFormat::J1939) {
        return None;
    }
    let event = ctx.event(event_id)?;
    if !event.has_freeze_frame(filter.kind) || !event.j1939_nodes.contains(&filter.node) {
        return None;
    }
    entry.freeze_frame(filter.kind)?;
    Some((event_id, ctx.config.dtc(event_id, DtcFormat::J1939)?))
}

/// Copies the frame of a primary entry. Fails with [`Error::Pending`] if the entry changed during the copy, `dest` is then left untouched.
fn copy_entry_frame(
    ctx: &RecordContext<'_>,
    index: usize,
    event_id: EventId,
    kind: FreezeFrameKind,
    dest: &mut [u8],
) -> Result<u8> {
    let mut staged = vec![PADDING; dest.len()];
    let before = ctx.memory.update_state(event_id);
    let data = ctx.memory.j1939_freeze_frame(index, kind).ok_or(Error::Pending)?;
    write_padded(&mut staged, data)?;

    let occurrence_counter = ctx
        .memory
        .entry(DtcOrigin::PrimaryMemory, index)
        .filter(|entry| entry.event_id == event_id)
        .map(|entry| entry.occurrence_counter);
    let after = ctx.memory.update_state(event_id);

    match occurrence_counter {
        Some(counter) if before == after => {
            dest.copy_from_slice(&staged);
            Ok(counter)
        }
        _ => {
            debug!("Event {} modified while copying J1939 freeze frame", event_id);
            Err(Error::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_padded() {
        let mut dest = [0u8; 6];
        write_padded(&mut dest, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(dest, [0x01, 0x02, 0x03, 0xff, 0xff, 0xff]);

        let mut dest = [0u8; 2];
        write_padded(&mut dest, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(dest, [0x01, 0x02]);
    }
}
