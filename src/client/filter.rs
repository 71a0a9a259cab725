//! DTC filters for UDS status reports and J1939 DM01/DM02/DM27 style reports.
use tracing::debug;

use crate::config::Config;
use crate::dtc::{status_bit, DtcFormat, DtcOrigin, EventId, NodeIndex};
use crate::freeze_frame::RecordContext;
use crate::memory::EventMemory;
use crate::{Error, Result};

/// Filter criteria of a UDS DTC status report.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DtcFilterCriteria {
    /// DTCs match if any masked status bit is set. 0 matches all DTCs.
    pub status_mask: u8,
    pub format: DtcFormat,
    pub origin: DtcOrigin,
    /// DTCs match if any severity bit is shared
    pub severity: Option<u8>,
}

impl DtcFilterCriteria {
    pub fn new(status_mask: u8, format: DtcFormat, origin: DtcOrigin) -> Self {
        Self {
            status_mask,
            format,
            origin,
            severity: None,
        }
    }
}

/// Status class of a J1939 DTC report.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum J1939DtcKind {
    /// DM01
    Active,
    /// DM02
    PreviouslyActive,
    /// DM06
    Pending,
    All,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilteredDtc {
    pub dtc: u32,
    pub status: u8,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilteredJ1939Dtc {
    pub dtc: u32,
    pub occurrence_counter: u8,
}

pub(crate) fn is_active(status: u8) -> bool {
    status & status_bit::TEST_FAILED != 0 && status & status_bit::CONFIRMED_DTC != 0
}

pub(crate) fn is_previously_active(status: u8) -> bool {
    status & status_bit::TEST_FAILED == 0 && status & status_bit::CONFIRMED_DTC != 0
}

/// Status of the DTC reported by `event_id`. Combined groups report the OR of their members.
pub(crate) fn combined_status(config: &Config, memory: &dyn EventMemory, event_id: EventId) -> u8 {
    config
        .group_members(event_id)
        .iter()
        .fold(0, |status, &member| status | memory.event_status(member))
        & config.status_availability_mask
}

/// Whether an event belongs to a memory. Secondary memories also hold copies of other events.
pub(crate) fn is_in_origin(ctx: &RecordContext<'_>, event_id: EventId, origin: DtcOrigin) -> bool {
    let configured = ctx
        .config
        .event(event_id)
        .map(|event| event.origin.physical() == origin.physical())
        .unwrap_or(false);
    configured || ctx.memory.find_entry(origin, event_id).is_some()
}

fn match_uds(ctx: &RecordContext<'_>, criteria: &DtcFilterCriteria, event_id: EventId) -> Option<FilteredDtc> {
    if !ctx.config.is_group_master(event_id) || !ctx.is_visible(event_id, criteria.format) {
        return None;
    }
    let event = ctx.event(event_id)?;
    if !is_in_origin(ctx, event_id, criteria.origin) {
        return None;
    }
    if criteria.severity.is_some_and(|severity| event.severity & severity == 0) {
        return None;
    }

    let status = combined_status(ctx.config, ctx.memory, event_id);
    if criteria.status_mask != 0 && status & criteria.status_mask == 0 {
        return None;
    }
    Some(FilteredDtc {
        dtc: ctx.config.dtc(event_id, criteria.format)?,
        status,
    })
}

fn match_j1939(ctx: &RecordContext<'_>, kind: J1939DtcKind, node: NodeIndex, event_id: EventId) -> Option<FilteredJ1939Dtc> {
    if !ctx.config.is_group_master(event_id)
        || !ctx.is_visible(event_id, DtcFormat::J1939)
        || !ctx.config.is_assigned_to_node(event_id, node)
    {
        return None;
    }

    let status = combined_status(ctx.config, ctx.memory, event_id);
    let matches = match kind {
        J1939DtcKind::Active => is_active(status),
        J1939DtcKind::PreviouslyActive => is_previously_active(status),
        J1939DtcKind::Pending => status & status_bit::PENDING_DTC != 0,
        J1939DtcKind::All => true,
    };
    if !matches {
        return None;
    }

    let occurrence_counter = ctx
        .memory
        .find_entry(DtcOrigin::PrimaryMemory, event_id)
        .map(|(_, entry)| entry.occurrence_counter)
        .unwrap_or(0);
    Some(FilteredJ1939Dtc {
        dtc: ctx.config.dtc(event_id, DtcFormat::J1939)?,
        occurrence_counter,
    })
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
enum FilterMode {
    #[default]
    Unset,
    Uds(DtcFilterCriteria),
    J1939 {
        kind: J1939DtcKind,
        node: NodeIndex,
    },
}

/// Per-client DTC filter. Walks the event table in id order, one DTC per call.
#[derive(Debug, Clone, Default)]
pub struct DtcFilter {
    mode: FilterMode,
    next_event: usize,
}

impl DtcFilter {
    pub fn set_uds(&mut self, criteria: DtcFilterCriteria) {
        debug!("Set DTC filter {:?}", criteria);
        self.mode = FilterMode::Uds(criteria);
        self.next_event = 1;
    }

    pub fn set_j1939(&mut self, kind: J1939DtcKind, node: NodeIndex) {
        debug!("Set J1939 DTC filter {:?} node {}", kind, node);
        self.mode = FilterMode::J1939 { kind, node };
        self.next_event = 1;
    }

    /// Number of DTCs a full pass reports. Does not move the cursor.
    pub fn count(&self, ctx: &RecordContext<'_>) -> Result<u16> {
        let count = match self.mode {
            FilterMode::Unset => return Err(Error::WrongCondition),
            FilterMode::Uds(criteria) => ctx
                .config
                .event_ids()
                .filter(|&event_id| match_uds(ctx, &criteria, event_id).is_some())
                .count(),
            FilterMode::J1939 { kind, node } => ctx
                .config
                .event_ids()
                .filter(|&event_id| match_j1939(ctx, kind, node, event_id).is_some())
                .count(),
        };
        Ok(u16::try_from(count).unwrap_or(u16::MAX))
    }

    pub fn next_uds(&mut self, ctx: &RecordContext<'_>) -> Result<Option<FilteredDtc>> {
        let FilterMode::Uds(criteria) = self.mode else {
            return Err(Error::WrongCondition);
        };
        Ok(self.advance(ctx, |event_id| match_uds(ctx, &criteria, event_id)))
    }

    pub fn next_j1939(&mut self, ctx: &RecordContext<'_>) -> Result<Option<FilteredJ1939Dtc>> {
        let FilterMode::J1939 { kind, node } = self.mode else {
            return Err(Error::WrongCondition);
        };
        Ok(self.advance(ctx, |event_id| match_j1939(ctx, kind, node, event_id)))
    }

    fn advance<T>(&mut self, ctx: &RecordContext<'_>, mut matcher: impl FnMut(EventId) -> Option<T>) -> Option<T> {
        while self.next_event < ctx.config.events.len() {
            let event_id = self.next_event as EventId;
            self.next_event += 1;
            if let Some(found) = matcher(event_id) {
                return Some(found);
            }
        }
        None
    }
}
