//! J1939 diagnostic readiness messages DM05, DM21 and DM26.
use strum::IntoEnumIterator;

use crate::config::ReadinessGroup;
use crate::dtc::{DtcFormat, NodeIndex};
use crate::freeze_frame::RecordContext;

use super::filter::{combined_status, is_active, is_previously_active};

/// Value reported for unsupported 16 bit parameters
pub const NOT_AVAILABLE_U16: u16 = 0xffff;
/// Value reported for unsupported 8 bit parameters
pub const NOT_AVAILABLE_U8: u8 = 0xff;

/// DM05
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticReadiness1 {
    pub active_trouble_codes: u8,
    pub previously_active_trouble_codes: u8,
    pub obd_compliance: u8,
    pub continuous_monitors_support: u8,
    /// Bit set: monitor not complete
    pub continuous_monitors_status: u8,
    pub non_continuous_monitors_support: u16,
    /// Bit set: monitor not complete
    pub non_continuous_monitors_status: u16,
}

/// DM21
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticReadiness2 {
    pub distance_with_mil_on: u16,
    pub distance_since_clear: u16,
    pub minutes_with_mil_on: u16,
    pub minutes_since_clear: u16,
}

/// DM26
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticReadiness3 {
    pub time_since_engine_start: u16,
    pub warm_ups_since_clear: u8,
    pub continuous_monitors_enabled: u8,
    /// Bit set: monitor not complete this cycle
    pub continuous_monitors_status: u8,
    pub non_continuous_monitors_enabled: u16,
    /// Bit set: monitor not complete this cycle
    pub non_continuous_monitors_status: u16,
}

/// Support and status bits of all configured readiness groups.
#[derive(Default)]
struct MonitorBits {
    continuous_support: u8,
    continuous_status: u8,
    non_continuous_support: u16,
    non_continuous_status: u16,
}

impl MonitorBits {
    /// `support` selects the groups that are reported, `incomplete` the groups whose status bit is set.
    fn collect(ctx: &RecordContext<'_>, support: u32, incomplete: u32) -> Self {
        let mut bits = Self::default();
        for group in ReadinessGroup::iter().filter(|&group| ctx.config.readiness.supports(group)) {
            if support & group.mask() == 0 {
                continue;
            }
            let status = incomplete & group.mask() != 0;
            if group.is_continuous() {
                let bit = 1u8 << group.monitor_bit();
                bits.continuous_support |= bit;
                if status {
                    bits.continuous_status |= bit;
                }
            } else {
                let bit = 1u16 << group.monitor_bit();
                bits.non_continuous_support |= bit;
                if status {
                    bits.non_continuous_status |= bit;
                }
            }
        }
        bits
    }
}

pub(crate) fn readiness1(ctx: &RecordContext<'_>, node: NodeIndex) -> DiagnosticReadiness1 {
    let mut readiness = DiagnosticReadiness1 {
        obd_compliance: ctx.config.readiness.obd_compliance,
        ..Default::default()
    };

    for event_id in ctx.config.event_ids() {
        if !ctx.config.is_group_master(event_id)
            || !ctx.is_visible(event_id, DtcFormat::J1939)
            || !ctx.config.is_assigned_to_node(event_id, node)
        {
            continue;
        }
        let status = combined_status(ctx.config, ctx.memory, event_id);
        if is_active(status) {
            readiness.active_trouble_codes = readiness.active_trouble_codes.saturating_add(1);
        } else if is_previously_active(status) {
            readiness.previously_active_trouble_codes = readiness.previously_active_trouble_codes.saturating_add(1);
        }
    }

    let counters = ctx.memory.obd_counters();
    let bits = MonitorBits::collect(ctx, u32::MAX, !counters.completed_groups);
    readiness.continuous_monitors_support = bits.continuous_support;
    readiness.continuous_monitors_status = bits.continuous_status;
    readiness.non_continuous_monitors_support = bits.non_continuous_support;
    readiness.non_continuous_monitors_status = bits.non_continuous_status;
    readiness
}

pub(crate) fn readiness2(ctx: &RecordContext<'_>) -> DiagnosticReadiness2 {
    let support = &ctx.config.readiness;
    let counters = ctx.memory.obd_counters();
    let value = |supported: bool, value: u16| if supported { value } else { NOT_AVAILABLE_U16 };

    DiagnosticReadiness2 {
        distance_with_mil_on: value(support.distance_with_mil_on, counters.distance_with_mil_on),
        distance_since_clear: value(support.distance_since_clear, counters.distance_since_clear),
        minutes_with_mil_on: value(support.minutes_with_mil_on, counters.minutes_with_mil_on),
        minutes_since_clear: value(support.minutes_since_clear, counters.minutes_since_clear),
    }
}

pub(crate) fn readiness3(ctx: &RecordContext<'_>) -> DiagnosticReadiness3 {
    let support = &ctx.config.readiness;
    let counters = ctx.memory.obd_counters();
    let bits = MonitorBits::collect(ctx, !counters.disabled_this_cycle, !counters.completed_this_cycle);

    DiagnosticReadiness3 {
        time_since_engine_start: if support.time_since_engine_start {
            counters.time_since_engine_start
        } else {
            NOT_AVAILABLE_U16
        },
        warm_ups_since_clear: if support.warm_ups_since_clear {
            counters.warm_ups_since_clear
        } else {
            NOT_AVAILABLE_U8
        },
        continuous_monitors_enabled: bits.continuous_support,
        continuous_monitors_status: bits.continuous_status,
        non_continuous_monitors_enabled: bits.non_continuous_support,
        non_continuous_monitors_status: bits.non_continuous_status,
    }
}
