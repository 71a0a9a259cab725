//! Error types for configuration validation.

use thiserror::Error;

use crate::dtc::{EventId, NodeIndex};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Missing Reserved Event 0")]
    MissingReservedEvent,
    #[error("Too Many Combined Groups: {0}")]
    TooManyCombinedGroups(usize),
    #[error("Too Many Clients: {0}")]
    TooManyClients(usize),
    #[error("Event {event} References Unknown Combined Group {group}")]
    UnknownCombinedGroup { event: EventId, group: usize },
    #[error("Combined Group {group} Has Invalid Member {event}")]
    InvalidGroupMember { group: usize, event: EventId },
    #[error("Event {event} References Unknown Sampling Profile {profile}")]
    UnknownSamplingProfile { event: EventId, profile: usize },
    #[error("Unknown J1939 Node: {0}")]
    UnknownNode(NodeIndex),
}
