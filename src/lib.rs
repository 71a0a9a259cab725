//! # The Automotive DEM Crate
//! This crate implements the client facing part of an AUTOSAR style Diagnostic Event Manager (DEM). It gives diagnostic service handlers (UDS, OBD and J1939) a per-client API to select DTCs, filter DTCs, clear DTCs, lock records for readout and iterate over stored freeze frame (snapshot) records.
//!
//! The event memory itself is an external collaborator. It is accessed through the [`memory::EventMemory`] trait, and [`memory::MemoryStore`] provides an in-memory implementation.
//!
//! ## Freeze Frame Filter Example
//!
//! The following example stores one snapshot record for a single event and reads it back through a client.
//!
//! ```rust
//! use automotive_dem::client::ClientAccess;
//! use automotive_dem::config::{ClientConfig, Config, EventConfig};
//! use automotive_dem::dtc::{DtcMapping, RecordFilterFormat};
//! use automotive_dem::memory::{EventEntry, MemoryStore, SnapshotRecord};
//!
//! let mut config = Config::new();
//! let event_id = config.add_event(EventConfig {
//!     snapshot_records: vec![1],
//!     ..EventConfig::new(DtcMapping::uds(0x123456))
//! });
//! config.clients.push(ClientConfig::new());
//!
//! let mut memory = MemoryStore::new(&config, 8);
//! let mut entry = EventEntry::new(event_id);
//! entry.snapshot_records.push(SnapshotRecord::new(1, &[0x01, 0x02]));
//! memory.store_primary_entry(entry);
//!
//! let mut dem = ClientAccess::new(config).unwrap();
//! let count = dem.set_freeze_frame_record_filter(0, RecordFilterFormat::Uds, &memory).unwrap();
//! assert_eq!(count, 1);
//!
//! let record = dem.get_next_filtered_record(0, &memory).unwrap().unwrap();
//! assert_eq!(record.dtc, 0x123456);
//! assert_eq!(record.record_number, 1);
//! ```
//!
//! ## Concurrency
//! All operations are synchronous and never block. Readers copying stored record data sample the per-event update state before and after the copy and return [`Error::Pending`] when a concurrent writer modified the entry in between. The caller is expected to retry with identical arguments.
//!

pub mod buffer;
pub mod client;
pub mod config;
pub mod det;
pub mod dtc;
mod error;
pub mod freeze_frame;
pub mod memory;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
