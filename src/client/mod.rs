//! Client access. One [`ClientAccess`] instance serves all configured diagnostic clients, each client is addressed by its [`ClientId`] and owns its own selection, filter, freeze frame iterator and readout buffer.
//!
//! Clearing DTCs is asynchronous: the first call queues the request and returns [`crate::Error::Pending`], [`ClientAccess::main_function`] executes it, and a later call with the same arguments returns the result.
//!
//! ## Example
//! ```rust
//! use automotive_dem::client::ClientAccess;
//! use automotive_dem::config::{ClientConfig, Config, EventConfig};
//! use automotive_dem::dtc::{DtcFormat, DtcMapping, DtcOrigin};
//! use automotive_dem::memory::{EventEntry, MemoryStore};
//! use automotive_dem::Error;
//!
//! let mut config = Config::new();
//! let event_id = config.add_event(EventConfig::new(DtcMapping::uds(0x123456)));
//! config.clients.push(ClientConfig::new());
//! let mut memory = MemoryStore::new(&config, 8);
//! memory.store_primary_entry(EventEntry::new(event_id));
//!
//! let mut dem = ClientAccess::new(config).unwrap();
//! dem.select_dtc(0, 0x123456, DtcFormat::Uds, DtcOrigin::PrimaryMemory).unwrap();
//! assert_eq!(dem.clear_dtc(0), Err(Error::Pending));
//!
//! dem.main_function(&mut memory);
//! assert_eq!(dem.clear_dtc(0), Ok(()));
//! ```

mod clear;
pub mod error;
mod filter;
mod readiness;
mod readout;
mod selector;

pub use clear::{ClearDtcStatus, J1939ClearFilter, J1939DtcTypeFilter};
pub use filter::{DtcFilter, DtcFilterCriteria, FilteredDtc, FilteredJ1939Dtc, J1939DtcKind};
pub use readiness::{DiagnosticReadiness1, DiagnosticReadiness2, DiagnosticReadiness3};
pub use readout::ReadoutBuffer;
pub use selector::{DtcSelection, SelectionResult};

use tracing::{debug, info};

use crate::config::{ClientConfig, Config, FreezeFrameKind};
use crate::det::{ApiId, DetError, DevErrorHook, LoggingDevErrorHook};
use crate::dtc::{ClientId, DtcFormat, DtcOrigin, EventId, NodeIndex, RecordFilterFormat};
use crate::freeze_frame::{FreezeFrameIterator, FreezeFrameRecord, J1939FreezeFrame, RecordContext, Spn};
use crate::memory::EventMemory;
use crate::{Error, Result};

use clear::{ClearRequest, ClearScope};

/// State owned by one client.
#[derive(Debug, Clone)]
struct Client {
    config: ClientConfig,
    selection: Option<DtcSelection>,
    filter: DtcFilter,
    freeze_frame: FreezeFrameIterator,
    readout: ReadoutBuffer,
    clear_status: ClearDtcStatus,
}

impl Client {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            selection: None,
            filter: DtcFilter::default(),
            freeze_frame: FreezeFrameIterator::new(),
            readout: ReadoutBuffer::default(),
            clear_status: ClearDtcStatus::Idle,
        }
    }

    fn selection_result(&self) -> SelectionResult {
        self.selection.map(|selection| selection.result).unwrap_or_default()
    }

    /// The selected single DTC. Any other selection is rejected.
    fn selected_event(&self) -> Result<(EventId, DtcOrigin)> {
        let Some(selection) = self.selection else {
            return Err(error::Error::WrongDtc.into());
        };
        match selection.result {
            SelectionResult::Dtc(event_id) => Ok((event_id, selection.origin)),
            SelectionResult::WrongOrigin => Err(error::Error::WrongDtcOrigin.into()),
            _ => Err(error::Error::WrongDtc.into()),
        }
    }

    fn node(&self, det: &dyn DevErrorHook, api: ApiId) -> Result<NodeIndex> {
        self.config.j1939_node.ok_or_else(|| {
            det.report(api, DetError::ParamConfig);
            Error::NotSupported
        })
    }
}

fn lookup<'c>(clients: &'c [Client], client_id: ClientId, det: &dyn DevErrorHook, api: ApiId) -> Result<&'c Client> {
    clients.get(client_id as usize).ok_or_else(|| {
        det.report(api, DetError::WrongClient);
        Error::InvalidClient(client_id)
    })
}

fn lookup_mut<'c>(
    clients: &'c mut [Client],
    client_id: ClientId,
    det: &dyn DevErrorHook,
    api: ApiId,
) -> Result<&'c mut Client> {
    clients.get_mut(client_id as usize).ok_or_else(|| {
        det.report(api, DetError::WrongClient);
        Error::InvalidClient(client_id)
    })
}

/// Fails with [`Error::NotSupported`] if the client lacks a capability.
fn require(enabled: bool, det: &dyn DevErrorHook, api: ApiId) -> Result<()> {
    if enabled {
        Ok(())
    } else {
        det.report(api, DetError::ParamConfig);
        Err(Error::NotSupported)
    }
}

/// Per-client diagnostic API.
pub struct ClientAccess {
    config: Config,
    clients: Vec<Client>,
    clear_request: Option<ClearRequest>,
    det: Box<dyn DevErrorHook>,
}

impl ClientAccess {
    /// Validates the configuration and creates one client per [`ClientConfig`]. Development errors are logged.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_dev_error_hook(config, Box::new(LoggingDevErrorHook))
    }

    pub fn with_dev_error_hook(config: Config, det: Box<dyn DevErrorHook>) -> Result<Self> {
        config.validate()?;
        let clients = config.clients.iter().copied().map(Client::new).collect();
        info!("Initialized {} diagnostic clients", config.clients.len());
        Ok(Self {
            config,
            clients,
            clear_request: None,
            det,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resets all client state and drops a queued clear request.
    pub fn init(&mut self) {
        for client in self.clients.iter_mut() {
            *client = Client::new(client.config);
        }
        self.clear_request = None;
    }

    /// Executes a queued clear request.
    pub fn main_function(&mut self, memory: &mut dyn EventMemory) {
        let Some(request) = self.clear_request.take() else {
            return;
        };
        let status = request.execute(&self.config, memory);
        match self.clients.get_mut(request.client as usize) {
            Some(client) => client.clear_status = status,
            None => self.det.report(ApiId::MainFunction, DetError::WrongClient),
        }
    }

    /// Selects a DTC, DTC group or all DTCs for subsequent clear, suppression and readout requests.
    pub fn select_dtc(&mut self, client_id: ClientId, dtc: u32, format: DtcFormat, origin: DtcOrigin) -> Result<()> {
        let api = ApiId::SelectDtc;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.dtc_selector, self.det.as_ref(), api)?;

        if client.clear_status == ClearDtcStatus::Pending {
            debug!("Client {} selected a DTC while clearing", client_id);
            return Err(Error::Busy);
        }
        client.clear_status = ClearDtcStatus::Idle;

        let selection = DtcSelection::select(&self.config, dtc, format, origin.physical());
        debug!("Client {} selected {:06x}: {:?}", client_id, dtc, selection.result);
        client.selection = Some(selection);
        Ok(())
    }

    pub fn get_dtc_selection_result(&self, client_id: ClientId) -> Result<SelectionResult> {
        let api = ApiId::GetDtcSelectionResult;
        let client = lookup(&self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.dtc_selector, self.det.as_ref(), api)?;
        Ok(client.selection_result())
    }

    /// Suppresses or releases the selected DTC, including all events of a combined DTC.
    pub fn set_dtc_suppression(
        &mut self,
        client_id: ClientId,
        suppressed: bool,
        memory: &mut dyn EventMemory,
    ) -> Result<()> {
        let api = ApiId::SetDtcSuppression;
        let client = lookup(&self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.dtc_selector, self.det.as_ref(), api)?;
        let (event_id, _) = client.selected_event()?;

        for member in self.config.group_members(event_id) {
            memory.set_dtc_suppression(member, suppressed);
        }
        debug!("DTC of event {} suppressed: {}", event_id, suppressed);
        Ok(())
    }

    pub fn get_dtc_suppression(&self, client_id: ClientId, memory: &dyn EventMemory) -> Result<bool> {
        let api = ApiId::GetDtcSuppression;
        let client = lookup(&self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.dtc_selector, self.det.as_ref(), api)?;
        let (event_id, _) = client.selected_event()?;
        Ok(memory.is_dtc_suppressed(event_id))
    }

    /// Starts or polls a clear request, `request` builds the request when the client is idle.
    fn poll_clear<F>(&mut self, client_id: ClientId, api: ApiId, request: F) -> Result<()>
    where
        F: FnOnce(&Config, &Client) -> Result<(ClearScope, DtcOrigin)>,
    {
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.clear_dtc, self.det.as_ref(), api)?;

        match client.clear_status {
            ClearDtcStatus::Idle => {
                if self.clear_request.is_some() {
                    debug!("Client {} clear rejected, another clear is running", client_id);
                    return Err(Error::Busy);
                }
                let (scope, origin) = request(&self.config, client)?;
                info!("Client {} clears {:?} in {:?}", client_id, scope, origin);
                self.clear_request = Some(ClearRequest {
                    client: client_id,
                    origin,
                    scope,
                });
                client.clear_status = ClearDtcStatus::Pending;
                Err(Error::Pending)
            }
            ClearDtcStatus::Pending => Err(Error::Pending),
            ClearDtcStatus::Done => {
                client.clear_status = ClearDtcStatus::Idle;
                Ok(())
            }
            ClearDtcStatus::Failed => {
                client.clear_status = ClearDtcStatus::Idle;
                Err(error::Error::ClearFailed.into())
            }
            ClearDtcStatus::NvError => {
                client.clear_status = ClearDtcStatus::Idle;
                Err(error::Error::ClearMemoryError.into())
            }
        }
    }

    /// Clears the selected DTC, DTC group or all DTCs.
    pub fn clear_dtc(&mut self, client_id: ClientId) -> Result<()> {
        self.poll_clear(client_id, ApiId::ClearDtc, |_, client| {
            let Some(selection) = client.selection else {
                return Err(error::Error::WrongDtc.into());
            };
            let scope = match selection.result {
                SelectionResult::Dtc(event_id) => ClearScope::Event(event_id),
                SelectionResult::Group(mask) => ClearScope::Group(mask),
                SelectionResult::AllDtcs => ClearScope::All,
                SelectionResult::WrongOrigin => return Err(error::Error::WrongDtcOrigin.into()),
                SelectionResult::Init | SelectionResult::NoMatch => return Err(error::Error::WrongDtc.into()),
            };
            Ok((scope, selection.origin))
        })
    }

    /// Clears all active (DM11) or previously active (DM03) DTCs of the client's node.
    pub fn j1939_clear_dtc(&mut self, client_id: ClientId, filter: J1939ClearFilter) -> Result<()> {
        let det = self.det.as_ref();
        let api = ApiId::J1939ClearDtc;
        let node = lookup(&self.clients, client_id, det, api)?.node(det, api)?;
        self.poll_clear(client_id, api, |_, _| {
            Ok((ClearScope::J1939 { filter, node }, DtcOrigin::PrimaryMemory))
        })
    }

    /// Clears a single J1939 DTC (DM22).
    pub fn j1939_clear_single_dtc(
        &mut self,
        client_id: ClientId,
        dtc: u32,
        type_filter: J1939DtcTypeFilter,
        memory: &dyn EventMemory,
    ) -> Result<()> {
        let det = self.det.as_ref();
        let api = ApiId::J1939ClearDtc;
        let node = lookup(&self.clients, client_id, det, api)?.node(det, api)?;
        self.poll_clear(client_id, api, |config, _| {
            let event_id = config
                .find_event(dtc, DtcFormat::J1939)
                .ok_or(Error::from(error::Error::WrongDtc))?;
            if !type_filter.matches(filter::combined_status(config, memory, event_id)) {
                return Err(error::Error::WrongDtcTypeFilter.into());
            }
            let obd_related = config.event(event_id).is_some_and(|event| event.obd_related);
            if obd_related && !config.is_assigned_to_node(event_id, node) {
                return Err(error::Error::ClearFailed.into());
            }
            Ok((ClearScope::Event(event_id), DtcOrigin::PrimaryMemory))
        })
    }

    /// Locks the selected DTC's records into the client's readout buffer.
    pub fn disable_dtc_record_update(&mut self, client_id: ClientId, memory: &dyn EventMemory) -> Result<()> {
        let api = ApiId::DisableDtcRecordUpdate;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.readout_buffer, self.det.as_ref(), api)?;

        let (event_id, origin) = client.selected_event()?;
        if memory.is_dtc_suppressed(event_id) {
            return Err(error::Error::WrongDtc.into());
        }
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        client.readout.lock(&ctx, event_id, origin)
    }

    pub fn enable_dtc_record_update(&mut self, client_id: ClientId) -> Result<()> {
        let api = ApiId::EnableDtcRecordUpdate;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.readout_buffer, self.det.as_ref(), api)?;
        if !client.readout.is_locked() {
            self.det.report(api, DetError::WrongCondition);
            return Err(Error::WrongCondition);
        }
        client.readout.release();
        Ok(())
    }

    /// Selects a snapshot record of the locked DTC, 0xFF selects all records.
    pub fn select_freeze_frame_data(&mut self, client_id: ClientId, record_number: u8, memory: &dyn EventMemory) -> Result<()> {
        let api = ApiId::SelectFreezeFrameData;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.readout_buffer, self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        client.readout.select_freeze_frame(&ctx, record_number)
    }

    /// Writes the next selected snapshot record to `dest` and returns the number of bytes written.
    pub fn get_next_freeze_frame_data(&mut self, client_id: ClientId, dest: &mut [u8]) -> Result<Option<usize>> {
        let api = ApiId::GetNextFreezeFrameData;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.readout_buffer, self.det.as_ref(), api)?;
        client.readout.next_freeze_frame(dest)
    }

    pub fn get_size_of_freeze_frame_selection(&self, client_id: ClientId) -> Result<usize> {
        let api = ApiId::GetNextFreezeFrameData;
        let client = lookup(&self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.readout_buffer, self.det.as_ref(), api)?;
        client.readout.freeze_frame_selection_size()
    }

    /// Selects an extended data record of the locked DTC. 0xFF selects all records, 0xFE all OBD records.
    pub fn select_extended_data_record(
        &mut self,
        client_id: ClientId,
        record_number: u8,
        memory: &dyn EventMemory,
    ) -> Result<()> {
        let api = ApiId::SelectExtendedDataRecord;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.readout_buffer, self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        client.readout.select_extended_record(&ctx, record_number)
    }

    pub fn get_next_extended_data_record(&mut self, client_id: ClientId, dest: &mut [u8]) -> Result<Option<usize>> {
        let api = ApiId::GetNextExtendedDataRecord;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.readout_buffer, self.det.as_ref(), api)?;
        client.readout.next_extended_record(dest)
    }

    pub fn get_size_of_extended_data_record_selection(&self, client_id: ClientId) -> Result<usize> {
        let api = ApiId::GetNextExtendedDataRecord;
        let client = lookup(&self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.readout_buffer, self.det.as_ref(), api)?;
        client.readout.extended_selection_size()
    }

    /// Starts a UDS DTC status report.
    pub fn set_dtc_filter(&mut self, client_id: ClientId, criteria: DtcFilterCriteria) -> Result<()> {
        let api = ApiId::SetDtcFilter;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.filter, self.det.as_ref(), api)?;

        let criteria = DtcFilterCriteria {
            origin: criteria.origin.physical(),
            ..criteria
        };
        if !self.config.supports_origin(criteria.origin) {
            return Err(error::Error::WrongDtcOrigin.into());
        }
        client.filter.set_uds(criteria);
        Ok(())
    }

    pub fn get_dtc_status_availability_mask(&self, client_id: ClientId) -> Result<u8> {
        lookup(&self.clients, client_id, self.det.as_ref(), ApiId::SetDtcFilter)?;
        Ok(self.config.status_availability_mask)
    }

    /// Number of DTCs matching the client's UDS or J1939 DTC filter.
    pub fn get_number_of_filtered_dtc(&self, client_id: ClientId, memory: &dyn EventMemory) -> Result<u16> {
        let api = ApiId::GetNextFilteredDtc;
        let client = lookup(&self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.filter, self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        client.filter.count(&ctx)
    }

    pub fn get_next_filtered_dtc(&mut self, client_id: ClientId, memory: &dyn EventMemory) -> Result<Option<FilteredDtc>> {
        let api = ApiId::GetNextFilteredDtc;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.filter, self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        client.filter.next_uds(&ctx)
    }

    /// Starts a freeze frame record filter and returns the number of records it reports.
    pub fn set_freeze_frame_record_filter(
        &mut self,
        client_id: ClientId,
        format: RecordFilterFormat,
        memory: &dyn EventMemory,
    ) -> Result<u16> {
        let api = ApiId::SetFreezeFrameRecordFilter;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.freeze_frame_iterator, self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        client.freeze_frame.start(format);
        Ok(client.freeze_frame.count(&ctx))
    }

    pub fn get_next_filtered_record(
        &mut self,
        client_id: ClientId,
        memory: &dyn EventMemory,
    ) -> Result<Option<FreezeFrameRecord>> {
        let api = ApiId::GetNextFilteredRecord;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.freeze_frame_iterator, self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        Ok(client.freeze_frame.next_record(&ctx))
    }

    /// Starts a J1939 DTC report for the client's node.
    pub fn j1939_set_dtc_filter(&mut self, client_id: ClientId, kind: J1939DtcKind) -> Result<()> {
        let api = ApiId::J1939SetDtcFilter;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.filter, self.det.as_ref(), api)?;
        let node = client.node(self.det.as_ref(), api)?;
        client.filter.set_j1939(kind, node);
        Ok(())
    }

    pub fn j1939_get_next_filtered_dtc(
        &mut self,
        client_id: ClientId,
        memory: &dyn EventMemory,
    ) -> Result<Option<FilteredJ1939Dtc>> {
        let api = ApiId::J1939GetNextFilteredDtc;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.filter, self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        client.filter.next_j1939(&ctx)
    }

    /// Starts a J1939 freeze frame (DM04) or expanded freeze frame (DM25) filter for the client's node.
    pub fn j1939_set_freeze_frame_filter(&mut self, client_id: ClientId, kind: FreezeFrameKind) -> Result<()> {
        let api = ApiId::J1939SetFreezeFrameFilter;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.freeze_frame_iterator, self.det.as_ref(), api)?;
        let node = client.node(self.det.as_ref(), api)?;
        client.freeze_frame.start_j1939(kind, node);
        Ok(())
    }

    pub fn j1939_get_next_freeze_frame(
        &mut self,
        client_id: ClientId,
        memory: &dyn EventMemory,
        dest: &mut [u8],
    ) -> Result<Option<J1939FreezeFrame>> {
        let api = ApiId::J1939GetNextFreezeFrame;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.freeze_frame_iterator, self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        client.freeze_frame.next_j1939_freeze_frame(&ctx, dest)
    }

    pub fn j1939_get_next_spn_in_freeze_frame(&mut self, client_id: ClientId) -> Result<Option<Spn>> {
        let api = ApiId::J1939GetNextSpnInFreezeFrame;
        let client = lookup_mut(&mut self.clients, client_id, self.det.as_ref(), api)?;
        require(client.config.freeze_frame_iterator, self.det.as_ref(), api)?;
        Ok(client.freeze_frame.next_spn(&self.config, self.det.as_ref()))
    }

    /// DM05 for the client's node.
    pub fn j1939_read_diagnostic_readiness1(
        &self,
        client_id: ClientId,
        memory: &dyn EventMemory,
    ) -> Result<DiagnosticReadiness1> {
        let api = ApiId::J1939ReadDiagnosticReadiness;
        let node = lookup(&self.clients, client_id, self.det.as_ref(), api)?.node(self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        Ok(readiness::readiness1(&ctx, node))
    }

    /// DM21
    pub fn j1939_read_diagnostic_readiness2(
        &self,
        client_id: ClientId,
        memory: &dyn EventMemory,
    ) -> Result<DiagnosticReadiness2> {
        let api = ApiId::J1939ReadDiagnosticReadiness;
        lookup(&self.clients, client_id, self.det.as_ref(), api)?.node(self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        Ok(readiness::readiness2(&ctx))
    }

    /// DM26
    pub fn j1939_read_diagnostic_readiness3(
        &self,
        client_id: ClientId,
        memory: &dyn EventMemory,
    ) -> Result<DiagnosticReadiness3> {
        let api = ApiId::J1939ReadDiagnosticReadiness;
        lookup(&self.clients, client_id, self.det.as_ref(), api)?.node(self.det.as_ref(), api)?;
        let ctx = RecordContext::new(&self.config, memory, self.det.as_ref());
        Ok(readiness::readiness3(&ctx))
    }
}
