//! Development error reporting. Development errors are programming mistakes (out of range handles, calls out of sequence). They are reported through a [`DevErrorHook`] and the operation degrades to a safe default instead of panicking.
use tracing::error;

/// API that detected a development error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ApiId {
    SelectDtc,
    GetDtcSelectionResult,
    SetDtcSuppression,
    GetDtcSuppression,
    ClearDtc,
    DisableDtcRecordUpdate,
    EnableDtcRecordUpdate,
    SelectFreezeFrameData,
    GetNextFreezeFrameData,
    SelectExtendedDataRecord,
    GetNextExtendedDataRecord,
    SetDtcFilter,
    GetNextFilteredDtc,
    SetFreezeFrameRecordFilter,
    GetNextFilteredRecord,
    J1939SetDtcFilter,
    J1939GetNextFilteredDtc,
    J1939SetFreezeFrameFilter,
    J1939GetNextFreezeFrame,
    J1939GetNextSpnInFreezeFrame,
    J1939ClearDtc,
    J1939ReadDiagnosticReadiness,
    MainFunction,
    /// Table lookup inside the library
    Internal,
}

/// Kind of development error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DetError {
    /// Client id outside of the configured client table
    WrongClient,
    /// Client lacks the capability handle required by the API
    ParamConfig,
    /// Index outside of a configuration or memory table
    ParamIndex,
    /// Filter or iterator used before it was started
    Uninit,
    /// API called in an invalid state
    WrongCondition,
}

/// A trait that defines how development errors are reported.
pub trait DevErrorHook {
    fn report(&self, api: ApiId, error: DetError);
}

/// A handler that drops all reports.
pub struct NoOpDevErrorHook;
impl DevErrorHook for NoOpDevErrorHook {
    fn report(&self, _api: ApiId, _error: DetError) {}
}

/// A handler that logs all reports using `tracing`.
pub struct LoggingDevErrorHook;
impl DevErrorHook for LoggingDevErrorHook {
    fn report(&self, api: ApiId, error: DetError) {
        error!("[DEM Development Error]: {:?} in {:?}", error, api);
    }
}

/// Table lookup that reports out of range indices and falls back to the first table element.
pub fn checked_get<'a, T>(table: &'a [T], index: usize, hook: &dyn DevErrorHook, api: ApiId) -> Option<&'a T> {
    match table.get(index) {
        Some(element) => Some(element),
        None => {
            hook.report(api, DetError::ParamIndex);
            table.first()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<(ApiId, DetError)>>);
    impl DevErrorHook for Recorder {
        fn report(&self, api: ApiId, error: DetError) {
            self.0.borrow_mut().push((api, error));
        }
    }

    #[test]
    fn out_of_range_falls_back_to_first() {
        let hook = Recorder::default();
        let table = [10, 20, 30];

        assert_eq!(checked_get(&table, 1, &hook, ApiId::Internal), Some(&20));
        assert!(hook.0.borrow().is_empty());

        assert_eq!(checked_get(&table, 7, &hook, ApiId::Internal), Some(&10));
        assert_eq!(hook.0.borrow().as_slice(), &[(ApiId::Internal, DetError::ParamIndex)]);

        let empty: [u8; 0] = [];
        assert_eq!(checked_get(&empty, 0, &hook, ApiId::Internal), None);
    }
}
