use thiserror::Error;

/// Rejections of a diagnostic request, mapped to negative responses by the service handler.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    #[error("Wrong DTC")]
    WrongDtc,
    #[error("Wrong DTC Origin")]
    WrongDtcOrigin,
    #[error("DTC Status Does Not Match Type Filter")]
    WrongDtcTypeFilter,
    #[error("Wrong Record Number")]
    WrongRecordNumber,
    #[error("Clear Failed")]
    ClearFailed,
    #[error("Clear Failed Writing Memory")]
    ClearMemoryError,
}
