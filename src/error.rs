//! Contains the main error type for the library.
use thiserror::Error;

use crate::dtc::ClientId;

/// The main error type for the library. Each module has it's own error type that is contained by this error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A concurrent writer modified the data during the copy, or an asynchronous operation is still running. Retry with identical arguments.
    #[error("Pending")]
    Pending,
    /// The destination buffer cannot hold the record. Nothing was reported as written.
    #[error("Buffer Too Small")]
    BufferTooSmall,
    /// Another client owns a shared resource, e.g. a clear operation is in progress.
    #[error("Busy")]
    Busy,
    #[error("Invalid Client: {0}")]
    InvalidClient(ClientId),
    /// The client is not configured for the requested capability.
    #[error("Not Supported")]
    NotSupported,
    /// The API was called out of sequence, e.g. reading a filter that was never set.
    #[error("Wrong Condition")]
    WrongCondition,
    #[error(transparent)]
    ClientError(#[from] crate::client::error::Error),
    #[error(transparent)]
    ConfigError(#[from] crate::config::error::Error),
}
