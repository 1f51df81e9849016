/// Runtime error taxonomy shared by handles and the layers above
/// them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Try again once I/O or a peer makes progress.
    #[error("retry later")]
    Retry,
    /// The resource is shutting down; the operation was drained.
    #[error("closing")]
    Closing,
    #[error("invalid parameter")]
    InvalidParam,
    /// Reads are not possible on this handle (wrong kind or closing).
    #[error("not readable")]
    NoReadable,
    /// Writes are not possible on this handle (wrong kind or closing).
    #[error("not writeable")]
    NoWriteable,
    /// The handle id is stale or was never opened.
    #[error("not open")]
    NoOpen,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable code for logs and wire-facing diagnostics.
    pub fn code(&self) -> i32 {
        match self {
            Error::Retry => -1,
            Error::Closing => -2,
            Error::InvalidParam => -3,
            Error::NoReadable => -4,
            Error::NoWriteable => -5,
            Error::NoOpen => -6,
            Error::Io(_) => -10,
        }
    }
}
