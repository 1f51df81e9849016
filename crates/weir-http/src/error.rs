/// Parse failures. Each one is terminal for the current message: the
/// serving layer answers with a stock error response where possible
/// and closes.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum HttpError {
    #[error("invalid HTTP method")]
    InvalidMethod,
    #[error("invalid URL")]
    InvalidUrl,
    #[error("invalid HTTP version")]
    InvalidVersion,
    #[error("invalid status line")]
    InvalidStatus,
    #[error("invalid character in header")]
    InvalidHeaderToken,
    #[error("invalid content-length")]
    InvalidContentLength,
    #[error("content-length conflicts with transfer-encoding")]
    UnexpectedContentLength,
    #[error("transfer-encoding cannot determine body length")]
    InvalidTransferEncoding,
    #[error("invalid chunk size")]
    InvalidChunkSize,
    #[error("multipart boundary rejected")]
    InvalidBoundary,
    #[error("stream ended in an invalid state")]
    InvalidEofState,
    #[error("header section exceeds the configured maximum")]
    HeaderOverflow,
    #[error("data after a connection-terminated message")]
    ClosedConnection,
    #[error("expected LF")]
    LfExpected,
    #[error("strict parsing violation")]
    Strict,
    #[error("parser is paused")]
    Paused,
    #[error("callback {0} failed")]
    Callback(&'static str),
}
