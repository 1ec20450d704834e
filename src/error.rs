use std::io;

use thiserror::Error;

/// Failure taxonomy shared by the command path and the streaming path.
///
/// Every variant carries a short context string; `kind()` strips it down to
/// the status value callers compare against.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Value out of range: {0}")]
    Range(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No matching device: {0}")]
    NoDevice(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Operation would block: {0}")]
    WouldBlock(String),

    #[error("Queue full: {0}")]
    QueueFull(String),

    #[error("Requested timestamp is in the past: {0}")]
    TimeInPast(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("File not found: {0}")]
    NoFile(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Checksum mismatch: {0}")]
    Checksum(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Status value of an [`Error`], without its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    Range,
    InvalidState,
    NoDevice,
    Unsupported,
    Timeout,
    WouldBlock,
    QueueFull,
    TimeInPast,
    Io,
    NoFile,
    PermissionDenied,
    Checksum,
    OutOfMemory,
    Unexpected,
}

impl ErrorKind {
    /// Numeric status, compatible with the libbladeRF status codes.
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::Unexpected => -1,
            ErrorKind::Range => -2,
            ErrorKind::InvalidParameter => -3,
            ErrorKind::OutOfMemory => -4,
            ErrorKind::Io => -5,
            ErrorKind::Timeout => -6,
            ErrorKind::NoDevice => -7,
            ErrorKind::Unsupported => -8,
            ErrorKind::Checksum => -10,
            ErrorKind::NoFile => -11,
            ErrorKind::TimeInPast => -14,
            ErrorKind::QueueFull => -15,
            ErrorKind::PermissionDenied => -17,
            ErrorKind::WouldBlock => -18,
            ErrorKind::InvalidState => -19,
        }
    }

    /// One-line human readable description.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidParameter => "Invalid operation or parameter",
            ErrorKind::Range => "Provided parameter was out of the allowable range",
            ErrorKind::InvalidState => "Operation not valid in the current state",
            ErrorKind::NoDevice => "No devices available",
            ErrorKind::Unsupported => "Operation not supported",
            ErrorKind::Timeout => "Operation timed out",
            ErrorKind::WouldBlock => {
                "The operation would block, but has been requested to be non-blocking"
            }
            ErrorKind::QueueFull => "Could not enqueue data into full queue",
            ErrorKind::TimeInPast => "Requested timestamp is in the past",
            ErrorKind::Io => "File or device I/O failure",
            ErrorKind::NoFile => "File not found",
            ErrorKind::PermissionDenied => "Insufficient permissions for the requested operation",
            ErrorKind::Checksum => "Invalid checksum",
            ErrorKind::OutOfMemory => "A memory allocation error occurred",
            ErrorKind::Unexpected => "An unexpected error occurred",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Error::Range(_) => ErrorKind::Range,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::NoDevice(_) => ErrorKind::NoDevice,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::WouldBlock(_) => ErrorKind::WouldBlock,
            Error::QueueFull(_) => ErrorKind::QueueFull,
            Error::TimeInPast(_) => ErrorKind::TimeInPast,
            Error::Io(_) => ErrorKind::Io,
            Error::NoFile(_) => ErrorKind::NoFile,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::Checksum(_) => ErrorKind::Checksum,
            Error::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Error::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// True for conditions a streaming loop is expected to retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::WouldBlock)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NoFile(err.to_string()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(err.to_string()),
            io::ErrorKind::OutOfMemory => Error::OutOfMemory(err.to_string()),
            io::ErrorKind::TimedOut => Error::Timeout(err.to_string()),
            _ => Error::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidParameter(format!("malformed device profile: {}", err))
    }
}
