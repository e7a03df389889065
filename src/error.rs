//! BurstFS Error Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for BurstFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// BurstFS error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // File system errors
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("File name too long: {0}")]
    NameTooLong(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Bad file descriptor: {0}")]
    BadDescriptor(i32),

    #[error("Too many levels of symbolic links: {0}")]
    SymlinkLoop(String),

    #[error("Remote I/O error: {0}")]
    RemoteIo(String),

    // Storage errors
    #[error("Metadata store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),
}

/// Transport-neutral error classification.
///
/// Every store backend and every remote reply is reduced to one of these
/// before the coordinator looks at it, so callers match on a single enum
/// regardless of where the failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Io,
    InvalidArgument,
    NotADirectory,
    IsADirectory,
    NotSupported,
    NotEmpty,
    NameTooLong,
    OutOfMemory,
    BadDescriptor,
    Loop,
}

impl ErrorKind {
    /// POSIX errno for this kind
    pub fn errno(self) -> libc::c_int {
        match self {
            ErrorKind::NotFound => libc::ENOENT,
            ErrorKind::AlreadyExists => libc::EEXIST,
            ErrorKind::Io => libc::EIO,
            ErrorKind::InvalidArgument => libc::EINVAL,
            ErrorKind::NotADirectory => libc::ENOTDIR,
            ErrorKind::IsADirectory => libc::EISDIR,
            ErrorKind::NotSupported => libc::ENOTSUP,
            ErrorKind::NotEmpty => libc::ENOTEMPTY,
            ErrorKind::NameTooLong => libc::ENAMETOOLONG,
            ErrorKind::OutOfMemory => libc::ENOMEM,
            ErrorKind::BadDescriptor => libc::EBADF,
            ErrorKind::Loop => libc::ELOOP,
        }
    }
}

impl Error {
    /// Rebuild an error from a kind reported by a remote daemon
    pub fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::NotFound => Error::NotFound(message),
            ErrorKind::AlreadyExists => Error::AlreadyExists(message),
            ErrorKind::Io => Error::RemoteIo(message),
            ErrorKind::InvalidArgument => Error::InvalidArgument(message),
            ErrorKind::NotADirectory => Error::NotADirectory(message),
            ErrorKind::IsADirectory => Error::IsADirectory(message),
            ErrorKind::NotSupported => Error::NotSupported(message),
            ErrorKind::NotEmpty => Error::NotEmpty(message),
            ErrorKind::NameTooLong => Error::NameTooLong(message),
            ErrorKind::OutOfMemory => Error::OutOfMemory(message),
            ErrorKind::BadDescriptor => Error::BadDescriptor(message.parse().unwrap_or(-1)),
            ErrorKind::Loop => Error::SymlinkLoop(message),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::NotADirectory(_) => ErrorKind::NotADirectory,
            Error::IsADirectory(_) => ErrorKind::IsADirectory,
            Error::NotEmpty(_) => ErrorKind::NotEmpty,
            Error::InvalidArgument(_) | Error::Config(_) => ErrorKind::InvalidArgument,
            Error::ConfigParse(_) | Error::ConfigSerialize(_) => ErrorKind::InvalidArgument,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::NameTooLong(_) => ErrorKind::NameTooLong,
            Error::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Error::BadDescriptor(_) => ErrorKind::BadDescriptor,
            Error::SymlinkLoop(_) => ErrorKind::Loop,
            Error::RemoteIo(_)
            | Error::Store(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Network(_)
            | Error::ConnectionFailed { .. }
            | Error::ConnectionTimeout(_) => ErrorKind::Io,
        }
    }

    /// Convert to libc error code
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            other => other.kind().errno(),
        }
    }

    /// Check if this error is transient and the operation may be retried
    /// against another replica
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RemoteIo(_)
                | Error::Io(_)
                | Error::Network(_)
                | Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
        )
    }
}
