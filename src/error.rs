//! Error types for driver operations.
use std::{io, sync};

use bson::{Bson, Document};
use thiserror::Error;

use crate::bulk_write::error::BulkWriteException;

/// The result type used throughout the driver.
pub type Result<T> = std::result::Result<T, Error>;

/// Label attached by the server to errors that are safe to retry as writes.
pub const RETRYABLE_WRITE_ERROR: &str = "RetryableWriteError";

/// Server error codes matched on by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    HostUnreachable = 6,
    HostNotFound = 7,
    NamespaceNotFound = 26,
    MaxTimeMSExpired = 50,
    CommandNotFound = 59,
    NetworkTimeout = 89,
    ShutdownInProgress = 91,
    PrimarySteppedDown = 189,
    ExceededTimeLimit = 262,
    SocketException = 9001,
    NotWritablePrimary = 10107,
    InterruptedAtShutdown = 11600,
    InterruptedDueToReplStateChange = 11602,
    NotPrimaryNoSecondaryOk = 13435,
    NotPrimaryOrSecondary = 13436,
}

impl ErrorCode {
    /// Codes that indicate a transient condition on the server side.
    pub fn is_retryable_code(code: i32) -> bool {
        [
            ErrorCode::HostUnreachable,
            ErrorCode::HostNotFound,
            ErrorCode::NetworkTimeout,
            ErrorCode::ShutdownInProgress,
            ErrorCode::PrimarySteppedDown,
            ErrorCode::ExceededTimeLimit,
            ErrorCode::SocketException,
            ErrorCode::NotWritablePrimary,
            ErrorCode::InterruptedAtShutdown,
            ErrorCode::InterruptedDueToReplStateChange,
            ErrorCode::NotPrimaryNoSecondaryOk,
            ErrorCode::NotPrimaryOrSecondary,
        ]
        .iter()
        .any(|c| *c as i32 == code)
    }
}

/// The error type for driver operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation's client-side deadline was exhausted.
    #[error("operation timed out: {0}")]
    OperationTimeout(String),

    /// No connection became available in the pool's wait queue in time.
    #[error("timed out waiting for a pooled connection: {0}")]
    PoolWaitTimeout(String),

    /// A command failure reported verbatim by the server.
    #[error("server error {code} ({code_name}): {message}")]
    ServerError {
        code: i32,
        code_name: String,
        message: String,
        labels: Vec<String>,
    },

    /// The connection to the server failed; the connection is discarded.
    #[error("network error: {0}")]
    NetworkError(String),

    /// A write model was rejected before anything was sent.
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("invalid argument: {0}")]
    ArgumentError(String),

    /// The server replied with something the driver cannot interpret.
    #[error("invalid server response: {0}")]
    ResponseError(String),

    #[error("{0}")]
    BulkWriteError(BulkWriteException),

    #[error("server selection failed: {0}")]
    ServerSelectionError(String),

    #[error("the connection pool has been closed")]
    PoolClosed,

    #[error("lock poisoned")]
    PoisonLockError,

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error(transparent)]
    EncoderError(#[from] bson::ser::Error),

    #[error(transparent)]
    DecoderError(#[from] bson::de::Error),
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Error {
        Error::PoisonLockError
    }
}

impl Error {
    /// Builds a server error from an `ok: 0` reply document.
    pub fn from_reply(reply: &Document) -> Error {
        let code = match reply.get("code") {
            Some(&Bson::Int32(code)) => code,
            Some(&Bson::Int64(code)) => code as i32,
            Some(&Bson::Double(code)) => code as i32,
            _ => 0,
        };
        let labels = match reply.get_array("errorLabels") {
            Ok(labels) => labels
                .iter()
                .filter_map(|l| l.as_str().map(String::from))
                .collect(),
            Err(_) => Vec::new(),
        };

        Error::ServerError {
            code,
            code_name: reply.get_str("codeName").unwrap_or_default().to_owned(),
            message: reply.get_str("errmsg").unwrap_or_default().to_owned(),
            labels,
        }
    }

    /// The server error code, if this error was reported by the server.
    pub fn code(&self) -> Option<i32> {
        match *self {
            Error::ServerError { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(*self, Error::OperationTimeout(_))
    }

    pub fn is_network_error(&self) -> bool {
        matches!(*self, Error::NetworkError(_) | Error::IoError(_))
    }

    /// Whether a single retry of the failed command may be attempted.
    pub fn is_retryable(&self) -> bool {
        match *self {
            Error::NetworkError(_) | Error::IoError(_) => true,
            Error::ServerError { code, ref labels, .. } => {
                ErrorCode::is_retryable_code(code)
                    || labels.iter().any(|l| l == RETRYABLE_WRITE_ERROR)
            }
            _ => false,
        }
    }

    pub(crate) fn timeout(what: &str) -> Error {
        Error::OperationTimeout(format!("timeoutMS expired during {}", what))
    }
}
