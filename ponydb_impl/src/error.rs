use std::sync::PoisonError;

/// The `Result` type used throughout this crate and re-exported to its consumers.
pub type HdbResult<T> = std::result::Result<T, HdbError>;

/// The single error type returned by every operation of this driver.
///
/// Variants are deliberately flat: the protocol has no nested error hierarchy, and
/// collapsing everything here keeps `match` arms in application code short.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HdbError {
    /// I/O failure on the underlying byte stream (socket or in-memory pipe).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A frame or value could not be parsed according to the wire format.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection (or a cursor derived from it) has already been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server rejected the login credentials.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The server reported `AUTHENTICATION_ERROR` on a later request.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The server returned an `EXCEPTION` reply for a request.
    #[error("server error {vendor_code}: {message}")]
    Server {
        /// Vendor-specific error code as sent by the server.
        vendor_code: i32,
        /// Human-readable message.
        message: String,
        /// Server-side stack trace, if the server provided one.
        stacktrace: String,
    },

    /// A per-query timeout elapsed before a response arrived.
    #[error("timeout waiting for response")]
    Timeout,

    /// A getter was asked to project a value into an incompatible shape.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A column name did not resolve against the current result's column list.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// A row or column index was outside the valid range.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The caller asked for something this driver intentionally does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invalid usage of the API (bad configuration, malformed connect string, ...).
    #[error("usage error: {0}")]
    Usage(String),

    /// An internal lock was poisoned by a panic in another thread.
    #[error("poisoned lock: {0}")]
    Poisoned(String),

    /// `serde` could not build the requested type from a result set's rows
    /// (§9, ambient `serde_db` row-to-struct deserialization).
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_db::de::DeserializationError> for HdbError {
    fn from(e: serde_db::de::DeserializationError) -> Self {
        Self::Deserialization(e.to_string())
    }
}

impl<T> From<PoisonError<T>> for HdbError {
    fn from(e: PoisonError<T>) -> Self {
        Self::Poisoned(e.to_string())
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for HdbError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Self::ConnectionClosed
    }
}

impl From<crossbeam_channel::RecvError> for HdbError {
    fn from(_: crossbeam_channel::RecvError) -> Self {
        Self::ConnectionClosed
    }
}

/// Builds a [`HdbError::Protocol`] with a formatted message.
macro_rules! protocol_err {
    ($($arg:tt)*) => {
        $crate::error::HdbError::Protocol(format!($($arg)*))
    };
}
pub(crate) use protocol_err;

/// Builds a [`HdbError::Usage`] with a formatted message.
macro_rules! usage_err {
    ($($arg:tt)*) => {
        $crate::error::HdbError::Usage(format!($($arg)*))
    };
}
pub(crate) use usage_err;
