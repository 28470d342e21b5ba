//! Error types for the Remote Play session library.

use std::fmt;

/// Errors that can occur while negotiating and running a session.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Cancellation**: [`Canceled`](Self::Canceled) — a blocking
///   operation was interrupted by [`Session::stop`](crate::Session::stop).
/// - **Network**: [`Network`](Self::Network) — socket/connect/recv
///   failures, including bounded-timeout expiry.
/// - **Resolution**: [`ParseAddr`](Self::ParseAddr) — the console host
///   string did not resolve to any address.
/// - **Protocol**: [`Parse`](Self::Parse) — malformed session-init
///   response; [`InvalidData`](Self::InvalidData) — well-formed but
///   semantically invalid data (e.g. a nonce that is not 16 bytes).
/// - **Negotiation**: [`VersionMismatch`](Self::VersionMismatch) — the
///   console advertised a different RP-Version; recoverable inside the
///   request phase, fatal afterwards.
/// - **Streaming**: [`Disconnected`](Self::Disconnected) — the console
///   ended the stream connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Underlying I/O or socket error.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// A blocking operation was interrupted by a stop request.
    #[error("operation canceled")]
    Canceled,

    /// The console host string could not be resolved to an address.
    #[error("failed to resolve console address: {0}")]
    ParseAddr(String),

    /// Failed to parse the session-init HTTP response.
    #[error("HTTP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Structurally valid input carrying invalid content.
    #[error("invalid data: {0}")]
    InvalidData(&'static str),

    /// The console reported a different RP-Version than ours.
    #[error("RP-Version mismatch")]
    VersionMismatch,

    /// The remote ended the stream connection.
    #[error("remote disconnected")]
    Disconnected,

    /// [`Session::start`](crate::Session::start) was called twice.
    #[error("session already started")]
    AlreadyStarted,

    /// Failure with no more specific classification.
    #[error("unknown error")]
    Unknown,
}

/// Specific kind of session-init response parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no status line).
    EmptyResponse,
    /// Status line did not have the expected `HTTP-Version Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The response headers exceeded the receive buffer.
    HeaderTooLarge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty response"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::HeaderTooLarge => write!(f, "response header too large"),
        }
    }
}

/// Convenience alias for `Result<T, SessionError>`.
pub type Result<T> = std::result::Result<T, SessionError>;
