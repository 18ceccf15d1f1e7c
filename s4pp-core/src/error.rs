use std::fmt;
use std::io;

/// Every failure kind surfaced to the host's disconnect callback.
///
/// Mirrors the `NetworkError`/`ErrorType` split used elsewhere in this
/// codebase, but folded into a single enum: a transport "would block"
/// condition is not represented here at all (it is simply the absence of
/// a `Sent`/`Written` event for an outstanding `Action::Send`, see `io`)
/// because unlike a generic socket wrapper, the engine only ever treats
/// would-block as routine backpressure, never as a reportable error.
#[derive(Debug)]
pub enum S4ppError {
    /// Missing or malformed construction parameter (`server`, `user`, `key`, ...).
    Config(String),
    /// DNS failure after server-list rotation, connect failure, write failure,
    /// or unexpected transport close.
    Network(io::ErrorKind),
    /// Banner mismatch, missing SHA256, hide-mandatory unmet, missing
    /// newline, unexpected line.
    Protocol(String),
    /// `REJ:` or `NOK:` received from the server.
    ServerReject(Option<String>),
    /// Out of memory, dictionary overflow.
    Resource(String),
    /// The sample source returned a malformed or incomplete record.
    Contract(String),
}

impl fmt::Display for S4ppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            S4ppError::Config(msg) => write!(f, "config error: {}", msg),
            S4ppError::Network(kind) => write!(f, "network error: {:?}", kind),
            S4ppError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            S4ppError::ServerReject(Some(msg)) => write!(f, "server rejected: {}", msg),
            S4ppError::ServerReject(None) => write!(f, "server rejected"),
            S4ppError::Resource(msg) => write!(f, "resource error: {}", msg),
            S4ppError::Contract(msg) => write!(f, "contract violation: {}", msg),
        }
    }
}

impl std::error::Error for S4ppError {}

impl From<io::Error> for S4ppError {
    #[inline]
    fn from(err: io::Error) -> Self {
        S4ppError::Network(err.kind())
    }
}

pub type Result<T> = std::result::Result<T, S4ppError>;
