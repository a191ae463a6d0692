//! Error types for the STUN client.

use thiserror::Error;

/// Errors produced by the codec, the transport, and the probes.
///
/// Absence of a response is never an error; operations that can time
/// out return `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum StunError {
    /// An endpoint string did not resolve to any IPv4 address.
    #[error("failed to resolve {0} as a udp4 endpoint")]
    Resolve(String),

    /// Socket-level I/O failure.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// A datagram too small or too large to be a STUN message.
    #[error("invalid message")]
    InvalidMessage,

    /// An attribute with a truncated, oversized, or unaligned length.
    #[error("invalid attribute")]
    InvalidAttribute,

    /// An attribute that does not carry an address payload.
    #[error("attribute is not an address")]
    NotAnAddress,

    /// A response that lacks an attribute the probe requires.
    #[error("response missing {0} attribute")]
    MissingAttribute(&'static str),

    /// The client was closed while an operation was in flight.
    #[error("client closed")]
    Closed,
}
