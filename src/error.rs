//! Error taxonomy shared by every layer of the toolkit.
//!
//! Frame-level decoders deliberately do *not* use this type: they return
//! `Option` because they are used speculatively during discovery probes,
//! where a malformed or short frame is routine input, not a failure (see
//! `isotp::decode_single_frame` and friends). `Error` is for the layers
//! above that: ISO-TP transactions, UDS orchestration, XCP orchestration.

use crate::constants::Nrc;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A length/range violation caught before any I/O took place.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The bus driver refused a send or signaled a hardware fault.
    #[error("bus error: {0}")]
    BusError(String),

    /// `N_Bs` expired, no flow control was received, no response arrived
    /// within the probe delay, or the XCP idle timer elapsed.
    #[error("timeout waiting for {0}")]
    Timeout(String),

    /// Malformed PCI, wrong CF sequence number, unknown frame type, or an
    /// unexpected flow-control status.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The peer reported flow status Overflow; the transmit aborted.
    #[error("peer reported overflow, transmit aborted")]
    PeerOverflow,

    /// A UDS server replied with `[0x7F, SID, NRC]`. NRC 0x78
    /// (responsePending) is never surfaced through this variant — see
    /// `uds::request_response`.
    #[error("negative response to SID 0x{sid:02X}: {nrc:?}")]
    NegativeResponse { sid: u8, nrc: Nrc },

    /// The XCP slave returned `0xFE` with a known error code.
    #[error("XCP error 0x{code:02X} ({label})")]
    XcpError { code: u8, label: &'static str },
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::ProtocolError(msg.into())
    }

    pub fn timeout(what: impl Into<String>) -> Self {
        Error::Timeout(what.into())
    }
}
