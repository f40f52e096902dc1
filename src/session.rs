//! Data model shared across the UDS and XCP layers (spec §3).

use bitflags::bitflags;
use chrono::{DateTime, Utc};

/// Byte order for XCP addresses, decoded from the Connect response's
/// COMM_MODE_BASIC bit 0 (spec §4.5.3 step 1; field layout from
/// `original_source/tool/modules/xcp.py::decode_connect_response`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ByteOrder {
    LsbFirst,
    MsbFirst,
}

bitflags! {
    /// Resource protection status (Connect response byte 1 / GetStatus
    /// byte 2): which optional resources require Seed & Key.
    #[derive(serde::Serialize, serde::Deserialize)]
    pub struct ResourceProtection: u8 {
        const CAL_PAG = 0b0000_0001;
        const DAQ     = 0b0000_0100;
        const STIM    = 0b0000_1000;
        const PGM     = 0b0001_0000;
    }
}

bitflags! {
    /// COMM_MODE_BASIC (Connect response byte 2).
    #[derive(serde::Serialize, serde::Deserialize)]
    pub struct CommModeBasic: u8 {
        const BYTE_ORDER           = 0b0000_0001;
        const ADDRESS_GRANULARITY0 = 0b0000_0010;
        const ADDRESS_GRANULARITY1 = 0b0000_0100;
        const SLAVE_BLOCK_MODE     = 0b0100_0000;
        const OPTIONAL             = 0b1000_0000;
    }
}

impl CommModeBasic {
    pub fn byte_order(self) -> ByteOrder {
        if self.contains(CommModeBasic::BYTE_ORDER) {
            ByteOrder::MsbFirst
        } else {
            ByteOrder::LsbFirst
        }
    }
}

/// A diagnostic session as the caller-held logical state the UDS layer is
/// otherwise stateless around (spec §3: "the protocol layer is stateless
/// beyond in-flight transaction bookkeeping").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiagnosticSessionState {
    pub channel: (u32, u32),
    pub current_session_type: u8,
    pub security_level_unlocked: Option<u8>,
    pub last_tester_present_timestamp: Option<DateTime<Utc>>,
}

impl DiagnosticSessionState {
    pub fn new(request_id: u32, response_id: u32) -> Self {
        DiagnosticSessionState {
            channel: (request_id, response_id),
            current_session_type: crate::constants::uds::SESSION_DEFAULT,
            security_level_unlocked: None,
            last_tester_present_timestamp: None,
        }
    }
}

/// XCP slave connection state (spec §3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct XcpSlaveState {
    pub connected: bool,
    pub byte_order: ByteOrder,
    pub max_cto: u8,
    pub max_dto: u16,
    pub protocol_version: u8,
    pub transport_version: u8,
    pub resource_protection: ResourceProtection,
    pub comm_mode: CommModeBasic,
    pub current_mta: Option<u32>,
}
