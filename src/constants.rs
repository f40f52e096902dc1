//! Protocol constants: UDS service IDs and negative-response codes, XCP
//! command and error tables, and the timing defaults used throughout the
//! crate.
//!
//! The UDS tables here are a superset of what `spec.md` enumerates by name:
//! the GMLAN-specific service IDs and the full 22-entry NRC table are pulled
//! from `caringcaribou`'s `modules/dcm.py` (see `DESIGN.md`), since the spec
//! explicitly allows service-name/NRC tables it names as "plus the
//! GMLAN-specific IDs" to be filled in from the original.

/// ISO-TP receiver timeout waiting for the next expected frame.
pub const N_BS_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1500);

/// Maximum single ISO-TP message length.
pub const MAX_MESSAGE_LENGTH: usize = 4095;

/// Maximum payload that fits in a Single Frame.
pub const MAX_SF_LENGTH: usize = 7;

/// Fixed per-message delay used by bruteforce iteration (~0.1s), matching
/// `can_actions.py`'s `MESSAGE_DELAY`.
pub const BRUTEFORCE_MESSAGE_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

/// Poll granularity used by `auto_blacklist`, matching `can_actions.py`.
pub const AUTO_BLACKLIST_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

/// Bounded dispatcher shutdown window (spec §4.1).
pub const DISPATCHER_SHUTDOWN_WINDOW: std::time::Duration = std::time::Duration::from_millis(500);

/// Default bound on responsePending (0x78) retries before giving up —
/// Open Question (a), see `DESIGN.md`.
pub const DEFAULT_RESPONSE_PENDING_RETRIES: u32 = 10;

/// Largest arbitration id representable with an 11-bit standard frame.
pub const ARBITRATION_ID_MAX: u32 = 0x7FF;

/// Largest arbitration id representable with a 29-bit extended frame.
pub const ARBITRATION_ID_MAX_EXTENDED: u32 = 0x1FFF_FFFF;

/// XCP `max_segment_size` for ShortUpload over raw CAN — Open Question (c).
pub const XCP_MAX_SEGMENT_SIZE: u8 = 7;

/// XCP idle-timeout reset value for the memory-dump state machine.
pub const XCP_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(3000);

/// XCP command-discovery per-command response timeout.
pub const XCP_COMMAND_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(3000);

// ===========================================================================
// UDS service identifiers
// ===========================================================================

pub mod uds {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const GMLAN_READ_FAILURE_RECORD: u8 = 0x12;
    pub const CLEAR_DIAGNOSTIC_INFORMATION: u8 = 0x14;
    pub const READ_DTC_INFORMATION: u8 = 0x19;
    pub const GMLAN_READ_DIAGNOSTIC_ID: u8 = 0x1A;
    pub const RETURN_TO_NORMAL: u8 = 0x20;
    pub const READ_DATA_BY_IDENTIFIER: u8 = 0x22;
    pub const READ_MEMORY_BY_ADDRESS: u8 = 0x23;
    pub const READ_SCALING_DATA_BY_IDENTIFIER: u8 = 0x24;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const COMMUNICATION_CONTROL: u8 = 0x28;
    pub const READ_DATA_BY_PERIODIC_IDENTIFIER: u8 = 0x2A;
    pub const DYNAMICALLY_DEFINE_DATA_IDENTIFIER: u8 = 0x2C;
    pub const DEFINE_PID_BY_MEMORY_ADDRESS: u8 = 0x2D;
    pub const WRITE_DATA_BY_IDENTIFIER: u8 = 0x2E;
    pub const INPUT_OUTPUT_CONTROL_BY_IDENTIFIER: u8 = 0x2F;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const REQUEST_DOWNLOAD: u8 = 0x34;
    pub const REQUEST_UPLOAD: u8 = 0x35;
    pub const TRANSFER_DATA: u8 = 0x36;
    pub const REQUEST_TRANSFER_EXIT: u8 = 0x37;
    pub const REQUEST_FILE_TRANSFER: u8 = 0x38;
    pub const GMLAN_WRITE_DID: u8 = 0x3B;
    pub const WRITE_MEMORY_BY_ADDRESS: u8 = 0x3D;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
    pub const ACCESS_TIMING_PARAMETER: u8 = 0x83;
    pub const SECURED_DATA_TRANSMISSION: u8 = 0x84;
    pub const CONTROL_DTC_SETTING: u8 = 0x85;
    pub const RESPONSE_ON_EVENT: u8 = 0x86;
    pub const LINK_CONTROL: u8 = 0x87;
    pub const GMLAN_REPORT_PROGRAMMING_STATE: u8 = 0xA2;
    pub const GMLAN_ENTER_PROGRAMMING_MODE: u8 = 0xA5;
    pub const GMLAN_CHECK_CODES: u8 = 0xA9;
    pub const GMLAN_READ_DPID: u8 = 0xAA;
    pub const GMLAN_DEVICE_CONTROL: u8 = 0xAE;

    /// Bit added to a SID to form its positive response.
    pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

    /// Diagnostic session types.
    pub const SESSION_DEFAULT: u8 = 0x01;
    pub const SESSION_PROGRAMMING: u8 = 0x02;
    pub const SESSION_EXTENDED: u8 = 0x03;

    /// ECU reset sub-functions. `0x00` is invalid per the standard and
    /// always rejected by a conformant server with NRC 0x12.
    pub const RESET_HARD: u8 = 0x01;
    pub const RESET_KEY_OFF_ON: u8 = 0x02;
    pub const RESET_SOFT: u8 = 0x03;

    /// "Suppress positive response" bit, overlaid on a sub-function byte.
    pub const SUPPRESS_POSITIVE_RESPONSE: u8 = 0x80;

    /// Human-readable service name, including the GMLAN-specific entries
    /// from `caringcaribou`'s `DCM_SERVICE_NAMES`.
    pub fn service_name(sid: u8) -> Option<&'static str> {
        Some(match sid {
            0x10 => "DiagnosticSessionControl",
            0x11 => "EcuReset",
            0x12 => "GmlanReadFailureRecord",
            0x14 => "ClearDiagnosticInformation",
            0x19 => "ReadDtcInformation",
            0x1A => "GmlanReadDiagnosticId",
            0x20 => "ReturnToNormal",
            0x22 => "ReadDataByIdentifier",
            0x23 => "ReadMemoryByAddress",
            0x24 => "ReadScalingDataByIdentifier",
            0x27 => "SecurityAccess",
            0x28 => "CommunicationControl",
            0x2A => "ReadDataByPeriodicIdentifier",
            0x2C => "DynamicallyDefineDataIdentifier",
            0x2D => "DefinePidByMemoryAddress",
            0x2E => "WriteDataByIdentifier",
            0x2F => "InputOutputControlByIdentifier",
            0x31 => "RoutineControl",
            0x34 => "RequestDownload",
            0x35 => "RequestUpload",
            0x36 => "TransferData",
            0x37 => "RequestTransferExit",
            0x38 => "RequestFileTransfer",
            0x3B => "GmlanWriteDid",
            0x3D => "WriteMemoryByAddress",
            0x3E => "TesterPresent",
            0x7F => "NegativeResponse",
            0x83 => "AccessTimingParameter",
            0x84 => "SecuredDataTransmission",
            0x85 => "ControlDtcSetting",
            0x86 => "ResponseOnEvent",
            0x87 => "LinkControl",
            0xA2 => "GmlanReportProgrammingState",
            0xA5 => "GmlanEnterProgrammingMode",
            0xA9 => "GmlanCheckCodes",
            0xAA => "GmlanReadDpid",
            0xAE => "GmlanDeviceControl",
            _ => return None,
        })
    }
}

/// Negative Response Code — the full 22-entry table from
/// `caringcaribou/modules/dcm.py`'s `NRC` dict, a superset of the
/// illustrative subset named in `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Nrc {
    GeneralReject,
    ServiceNotSupported,
    SubFunctionNotSupported,
    IncorrectMessageLengthOrInvalidFormat,
    ResponseTooBig,
    BusyRepeatRequest,
    ConditionsNotCorrect,
    RequestSequenceError,
    NoResponseFromSubnetComponent,
    FailurePreventsExecutionOfRequestedAction,
    RequestOutOfRange,
    SecurityAccessDenied,
    InvalidKey,
    ExceededNumberOfAttempts,
    RequiredTimeDelayNotExpired,
    UploadDownloadNotAccepted,
    TransferDataSuspended,
    GeneralProgrammingFailure,
    WrongBlockSequenceCounter,
    RequestCorrectlyReceivedResponsePending,
    SubFunctionNotSupportedInActiveSession,
    ServiceNotSupportedInActiveSession,
    /// A code this table doesn't recognize; carried through verbatim so
    /// callers still see something useful.
    Unknown(u8),
}

impl Nrc {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x10 => Nrc::GeneralReject,
            0x11 => Nrc::ServiceNotSupported,
            0x12 => Nrc::SubFunctionNotSupported,
            0x13 => Nrc::IncorrectMessageLengthOrInvalidFormat,
            0x14 => Nrc::ResponseTooBig,
            0x21 => Nrc::BusyRepeatRequest,
            0x22 => Nrc::ConditionsNotCorrect,
            0x24 => Nrc::RequestSequenceError,
            0x25 => Nrc::NoResponseFromSubnetComponent,
            0x26 => Nrc::FailurePreventsExecutionOfRequestedAction,
            0x31 => Nrc::RequestOutOfRange,
            0x33 => Nrc::SecurityAccessDenied,
            0x35 => Nrc::InvalidKey,
            0x36 => Nrc::ExceededNumberOfAttempts,
            0x37 => Nrc::RequiredTimeDelayNotExpired,
            0x70 => Nrc::UploadDownloadNotAccepted,
            0x71 => Nrc::TransferDataSuspended,
            0x72 => Nrc::GeneralProgrammingFailure,
            0x73 => Nrc::WrongBlockSequenceCounter,
            0x78 => Nrc::RequestCorrectlyReceivedResponsePending,
            0x7E => Nrc::SubFunctionNotSupportedInActiveSession,
            0x7F => Nrc::ServiceNotSupportedInActiveSession,
            other => Nrc::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Nrc::GeneralReject => 0x10,
            Nrc::ServiceNotSupported => 0x11,
            Nrc::SubFunctionNotSupported => 0x12,
            Nrc::IncorrectMessageLengthOrInvalidFormat => 0x13,
            Nrc::ResponseTooBig => 0x14,
            Nrc::BusyRepeatRequest => 0x21,
            Nrc::ConditionsNotCorrect => 0x22,
            Nrc::RequestSequenceError => 0x24,
            Nrc::NoResponseFromSubnetComponent => 0x25,
            Nrc::FailurePreventsExecutionOfRequestedAction => 0x26,
            Nrc::RequestOutOfRange => 0x31,
            Nrc::SecurityAccessDenied => 0x33,
            Nrc::InvalidKey => 0x35,
            Nrc::ExceededNumberOfAttempts => 0x36,
            Nrc::RequiredTimeDelayNotExpired => 0x37,
            Nrc::UploadDownloadNotAccepted => 0x70,
            Nrc::TransferDataSuspended => 0x71,
            Nrc::GeneralProgrammingFailure => 0x72,
            Nrc::WrongBlockSequenceCounter => 0x73,
            Nrc::RequestCorrectlyReceivedResponsePending => 0x78,
            Nrc::SubFunctionNotSupportedInActiveSession => 0x7E,
            Nrc::ServiceNotSupportedInActiveSession => 0x7F,
            Nrc::Unknown(code) => code,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Nrc::GeneralReject => "generalReject",
            Nrc::ServiceNotSupported => "serviceNotSupported",
            Nrc::SubFunctionNotSupported => "sub-functionNotSupported",
            Nrc::IncorrectMessageLengthOrInvalidFormat => "incorrectMessageLengthOrInvalidFormat",
            Nrc::ResponseTooBig => "responseTooBig",
            Nrc::BusyRepeatRequest => "busyRepeatRequest",
            Nrc::ConditionsNotCorrect => "conditionsNotCorrect",
            Nrc::RequestSequenceError => "requestSequenceError",
            Nrc::NoResponseFromSubnetComponent => "noResponseFromSubnetComponent",
            Nrc::FailurePreventsExecutionOfRequestedAction => {
                "failurePreventsExecutionOfRequestedAction"
            }
            Nrc::RequestOutOfRange => "requestOutOfRange",
            Nrc::SecurityAccessDenied => "securityAccessDenied",
            Nrc::InvalidKey => "invalidKey",
            Nrc::ExceededNumberOfAttempts => "exceededNumberOfAttempts",
            Nrc::RequiredTimeDelayNotExpired => "requiredTimeDelayNotExpired",
            Nrc::UploadDownloadNotAccepted => "uploadDownloadNotAccepted",
            Nrc::TransferDataSuspended => "transferDataSuspended",
            Nrc::GeneralProgrammingFailure => "generalProgrammingFailure",
            Nrc::WrongBlockSequenceCounter => "wrongBlockSequenceCounter",
            Nrc::RequestCorrectlyReceivedResponsePending => {
                "requestCorrectlyReceivedResponsePending"
            }
            Nrc::SubFunctionNotSupportedInActiveSession => {
                "sub-FunctionNotSupportedInActiveSession"
            }
            Nrc::ServiceNotSupportedInActiveSession => "serviceNotSupportedInActiveSession",
            Nrc::Unknown(_) => "unknown",
        }
    }
}

// ===========================================================================
// XCP command and error tables, verbatim from original_source/tool/modules/xcp.py
// ===========================================================================

/// `(code, name)` pairs for every XCP command the original tool's
/// `XCP_COMMAND_CODES` table lists, CONNECT down to PROGRAM_VERIFY.
pub const XCP_COMMANDS: &[(u8, &str)] = &[
    (0xFF, "CONNECT"),
    (0xFE, "DISCONNECT"),
    (0xFD, "GET_STATUS"),
    (0xFC, "SYNCH"),
    (0xFB, "GET_COMM_MODE_INFO"),
    (0xFA, "GET_ID"),
    (0xF9, "SET_REQUEST"),
    (0xF8, "GET_SEED"),
    (0xF7, "UNLOCK"),
    (0xF6, "SET_MTA"),
    (0xF5, "UPLOAD"),
    (0xF4, "SHORT_UPLOAD"),
    (0xF3, "BUILD_CHECKSUM"),
    (0xF2, "TRANSPORT_LAYER_CMD"),
    (0xF1, "USER_CMD"),
    (0xF0, "DOWNLOAD"),
    (0xEF, "DOWNLOAD_NEXT"),
    (0xEE, "DOWNLOAD_MAX"),
    (0xED, "SHORT_DOWNLOAD"),
    (0xEC, "MODIFY_BITS"),
    (0xEB, "SET_CAL_PAGE"),
    (0xEA, "GET_CAL_PAGE"),
    (0xE9, "GET_PAG_PROCESSOR_INFO"),
    (0xE8, "GET_SEGMENT_INFO"),
    (0xE7, "GET_PAGE_INFO"),
    (0xE6, "SET_SEGMENT_MODE"),
    (0xE5, "GET_SEGMENT_MODE"),
    (0xE4, "COPY_CAL_PAGE"),
    (0xE3, "CLEAR_DAQ_LIST"),
    (0xE2, "SET_DAQ_PTR"),
    (0xE1, "WRITE_DAQ"),
    (0xE0, "SET_DAQ_LIST_MODE"),
    (0xDF, "GET_DAQ_LIST_MODE"),
    (0xDE, "START_STOP_DAQ_LIST"),
    (0xDD, "START_STOP_SYNCH"),
    (0xDC, "GET_DAQ_CLOCK"),
    (0xDB, "READ_DAQ"),
    (0xDA, "GET_DAQ_PROCESSOR_INFO"),
    (0xD9, "GET_DAQ_RESOLUTION_INFO"),
    (0xD8, "GET_DAQ_LIST_INFO"),
    (0xD7, "GET_DAQ_EVENT_INFO"),
    (0xD6, "FREE_DAQ"),
    (0xD5, "ALLOC_DAQ"),
    (0xD4, "ALLOC_ODT"),
    (0xD3, "ALLOC_ODT_ENTRY"),
    (0xD2, "PROGRAM_START"),
    (0xD1, "PROGRAM_CLEAR"),
    (0xD0, "PROGRAM"),
    (0xCF, "PROGRAM_RESET"),
    (0xCE, "GET_PGM_PROCESSOR_INFO"),
    (0xCD, "GET_SECTOR_INFO"),
    (0xCC, "PROGRAM_PREPARE"),
    (0xCB, "PROGRAM_FORMAT"),
    (0xCA, "PROGRAM_NEXT"),
    (0xC9, "PROGRAM_MAX"),
    (0xC8, "PROGRAM_VERIFY"),
];

/// `(code, (short_name, description))` for every XCP error code, verbatim
/// from `XCP_ERROR_CODES`.
pub const XCP_ERRORS: &[(u8, (&str, &str))] = &[
    (0x00, ("ERR_CMD_SYNC", "Command processor synchronisation.")),
    (0x10, ("ERR_CMD_BUSY", "Command was not executed.")),
    (0x11, ("ERR_DAQ_ACTIVE", "Command rejected because DAQ is running.")),
    (0x12, ("ERR_PGM_ACTIVE", "Command rejected because PGM is running.")),
    (0x20, ("ERR_CMD_UNKNOWN", "Unknown command or not implemented optional command.")),
    (0x21, ("ERR_CMD_SYNTAX", "Command syntax invalid.")),
    (0x22, ("ERR_OUT_OF_RANGE", "Command syntax valid but command parameter(s) out of range.")),
    (0x23, ("ERR_WRITE_PROTECTED", "The memory location is write protected.")),
    (0x24, ("ERR_ACCESS_DENIED", "The memory location is not accessible.")),
    (0x25, ("ERR_ACCESS_LOCKED", "Access denied, Seed & Key is required.")),
    (0x26, ("ERR_PAGE_NOT_VALID", "Selected page not available.")),
    (0x27, ("ERR_MODE_NOT_VALID", "Selected page mode not available.")),
    (0x28, ("ERR_SEGMENT_NOT_VALID", "Selected segment not valid.")),
    (0x29, ("ERR_SEQUENCE", "Sequence error.")),
    (0x2A, ("ERR_DAQ_CONFIG", "DAQ configuration not valid.")),
    (0x30, ("ERR_MEMORY_OVERFLOW", "Memory overflow error.")),
    (0x31, ("ERR_GENERIC", "Generic error.")),
    (0x32, ("ERR_VERIFY", "The slave internal program verify routine detects an error.")),
];

pub fn xcp_command_name(code: u8) -> Option<&'static str> {
    XCP_COMMANDS.iter().find(|(c, _)| *c == code).map(|(_, n)| *n)
}

pub fn xcp_error_label(code: u8) -> (&'static str, &'static str) {
    XCP_ERRORS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, l)| *l)
        .unwrap_or(("UNKNOWN", "Unknown error"))
}
