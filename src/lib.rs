//! A vehicle-bus security and diagnostics toolkit built on three layered
//! CAN protocols: the ISO-15765-2 (ISO-TP) transport, UDS / ISO-14229
//! diagnostics on top of it, and the XCP calibration protocol used for
//! memory dumps.
//!
//! The crate is organized leaves-first, matching the five components of
//! the design: [`bus`] (the driver contract every other module depends
//! on), [`scanner`] (brute-force/auto-blacklist convenience layer),
//! [`isotp`] (segmentation/reassembly engine), [`uds`] (request/response
//! orchestration, discovery, session/security/tester-present flows) and
//! [`xcp`] (connect/upload state machine). [`constants`] holds the
//! protocol tables (SIDs, NRCs, XCP command/error codes) shared across
//! layers; [`session`] holds the data model each caller holds onto
//! between calls; [`error`] is the crate-wide error taxonomy.
//!
//! This crate does not provide a CAN driver, a command-line interface, or
//! persistence — callers supply a [`bus::Bus`] implementation for their
//! own hardware and build orchestration on top of the functions exposed
//! here. See each module's docs for the relevant part of the protocol.

pub mod bus;
pub mod constants;
pub mod error;
pub mod isotp;
pub mod scanner;
pub mod session;
pub mod uds;
pub mod xcp;

#[cfg(test)]
pub mod mock;

pub use bus::{Bus, CanFrame, Filter};
pub use error::{Error, Result};

/// Crate-wide tunables that replace the scattered constructor parameters
/// and ad hoc defaults the donor hard-codes per call site (`dcan.rs`'s
/// `block_size`/`separation_time` fields on `DCanHandler`). Construct with
/// [`Config::default`] and override only the fields a caller needs to
/// change, matching the donor's `DCanHandler::new()` / `for_ecu()`
/// sensible-default-plus-override pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// ISO-TP `N_Bs` receiver timeout (spec §4.3.3, default 1.5s).
    pub n_bs_timeout: std::time::Duration,
    /// Bound on UDS responsePending (0x78) retries before giving up —
    /// spec §9 Open Question (a), default 10.
    pub response_pending_retries: u32,
    /// XCP memory-dump idle timeout, reset on every accepted reply (spec
    /// §4.5.3, default 3s).
    pub xcp_idle_timeout: std::time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            n_bs_timeout: constants::N_BS_TIMEOUT,
            response_pending_retries: constants::DEFAULT_RESPONSE_PENDING_RETRIES,
            xcp_idle_timeout: constants::XCP_IDLE_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_spec_constants() {
        let config = Config::default();
        assert_eq!(config.n_bs_timeout, constants::N_BS_TIMEOUT);
        assert_eq!(config.response_pending_retries, 10);
    }
}
