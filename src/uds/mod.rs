//! UDS / ISO-14229 diagnostics layer (spec §4.4).
//!
//! Algorithms here follow `spec.md` §4.4 directly — the signatures and
//! behavior `original_source/caringcaribou/modules/uds.py` documents are
//! elided to docstrings in the pack, so the spec is the authoritative
//! source for the discovery/session/security/tester-present flows. Naming
//! and the request-building style are grounded in `dcan.rs`'s high-level
//! wrapper functions (`read_dtcs`, `read_data_by_id`, `start_session`,
//! `tester_present`, `routine_control`) and `bmw.rs`'s `uds`/`nrc` constant
//! modules, generalized from BMW-specific D-CAN plumbing to the crate's
//! `IsoTp`-backed transport.

use crate::bus::{Bus, CanFrame};
use crate::constants::{uds, Nrc, DEFAULT_RESPONSE_PENDING_RETRIES};
use crate::error::{Error, Result};
use crate::isotp::{get_frames_from_message, IsoTp, Padding};
use crate::scanner::{self, StopFlag};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A decoded UDS response (spec §9: "sum-type... for UDS responses").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdsResponse {
    Positive(Vec<u8>),
    Negative { sid: u8, nrc: Nrc },
}

fn decode_response(sid: u8, raw: &[u8]) -> Result<UdsResponse> {
    match raw.first() {
        Some(&first) if first == sid | uds::POSITIVE_RESPONSE_OFFSET => {
            Ok(UdsResponse::Positive(raw.to_vec()))
        }
        Some(&uds::NEGATIVE_RESPONSE) => {
            let nrc = Nrc::from_code(*raw.get(2).unwrap_or(&0));
            Ok(UdsResponse::Negative {
                sid: *raw.get(1).unwrap_or(&sid),
                nrc,
            })
        }
        _ => Err(Error::protocol(format!(
            "unexpected UDS response for SID 0x{:02X}: {:02X?}",
            sid, raw
        ))),
    }
}

/// One UDS request/response exchange (spec §4.4.1). NRC 0x78
/// (responsePending) is transparently retried, restarting `N_Bs` each time,
/// up to `max_retries`; it is never surfaced to the caller. Any other
/// negative response surfaces as `Error::NegativeResponse`.
pub fn request_response<B: Bus>(
    isotp: &IsoTp<B>,
    request: &[u8],
    max_retries: u32,
) -> Result<Vec<u8>> {
    let sid = *request
        .first()
        .ok_or_else(|| Error::invalid_argument("UDS request must have at least one byte"))?;

    isotp.transmit(request, isotp.request_id, isotp.response_id)?;

    let mut retries_left = max_retries;
    loop {
        let raw = isotp.indication(isotp.response_id, isotp.request_id)?;
        match decode_response(sid, &raw)? {
            UdsResponse::Positive(data) => return Ok(data),
            UdsResponse::Negative {
                nrc: Nrc::RequestCorrectlyReceivedResponsePending,
                ..
            } => {
                if retries_left == 0 {
                    return Err(Error::timeout("responsePending retry budget exhausted"));
                }
                debug!(sid = format!("{:#04X}", sid), retries_left, "responsePending, retrying");
                retries_left -= 1;
                continue;
            }
            UdsResponse::Negative { sid, nrc } => return Err(Error::NegativeResponse { sid, nrc }),
        }
    }
}

fn request_response_default<B: Bus>(isotp: &IsoTp<B>, request: &[u8]) -> Result<Vec<u8>> {
    request_response(isotp, request, DEFAULT_RESPONSE_PENDING_RETRIES)
}

// ===========================================================================
// 4.4.2 UDS Discovery
// ===========================================================================

/// One confirmed (client, server) diagnostic channel pair.
pub type DiscoveredChannel = (u32, u32);

/// Probes `[min_id, max_id]` with a Diagnostic Session Control request,
/// recording any pair that answers (spec §4.4.2).
pub fn uds_discovery<B: Bus>(
    bus: &B,
    min_id: u32,
    max_id: u32,
    blacklist: &HashSet<u32>,
    auto_blacklist_duration: Duration,
    probe_delay: Duration,
    verify: bool,
) -> Result<Vec<DiscoveredChannel>> {
    let mut effective_blacklist = blacklist.clone();
    if !auto_blacklist_duration.is_zero() {
        let noisy = scanner::auto_blacklist(bus, auto_blacklist_duration, |_frame| true)?;
        effective_blacklist.extend(noisy);
    }

    let mut found = Vec::new();
    for client_id in min_id..=max_id {
        if effective_blacklist.contains(&client_id) {
            continue;
        }
        if let Some(response_id) = probe_session_control(bus, client_id, probe_delay)? {
            if verify {
                std::thread::sleep(Duration::from_millis(20));
                let recurred = probe_session_control(bus, client_id, probe_delay)?;
                if recurred != Some(response_id) {
                    continue;
                }
            }
            info!(
                client_id = format!("{:#06X}", client_id),
                response_id = format!("{:#06X}", response_id),
                "confirmed diagnostic channel"
            );
            found.push((client_id, response_id));
        }
    }

    found.sort_by_key(|&(client_id, _)| client_id);
    Ok(found)
}

/// Sends a minimal Diagnostic Session Control request on `client_id` and
/// waits up to `probe_delay` for the first frame whose arbitration id
/// differs from `client_id`, returning the id it arrived on. Per spec
/// §4.4.2(b), *any* frame not from the probing id itself counts as a
/// candidate response — content isn't inspected here; `verify` (the
/// caller's second pass) is what filters out one-off bus noise. Response
/// id isn't known ahead of a discovery sweep, so this listens for any
/// frame rather than going through a fixed-channel `IsoTp` instance.
fn probe_session_control<B: Bus>(
    bus: &B,
    client_id: u32,
    probe_delay: Duration,
) -> Result<Option<u32>> {
    let message = [uds::DIAGNOSTIC_SESSION_CONTROL, uds::SESSION_DEFAULT];
    let frames = get_frames_from_message(&message, Padding::Enabled(0x00))?;
    let extended = client_id > crate::constants::ARBITRATION_ID_MAX;
    bus.send(&CanFrame::new(client_id, &frames[0], extended))?;

    let deadline = Instant::now() + probe_delay;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let reply = match bus.recv(remaining)? {
            Some(reply) => reply,
            None => break,
        };
        if reply.arbitration_id != client_id {
            return Ok(Some(reply.arbitration_id));
        }
    }
    Ok(None)
}

// ===========================================================================
// 4.4.3 Service Discovery / 4.4.4 Sub-function Discovery
// ===========================================================================

/// Classification shared by service- and sub-function discovery: a
/// positive response or any NRC other than "not supported" both mean the
/// probed id exists in some form (spec §4.4.3).
fn classify_probe_outcome(outcome: &Result<Vec<u8>>, not_supported: Nrc) -> bool {
    match outcome {
        Ok(_) => true,
        Err(Error::NegativeResponse { nrc, .. }) => *nrc != not_supported,
        _ => false,
    }
}

/// Sends a minimal request for each SID in `[min_sid, max_sid]` and
/// collects the ones that respond positively or with any NRC other than
/// `serviceNotSupported` (spec §4.4.3).
pub fn service_discovery<B: Bus>(
    isotp: &IsoTp<B>,
    min_sid: u8,
    max_sid: u8,
) -> Result<Vec<u8>> {
    let mut supported = Vec::new();
    for sid in min_sid..=max_sid {
        let request = minimal_probe_request(sid);
        let outcome = request_response_default(isotp, &request);
        if classify_probe_outcome(&outcome, Nrc::ServiceNotSupported) {
            supported.push(sid);
        }
    }
    supported.sort_unstable();
    Ok(supported)
}

fn minimal_probe_request(sid: u8) -> Vec<u8> {
    match sid {
        uds::DIAGNOSTIC_SESSION_CONTROL | uds::ECU_RESET | uds::TESTER_PRESENT => {
            vec![sid, 0x01]
        }
        _ => vec![sid],
    }
}

/// Iterates sub-function values `0x00..=0xFF` for `service`, with the
/// caller-supplied extended session already active, and records which ones
/// respond as "supported" using the same positive-or-other-NRC rule as
/// service discovery (spec §4.4.4).
pub fn sub_discovery<B: Bus>(isotp: &IsoTp<B>, service: u8) -> Result<Vec<u8>> {
    let mut supported = Vec::new();
    for sub_function in 0u8..=0xFF {
        let outcome = request_response_default(isotp, &[service, sub_function]);
        if classify_probe_outcome(&outcome, Nrc::SubFunctionNotSupported) {
            supported.push(sub_function);
        }
        if sub_function == 0xFF {
            break;
        }
    }
    Ok(supported)
}

// ===========================================================================
// 4.4.5 ECU Reset, Session Control, Extended Session
// ===========================================================================

/// `reset_type` 0x00 is invalid per the standard; a conformant server
/// rejects it with NRC 0x12 (spec §4.4.5) rather than this layer rejecting
/// it client-side, since a real ECU's behavior here is itself a
/// discoverable fact.
pub fn ecu_reset<B: Bus>(isotp: &IsoTp<B>, reset_type: u8) -> Result<Vec<u8>> {
    request_response_default(isotp, &[uds::ECU_RESET, reset_type])
}

pub fn session_control<B: Bus>(isotp: &IsoTp<B>, session_type: u8) -> Result<Vec<u8>> {
    request_response_default(isotp, &[uds::DIAGNOSTIC_SESSION_CONTROL, session_type])
}

pub fn extended_session<B: Bus>(isotp: &IsoTp<B>) -> Result<Vec<u8>> {
    session_control(isotp, uds::SESSION_EXTENDED)
}

// ===========================================================================
// 4.4.6 Security Access
// ===========================================================================

/// Requests a seed at `level` (spec §4.4.6). Even level values are an
/// invalid request-seed level per the request/send-key pairing convention
/// (odd = request seed, the next even = send key) and are rejected
/// client-side before any I/O.
pub fn request_seed<B: Bus>(isotp: &IsoTp<B>, level: u8, data_record: &[u8]) -> Result<Vec<u8>> {
    if level % 2 == 0 {
        return Err(Error::invalid_argument(format!(
            "security access level 0x{:02X} is even; request_seed requires an odd level",
            level
        )));
    }
    let mut request = vec![uds::SECURITY_ACCESS, level];
    request.extend_from_slice(data_record);
    request_response_default(isotp, &request)
}

/// Sends `key` at `level` (the even level paired with the odd level that
/// produced the seed). This crate never derives a key itself — the caller
/// supplies one obtained out of band, per spec's Non-goal "no cryptographic
/// seed-solving".
pub fn send_key<B: Bus>(isotp: &IsoTp<B>, level: u8, key: &[u8]) -> Result<Vec<u8>> {
    let mut request = vec![uds::SECURITY_ACCESS, level];
    request.extend_from_slice(key);
    request_response_default(isotp, &request)
}

/// For a request-seed level `L`, returns the matching send-key level
/// `L + 1`.
pub fn send_key_level_for(request_seed_level: u8) -> u8 {
    request_seed_level + 1
}

// ===========================================================================
// 4.4.7 Tester Present
// ===========================================================================

/// Repeats TesterPresent (SID 0x3E, sub-function 0x00 or 0x80 when
/// suppressing the positive response) at `delay` intervals for `duration`,
/// or indefinitely when `duration` is `None`. No response is awaited when
/// suppression is requested (spec §4.4.7).
pub fn tester_present<B: Bus>(
    isotp: &IsoTp<B>,
    delay: Duration,
    duration: Option<Duration>,
    suppress_positive_response: bool,
    stop: &StopFlag,
) -> Result<()> {
    let sub_function = if suppress_positive_response {
        uds::SUPPRESS_POSITIVE_RESPONSE
    } else {
        0x00
    };
    let request = [uds::TESTER_PRESENT, sub_function];
    let start = std::time::Instant::now();

    loop {
        if let Some(duration) = duration {
            if start.elapsed() >= duration {
                return Ok(());
            }
        }
        if stop.is_stopped() {
            return Ok(());
        }

        if suppress_positive_response {
            isotp.transmit(&request, isotp.request_id, isotp.response_id)?;
        } else {
            request_response_default(isotp, &request)?;
        }

        std::thread::sleep(delay);
    }
}

// ===========================================================================
// 4.4.8 DID Dump
// ===========================================================================

/// For every DID in `[min_did, max_did]`, sends ReadDataByIdentifier and
/// records `(did, payload)` for positive responses; negatives are skipped
/// silently (spec §4.4.8).
pub fn dump_dids<B: Bus>(isotp: &IsoTp<B>, min_did: u16, max_did: u16) -> Result<Vec<(u16, Vec<u8>)>> {
    let mut found = Vec::new();
    for did in min_did..=max_did {
        let request = [
            uds::READ_DATA_BY_IDENTIFIER,
            (did >> 8) as u8,
            (did & 0xFF) as u8,
        ];
        match request_response_default(isotp, &request) {
            Ok(response) if response.len() >= 3 => {
                found.push((did, response[3..].to_vec()));
            }
            Ok(_) => {}
            Err(Error::NegativeResponse { .. }) => {}
            Err(other) => return Err(other),
        }
        if did == max_did {
            break;
        }
    }
    Ok(found)
}

/// Looks up a human-readable UDS service name, including the GMLAN SIDs
/// `constants::uds::service_name` supplements `spec.md` with.
pub fn service_name(sid: u8) -> &'static str {
    uds::service_name(sid).unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::CanFrame;
    use crate::mock::MockBus;
    use std::sync::Arc;

    fn channel(bus: &Arc<MockBus>, req: u32, resp: u32) -> IsoTp<MockBus> {
        IsoTp::new(bus.clone(), req, resp, Padding::Enabled(0x00))
    }

    #[test]
    fn s5_ecu_reset_success() {
        let bus = Arc::new(MockBus::new());
        bus.on_send(|frame| {
            if frame.arbitration_id == 0x7E0
                && frame.data() == [0x02, 0x11, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]
            {
                Some(CanFrame::new(
                    0x7E8,
                    &[0x02, 0x51, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
                    false,
                ))
            } else {
                None
            }
        });
        let isotp = channel(&bus, 0x7E0, 0x7E8);
        let response = ecu_reset(&isotp, 0x01).unwrap();
        assert_eq!(response, vec![0x51, 0x01]);
    }

    #[test]
    fn s6_ecu_reset_rejected() {
        let bus = Arc::new(MockBus::new());
        bus.on_send(|frame| {
            if frame.arbitration_id == 0x7E0
                && frame.data() == [0x02, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
            {
                Some(CanFrame::new(
                    0x7E8,
                    &[0x03, 0x7F, 0x11, 0x12, 0x00, 0x00, 0x00, 0x00],
                    false,
                ))
            } else {
                None
            }
        });
        let isotp = channel(&bus, 0x7E0, 0x7E8);
        let err = ecu_reset(&isotp, 0x00).unwrap_err();
        assert_eq!(
            err,
            Error::NegativeResponse {
                sid: 0x11,
                nrc: Nrc::SubFunctionNotSupported
            }
        );
    }

    #[test]
    fn s7_security_handshake() {
        let bus = Arc::new(MockBus::new());
        bus.on_send(|frame| match frame.data() {
            [0x02, 0x27, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00] => Some(CanFrame::new(
                0x7E8,
                &[0x06, 0x67, 0x01, 0xDE, 0xAD, 0xBE, 0xEF, 0x00],
                false,
            )),
            [0x06, 0x27, 0x02, 0xCA, 0xFE, 0xBA, 0xBE, 0x00] => Some(CanFrame::new(
                0x7E8,
                &[0x02, 0x67, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00],
                false,
            )),
            _ => None,
        });
        let isotp = channel(&bus, 0x7E0, 0x7E8);

        let seed_response = request_seed(&isotp, 0x01, &[]).unwrap();
        assert_eq!(&seed_response[..2], &[0x67, 0x01]);

        let key_level = send_key_level_for(0x01);
        assert_eq!(key_level, 0x02);
        let key_response = send_key(&isotp, key_level, &[0xCA, 0xFE, 0xBA, 0xBE]).unwrap();
        assert_eq!(key_response, vec![0x67, 0x02]);
    }

    #[test]
    fn request_seed_rejects_even_level_client_side() {
        let bus = Arc::new(MockBus::new());
        let isotp = channel(&bus, 0x7E0, 0x7E8);
        let err = request_seed(&isotp, 0x02, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(bus.sent_frames().is_empty());
    }

    #[test]
    fn response_pending_is_retried_transparently() {
        let bus = Arc::new(MockBus::new());
        bus.queue_response(CanFrame::new(0x7E8, &[0x03, 0x7F, 0x22, 0x78], false));
        bus.queue_response(CanFrame::new(0x7E8, &[0x06, 0x62, 0xF1, 0x90, 1, 2, 3], false));
        let isotp = channel(&bus, 0x7E0, 0x7E8);
        let response = request_response_default(&isotp, &[0x22, 0xF1, 0x90]).unwrap();
        assert_eq!(response[0], 0x62);
    }

    #[test]
    fn s4_service_discovery_finds_supported_only() {
        let bus = Arc::new(MockBus::new());
        bus.on_send(|frame| {
            let sid = *frame.data().get(1)?;
            match sid {
                0x10 => Some(CanFrame::new(0x7E8, &[0x06, 0x50, 0x01, 0, 0x32, 0x01, 0xF4], false)),
                0x11 => Some(CanFrame::new(0x7E8, &[0x02, 0x51, 0x01], false)),
                other => Some(CanFrame::new(0x7E8, &[0x03, 0x7F, other, 0x11], false)),
            }
        });
        let isotp = channel(&bus, 0x7E0, 0x7E8);
        let supported = service_discovery(&isotp, 0x09, 0x13).unwrap();
        assert_eq!(supported, vec![0x10, 0x11]);
    }

    #[test]
    fn s3_uds_discovery_over_mock_channel() {
        let bus = Arc::new(MockBus::new());
        bus.on_send(|frame| {
            if frame.arbitration_id == 0x300E {
                Some(CanFrame::new(
                    0x300F,
                    &[0x06, 0x50, 0x01, 0x00, 0x32, 0x01, 0xF4],
                    false,
                ))
            } else {
                None
            }
        });

        let found = uds_discovery(
            bus.as_ref(),
            0x3009,
            0x3013,
            &HashSet::new(),
            Duration::from_millis(0),
            Duration::from_millis(50),
            true,
        )
        .unwrap();

        assert_eq!(found, vec![(0x300E, 0x300F)]);
    }

    #[test]
    fn uds_discovery_skips_blacklisted_ids() {
        let bus = Arc::new(MockBus::new());
        bus.on_send(|frame| {
            if frame.arbitration_id == 0x300E {
                Some(CanFrame::new(0x300F, &[0x06, 0x50, 0x01, 0, 0x32, 1, 0xF4], false))
            } else {
                None
            }
        });

        let found = uds_discovery(
            bus.as_ref(),
            0x3009,
            0x3013,
            &HashSet::from([0x300E]),
            Duration::from_millis(0),
            Duration::from_millis(50),
            false,
        )
        .unwrap();

        assert!(found.is_empty());
    }

    #[test]
    fn uds_discovery_is_idempotent_on_unchanged_bus() {
        let bus = Arc::new(MockBus::new());
        bus.on_send(|frame| {
            if frame.arbitration_id == 0x300E {
                Some(CanFrame::new(0x300F, &[0x06, 0x50, 0x01, 0, 0x32, 1, 0xF4], false))
            } else {
                None
            }
        });

        let run = || {
            uds_discovery(
                bus.as_ref(),
                0x3009,
                0x3013,
                &HashSet::new(),
                Duration::from_millis(0),
                Duration::from_millis(30),
                false,
            )
            .unwrap()
        };

        assert_eq!(run(), run());
    }
}
