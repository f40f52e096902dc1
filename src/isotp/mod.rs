//! ISO-15765-2 (ISO-TP) transport: frame-level encode/decode, the receive
//! state machine (`indication`) and the transmit state machine
//! (`transmit`). This is the most intricate part of the crate (spec §2: "the
//! IsoTp engine alone is the single most intricate piece").
//!
//! Frame shapes and the segmentation algorithm are grounded in
//! `original_source/caringcaribou/utils/iso15765_2.py`, the authoritative
//! ancestor of the donor's `dcan.rs::IsoTpFrame`/`DCanHandler`. Two points
//! deliberately diverge from that original in favor of `spec.md`'s stricter,
//! unambiguous requirements — see `DESIGN.md`: CF sequence-number mismatch
//! aborts with `ProtocolError` instead of being silently ignored, and
//! zero-length messages are rejected like oversized ones.

use crate::bus::{Bus, CanFrame, Filter};
use crate::constants::{MAX_MESSAGE_LENGTH, MAX_SF_LENGTH, N_BS_TIMEOUT};
use crate::error::{Error, Result};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Padding policy for outgoing frames (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    Enabled(u8),
    Disabled,
}

impl Padding {
    fn fill(self, buf: &mut [u8]) {
        if let Padding::Enabled(value) = self {
            for b in buf.iter_mut() {
                *b = value;
            }
        }
    }
}

/// Flow-control status (PCI low nibble of an FC frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    ClearToSend,
    Wait,
    Overflow,
}

impl FlowStatus {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(FlowStatus::ClearToSend),
            1 => Some(FlowStatus::Wait),
            2 => Some(FlowStatus::Overflow),
            _ => None,
        }
    }

    fn nibble(self) -> u8 {
        match self {
            FlowStatus::ClearToSend => 0,
            FlowStatus::Wait => 1,
            FlowStatus::Overflow => 2,
        }
    }
}

/// A decoded ISO-TP PCI frame (spec §3, §4.3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Single { data: Vec<u8> },
    First { length: u16, data: Vec<u8> },
    Consecutive { sn: u8, data: Vec<u8> },
    FlowControl { status: FlowStatus, bs: u8, stmin: u8 },
}

/// Decodes the PCI high nibble of `data[0]` speculatively: returns `None`
/// on frames shorter than their minimum PCI length or an unrecognized
/// nibble, exactly as the frame decoders in the original tool do (they are
/// used during discovery probes where garbage input is routine, not an
/// error — see `error.rs`'s module doc).
pub fn decode_frame(data: &[u8]) -> Option<Frame> {
    let pci = *data.first()?;
    match pci >> 4 {
        0x0 => {
            let len = (pci & 0x0F) as usize;
            if data.len() < 1 + len {
                return None;
            }
            Some(Frame::Single {
                data: data[1..1 + len].to_vec(),
            })
        }
        0x1 => {
            if data.len() < 8 {
                return None;
            }
            let length = (((pci & 0x0F) as u16) << 8) | data[1] as u16;
            Some(Frame::First {
                length,
                data: data[2..8].to_vec(),
            })
        }
        0x2 => {
            if data.len() < 2 {
                return None;
            }
            Some(Frame::Consecutive {
                sn: pci & 0x0F,
                data: data[1..].to_vec(),
            })
        }
        0x3 => {
            if data.len() < 3 {
                return None;
            }
            let status = FlowStatus::from_nibble(pci & 0x0F)?;
            Some(Frame::FlowControl {
                status,
                bs: data[1],
                stmin: data[2],
            })
        }
        _ => None,
    }
}

fn encode_flow_control(status: FlowStatus, bs: u8, stmin: u8) -> [u8; 8] {
    [0x30 | status.nibble(), bs, stmin, 0, 0, 0, 0, 0]
}

/// Segments `message` into ISO-TP frames (spec §4.3.1). Fails with
/// `InvalidArgument` before any I/O when the message is empty or exceeds
/// `MAX_MESSAGE_LENGTH` — the second check mirrors the original's
/// `MessageTooLong`/`ValueError`; the emptiness check is this crate's own
/// addition per `spec.md` §3/§8 (see `DESIGN.md`).
pub fn get_frames_from_message(message: &[u8], padding: Padding) -> Result<Vec<Vec<u8>>> {
    if message.is_empty() {
        return Err(Error::invalid_argument("ISO-TP message must not be empty"));
    }
    if message.len() > MAX_MESSAGE_LENGTH {
        return Err(Error::invalid_argument(format!(
            "ISO-TP message of {} bytes exceeds the {}-byte maximum",
            message.len(),
            MAX_MESSAGE_LENGTH
        )));
    }

    if message.len() <= MAX_SF_LENGTH {
        let mut frame = vec![0u8; if matches!(padding, Padding::Enabled(_)) { 8 } else { message.len() + 1 }];
        padding.fill(&mut frame);
        frame[0] = message.len() as u8;
        frame[1..1 + message.len()].copy_from_slice(message);
        return Ok(vec![frame]);
    }

    let mut frames = Vec::new();

    // First Frame: always exactly 8 bytes regardless of padding policy.
    let mut ff = vec![0u8; 8];
    padding.fill(&mut ff);
    let length = message.len() as u16;
    ff[0] = 0x10 | ((length >> 8) as u8 & 0x0F);
    ff[1] = (length & 0xFF) as u8;
    ff[2..8].copy_from_slice(&message[0..6]);
    frames.push(ff);

    let mut offset = 6;
    let mut sn: u8 = 0;
    while offset < message.len() {
        sn = (sn + 1) % 16;
        let remaining = message.len() - offset;
        let chunk_len = remaining.min(7);
        let is_last = offset + chunk_len >= message.len();
        let mut cf = vec![
            0u8;
            if is_last && matches!(padding, Padding::Disabled) {
                chunk_len + 1
            } else {
                8
            }
        ];
        padding.fill(&mut cf);
        cf[0] = 0x20 | sn;
        cf[1..1 + chunk_len].copy_from_slice(&message[offset..offset + chunk_len]);
        frames.push(cf);
        offset += chunk_len;
    }

    Ok(frames)
}

/// Whether an `IsoTp::indication` call that sees a First Frame should
/// abandon the exchange after the FF alone (sending FS=Overflow), rather
/// than reassembling the full message — spec §4.3.3 branch (a).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMode {
    Full,
    FirstFrameOnly,
}

/// Binds (request_id, response_id, padding, bus) for the duration of one
/// diagnostic channel (spec §3 "Lifecycles"). Exactly one in-flight
/// transaction per direction is assumed; concurrent exchanges use separate
/// `IsoTp` instances (spec §5).
pub struct IsoTp<B: Bus> {
    bus: Arc<B>,
    pub request_id: u32,
    pub response_id: u32,
    pub padding: Padding,
    pub n_bs_timeout: Duration,
    pub receive_mode: ReceiveMode,
}

impl<B: Bus> IsoTp<B> {
    pub fn new(bus: Arc<B>, request_id: u32, response_id: u32, padding: Padding) -> Self {
        IsoTp {
            bus,
            request_id,
            response_id,
            padding,
            n_bs_timeout: N_BS_TIMEOUT,
            receive_mode: ReceiveMode::Full,
        }
    }

    /// Installs a filter matching only `response_id` (spec §4.3.5).
    pub fn set_filter_single_arbitration_id(&self, id: u32) -> Result<()> {
        self.bus.set_filters(Some(&[Filter::single(id)]))
    }

    pub fn clear_filters(&self) -> Result<()> {
        self.bus.set_filters(None)
    }

    /// Segments and sends `message` as a request, then waits for and
    /// reassembles the response — the common request/response round trip
    /// the UDS layer builds on (spec §4.4.1).
    pub fn send_request(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.transmit(message, self.request_id, self.response_id)?;
        self.indication(self.response_id, self.request_id)
    }

    /// Segments and sends `message` over `from_id`, using `fc_id` as the
    /// arbitration id flow-control replies are expected on (spec §4.3.4).
    pub fn transmit(&self, message: &[u8], from_id: u32, fc_id: u32) -> Result<()> {
        let frames = get_frames_from_message(message, self.padding)?;
        self.transmit_frames(&frames, from_id, fc_id)
    }

    fn send_raw(&self, id: u32, data: &[u8]) -> Result<()> {
        let frame = CanFrame::new(id, data, id > crate::constants::ARBITRATION_ID_MAX);
        self.bus.send(&frame)
    }

    /// Transmit state machine (spec §4.3.4). `frames` is the already
    /// encoded frame list; `from_id` is the arbitration id frames are sent
    /// on, `fc_id` the id flow control is expected back on.
    fn transmit_frames(&self, frames: &[Vec<u8>], from_id: u32, fc_id: u32) -> Result<()> {
        match frames.len() {
            0 => Ok(()),
            1 => self.send_raw(from_id, &frames[0]),
            _ => {
                self.send_raw(from_id, &frames[0])?;
                let mut remaining = &frames[1..];

                while !remaining.is_empty() {
                    let (block_size, stmin) = self.await_flow_control(fc_id)?;
                    let effective_block = if block_size == 0 {
                        remaining.len()
                    } else {
                        remaining.len().min(block_size as usize)
                    };
                    let stmin_delay = normalize_stmin(stmin);

                    for (i, cf) in remaining[..effective_block].iter().enumerate() {
                        self.send_raw(from_id, cf)?;
                        if i + 1 < effective_block {
                            thread::sleep(stmin_delay);
                        }
                    }
                    remaining = &remaining[effective_block..];
                }
                Ok(())
            }
        }
    }

    /// Waits for a flow-control frame on `fc_id`, re-arming the `N_Bs`
    /// timer on every loop iteration (matching the original's
    /// `self.bus.recv(self.N_BS_TIMEOUT)` call, which is *not* a single
    /// overall deadline but a fresh wait each time a non-matching or
    /// Wait-status frame arrives).
    fn await_flow_control(&self, fc_id: u32) -> Result<(u8, u8)> {
        loop {
            let frame = self
                .bus
                .recv(self.n_bs_timeout)?
                .ok_or_else(|| Error::timeout("flow control"))?;
            if frame.arbitration_id != fc_id {
                continue;
            }
            match decode_frame(frame.data()) {
                Some(Frame::FlowControl { status, bs, stmin }) => match status {
                    FlowStatus::Wait => {
                        debug!(fc_id, "peer sent FS=Wait, re-arming N_Bs");
                        continue;
                    }
                    FlowStatus::Overflow => {
                        warn!(fc_id, "peer sent FS=Overflow, aborting transmit");
                        return Err(Error::PeerOverflow);
                    }
                    FlowStatus::ClearToSend => return Ok((bs, stmin)),
                },
                _ => {
                    return Err(Error::protocol(
                        "expected flow control frame, got something else",
                    ))
                }
            }
        }
    }

    /// Receive state machine (spec §4.3.3). `listen_id` is the arbitration
    /// id data frames are expected on; `fc_id` is where this side's flow
    /// control replies are sent.
    pub fn indication(&self, listen_id: u32, fc_id: u32) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.n_bs_timeout;

        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| Error::timeout("ISO-TP indication"))?;
            let frame = self
                .bus
                .recv(remaining)?
                .ok_or_else(|| Error::timeout("ISO-TP indication"))?;
            if frame.arbitration_id != listen_id {
                continue;
            }

            return match decode_frame(frame.data()) {
                Some(Frame::Single { data }) => Ok(data),
                Some(Frame::First { length, data }) => {
                    trace!(listen_id, ff_dl = length, "received First Frame");
                    if self.receive_mode == ReceiveMode::FirstFrameOnly {
                        self.send_raw(fc_id, &encode_flow_control(FlowStatus::Overflow, 0, 0))?;
                        Ok(data)
                    } else {
                        self.send_raw(fc_id, &encode_flow_control(FlowStatus::ClearToSend, 0, 0))?;
                        self.await_consecutive_frames(listen_id, length as usize, data, deadline)
                    }
                }
                Some(Frame::Consecutive { .. }) | Some(Frame::FlowControl { .. }) => continue,
                None => Err(Error::protocol("unknown or malformed ISO-TP frame type")),
            };
        }
    }

    /// `deadline` is the single `N_Bs` wait window for the whole `indication`
    /// call (spec §4.3.3: "overall timer `N_Bs`"), established once by the
    /// caller and never recomputed here — matching `iso15765_2.py::indication`,
    /// which computes `end_time` once at the top of the call and reuses it
    /// across every CF wait rather than re-arming per frame.
    fn await_consecutive_frames(
        &self,
        listen_id: u32,
        total_length: usize,
        mut accumulated: Vec<u8>,
        deadline: Instant,
    ) -> Result<Vec<u8>> {
        let mut expected_sn: u8 = 1;

        while accumulated.len() < total_length {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| Error::timeout("ISO-TP consecutive frame"))?;
            let frame = self
                .bus
                .recv(remaining)?
                .ok_or_else(|| Error::timeout("ISO-TP consecutive frame"))?;
            if frame.arbitration_id != listen_id {
                continue;
            }

            match decode_frame(frame.data()) {
                Some(Frame::Consecutive { sn, data }) => {
                    if sn != expected_sn {
                        warn!(listen_id, expected_sn, got_sn = sn, "CF sequence error");
                        return Err(Error::protocol(format!(
                            "consecutive frame sequence error: expected {}, got {}",
                            expected_sn, sn
                        )));
                    }
                    accumulated.extend_from_slice(&data);
                    expected_sn = (expected_sn + 1) % 16;
                }
                _ => return Err(Error::protocol("expected consecutive frame")),
            }
        }

        accumulated.truncate(total_length);
        Ok(accumulated)
    }
}

/// STmin normalization (spec §4.3.4d): 0x00-0x7F are taken as milliseconds
/// directly; 0x80-0xFF (which includes the documented 0xF1-0xF9
/// microsecond encodings and every reserved value) all round up to 1ms,
/// confirmed by the original's `if st_min > 0x7F: st_min = 1`.
fn normalize_stmin(stmin: u8) -> Duration {
    if stmin > 0x7F {
        Duration::from_millis(1)
    } else {
        Duration::from_millis(stmin as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBus;
    use std::sync::Mutex;

    #[test]
    fn s1_single_frame() {
        let frames = get_frames_from_message(&[0x10, 0x01], Padding::Enabled(0x00)).unwrap();
        assert_eq!(frames, vec![vec![0x02, 0x10, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]]);
    }

    #[test]
    fn s2_two_frame() {
        let payload: Vec<u8> = (1..=10).collect();
        let frames = get_frames_from_message(&payload, Padding::Enabled(0x00)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], vec![0x10, 0x0A, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(frames[1], vec![0x21, 0x07, 0x08, 0x09, 0x0A, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn sf_boundary_at_seven_and_eight_bytes() {
        let seven = get_frames_from_message(&[0u8; 7], Padding::Enabled(0)).unwrap();
        assert_eq!(seven.len(), 1);
        let eight = get_frames_from_message(&[0u8; 8], Padding::Enabled(0)).unwrap();
        assert_eq!(eight.len(), 2);
    }

    #[test]
    fn cf_sequence_wraps_after_fifteen() {
        let payload = vec![0xAAu8; 120];
        let frames = get_frames_from_message(&payload, Padding::Enabled(0)).unwrap();
        // FF + 17 CFs -> SNs 1..=15, 0, 1
        let sns: Vec<u8> = frames[1..].iter().map(|f| f[0] & 0x0F).collect();
        assert_eq!(
            sns,
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 0, 1]
        );
    }

    #[test]
    fn rejects_empty_and_oversized_messages() {
        assert!(matches!(
            get_frames_from_message(&[], Padding::Enabled(0)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            get_frames_from_message(&[0u8; 4096], Padding::Enabled(0)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn stmin_normalization_matches_property_5() {
        assert_eq!(normalize_stmin(0x00), Duration::from_millis(0));
        assert_eq!(normalize_stmin(0x7F), Duration::from_millis(127));
        assert_eq!(normalize_stmin(0x80), Duration::from_millis(1));
        assert_eq!(normalize_stmin(0xF5), Duration::from_millis(1));
        assert_eq!(normalize_stmin(0xFF), Duration::from_millis(1));
    }

    #[test]
    fn decode_rejects_short_frames_without_erroring() {
        assert!(decode_frame(&[]).is_none());
        assert!(decode_frame(&[0x03, 0xAA, 0xBB]).is_none()); // SF claims 3 bytes, has 2
        assert!(decode_frame(&[0x10, 0x0A, 1, 2, 3]).is_none()); // FF too short
    }

    #[test]
    fn unknown_pci_nibble_is_none() {
        assert!(decode_frame(&[0x40, 0, 0, 0, 0, 0, 0, 0]).is_none());
    }

    /// Property 1: for any 1..=4095-byte payload, a correctly flow-controlled
    /// transmit followed by reassembly yields the original bytes back,
    /// regardless of padding choice.
    #[test]
    fn property1_transmit_then_indication_round_trips() {
        for &(len, padding) in &[
            (5usize, Padding::Enabled(0xAA)),
            (7, Padding::Disabled),
            (8, Padding::Enabled(0x00)),
            (300, Padding::Enabled(0x00)),
            (4095, Padding::Disabled),
        ] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();

            let sender_bus = Arc::new(MockBus::new());
            sender_bus.on_send(|frame| {
                if matches!(decode_frame(frame.data()), Some(Frame::First { .. })) {
                    Some(CanFrame::new(0x7E0, &[0x30, 0x00, 0x00], false))
                } else {
                    None
                }
            });
            let sender = IsoTp::new(sender_bus.clone(), 0x7E8, 0x7E0, padding);
            sender.transmit(&payload, 0x7E8, 0x7E0).unwrap();

            // Replay exactly the frames the sender emitted (minus the mock's
            // own FC reply) into a receiver listening on the same id.
            let receiver_bus = Arc::new(MockBus::with_responses(
                sender_bus
                    .sent_frames()
                    .into_iter()
                    .filter(|f| f.arbitration_id == 0x7E8)
                    .collect(),
            ));
            let receiver = IsoTp::new(receiver_bus, 0x7E0, 0x7E8, padding);
            let reassembled = receiver.indication(0x7E8, 0x7E0).unwrap();
            assert_eq!(reassembled, payload, "len={len} padding={padding:?}");
        }
    }

    /// Property 6: a peer reporting FS=Overflow after the First Frame
    /// aborts the transmit with `PeerOverflow` and no Consecutive Frame is
    /// ever sent.
    #[test]
    fn property6_fc_overflow_aborts_before_any_cf() {
        let bus = Arc::new(MockBus::new());
        bus.on_send(|frame| {
            if matches!(decode_frame(frame.data()), Some(Frame::First { .. })) {
                Some(CanFrame::new(0x7E0, &encode_flow_control(FlowStatus::Overflow, 0, 0), false))
            } else {
                None
            }
        });
        let isotp = IsoTp::new(bus.clone(), 0x7E8, 0x7E0, Padding::Enabled(0x00));
        let payload = vec![0xAAu8; 20];
        let err = isotp.transmit(&payload, 0x7E8, 0x7E0).unwrap_err();
        assert_eq!(err, Error::PeerOverflow);

        let cf_count = bus
            .sent_frames()
            .iter()
            .filter(|f| matches!(decode_frame(f.data()), Some(Frame::Consecutive { .. })))
            .count();
        assert_eq!(cf_count, 0);
    }

    /// A Consecutive Frame with the wrong sequence number aborts the
    /// indication with `ProtocolError` rather than being silently ignored
    /// (spec.md diverges from `original_source` here; see DESIGN.md).
    #[test]
    fn cf_sequence_mismatch_is_protocol_error() {
        let bus = Arc::new(MockBus::with_responses(vec![
            CanFrame::new(0x7E8, &[0x10, 0x0A, 1, 2, 3, 4, 5, 6], false),
            CanFrame::new(0x7E8, &[0x22, 7, 8, 9, 10, 0, 0, 0], false), // SN=2, expected 1
        ]));
        let isotp = IsoTp::new(bus, 0x7E0, 0x7E8, Padding::Enabled(0x00));
        let err = isotp.indication(0x7E8, 0x7E0).unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }

    /// FC with an unrecognized flow status nibble is a protocol error, not
    /// a silently-ignored frame.
    #[test]
    fn unrecognized_fc_status_is_protocol_error() {
        let bus = Arc::new(MockBus::with_responses(vec![CanFrame::new(
            0x7E0,
            &[0x33, 0, 0, 0, 0, 0, 0, 0],
            false,
        )]));
        let isotp = IsoTp::new(bus, 0x7E8, 0x7E0, Padding::Enabled(0x00));
        let payload = vec![0xAAu8; 20];
        let err = isotp.transmit(&payload, 0x7E8, 0x7E0).unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
    }

    /// `indication` times out when nothing arrives within `N_Bs`.
    #[test]
    fn indication_times_out_when_bus_is_silent() {
        let bus = Arc::new(MockBus::new());
        let mut isotp = IsoTp::new(bus, 0x7E0, 0x7E8, Padding::Enabled(0x00));
        isotp.n_bs_timeout = Duration::from_millis(20);
        let err = isotp.indication(0x7E8, 0x7E0).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    /// A `Bus` that hands out queued frames only after a fixed per-`recv`
    /// delay, used to prove `N_Bs` is a single window over the whole
    /// `indication` call rather than re-armed on every accepted CF.
    struct SlowBus {
        frames: Mutex<std::collections::VecDeque<CanFrame>>,
        delay: Duration,
    }

    impl Bus for SlowBus {
        fn send(&self, _frame: &CanFrame) -> Result<()> {
            Ok(())
        }

        fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>> {
            thread::sleep(self.delay.min(timeout));
            Ok(self.frames.lock().unwrap().pop_front())
        }

        fn set_filters(&self, _filters: Option<&[Filter]>) -> Result<()> {
            Ok(())
        }

        fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    /// A sender dribbling CFs in just under `N_Bs` apart still must not be
    /// allowed to stall the reassembly forever: the overall `N_Bs` window is
    /// fixed at the First Frame, not re-armed after every accepted CF (spec
    /// §4.3.3; `iso15765_2.py::indication` computes `end_time` once).
    #[test]
    fn indication_overall_deadline_is_not_rearmed_per_cf() {
        let payload: Vec<u8> = (0..20).collect();
        let queued: std::collections::VecDeque<CanFrame> =
            get_frames_from_message(&payload, Padding::Enabled(0x00))
                .unwrap()
                .into_iter()
                .map(|f| CanFrame::new(0x7E8, &f, false))
                .collect();

        let bus = Arc::new(SlowBus {
            frames: Mutex::new(queued),
            delay: Duration::from_millis(30),
        });
        let mut isotp = IsoTp::new(bus, 0x7E0, 0x7E8, Padding::Enabled(0x00));
        // N_Bs shorter than the per-frame delay: each individual wait is
        // "fast enough" on its own, but three CFs at 30ms apart blow a 50ms
        // total window. A per-CF re-arm would let this succeed; the fixed
        // overall deadline must time out instead.
        isotp.n_bs_timeout = Duration::from_millis(50);
        let err = isotp.indication(0x7E8, 0x7E0).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
