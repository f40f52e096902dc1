//! Scanner / CanActions convenience layer (spec §4.2).
//!
//! Grounded in `original_source/caringcaribou/utils/can_actions.py`, the
//! authoritative algorithm for `auto_blacklist` and the three `bruteforce_*`
//! variants (fixed ~0.1s per-message delay, callback-factory listener
//! installation, Cartesian product over multiple byte indices preserving
//! lexicographic order). Adapted to the donor's synchronous, plain-struct
//! idiom (`dcan.rs`) instead of the original's notifier-thread/context-
//! manager style.

use crate::bus::{Bus, CanFrame};
use crate::constants::{ARBITRATION_ID_MAX, AUTO_BLACKLIST_POLL_INTERVAL, BRUTEFORCE_MESSAGE_DELAY};
use crate::error::Result;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Cooperative stop flag shared between a caller and a running brute-force
/// loop (spec §5: "a single boolean monitored between iterations").
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        StopFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drains frames from `bus` for `duration`, polling in fixed
/// `AUTO_BLACKLIST_POLL_INTERVAL` increments (matching the original's
/// `bus.recv(0.1)` call inside a wall-clock `while` loop), and returns every
/// arbitration id for which `classifier(frame)` held true at least once.
/// Never mutates `classifier`.
pub fn auto_blacklist<B, F>(bus: &B, duration: Duration, classifier: F) -> Result<HashSet<u32>>
where
    B: Bus,
    F: Fn(&CanFrame) -> bool,
{
    let mut blacklist = HashSet::new();
    let deadline = Instant::now() + duration;

    while Instant::now() < deadline {
        if let Some(frame) = bus.recv(AUTO_BLACKLIST_POLL_INTERVAL)? {
            if classifier(&frame) {
                blacklist.insert(frame.arbitration_id);
            }
        }
    }

    info!(count = blacklist.len(), "auto_blacklist finished");

    Ok(blacklist)
}

/// Sends `data` once on `id`, with the standard/extended flag inferred from
/// whether `id` exceeds the 11-bit range, matching `CanActions.send`'s
/// auto-detection.
fn send_probe<B: Bus>(bus: &B, id: u32, data: &[u8]) -> Result<()> {
    let frame = CanFrame::try_new(id, data, id > ARBITRATION_ID_MAX)?;
    bus.send(&frame)
}

/// Brute-forces arbitration ids in `[min_id, max_id]`, sending `data` on
/// each one after installing `callback_factory(id)` as the sole listener
/// for that iteration's replies. Sleeps `BRUTEFORCE_MESSAGE_DELAY` between
/// ids and checks `stop` after each send+sleep — "stopping is cooperative
/// and takes effect within one iteration" (spec §4.2). `on_complete` fires
/// once with a human-readable summary when the sweep finishes or is
/// stopped.
pub fn bruteforce_arbitration_id<B, L, D>(
    bus: &B,
    data: &[u8],
    mut callback_factory: impl FnMut(u32) -> L,
    min_id: u32,
    max_id: u32,
    stop: &StopFlag,
    mut on_complete: D,
) -> Result<()>
where
    B: Bus,
    L: Fn(&CanFrame),
    D: FnMut(&str),
{
    stop.reset();
    for id in min_id..=max_id {
        let listener = callback_factory(id);
        send_probe(bus, id, data)?;
        thread::sleep_and_poll(&listener, bus, BRUTEFORCE_MESSAGE_DELAY)?;
        if stop.is_stopped() {
            on_complete("bruteforce_arbitration_id stopped early");
            return Ok(());
        }
    }
    on_complete("bruteforce_arbitration_id finished sweeping the full id range");
    Ok(())
}

/// Identical pattern to `bruteforce_arbitration_id`, varying the byte at
/// `index` within `data` over `[min_value, max_value]` instead of the
/// arbitration id.
pub fn bruteforce_data<B, L, D>(
    bus: &B,
    arbitration_id: u32,
    data: &[u8],
    index: usize,
    mut callback_factory: impl FnMut(u8) -> L,
    min_value: u8,
    max_value: u8,
    stop: &StopFlag,
    mut on_complete: D,
) -> Result<()>
where
    B: Bus,
    L: Fn(&CanFrame),
    D: FnMut(&str),
{
    stop.reset();
    let mut buf = data.to_vec();
    for value in min_value..=max_value {
        if index < buf.len() {
            buf[index] = value;
        }
        let listener = callback_factory(value);
        send_probe(bus, arbitration_id, &buf)?;
        thread::sleep_and_poll(&listener, bus, BRUTEFORCE_MESSAGE_DELAY)?;
        if stop.is_stopped() {
            on_complete("bruteforce_data stopped early");
            return Ok(());
        }
        if value == max_value {
            break; // avoid overflow when max_value == 0xFF
        }
    }
    on_complete("bruteforce_data finished sweeping the full value range");
    Ok(())
}

/// Cartesian product across multiple byte positions in `data`, preserving
/// lexicographic order over `indices` (outermost = `indices[0]`,
/// innermost = the last index) — matching the original's recursive
/// `bruteforce(idx)` closure in `bruteforce_data_new`.
pub fn bruteforce_data_new<B, L, D>(
    bus: &B,
    arbitration_id: u32,
    data: &[u8],
    indices: &[usize],
    mut callback_factory: impl FnMut(&[u8]) -> L,
    min_value: u8,
    max_value: u8,
    stop: &StopFlag,
    mut on_complete: D,
) -> Result<()>
where
    B: Bus,
    L: Fn(&CanFrame),
    D: FnMut(&str),
{
    stop.reset();
    let mut buf = data.to_vec();

    fn recurse<B, L>(
        bus: &B,
        arbitration_id: u32,
        buf: &mut Vec<u8>,
        indices: &[usize],
        depth: usize,
        callback_factory: &mut impl FnMut(&[u8]) -> L,
        min_value: u8,
        max_value: u8,
        stop: &StopFlag,
    ) -> Result<bool>
    where
        B: Bus,
        L: Fn(&CanFrame),
    {
        if depth == indices.len() {
            let combo: Vec<u8> = indices.iter().map(|&i| buf[i]).collect();
            let listener = callback_factory(&combo);
            send_probe(bus, arbitration_id, buf)?;
            thread::sleep_and_poll(&listener, bus, BRUTEFORCE_MESSAGE_DELAY)?;
            return Ok(stop.is_stopped());
        }

        let idx = indices[depth];
        let mut value = min_value;
        loop {
            if idx < buf.len() {
                buf[idx] = value;
            }
            let stopped = recurse(
                bus,
                arbitration_id,
                buf,
                indices,
                depth + 1,
                callback_factory,
                min_value,
                max_value,
                stop,
            )?;
            if stopped {
                return Ok(true);
            }
            if value == max_value {
                break;
            }
            value += 1;
        }
        Ok(false)
    }

    let stopped = recurse(
        bus,
        arbitration_id,
        &mut buf,
        indices,
        0,
        &mut callback_factory,
        min_value,
        max_value,
        stop,
    )?;

    if stopped {
        on_complete("bruteforce_data_new stopped early");
    } else {
        on_complete("bruteforce_data_new finished sweeping the full combination space");
    }
    Ok(())
}

/// Sleeps for `delay`, polling `bus` once midway so a single-shot listener
/// gets a chance to observe a reply — a simplification of the original's
/// background-notifier model (spec §9: "model this as... a single blocking
/// `recv` per channel with filters").
mod thread {
    use super::*;

    pub(super) fn sleep_and_poll<B: Bus>(
        listener: &impl Fn(&CanFrame),
        bus: &B,
        delay: Duration,
    ) -> Result<()> {
        if let Some(frame) = bus.recv(delay)? {
            listener(&frame);
        }
        Ok(())
    }
}
