//! Bus abstraction (spec §4.1).
//!
//! This is the one external collaborator the rest of the crate depends on:
//! a concrete `Bus` implementation wraps whatever CAN driver is actually
//! present (SocketCAN, an FTDI bridge, a USB-CAN dongle) and is supplied by
//! the embedder. Everything above this layer only ever talks to the trait.

use crate::constants::{ARBITRATION_ID_MAX, DISPATCHER_SHUTDOWN_WINDOW};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A CAN arbitration-id filter: deliver frames whose id, after masking with
/// `mask`, equals `id & mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub id: u32,
    pub mask: u32,
    pub extended: bool,
}

impl Filter {
    /// A filter matching exactly one arbitration id, per
    /// `set_filter_single_arbitration_id` in the original (mask is the full
    /// 29-bit extended range so standard and extended ids alike match only
    /// themselves).
    pub fn single(id: u32) -> Self {
        Filter {
            id,
            mask: crate::constants::ARBITRATION_ID_MAX_EXTENDED,
            extended: id > ARBITRATION_ID_MAX,
        }
    }
}

/// A single CAN frame: up to 8 bytes of payload plus its addressing and
/// status flags.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CanFrame {
    pub arbitration_id: u32,
    data: Vec<u8>,
    pub extended: bool,
    pub error: bool,
    pub remote: bool,
}

impl CanFrame {
    /// Builds a frame, truncating payloads over 8 bytes and automatically
    /// setting `extended` when `id` exceeds the 11-bit standard range,
    /// regardless of the requested value — matching spec's invariant "an
    /// arbitration ID above 0x7FF implies the extended flag".
    pub fn new(arbitration_id: u32, data: &[u8], extended: bool) -> Self {
        let extended = extended || arbitration_id > ARBITRATION_ID_MAX;
        let mut payload = data.to_vec();
        payload.truncate(8);
        CanFrame {
            arbitration_id,
            data: payload,
            extended,
            error: false,
            remote: false,
        }
    }

    /// Like `new`, but rejects payloads over 8 bytes instead of truncating
    /// (used by `Bus::send` per spec's `InvalidLength`).
    pub fn try_new(arbitration_id: u32, data: &[u8], extended: bool) -> Result<Self> {
        if data.len() > 8 {
            return Err(Error::invalid_argument(format!(
                "CAN payload of {} bytes exceeds 8-byte maximum",
                data.len()
            )));
        }
        Ok(Self::new(arbitration_id, data, extended))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A pure function of a received frame. Listeners must be side-effect-only
/// with respect to the bus: no blocking bus operations from inside one
/// (spec §5).
pub type Listener = Box<dyn Fn(&CanFrame) + Send + Sync>;

/// Minimal contract for a CAN bus driver (spec §4.1 / §6).
///
/// Safe to call `recv` from a single consumer only; callers needing
/// concurrent access serialize through their own synchronization (spec §5:
/// "the Bus is the only shared mutable resource... serialized by whichever
/// component opened it").
pub trait Bus: Send + Sync {
    /// Transmits a frame immediately.
    fn send(&self, frame: &CanFrame) -> Result<()>;

    /// Returns the next frame or `None` on timeout. Never blocks longer
    /// than `timeout`.
    fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>>;

    /// Narrows the set of frames a subsequent `recv` delivers. `None`
    /// clears all filters.
    fn set_filters(&self, filters: Option<&[Filter]>) -> Result<()>;

    /// Releases driver resources. Called on every exit path of a scoped
    /// acquisition; implementations must make this idempotent.
    fn shutdown(&self) -> Result<()>;
}

impl<T: Bus + ?Sized> Bus for Arc<T> {
    fn send(&self, frame: &CanFrame) -> Result<()> {
        (**self).send(frame)
    }

    fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>> {
        (**self).recv(timeout)
    }

    fn set_filters(&self, filters: Option<&[Filter]>) -> Result<()> {
        (**self).set_filters(filters)
    }

    fn shutdown(&self) -> Result<()> {
        (**self).shutdown()
    }
}

/// Fan-out of received frames to an ordered, mutable list of listeners,
/// built on top of any `Bus` (spec §4.1). `start`/`stop` run the fan-out on
/// a background thread for embedders that want an always-on listener feed;
/// `poll_once` drives the same fan-out inline for one iteration at a time,
/// which is what the scanner (`scanner.rs`) uses since brute-force needs a
/// fresh per-iteration classifier rather than a long-lived subscription
/// (spec §9: "keep the dispatcher only where brute-force requires
/// per-iteration classification"). The ISO-TP and UDS layers talk to
/// `Bus::recv` directly instead, since they only ever expect one reply
/// stream at a time.
pub struct Dispatcher<B: Bus> {
    bus: Arc<B>,
    listeners: Arc<Mutex<Vec<Listener>>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Poll granularity of the background dispatcher loop — short enough that
/// `stop()` drains within `DISPATCHER_SHUTDOWN_WINDOW` (spec §4.1).
const DISPATCHER_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl<B: Bus + 'static> Dispatcher<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Dispatcher {
            bus,
            listeners: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Starts a background thread that repeatedly drains `recv` and hands
    /// each frame to every listener in order. A no-op if already running.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let bus = Arc::clone(&self.bus);
        let listeners = Arc::clone(&self.listeners);
        let running = Arc::clone(&self.running);
        debug!("dispatcher thread starting");
        *handle = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                if let Ok(Some(frame)) = bus.recv(DISPATCHER_POLL_INTERVAL) {
                    let listeners = listeners.lock().unwrap();
                    for listener in listeners.iter() {
                        listener(&frame);
                    }
                }
            }
            debug!("dispatcher thread exiting");
        }));
    }

    /// Signals the background thread to stop and joins it, draining
    /// gracefully within the bounded shutdown window (spec §4.1: "≈0.5s").
    /// A no-op if not running.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + DISPATCHER_SHUTDOWN_WINDOW;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            if !handle.is_finished() {
                warn!("dispatcher did not stop within shutdown window, joining anyway");
            }
            let _ = handle.join();
            debug!("dispatcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_listener(&self, listener: Listener) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.clear();
        listeners.push(listener);
    }

    pub fn add_listener(&self, listener: Listener) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn clear_listeners(&self) {
        self.listeners.lock().unwrap().clear();
    }

    /// Drains one frame (if any arrives within `timeout`) and hands it to
    /// every listener in order. Returns whether a frame was delivered.
    pub fn poll_once(&self, timeout: Duration) -> Result<bool> {
        match self.bus.recv(timeout)? {
            Some(frame) => {
                let listeners = self.listeners.lock().unwrap();
                for listener in listeners.iter() {
                    listener(&frame);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }
}

/// Guarantees the background thread stops on every exit path, including
/// panics unwinding through a scope that owns a `Dispatcher` (spec §4.1:
/// "scoped acquisition of a Bus guarantees shutdown on every exit path").
impl<B: Bus> Drop for Dispatcher<B> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_id_stays_standard() {
        let f = CanFrame::new(0x7DF, &[0x02, 0x10, 0x01], false);
        assert!(!f.extended);
    }

    #[test]
    fn id_above_0x7ff_forces_extended() {
        let f = CanFrame::new(0x18DB33F1, &[0x01], false);
        assert!(f.extended);
    }

    #[test]
    fn payload_over_eight_bytes_truncates_in_new() {
        let f = CanFrame::new(0x100, &[0u8; 12], false);
        assert_eq!(f.data().len(), 8);
    }

    #[test]
    fn try_new_rejects_long_payload() {
        assert!(CanFrame::try_new(0x100, &[0u8; 9], false).is_err());
    }

    #[test]
    fn single_filter_uses_extended_mask() {
        let f = Filter::single(0x7E8);
        assert_eq!(f.mask, crate::constants::ARBITRATION_ID_MAX_EXTENDED);
        assert!(!f.extended);
    }

    #[test]
    fn dispatcher_delivers_queued_frames_to_listener() {
        use crate::mock::MockBus;
        use std::sync::atomic::AtomicUsize;

        let bus = Arc::new(MockBus::with_responses(vec![
            CanFrame::new(0x100, &[0x01], false),
            CanFrame::new(0x100, &[0x02], false),
        ]));
        let dispatcher = Dispatcher::new(bus);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        dispatcher.set_listener(Box::new(move |_frame| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));
        dispatcher.start();

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        dispatcher.stop();

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(!dispatcher.is_running());
    }

    #[test]
    fn dispatcher_stop_is_idempotent_and_bounded() {
        use crate::mock::MockBus;

        let bus = Arc::new(MockBus::new());
        let dispatcher = Dispatcher::new(bus);
        dispatcher.start();
        let start = Instant::now();
        dispatcher.stop();
        assert!(start.elapsed() < Duration::from_millis(600));
        dispatcher.stop(); // second stop is a no-op, not a hang
    }
}
