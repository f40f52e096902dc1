//! An in-process `Bus` double for this crate's own unit tests.
//!
//! Distinct from the "mock ECUs used by the test suite" `spec.md` places
//! out of scope — that refers to external full-stack simulators driving
//! this crate from the outside. `MockBus` only needs to satisfy the `Bus`
//! trait well enough to drive `IsoTp`/`uds`/`xcp` in-process, the same role
//! `examples/other_examples/..zeroclaw..mock.rs`'s `MockCanInterface` plays
//! for its crate (queued responses, recorded sent frames), adapted here to
//! this crate's synchronous `Bus` trait and extended with a responder map
//! keyed by arbitration id so a single bus can stand in for several ECUs.

use crate::bus::{Bus, CanFrame, Filter};
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&CanFrame) -> Option<CanFrame> + Send>;

#[derive(Default)]
pub struct MockBus {
    /// Frames waiting to be returned by `recv`, in order.
    queued: Mutex<VecDeque<CanFrame>>,
    /// Every frame ever passed to `send`.
    sent: Mutex<Vec<CanFrame>>,
    /// Optional per-send responders, tried in order; the first one to
    /// return `Some(frame)` has its output queued for the next `recv`.
    responders: Mutex<Vec<Responder>>,
    filters: Mutex<Option<Vec<Filter>>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-loads frames that will be handed out by `recv`, oldest first.
    pub fn with_responses(responses: Vec<CanFrame>) -> Self {
        MockBus {
            queued: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn queue_response(&self, frame: CanFrame) {
        self.queued.lock().unwrap().push_back(frame);
    }

    /// Installs a responder: called with every frame `send` receives; its
    /// return value (if any) is queued as the next `recv` result. Multiple
    /// responders can be installed to simulate multiple ECUs replying on
    /// distinct arbitration ids.
    pub fn on_send<F>(&self, responder: F)
    where
        F: Fn(&CanFrame) -> Option<CanFrame> + Send + 'static,
    {
        self.responders.lock().unwrap().push(Box::new(responder));
    }

    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_sent(&self) -> Option<CanFrame> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn filters(&self) -> Option<Vec<Filter>> {
        self.filters.lock().unwrap().clone()
    }
}

impl Bus for MockBus {
    fn send(&self, frame: &CanFrame) -> Result<()> {
        self.sent.lock().unwrap().push(frame.clone());
        let responders = self.responders.lock().unwrap();
        for responder in responders.iter() {
            if let Some(reply) = responder(frame) {
                self.queued.lock().unwrap().push_back(reply);
            }
        }
        Ok(())
    }

    fn recv(&self, _timeout: Duration) -> Result<Option<CanFrame>> {
        Ok(self.queued.lock().unwrap().pop_front())
    }

    fn set_filters(&self, filters: Option<&[Filter]>) -> Result<()> {
        *self.filters.lock().unwrap() = filters.map(|f| f.to_vec());
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_sent_frames() {
        let bus = MockBus::new();
        bus.send(&CanFrame::new(0x7E0, &[0x02, 0x10, 0x01], false))
            .unwrap();
        assert_eq!(bus.sent_frames().len(), 1);
    }

    #[test]
    fn returns_queued_responses() {
        let bus = MockBus::with_responses(vec![CanFrame::new(0x7E8, &[0x06, 0x50, 0x01], false)]);
        let frame = bus.recv(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(frame.arbitration_id, 0x7E8);
        assert!(bus.recv(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn on_send_responder_echoes_reply() {
        let bus = MockBus::new();
        bus.on_send(|frame| {
            if frame.arbitration_id == 0x7E0 {
                Some(CanFrame::new(0x7E8, &[0x06, 0x50, 0x01], false))
            } else {
                None
            }
        });
        bus.send(&CanFrame::new(0x7E0, &[0x02, 0x10, 0x01], false))
            .unwrap();
        let reply = bus.recv(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(reply.arbitration_id, 0x7E8);
    }

    #[test]
    fn timeout_when_empty() {
        let bus = MockBus::new();
        assert!(bus.recv(Duration::from_millis(10)).unwrap().is_none());
    }
}
