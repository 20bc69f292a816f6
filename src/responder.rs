//! # Device Responder
//!
//! A software stand-in for the embedded device under test. It decodes request
//! frames, applies its data transformation and answers with a frame carrying
//! the same sequence id, exactly like the firmware does on the real board.
//!
//! Faults can be scheduled per request so the controller's timeout, retry and
//! correlation paths can be exercised without hardware.

use crate::codec::{Frame, FrameBuffer, FRAME_LEN};
use crate::error::FrameError;
use log::{debug, warn};
use std::collections::VecDeque;
use std::fmt;

/// Misbehaviour applied to a single request.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Swallow the request and never answer.
    Drop,
    /// Answer with only the first `n` bytes of the reply.
    Truncate(usize),
    /// Answer with a header-aligned frame carrying a non-finite value.
    Corrupt,
    /// Send a reply tagged with the previous sequence id before the real one.
    Stale,
    /// Answer with this value instead of the transformed input.
    Reply(f64),
}

type Transform = Box<dyn FnMut(f64) -> f64 + Send>;

/// The simulated device.
pub struct Responder {
    transform: Transform,
    faults: VecDeque<Option<Fault>>,
    rx: FrameBuffer,
    // Number of well-formed requests seen so far.
    pub requests_seen: u32,
    pub last_sequence_id: Option<u32>,
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("faults", &self.faults)
            .field("requests_seen", &self.requests_seen)
            .field("last_sequence_id", &self.last_sequence_id)
            .finish()
    }
}

impl Responder {
    /// Creates a responder that answers every request with `transform(value)`.
    pub fn new(transform: impl FnMut(f64) -> f64 + Send + 'static) -> Self {
        Self {
            transform: Box::new(transform),
            faults: VecDeque::new(),
            rx: FrameBuffer::new(),
            requests_seen: 0,
            last_sequence_id: None,
        }
    }

    /// A device that multiplies its input by `factor`.
    pub fn scaling(factor: f64) -> Self {
        Self::new(move |v| v * factor)
    }

    /// The doubling device used throughout the examples.
    pub fn doubling() -> Self {
        Self::scaling(2.0)
    }

    /// Queues a fault for the next request that has no fault yet.
    pub fn then(mut self, fault: Fault) -> Self {
        self.faults.push_back(Some(fault));
        self
    }

    /// Lets the next request through untouched.
    pub fn then_ok(mut self) -> Self {
        self.faults.push_back(None);
        self
    }

    /// Queues the same fault for the next `count` requests.
    pub fn repeat(mut self, fault: Fault, count: usize) -> Self {
        self.faults
            .extend(std::iter::repeat(Some(fault)).take(count));
        self
    }

    /// Feeds received bytes and returns everything the device sends back.
    ///
    /// Several requests may be answered in one call. A malformed request is
    /// dropped along with everything buffered after it.
    pub fn process(&mut self, bytes: &[u8]) -> Result<Vec<u8>, FrameError> {
        self.rx.extend(bytes);
        let mut out = Vec::new();

        loop {
            match self.rx.next_frame() {
                Ok(Some(request)) => self.answer(request, &mut out),
                Ok(None) => return Ok(out),
                Err(e) => {
                    warn!("Responder discarding bad request: {}", e);
                    self.rx.clear();
                    return Err(e);
                }
            }
        }
    }

    fn answer(&mut self, request: Frame, out: &mut Vec<u8>) {
        self.requests_seen += 1;
        self.last_sequence_id = Some(request.sequence_id);

        let value = (self.transform)(request.payload);
        let reply = Frame::new(request.sequence_id, value).encode();
        let fault = self.faults.pop_front().flatten();
        debug!(
            "Responder seq={} in={} out={} fault={:?}",
            request.sequence_id, request.payload, value, fault
        );

        match fault {
            None => out.extend_from_slice(&reply),
            Some(Fault::Drop) => {}
            Some(Fault::Truncate(n)) => out.extend_from_slice(&reply[..n.min(FRAME_LEN)]),
            Some(Fault::Corrupt) => {
                out.extend_from_slice(&Frame::new(request.sequence_id, f64::NAN).encode());
            }
            Some(Fault::Stale) => {
                let stale = Frame::new(request.sequence_id.wrapping_sub(1), value);
                out.extend_from_slice(&stale.encode());
                out.extend_from_slice(&reply);
            }
            Some(Fault::Reply(v)) => {
                out.extend_from_slice(&Frame::new(request.sequence_id, v).encode());
            }
        }
    }
}
