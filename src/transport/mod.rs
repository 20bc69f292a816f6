//! Byte-stream links between the controller and the device under test.
//!
//! The controller only sees the [`Transport`] trait. [`SerialTransport`] drives
//! a real port; [`LoopbackTransport`] connects straight to an in-process
//! [`Responder`](crate::responder::Responder).

use crate::error::TransportError;
use std::time::Instant;

mod loopback;
mod serial;

pub use loopback::LoopbackTransport;
pub use serial::{Parity, SerialSettings, SerialTransport, StopBits};

/// A duplex byte channel with deadline-bounded reads.
///
/// A session owns its transport exclusively; nothing else may read or write
/// it while the session runs.
pub trait Transport {
    /// Writes all of `bytes` to the link.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Blocks until some bytes arrive or `deadline` passes.
    ///
    /// Returns a non-empty chunk, [`TransportError::DeadlineExceeded`] if
    /// nothing arrived in time, or another error if the link is gone.
    fn read_with_deadline(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError>;

    /// Releases the link. Later calls fail with [`TransportError::Closed`].
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn read_with_deadline(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        (**self).read_with_deadline(deadline)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
