use super::Transport;
use crate::error::TransportError;
use crate::responder::Responder;
use log::{debug, warn};
use std::collections::VecDeque;
use std::thread;
use std::time::Instant;

/// An in-process link wired directly to a [`Responder`].
///
/// Whatever the controller writes is handed to the responder; its replies
/// become readable immediately. With nothing pending, a read sleeps until
/// the deadline, the same as a silent serial line.
#[derive(Debug)]
pub struct LoopbackTransport {
    responder: Responder,
    pending: VecDeque<u8>,
    // Maximum bytes returned per read; 0 means everything pending.
    chunk_size: usize,
    // Link goes down once this many writes have succeeded.
    disconnect_after: Option<usize>,
    writes: usize,
    closed: bool,
}

impl LoopbackTransport {
    pub fn new(responder: Responder) -> Self {
        Self {
            responder,
            pending: VecDeque::new(),
            chunk_size: 0,
            disconnect_after: None,
            writes: 0,
            closed: false,
        }
    }

    /// Delivers replies in pieces of at most `size` bytes.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Makes the link report closed on the write after `writes` successful ones.
    pub fn disconnect_after(mut self, writes: usize) -> Self {
        self.disconnect_after = Some(writes);
        self
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for LoopbackTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.disconnect_after.is_some_and(|n| self.writes >= n) {
            debug!("Loopback link dropping after {} writes", self.writes);
            self.closed = true;
            return Err(TransportError::Closed);
        }

        self.writes += 1;
        match self.responder.process(bytes) {
            Ok(reply) => self.pending.extend(reply),
            Err(e) => warn!("Responder rejected request: {}", e),
        }
        Ok(())
    }

    fn read_with_deadline(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.pending.is_empty() {
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
            return Err(TransportError::DeadlineExceeded);
        }

        let n = match self.chunk_size {
            0 => self.pending.len(),
            size => size.min(self.pending.len()),
        };
        Ok(self.pending.drain(..n).collect())
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}
