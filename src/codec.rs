//! # Packet Codec
//!
//! Pure transformation between frames and wire bytes. No I/O happens here.
//!
//! Every frame, in either direction, is exactly [`FRAME_LEN`] bytes:
//!
//! ```text
//! +-----+-----+-----+-----+-----+-----+-----+-----+ ... +-----+
//! | '$' | 'F' | 'S' |   sequence id (u32 LE)  |  value (f64 LE) |
//! +-----+-----+-----+-----+-----+-----+-----+-----+ ... +-----+
//!   0     1     2     3                       7            14
//! ```
//!
//! A stream can start mid-frame (a late tail from an earlier attempt, line
//! noise after a reset), so [`FrameBuffer`] skips ahead to the next header
//! before cutting frames.

use crate::error::FrameError;
use log::debug;

/// Start-of-frame marker, ASCII `$FS`.
pub const HEADER: [u8; 3] = [0x24, 0x46, 0x53];

/// Byte length of every frame on the wire.
pub const FRAME_LEN: usize = 15;

const OFF_SEQ: usize = 3;
const OFF_VALUE: usize = 7;

/// The wire-level unit: a value tagged with a correlation id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub payload: f64,
    pub sequence_id: u32,
}

/// A decoded response from the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseRecord {
    pub sequence_id: u32,
    pub received_value: f64,
}

impl From<Frame> for ResponseRecord {
    fn from(frame: Frame) -> Self {
        Self {
            sequence_id: frame.sequence_id,
            received_value: frame.payload,
        }
    }
}

impl From<ResponseRecord> for Frame {
    fn from(record: ResponseRecord) -> Self {
        Self {
            payload: record.received_value,
            sequence_id: record.sequence_id,
        }
    }
}

impl Frame {
    pub fn new(sequence_id: u32, payload: f64) -> Self {
        Self {
            payload,
            sequence_id,
        }
    }

    /// Serialises the frame into its fixed-length wire form.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[..OFF_SEQ].copy_from_slice(&HEADER);
        buf[OFF_SEQ..OFF_VALUE].copy_from_slice(&self.sequence_id.to_le_bytes());
        buf[OFF_VALUE..].copy_from_slice(&self.payload.to_le_bytes());
        buf
    }

    /// Parses the first [`FRAME_LEN`] bytes of `bytes`. Anything after them
    /// is left for the caller.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < FRAME_LEN {
            return Err(FrameError::Incomplete {
                have: bytes.len(),
                need: FRAME_LEN,
            });
        }
        if bytes[..OFF_SEQ] != HEADER {
            return Err(FrameError::Malformed(format!(
                "bad header {:02X?}",
                &bytes[..OFF_SEQ]
            )));
        }

        let mut seq = [0u8; 4];
        seq.copy_from_slice(&bytes[OFF_SEQ..OFF_VALUE]);
        let mut value = [0u8; 8];
        value.copy_from_slice(&bytes[OFF_VALUE..FRAME_LEN]);

        let payload = f64::from_le_bytes(value);
        if !payload.is_finite() {
            return Err(FrameError::Malformed(format!("non-finite value {}", payload)));
        }

        Ok(Self {
            payload,
            sequence_id: u32::from_le_bytes(seq),
        })
    }
}

/// Encodes a frame for transmission.
pub fn encode(frame: &Frame) -> [u8; FRAME_LEN] {
    frame.encode()
}

/// Decodes a response record from the start of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<ResponseRecord, FrameError> {
    Frame::decode(bytes).map(ResponseRecord::from)
}

/// Accumulates bytes from a stream and cuts them into frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Takes the next complete frame off the front of the buffer.
    ///
    /// Bytes that can not start a frame are skipped first. Returns `Ok(None)`
    /// while a frame is still incomplete. A header-aligned frame with an
    /// invalid body is consumed and reported as malformed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        self.resync();
        match Frame::decode(&self.buf) {
            Ok(frame) => {
                self.buf.drain(..FRAME_LEN);
                Ok(Some(frame))
            }
            Err(FrameError::Incomplete { .. }) => Ok(None),
            Err(e) => {
                self.buf.drain(..FRAME_LEN);
                Err(e)
            }
        }
    }

    // Drops leading bytes until the buffer starts with the header, or with a
    // prefix of it when fewer than `HEADER.len()` bytes are left.
    fn resync(&mut self) {
        let start = (0..self.buf.len())
            .find(|&i| {
                let rest = &self.buf[i..];
                let n = rest.len().min(HEADER.len());
                rest[..n] == HEADER[..n]
            })
            .unwrap_or(self.buf.len());
        if start > 0 {
            debug!("Skipped {} byte(s) ahead of the next frame header", start);
            self.buf.drain(..start);
        }
    }

    pub fn next_record(&mut self) -> Result<Option<ResponseRecord>, FrameError> {
        self.next_frame().map(|f| f.map(ResponseRecord::from))
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
