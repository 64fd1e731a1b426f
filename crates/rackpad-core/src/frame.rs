//! Message frames
//!
//! A frame is one datagram as received by the listener thread: a fixed-size
//! byte buffer plus the address it came from. Frames are plain values; they
//! are moved into the transfer queue by the listener and moved out again by
//! the control loop, so neither side ever shares one.

use std::fmt;
use std::net::SocketAddr;

/// Largest datagram retained in full; anything longer is truncated
pub const MAX_FRAME_BYTES: usize = 128;

/// One inbound datagram crossing the network → control thread boundary
#[derive(Clone, Copy)]
pub struct Frame {
    len: usize,
    payload: [u8; MAX_FRAME_BYTES],
    origin: SocketAddr,
}

impl Frame {
    /// Build a frame from received bytes, truncating to [`MAX_FRAME_BYTES`]
    pub fn new(data: &[u8], origin: SocketAddr) -> Self {
        let len = data.len().min(MAX_FRAME_BYTES);
        let mut payload = [0u8; MAX_FRAME_BYTES];
        payload[..len].copy_from_slice(&data[..len]);
        Self {
            len,
            payload,
            origin,
        }
    }

    /// The retained bytes
    pub fn bytes(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Number of retained bytes (never more than [`MAX_FRAME_BYTES`])
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sender of the datagram
    pub fn origin(&self) -> SocketAddr {
        self.origin
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.len)
            .field("origin", &self.origin)
            .finish()
    }
}
