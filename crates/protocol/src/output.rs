//! Outbound message buffer and pool
//!
//! An [`OutputMessage`] reserves room at the front of its storage for the
//! frame headers, so framing prepends in place instead of copying:
//!
//! ```text
//! PLAINTEXT:
//!     0 .. 2 => num XTEA blocks
//!     2 .. 6 => sequence number
//! ENCRYPTED:
//!     6 .. 7 => pad count
//!     7 ..   => payload + padding
//! ```
//!
//! Buffers are recycled through a bounded LIFO free list so steady-state
//! traffic does not allocate per packet. `next` chains messages into the
//! per-connection output queue without a container allocation.

use parking_lot::Mutex;

use crate::message::{NetworkMessage, NETWORK_MESSAGE_MAX};

/// Room reserved for the largest header stack (u16 blocks + u32 seq + u8 pad,
/// rounded up to keep the encrypted region 8-aligned in storage).
pub const OUTPUT_HEADER_BYTES: usize = 8;

const POOL_CAPACITY: usize = 2048;

static OUTPUT_POOL: Mutex<Vec<Box<OutputMessage>>> = Mutex::new(Vec::new());

pub struct OutputMessage {
    start: usize,
    wrpos: usize,
    buffer: Box<[u8; NETWORK_MESSAGE_MAX]>,
    pub next: Option<Box<OutputMessage>>,
}

impl OutputMessage {
    fn new() -> Self {
        Self {
            start: OUTPUT_HEADER_BYTES,
            wrpos: OUTPUT_HEADER_BYTES,
            buffer: Box::new([0u8; NETWORK_MESSAGE_MAX]),
            next: None,
        }
    }

    pub fn reset(&mut self) {
        self.start = OUTPUT_HEADER_BYTES;
        self.wrpos = OUTPUT_HEADER_BYTES;
        self.next = None;
    }

    pub fn can_add(&self, n: usize) -> bool {
        self.wrpos + n <= NETWORK_MESSAGE_MAX
    }

    pub fn is_overrun(&self) -> bool {
        self.wrpos > NETWORK_MESSAGE_MAX
    }

    /// Length of header-stripped output written so far.
    pub fn output_len(&self) -> usize {
        debug_assert!(self.wrpos >= self.start);
        if self.is_overrun() {
            0
        } else {
            self.wrpos - self.start
        }
    }

    pub fn output(&self) -> &[u8] {
        if self.is_overrun() {
            &[]
        } else {
            &self.buffer[self.start..self.wrpos]
        }
    }

    pub fn output_mut(&mut self) -> &mut [u8] {
        if self.is_overrun() {
            &mut []
        } else {
            &mut self.buffer[self.start..self.wrpos]
        }
    }

    /// Replace the current output region with `data` (used after deflate).
    pub(crate) fn replace_output(&mut self, data: &[u8]) {
        debug_assert!(self.start + data.len() <= NETWORK_MESSAGE_MAX);
        self.buffer[self.start..self.start + data.len()].copy_from_slice(data);
        self.wrpos = self.start + data.len();
    }

    pub fn add_byte(&mut self, value: u8) {
        if self.can_add(1) {
            self.buffer[self.wrpos] = value;
        }
        self.wrpos += 1;
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        if self.can_add(bytes.len()) {
            self.buffer[self.wrpos..self.wrpos + bytes.len()].copy_from_slice(bytes);
        }
        self.wrpos += bytes.len();
    }

    pub fn add_u16(&mut self, value: u16) {
        self.add_bytes(&value.to_le_bytes());
    }

    pub fn add_u32(&mut self, value: u32) {
        self.add_bytes(&value.to_le_bytes());
    }

    /// Prepend a header byte into the reserved region.
    pub fn add_header_byte(&mut self, value: u8) {
        assert!(self.start >= 1);
        self.start -= 1;
        self.buffer[self.start] = value;
    }

    pub fn add_header_u16(&mut self, value: u16) {
        assert!(self.start >= 2);
        self.start -= 2;
        self.buffer[self.start..self.start + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn add_header_u32(&mut self, value: u32) {
        assert!(self.start >= 4);
        self.start -= 4;
        self.buffer[self.start..self.start + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Append the written content of a game-thread message.
    pub fn append(&mut self, msg: &NetworkMessage) {
        if !msg.is_overrun() {
            self.add_bytes(msg.written());
        }
    }
}

/// Take a buffer from the free list, or allocate when the list is empty.
pub fn make_output_message() -> Box<OutputMessage> {
    if let Some(mut msg) = OUTPUT_POOL.lock().pop() {
        msg.reset();
        return msg;
    }
    Box::new(OutputMessage::new())
}

/// Return a buffer to the free list. Dropped when the list is full.
pub fn recycle_output_message(mut msg: Box<OutputMessage>) {
    msg.next = None;
    let mut pool = OUTPUT_POOL.lock();
    if pool.len() < POOL_CAPACITY {
        pool.push(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_prepend_in_reserved_region() {
        let mut msg = make_output_message();
        msg.add_byte(0xaa);
        msg.add_u16(0x1234);
        msg.add_header_byte(0x05);
        msg.add_header_u32(0x0a0b0c0d);
        msg.add_header_u16(0x0001);

        assert_eq!(
            msg.output(),
            &[0x01, 0x00, 0x0d, 0x0c, 0x0b, 0x0a, 0x05, 0xaa, 0x34, 0x12]
        );
    }

    #[test]
    fn test_append_copies_written_content() {
        let mut src = NetworkMessage::new();
        src.add_byte(0x14);
        src.add_string("bye");

        let mut out = make_output_message();
        out.append(&src);
        assert_eq!(out.output(), &[0x14, 0x03, 0x00, b'b', b'y', b'e']);
    }

    #[test]
    fn test_recycled_buffer_comes_back_reset() {
        let mut msg = make_output_message();
        msg.add_bytes(&[1, 2, 3]);
        recycle_output_message(msg);

        let msg = make_output_message();
        assert_eq!(msg.output_len(), 0);
        assert!(msg.next.is_none());
    }
}
