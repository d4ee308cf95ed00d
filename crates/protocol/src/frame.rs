//! Packet framing
//!
//! Wire layout, both directions, once the session is keyed:
//!
//! ```text
//! [u16 N]  [u32 SEQ]  [u8 PAD]  [payload .. PAD trailing random bytes]
//!          └──────────── XTEA in ECB when keyed ────────────────────┘
//! ```
//!
//! `N` counts 8-byte XTEA blocks after the sequence field; the total wire
//! size is `2 + 4 + 8*N`. The low 30 bits of `SEQ` are a per-direction
//! monotonic counter. Bit 31 marks a deflated payload; bit 30 is reserved
//! and never set. Inbound frames must match the expected counter exactly,
//! so a frame with either high bit set fails the comparison and aborts the
//! connection.

use flate2::{Compress, Compression, FlushCompress, Status};
use otgate_core::{GatewayError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::message::{NetworkMessage, NETWORK_MESSAGE_MAX};
use crate::output::OutputMessage;
use crate::xtea::{XteaKey, XTEA_BLOCK_BYTES};

/// Sequence bit marking a deflate-compressed payload.
pub const SEQUENCE_COMPRESSED: u32 = 0x8000_0000;

/// Payloads below this size are never worth deflating.
pub const MIN_DEFLATE_LEN: usize = 128;

/// Per-connection raw-deflate stream (no zlib wrapper, reset between
/// packets). Kept out of [`wrap_packet`] so the stream state survives.
pub struct Deflater {
    stream: Compress,
}

impl Default for Deflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Deflater {
    pub fn new() -> Self {
        Self {
            stream: Compress::new(Compression::new(6), false),
        }
    }

    /// Deflate the output region in place. Returns false (leaving the
    /// message untouched) when the payload is empty, the stream errors, or
    /// the deflated copy would not be smaller; high-entropy payloads do
    /// grow under deflate.
    fn deflate(&mut self, msg: &mut OutputMessage) -> bool {
        let uncompressed = msg.output_len();
        if uncompressed == 0 {
            return false;
        }

        let mut buffer = vec![0u8; NETWORK_MESSAGE_MAX];
        let status = self
            .stream
            .compress(msg.output(), &mut buffer, FlushCompress::Finish);
        let compressed = self.stream.total_out() as usize;
        let finished = matches!(status, Ok(Status::StreamEnd));
        self.stream.reset();

        if !finished || compressed >= uncompressed {
            return false;
        }

        msg.replace_output(&buffer[..compressed]);
        true
    }
}

/// Frame-out: optional deflate, random padding, XTEA, sequence and block
/// count headers. Returns the sequence word actually written (high bit set
/// when the payload was deflated).
pub fn wrap_packet(
    msg: &mut OutputMessage,
    key: Option<&XteaKey>,
    sequence: u32,
    deflater: Option<&mut Deflater>,
) -> Result<u32> {
    let mut sequence = sequence;
    if let Some(deflater) = deflater {
        if msg.output_len() >= MIN_DEFLATE_LEN && deflater.deflate(msg) {
            sequence |= SEQUENCE_COMPRESSED;
        }
    }

    // Pad until payload + pad-count byte fill whole XTEA blocks.
    let padding = (XTEA_BLOCK_BYTES - (msg.output_len() + 1) % XTEA_BLOCK_BYTES) % XTEA_BLOCK_BYTES;
    if padding > 0 {
        let mut pad = [0u8; XTEA_BLOCK_BYTES];
        OsRng.fill_bytes(&mut pad[..padding]);
        msg.add_bytes(&pad[..padding]);
    }
    msg.add_header_byte(padding as u8);

    let num_blocks = msg.output_len() / XTEA_BLOCK_BYTES;
    if msg.is_overrun() || num_blocks == 0 || num_blocks > u16::MAX as usize {
        return Err(GatewayError::Protocol(format!(
            "unframeable packet ({num_blocks} blocks)"
        )));
    }

    if let Some(key) = key {
        key.encrypt_in_place(msg.output_mut())?;
    }

    msg.add_header_u32(sequence);
    msg.add_header_u16(num_blocks as u16);
    Ok(sequence)
}

/// Frame-in tail: the reader has already consumed the block count and
/// verified the sequence word; this deciphers the remainder and trims the
/// padding so only the payload stays readable.
pub fn unwrap_payload(msg: &mut NetworkMessage, key: Option<&XteaKey>) -> Result<()> {
    if let Some(key) = key {
        key.decrypt_in_place(msg.remaining_mut())?;
    }

    let padding = msg.get_byte() as usize;
    if msg.is_overrun() || !msg.discard_padding(padding) {
        return Err(GatewayError::Protocol("malformed frame padding".into()));
    }
    Ok(())
}
