//! # Gateway wire protocol
//!
//! Implements the sequenced, XTEA-enciphered, RSA-bootstrapped binary
//! protocol spoken by game clients, with byte-level compatibility.
//!
//! ## Layers
//!
//! 1. Message buffers ([`message`], [`output`]): bounded cursors over fixed
//!    storage. Inbound reads never run past the end; they return zero and
//!    raise an overrun flag instead, which the dispatcher checks after every
//!    parse. Outbound buffers reserve 8 bytes of room for the frame headers
//!    and are pooled.
//! 2. Ciphers ([`xtea`], [`rsa`]): XTEA in ECB mode over the whole session,
//!    one raw RSA private-key operation to open the login block.
//! 3. Framing ([`frame`]): block counts, sequence numbers, random padding
//!    and optional deflate, composed around the ciphers.

pub mod frame;
pub mod message;
pub mod opcodes;
pub mod output;
pub mod rsa;
pub mod xtea;

pub use frame::*;
pub use message::*;
pub use output::*;
pub use rsa::*;
pub use xtea::*;
