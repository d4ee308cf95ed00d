//! I/O → game thread seam
//!
//! The network layer never touches game state. Everything it produces is
//! handed across through this trait; the embedding server implements it by
//! posting closures onto the game thread's dispatcher.

use std::sync::Arc;

use crate::connection::Connection;

/// Outcome of the cryptographic handshake, ready for session validation on
/// the game thread.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Parsed from the RSA block but not enforced by admission.
    pub is_gamemaster: bool,
    /// Session token, already base64-decoded.
    pub session_token: String,
    pub character_name: String,
}

pub trait GameSink: Send + Sync + 'static {
    /// A handshake completed; validate the session and admit or refuse.
    fn queue_login(&self, connection: Arc<Connection>, request: LoginRequest);

    /// A deciphered command payload arrived. Payloads for one connection
    /// are queued in arrival order.
    fn queue_packet(&self, connection: Arc<Connection>, payload: Vec<u8>);

    /// The connection is going away; undo the connection⇄player relation.
    fn queue_detach(&self, connection: Arc<Connection>);
}
