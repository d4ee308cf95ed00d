//! Per-client connection record
//!
//! One [`Connection`] is shared between the handshake/reader/writer tasks on
//! the I/O thread and the game thread. Synchronization is deliberately
//! coarse:
//!
//! - the lifecycle state is an atomic advanced only forward by CAS,
//! - the XTEA key and terminal identification are written exactly once
//!   during the handshake and read-only afterwards,
//! - the output queue has its own mutex, held only across queue surgery,
//! - everything else is owned by exactly one thread.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::sync::Notify;

use otgate_protocol::{
    make_output_message, NetworkMessage, OutputMessage, XteaKey, OUTPUT_HEADER_BYTES,
};

/// Room the framer may still add to a queued message (pad bytes).
pub const MAX_OUTPUT_PADDING: usize = 8;

/// Connection lifecycle. Transitions move strictly downward:
///
/// ```text
/// Login --(login success)--> Ok
/// Login --(reject/timeout)--> Close or Abort
/// Ok    --(detach)---------> Close
/// any   --(socket error)---> Abort
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Login = 0,
    Ok = 1,
    Close = 2,
    Abort = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Login,
            1 => Self::Ok,
            2 => Self::Close,
            _ => Self::Abort,
        }
    }
}

/// Client identification captured from the login packet.
#[derive(Debug, Clone)]
pub struct TerminalInfo {
    pub kind: u16,
    pub version: u16,
    /// Free-form version string, kept for log lines.
    pub debug_label: String,
}

pub struct Connection {
    pub id: u64,
    pub peer: SocketAddr,
    state: AtomicU8,
    server_sequence: AtomicU32,
    client_sequence: AtomicU32,
    xtea_key: OnceLock<XteaKey>,
    terminal: OnceLock<TerminalInfo>,
    output: Mutex<OutputQueue>,
    /// Signalled when the game thread resolves the login one way or another.
    pub(crate) login_resolved: Notify,
    /// Nudges reader/writer out of their waits after a state change.
    pub(crate) wake: Notify,
}

#[derive(Default)]
struct OutputQueue {
    head: Option<Box<OutputMessage>>,
}

impl Connection {
    pub fn new(id: u64, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            state: AtomicU8::new(ConnectionState::Login as u8),
            server_sequence: AtomicU32::new(0),
            client_sequence: AtomicU32::new(0),
            xtea_key: OnceLock::new(),
            terminal: OnceLock::new(),
            output: Mutex::new(OutputQueue::default()),
            login_resolved: Notify::new(),
            wake: Notify::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Forward-only CAS between lifecycle states. Safe to race from both
    /// threads; losing the race is harmless everywhere it is used.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if moved {
            self.wake.notify_waiters();
        }
        moved
    }

    /// Resolve the pending login to `Ok`, `Close` or `Abort`, releasing the
    /// handshake task. Racing against the login timeout is fine: whichever
    /// transition wins determines the outcome.
    pub fn resolve_login(&self, to: ConnectionState) {
        if self.transition(ConnectionState::Login, to) {
            self.login_resolved.notify_one();
        }
    }

    /// Hard-fail the connection from whatever state it is in.
    pub fn mark_aborted(&self) {
        self.state
            .store(ConnectionState::Abort as u8, Ordering::SeqCst);
        self.wake.notify_waiters();
        self.login_resolved.notify_one();
    }

    pub fn set_key(&self, key: XteaKey) {
        // Second call would mean the handshake ran twice; ignore it.
        let _ = self.xtea_key.set(key);
    }

    pub fn key(&self) -> Option<&XteaKey> {
        self.xtea_key.get()
    }

    pub fn set_terminal(&self, terminal: TerminalInfo) {
        let _ = self.terminal.set(terminal);
    }

    pub fn terminal(&self) -> Option<&TerminalInfo> {
        self.terminal.get()
    }

    pub fn next_server_sequence(&self) -> u32 {
        self.server_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn expected_client_sequence(&self) -> u32 {
        self.client_sequence.load(Ordering::Relaxed)
    }

    pub fn bump_client_sequence(&self) {
        self.client_sequence.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a built packet to the output queue. Called from the game
    /// thread for every outbound packet; the lock covers only the append.
    /// Messages are packed into the current tail buffer while it has room
    /// for the payload plus worst-case framing padding.
    pub fn write_to_output_buffer(&self, msg: &NetworkMessage) {
        if msg.is_overrun() {
            tracing::warn!("connection {}: dropping overrun outbound message", self.id);
            return;
        }

        let mut queue = self.output.lock();

        // Walk to the tail of the intrusive list; append in place when it
        // still has room, otherwise chain a fresh pooled buffer.
        let mut slot = &mut queue.head;
        loop {
            if slot.is_some() {
                let tail = slot.as_mut().unwrap();
                if tail.next.is_some() {
                    slot = &mut tail.next;
                    continue;
                }
                if tail.can_add(msg.written_len() + MAX_OUTPUT_PADDING) {
                    tail.append(msg);
                } else {
                    let mut fresh = make_output_message();
                    fresh.append(msg);
                    tail.next = Some(fresh);
                }
                return;
            } else {
                let mut fresh = make_output_message();
                fresh.append(msg);
                *slot = Some(fresh);
                return;
            }
        }
    }

    /// Detach the first queued message, if any. Writer task only.
    pub fn pop_output(&self) -> Option<Box<OutputMessage>> {
        let mut queue = self.output.lock();
        let mut head = queue.head.take()?;
        queue.head = head.next.take();
        Some(head)
    }

    pub fn has_queued_output(&self) -> bool {
        self.output.lock().head.is_some()
    }
}

// Quick sanity: a default message always fits a fresh buffer.
const _: () = assert!(OUTPUT_HEADER_BYTES < 16);

#[cfg(test)]
mod tests {
    use super::*;

    fn test_connection() -> Connection {
        Connection::new(1, "127.0.0.1:5000".parse().unwrap())
    }

    #[test]
    fn test_transitions_are_one_way() {
        let conn = test_connection();
        assert_eq!(conn.state(), ConnectionState::Login);
        assert!(conn.transition(ConnectionState::Login, ConnectionState::Ok));
        assert!(!conn.transition(ConnectionState::Login, ConnectionState::Close));
        assert!(conn.transition(ConnectionState::Ok, ConnectionState::Close));
        assert_eq!(conn.state(), ConnectionState::Close);

        conn.mark_aborted();
        assert_eq!(conn.state(), ConnectionState::Abort);
        assert!(!conn.transition(ConnectionState::Close, ConnectionState::Ok));
    }

    #[test]
    fn test_key_and_terminal_are_write_once() {
        let conn = test_connection();
        conn.set_key(XteaKey::from_words([1, 2, 3, 4]));
        conn.set_key(XteaKey::from_words([9, 9, 9, 9]));
        assert_eq!(conn.key().unwrap().words(), [1, 2, 3, 4]);

        conn.set_terminal(TerminalInfo {
            kind: 10,
            version: 1200,
            debug_label: "12.00".into(),
        });
        conn.set_terminal(TerminalInfo {
            kind: 11,
            version: 1300,
            debug_label: "13.00".into(),
        });
        assert_eq!(conn.terminal().unwrap().version, 1200);
    }

    #[test]
    fn test_output_queue_is_fifo() {
        let conn = test_connection();
        for opcode in [0x0Au8, 0x0F, 0x14] {
            let mut msg = NetworkMessage::new();
            msg.add_byte(opcode);
            conn.write_to_output_buffer(&msg);
        }

        // Small messages pack into a single pooled buffer.
        let first = conn.pop_output().expect("queued output");
        assert_eq!(first.output(), &[0x0A, 0x0F, 0x14]);
        assert!(conn.pop_output().is_none());
    }

    #[test]
    fn test_output_queue_chains_when_tail_is_full() {
        let conn = test_connection();
        let big = vec![0x55u8; otgate_protocol::NETWORK_MESSAGE_MAX - 64];
        let mut msg = NetworkMessage::new();
        msg.add_bytes(&big);
        conn.write_to_output_buffer(&msg);

        let mut msg2 = NetworkMessage::new();
        msg2.add_bytes(&[1, 2, 3, 4]);
        conn.write_to_output_buffer(&msg2);

        assert_eq!(conn.pop_output().unwrap().output_len(), big.len());
        assert_eq!(conn.pop_output().unwrap().output(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_sequences_are_monotonic() {
        let conn = test_connection();
        assert_eq!(conn.next_server_sequence(), 0);
        assert_eq!(conn.next_server_sequence(), 1);
        assert_eq!(conn.expected_client_sequence(), 0);
        conn.bump_client_sequence();
        assert_eq!(conn.expected_client_sequence(), 1);
    }
}
