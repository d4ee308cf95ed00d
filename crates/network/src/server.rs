//! Game service: accept loop, handshake, reader and writer tasks
//!
//! Everything here runs on the single I/O thread. Each accepted socket gets
//! a handshake task; a successful handshake leaves the connection in `Ok`
//! and spawns the sibling reader and writer tasks. The service enforces the
//! wire contract (framing, sequences, deadlines) and forwards the rest to
//! the game thread through the [`GameSink`].
//!
//! Deadlines:
//! - 5 s for the whole handshake including game-thread login resolution,
//! - 15 s per frame read and per frame write,
//! - 10 ms writer poll while the output queue is empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use otgate_core::{GatewayError, Result};
use otgate_protocol::{
    make_output_message, recycle_output_message, unwrap_payload, wrap_packet, Deflater,
    NetworkMessage, RsaDecryptor, XteaKey, NETWORK_MESSAGE_MAX, RSA_BUFFER_LENGTH,
};

use crate::connection::{Connection, ConnectionState, TerminalInfo};
use crate::sink::{GameSink, LoginRequest};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(15);
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);
const AUTO_SEND_INTERVAL: Duration = Duration::from_millis(10);

/// Greeting line cap; world names are short ASCII identifiers.
const WORLD_NAME_MAX: usize = 32;

/// Fixed size of the login command after the frame header.
const LOGIN_PAYLOAD_LEN: usize = 252;

/// Network-layer options, distilled from the gateway config by the embedder.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: std::net::SocketAddr,
    pub world_name: String,
    pub max_packets_per_second: u32,
}

/// The game service. One instance per process, driven by the I/O thread.
pub struct Service {
    shared: Arc<ServiceShared>,
}

struct ServiceShared {
    config: ServiceConfig,
    rsa: RsaDecryptor,
    sink: Arc<dyn GameSink>,
    connections: DashMap<u64, Arc<Connection>>,
    next_connection_id: AtomicU64,
    started: Instant,
}

impl Service {
    pub fn new(config: ServiceConfig, rsa: RsaDecryptor, sink: Arc<dyn GameSink>) -> Self {
        Self {
            shared: Arc::new(ServiceShared {
                config,
                rsa,
                sink,
                connections: DashMap::new(),
                next_connection_id: AtomicU64::new(1),
                started: Instant::now(),
            }),
        }
    }

    /// Accept connections until ctrl-c. Must run inside the I/O thread's
    /// current-thread runtime.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.shared.config.bind_address).await?;
        tracing::info!(
            "game service listening on {}",
            self.shared.config.bind_address
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            let _ = socket.set_nodelay(true);
                            self.shared.clone().start_connection(socket, peer);
                        }
                        Err(e) => {
                            tracing::error!("accept failed: {}", e);
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("ctrl-c received, shutting down game service");
                    break;
                }
            }
        }

        self.shared.close_all();
        Ok(())
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.len()
    }
}

impl ServiceShared {
    fn start_connection(self: Arc<Self>, socket: TcpStream, peer: std::net::SocketAddr) {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(Connection::new(id, peer));
        self.connections.insert(id, connection.clone());
        tracing::debug!("connection {} accepted from {}", id, peer);

        tokio::spawn(async move {
            self.handshake_task(connection, socket).await;
        });
    }

    fn uptime_seconds(&self) -> u32 {
        self.started.elapsed().as_secs() as u32
    }

    /// Graceful teardown: the writer drains the queue before half-closing.
    fn close(&self, connection: &Arc<Connection>) {
        connection.transition(ConnectionState::Ok, ConnectionState::Close);
        connection.resolve_login(ConnectionState::Close);
        self.connections.remove(&connection.id);
        self.sink.queue_detach(connection.clone());
    }

    /// Hard teardown: both tasks exit as soon as they observe the state.
    fn abort(&self, connection: &Arc<Connection>) {
        connection.mark_aborted();
        self.connections.remove(&connection.id);
        self.sink.queue_detach(connection.clone());
    }

    fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().mark_aborted();
        }
        self.connections.clear();
    }

    async fn handshake_task(self: Arc<Self>, connection: Arc<Connection>, socket: TcpStream) {
        let (mut read_half, mut write_half) = socket.into_split();

        let outcome = timeout(LOGIN_TIMEOUT, async {
            self.handshake_io(&connection, &mut read_half, &mut write_half)
                .await?;
            // The login task on the game thread resolves the state.
            connection.login_resolved.notified().await;
            Ok::<(), GatewayError>(())
        })
        .await;

        match outcome {
            Err(_) => {
                tracing::debug!("connection {}: login deadline expired", connection.id);
                self.abort(&connection);
                return;
            }
            Ok(Err(e)) => {
                tracing::debug!("connection {}: handshake failed: {}", connection.id, e);
                self.abort(&connection);
                return;
            }
            Ok(Ok(())) => {}
        }

        let state = connection.state();
        if state == ConnectionState::Login {
            self.abort(&connection);
            return;
        }

        if state == ConnectionState::Ok {
            let this = self.clone();
            let conn = connection.clone();
            tokio::spawn(async move {
                this.reader_task(conn, read_half).await;
            });
        }

        if state == ConnectionState::Ok || state == ConnectionState::Close {
            let this = self.clone();
            tokio::spawn(async move {
                this.writer_task(connection, write_half).await;
            });
        }
    }

    /// Wire half of the handshake: greeting, challenge, login packet.
    /// Session validation happens on the game thread afterwards.
    async fn handshake_io(
        &self,
        connection: &Arc<Connection>,
        read_half: &mut OwnedReadHalf,
        write_half: &mut OwnedWriteHalf,
    ) -> Result<()> {
        // SERVER <- CLIENT: world name, LF-terminated.
        let world_name = read_greeting_line(read_half).await?;
        if world_name != self.config.world_name {
            return Err(GatewayError::Protocol(format!(
                "wrong world name {world_name:?}"
            )));
        }

        // SERVER -> CLIENT: challenge, framed but not yet enciphered.
        let challenge_uptime = self.uptime_seconds();
        let challenge_random = random_byte();
        {
            let mut challenge = make_output_message();
            challenge.add_byte(0x1F);
            challenge.add_u32(challenge_uptime);
            challenge.add_byte(challenge_random);
            wrap_packet(
                &mut challenge,
                None,
                connection.next_server_sequence(),
                None,
            )?;
            timeout(WRITE_TIMEOUT, write_half.write_all(challenge.output()))
                .await
                .map_err(|_| GatewayError::Protocol("challenge write deadline".into()))??;
        }

        // SERVER <- CLIENT: login command, framed without XTEA.
        let mut input = NetworkMessage::new();
        read_game_packet(connection, read_half, &mut input, false).await?;

        if input.remaining_len() != LOGIN_PAYLOAD_LEN {
            return Err(GatewayError::Protocol(format!(
                "bad login payload length {}",
                input.remaining_len()
            )));
        }

        if input.get_byte() != 0x0A {
            return Err(GatewayError::Protocol("bad login command tag".into()));
        }

        let terminal_kind = input.get_u16();
        let terminal_version = input.get_u16();
        input.get_u32(); // extended version, unused
        let version_label = input.get_string();
        input.get_string(); // asset checksum
        input.get_byte(); // reserved

        if input.remaining_len() != RSA_BUFFER_LENGTH {
            return Err(GatewayError::Protocol("bad RSA block length".into()));
        }
        self.rsa.decrypt_in_place(input.remaining_mut())?;
        if input.get_byte() != 0 {
            return Err(GatewayError::Protocol("bad RSA opening".into()));
        }

        let key = XteaKey::from_words([
            input.get_u32(),
            input.get_u32(),
            input.get_u32(),
            input.get_u32(),
        ]);

        let is_gamemaster = input.get_byte() != 0;
        let session_token = match BASE64.decode(input.get_string()) {
            Ok(decoded) => String::from_utf8_lossy(&decoded).into_owned(),
            Err(_) => String::new(),
        };
        let character_name = input.get_string();

        if input.get_u32() != challenge_uptime
            || input.get_byte() != challenge_random
            || input.is_overrun()
        {
            return Err(GatewayError::Protocol("challenge echo mismatch".into()));
        }

        connection.set_key(key);
        connection.set_terminal(TerminalInfo {
            kind: terminal_kind,
            version: terminal_version,
            debug_label: version_label,
        });

        self.sink.queue_login(
            connection.clone(),
            LoginRequest {
                is_gamemaster,
                session_token,
                character_name,
            },
        );
        Ok(())
    }

    async fn reader_task(self: Arc<Self>, connection: Arc<Connection>, mut read_half: OwnedReadHalf) {
        let mut input = NetworkMessage::new();
        let mut window_start = Instant::now();
        let mut window_packets = 0u32;

        while connection.state() == ConnectionState::Ok {
            let read = tokio::select! {
                read = timeout(
                    READ_TIMEOUT,
                    read_game_packet(&connection, &mut read_half, &mut input, true),
                ) => read,
                _ = connection.wake.notified() => continue,
            };

            match read {
                Err(_) => {
                    tracing::debug!("connection {}: read deadline expired", connection.id);
                    self.abort(&connection);
                    return;
                }
                Ok(Err(GatewayError::Io(e)))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.close(&connection);
                    return;
                }
                Ok(Err(e)) => {
                    tracing::debug!("connection {}: read failed: {}", connection.id, e);
                    self.abort(&connection);
                    return;
                }
                Ok(Ok(())) => {}
            }

            // Command rate guard, windowed over a couple of seconds.
            window_packets += 1;
            let elapsed = window_start.elapsed().as_secs().max(1) as u32;
            if window_packets / elapsed > self.config.max_packets_per_second {
                tracing::warn!(
                    "{} disconnected for exceeding the packet-per-second limit",
                    connection.peer
                );
                self.close(&connection);
                return;
            }
            if elapsed > 2 {
                window_start = Instant::now();
                window_packets = 0;
            }

            let payload = input.remaining().to_vec();
            if !payload.is_empty() {
                self.sink.queue_packet(connection.clone(), payload);
            }
        }
    }

    async fn writer_task(
        self: Arc<Self>,
        connection: Arc<Connection>,
        mut write_half: OwnedWriteHalf,
    ) {
        let mut deflater = Deflater::new();

        loop {
            let state = connection.state();
            if state != ConnectionState::Ok && state != ConnectionState::Close {
                break;
            }

            let Some(mut output) = connection.pop_output() else {
                if state == ConnectionState::Close {
                    // Queue drained: finish the graceful close.
                    let _ = write_half.shutdown().await;
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(AUTO_SEND_INTERVAL) => {}
                    _ = connection.wake.notified() => {}
                }
                continue;
            };

            let sequence = connection.next_server_sequence();
            if let Err(e) = wrap_packet(
                &mut output,
                connection.key(),
                sequence,
                Some(&mut deflater),
            ) {
                tracing::warn!("connection {}: failed to wrap packet: {}", connection.id, e);
                recycle_output_message(output);
                self.abort(&connection);
                return;
            }

            let written = timeout(WRITE_TIMEOUT, write_half.write_all(output.output())).await;
            recycle_output_message(output);
            match written {
                Err(_) => {
                    tracing::debug!("connection {}: write deadline expired", connection.id);
                    self.abort(&connection);
                    return;
                }
                Ok(Err(e)) => {
                    tracing::debug!("connection {}: write failed: {}", connection.id, e);
                    self.abort(&connection);
                    return;
                }
                Ok(Ok(())) => {}
            }
        }

        // The writer outlives the reader on every path, so final cleanup
        // happens here. This also detaches sessions whose login was refused
        // with a queued farewell; repeated detaches are harmless.
        self.connections.remove(&connection.id);
        self.sink.queue_detach(connection);
    }
}

/// Read one framed packet: block count, total read, sequence check, then
/// decipher and padding trim. Any violation is a protocol error; the caller
/// maps I/O EOF to a graceful close.
async fn read_game_packet(
    connection: &Connection,
    read_half: &mut OwnedReadHalf,
    input: &mut NetworkMessage,
    keyed: bool,
) -> Result<()> {
    let mut header = [0u8; 2];
    read_half.read_exact(&mut header).await?;
    let num_blocks = u16::from_le_bytes(header) as usize;
    let packet_len = 4 + num_blocks * 8;
    if num_blocks == 0 || packet_len > NETWORK_MESSAGE_MAX {
        return Err(GatewayError::Protocol(format!(
            "bad frame block count {num_blocks}"
        )));
    }

    read_half
        .read_exact(&mut input.storage_mut()[..packet_len])
        .await?;
    input.reset_for(packet_len);

    // Exact match: replays, gaps, and unknown high bits all fail here.
    let sequence = input.get_u32();
    if sequence != connection.expected_client_sequence() {
        return Err(GatewayError::Protocol(format!(
            "sequence mismatch (got {sequence}, expected {})",
            connection.expected_client_sequence()
        )));
    }

    let key = if keyed { connection.key() } else { None };
    unwrap_payload(input, key)?;
    connection.bump_client_sequence();
    Ok(())
}

/// Read the LF-terminated world-name greeting, byte by byte. Over-long or
/// non-ASCII greetings fail the handshake.
async fn read_greeting_line(read_half: &mut OwnedReadHalf) -> Result<String> {
    let mut name = Vec::with_capacity(WORLD_NAME_MAX);
    loop {
        let mut byte = [0u8; 1];
        read_half.read_exact(&mut byte).await?;
        if byte[0] == b'\n' {
            break;
        }
        if name.len() >= WORLD_NAME_MAX || !byte[0].is_ascii() {
            return Err(GatewayError::Protocol("malformed world greeting".into()));
        }
        name.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&name).into_owned())
}

fn random_byte() -> u8 {
    let mut byte = [0u8; 1];
    OsRng.fill_bytes(&mut byte);
    byte[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        logins: Mutex<Vec<LoginRequest>>,
        packets: Mutex<Vec<Vec<u8>>>,
        detaches: Mutex<usize>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                logins: Mutex::new(Vec::new()),
                packets: Mutex::new(Vec::new()),
                detaches: Mutex::new(0),
            })
        }
    }

    impl GameSink for RecordingSink {
        fn queue_login(&self, connection: Arc<Connection>, request: LoginRequest) {
            self.logins.lock().unwrap().push(request);
            // Admit everyone so the handshake task proceeds.
            connection.resolve_login(ConnectionState::Ok);
        }

        fn queue_packet(&self, _connection: Arc<Connection>, payload: Vec<u8>) {
            self.packets.lock().unwrap().push(payload);
        }

        fn queue_detach(&self, _connection: Arc<Connection>) {
            *self.detaches.lock().unwrap() += 1;
        }
    }

    fn test_service(sink: Arc<RecordingSink>) -> Arc<ServiceShared> {
        let (_, rsa) = otgate_protocol::rsa::dev_keys::keypair();
        Arc::new(ServiceShared {
            config: ServiceConfig {
                bind_address: "127.0.0.1:0".parse().unwrap(),
                world_name: "MyWorld".into(),
                max_packets_per_second: 25,
            },
            rsa,
            sink,
            connections: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
            started: Instant::now(),
        })
    }

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_wrong_world_name_aborts_without_reply() {
        let sink = RecordingSink::new();
        let service = test_service(sink.clone());
        let (mut client, server) = connected_pair().await;

        let connection = Arc::new(Connection::new(7, server.peer_addr().unwrap()));
        service.connections.insert(7, connection.clone());
        let task = tokio::spawn({
            let service = service.clone();
            async move { service.handshake_task(connection, server).await }
        });

        client.write_all(b"OtherWorld\n").await.unwrap();
        task.await.unwrap();

        assert!(sink.logins.lock().unwrap().is_empty());
        assert_eq!(*sink.detaches.lock().unwrap(), 1);
        assert_eq!(service.connections.len(), 0);
    }

    #[tokio::test]
    async fn test_greeting_and_challenge_exchange() {
        let sink = RecordingSink::new();
        let service = test_service(sink.clone());
        let (mut client, server) = connected_pair().await;

        let connection = Arc::new(Connection::new(1, server.peer_addr().unwrap()));
        service.connections.insert(1, connection.clone());
        let service2 = service.clone();
        let conn2 = connection.clone();
        let task = tokio::spawn(async move { service2.handshake_task(conn2, server).await });

        client.write_all(b"MyWorld\n").await.unwrap();

        // Challenge: 1 block, sequence 0, pad 1, payload 0x1F + uptime + random.
        let mut challenge = [0u8; 14];
        client.read_exact(&mut challenge).await.unwrap();
        assert_eq!(u16::from_le_bytes([challenge[0], challenge[1]]), 1);
        assert_eq!(u32::from_le_bytes([challenge[2], challenge[3], challenge[4], challenge[5]]), 0);
        assert_eq!(challenge[6], 1); // pad count
        assert_eq!(challenge[7], 0x1F);

        // Not sending the login packet: the 5 s deadline aborts the task.
        drop(client);
        task.await.unwrap();
        assert_eq!(*sink.detaches.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_graceful_close_drains_queue_before_half_close() {
        let sink = RecordingSink::new();
        let service = test_service(sink.clone());
        let (mut client, server) = connected_pair().await;

        let connection = Arc::new(Connection::new(9, server.peer_addr().unwrap()));

        // Queue three packets on the game side, then close gracefully.
        for opcode in [0x01u8, 0x02, 0x03] {
            let mut msg = NetworkMessage::new();
            msg.add_byte(opcode);
            connection.write_to_output_buffer(&msg);
        }
        assert!(connection.transition(ConnectionState::Login, ConnectionState::Close));

        let (_server_read, server_write) = server.into_split();
        let task = tokio::spawn({
            let service = service.clone();
            let connection = connection.clone();
            async move { service.writer_task(connection, server_write).await }
        });

        // Everything queued arrives, then the socket half-closes (EOF).
        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match client.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(_) => break,
            }
        }
        task.await.unwrap();

        // The three small packets pack into one unkeyed frame.
        let mut frame = NetworkMessage::from_payload(&received);
        let num_blocks = frame.get_u16() as usize;
        assert_eq!(received.len(), 2 + 4 + 8 * num_blocks);
        assert_eq!(frame.get_u32(), 0); // first server sequence
        unwrap_payload(&mut frame, None).unwrap();
        assert_eq!(frame.remaining(), &[0x01, 0x02, 0x03]);
    }

    #[tokio::test]
    async fn test_full_handshake_reaches_login_queue() {
        let sink = RecordingSink::new();
        let service = test_service(sink.clone());
        let (mut client, server) = connected_pair().await;

        let connection = Arc::new(Connection::new(3, server.peer_addr().unwrap()));
        service.connections.insert(3, connection.clone());
        let service2 = service.clone();
        let conn2 = connection.clone();
        let task = tokio::spawn(async move { service2.handshake_task(conn2, server).await });

        client.write_all(b"MyWorld\n").await.unwrap();

        let mut challenge = [0u8; 14];
        client.read_exact(&mut challenge).await.unwrap();
        let uptime = u32::from_le_bytes([challenge[8], challenge[9], challenge[10], challenge[11]]);
        let random = challenge[12];

        // Assemble the 252-byte login payload around a 128-byte RSA block.
        let (public, _) = otgate_protocol::rsa::dev_keys::keypair();
        let mut rsa_block = [0u8; RSA_BUFFER_LENGTH];
        {
            let mut inner = NetworkMessage::new();
            inner.add_byte(0); // leading zero proves the opening
            inner.add_u32(0xA1);
            inner.add_u32(0xB2);
            inner.add_u32(0xC3);
            inner.add_u32(0xD4);
            inner.add_byte(0); // not a gamemaster
            inner.add_string(&BASE64.encode(b"session-token"));
            inner.add_string("Pathfinder");
            inner.add_u32(uptime);
            inner.add_byte(random);
            let written = inner.written();
            rsa_block[..written.len()].copy_from_slice(written);
        }
        public.encrypt_in_place(&mut rsa_block).unwrap();

        let mut login = NetworkMessage::new();
        login.add_byte(0x0A);
        login.add_u16(10); // terminal kind
        login.add_u16(1200); // terminal version
        login.add_u32(0);
        login.add_string("12.00");
        // The checksum string soaks up the slack so the RSA block is the
        // final 128 bytes of an exactly 252-byte payload.
        login.add_string(&"a".repeat(105));
        login.add_byte(0);
        login.add_bytes(&rsa_block);
        assert_eq!(login.written_len(), LOGIN_PAYLOAD_LEN);

        let mut framed = make_output_message();
        framed.add_bytes(login.written());
        wrap_packet(&mut framed, None, 0, None).unwrap();
        client.write_all(framed.output()).await.unwrap();

        task.await.unwrap();

        let logins = sink.logins.lock().unwrap();
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0].character_name, "Pathfinder");
        assert_eq!(logins[0].session_token, "session-token");
        assert!(!logins[0].is_gamemaster);
        assert_eq!(connection.key().unwrap().words(), [0xA1, 0xB2, 0xC3, 0xD4]);
        assert_eq!(connection.terminal().unwrap().version, 1200);
        assert_eq!(connection.state(), ConnectionState::Ok);
    }
}
