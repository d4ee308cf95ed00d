//! Game-thread context
//!
//! The [`GameContext`] owns everything the game thread mutates: the client
//! table, the wait-list, and the façade trait objects constructed at
//! startup. The three `handle_*` functions are the only entry points the
//! dispatcher exposes to the network sink.

use std::collections::HashMap;
use std::sync::Arc;

use otgate_config::GatewayConfig;
use otgate_network::{Connection, LoginRequest};

use crate::client::{detach, ClientState};
use crate::dispatch;
use crate::facade::{BanStore, GameWorld, SessionStore};
use crate::login;
use crate::waitlist::WaitList;

pub struct GameContext {
    pub config: GatewayConfig,
    pub sessions: Box<dyn SessionStore>,
    pub bans: Box<dyn BanStore>,
    pub world: Box<dyn GameWorld>,
    /// Game-side connection records, keyed by connection id.
    pub clients: HashMap<u64, ClientState>,
    pub waitlist: WaitList,
}

impl GameContext {
    pub fn new(
        config: GatewayConfig,
        sessions: Box<dyn SessionStore>,
        bans: Box<dyn BanStore>,
        world: Box<dyn GameWorld>,
    ) -> Self {
        Self {
            config,
            sessions,
            bans,
            world,
            clients: HashMap::new(),
            waitlist: WaitList::new(),
        }
    }
}

/// A handshake finished on the I/O thread; run session validation and
/// admission.
pub fn handle_login(ctx: &mut GameContext, connection: Arc<Connection>, request: LoginRequest) {
    login::perform_login(ctx, connection, request);
}

/// A deciphered command payload arrived.
pub fn handle_packet(ctx: &mut GameContext, connection: Arc<Connection>, payload: Vec<u8>) {
    dispatch::parse_packet(ctx, &connection, &payload);
}

/// The connection is going away.
pub fn handle_detach(ctx: &mut GameContext, connection: Arc<Connection>) {
    detach(ctx, &connection);
}
