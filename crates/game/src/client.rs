//! Game-side connection state
//!
//! A [`ClientState`] pairs the shared connection record with everything only
//! the game thread may touch: the player handle, the known-creature set and
//! the debug-assert latch. Detach is the single place the connection⇄player
//! relation is undone.

use std::sync::Arc;

use otgate_core::{CreatureId, Position};
use otgate_network::{Connection, ConnectionState};

use crate::context::GameContext;
use crate::facade::{LogoutCheck, MessageEffect, Player, TextMessage};
use crate::send;

/// Bound on creatures a client is expected to track.
pub const KNOWN_CREATURE_LIMIT: usize = 1300;

/// Magic effect shown when a player logs out in the open.
pub const MAGIC_EFFECT_POFF: u8 = 3;

/// Status-bar message class for cancel notices.
pub const MESSAGE_STATUS_SMALL: u8 = 43;

/// Session-end reasons for the 0x18 packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    Logout = 0,
    Unknown = 1,
    ForceClose = 2,
    Unknown2 = 3,
}

pub struct ClientState {
    pub connection: Arc<Connection>,
    /// Created and cleared exclusively on the game thread.
    pub player: Option<Arc<dyn Player>>,
    pub known_creatures: Vec<CreatureId>,
    pub debug_assert_received: bool,
}

impl ClientState {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            player: None,
            known_creatures: Vec::new(),
            debug_assert_received: false,
        }
    }

    pub fn player_id(&self) -> Option<CreatureId> {
        self.player.as_ref().map(|p| p.id())
    }

    pub fn player_position(&self) -> Option<Position> {
        self.player.as_ref().map(|p| p.position())
    }
}

/// Undo the connection⇄player relation. The player handle is taken into a
/// local before either pointer is cleared, so the last shared reference
/// cannot drop while the back-pointer is still set.
pub fn detach(ctx: &mut GameContext, connection: &Arc<Connection>) {
    connection.transition(ConnectionState::Ok, ConnectionState::Close);

    let Some(mut client) = ctx.clients.remove(&connection.id) else {
        return;
    };
    if let Some(player) = client.player.take() {
        player.clear_connection();
        ctx.world.release_creature(&player);
    }
}

/// Voluntary or forced logout. Performs the no-logout checks unless forced,
/// shows the logout effect, sends the session-end packet and detaches.
pub fn logout(ctx: &mut GameContext, connection: &Arc<Connection>, display_effect: bool, forced: bool) {
    let Some(player) = ctx
        .clients
        .get(&connection.id)
        .and_then(|c| c.player.clone())
    else {
        return;
    };

    if !player.is_removed() {
        if !forced && !player.is_access_player() {
            let blocked_text = match ctx.world.logout_check(&player) {
                LogoutCheck::Allowed => None,
                LogoutCheck::NoLogoutHere => Some("You cannot log out here."),
                LogoutCheck::InFight => {
                    Some("You may not log out during or immediately after a fight!")
                }
                LogoutCheck::Denied => return,
            };
            if let Some(text) = blocked_text {
                if let Some(client) = ctx.clients.get(&connection.id) {
                    send::send_text_message(
                        client,
                        &TextMessage {
                            kind: MESSAGE_STATUS_SMALL,
                            text: text.into(),
                            effect: MessageEffect::None,
                        },
                    );
                }
                return;
            }
        }

        if display_effect && !player.is_dead() && !player.is_ghost() {
            ctx.world.add_magic_effect(player.position(), MAGIC_EFFECT_POFF);
        }
    }

    if let Some(client) = ctx.clients.get(&connection.id) {
        send::send_session_end(
            client,
            if forced {
                SessionEndReason::ForceClose
            } else {
                SessionEndReason::Logout
            },
        );
    }

    detach(ctx, connection);
    ctx.world.remove_creature(&player);
}
