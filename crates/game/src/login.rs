//! Session validation and admission
//!
//! Runs on the game thread once the cryptographic handshake succeeded. The
//! checks run in a fixed order; every refusal sends one typed login-error
//! packet and resolves the connection to `Close` so the writer can deliver
//! it. Only a fully placed character resolves to `Ok`.

use std::sync::Arc;
use std::time::Instant;

use otgate_core::GameState;
use otgate_network::{Connection, ConnectionState, LoginRequest};

use crate::client::ClientState;
use crate::context::GameContext;
use crate::facade::BanInfo;
use crate::send;
use crate::waitlist::WaitDecision;

/// Supported terminal protocol range.
pub const TERMINAL_VERSION_MIN: u16 = 1310;
pub const TERMINAL_VERSION_MAX: u16 = 1321;
pub const TERMINAL_VERSION_STR: &str = "13.10";

/// Terminal kinds at or above this value understand extended opcodes.
pub const TERMINAL_OTCLIENT_LINUX: u16 = 10;

/// Creature event registered for extended-opcode capable terminals.
const EXTENDED_OPCODE_EVENT: &str = "ExtendedOpcode";

fn refuse(ctx: &GameContext, connection: &Arc<Connection>, message: &str) {
    if let Some(client) = ctx.clients.get(&connection.id) {
        send::send_login_error(client, message);
    }
    connection.resolve_login(ConnectionState::Close);
}

fn ip_ban_text(ban: &BanInfo) -> String {
    format!(
        "Your IP has been banned until {} by {}.\n\nReason specified:\n{}",
        format_date_short(ban.expires_at),
        ban.banned_by,
        ban.reason
    )
}

fn account_ban_text(ban: &BanInfo) -> String {
    if ban.expires_at > 0 {
        format!(
            "Your account has been banned until {} by {}.\n\nReason specified:\n{}",
            format_date_short(ban.expires_at),
            ban.banned_by,
            ban.reason
        )
    } else {
        format!(
            "Your account has been permanently banned by {}.\n\nReason specified:\n{}",
            ban.banned_by, ban.reason
        )
    }
}

/// `dd/mm/yyyy` from a unix timestamp, civil-calendar arithmetic only.
pub fn format_date_short(timestamp: i64) -> String {
    let days = timestamp.div_euclid(86_400);
    // Days-to-civil conversion over 400-year eras.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };
    format!("{day:02}/{month:02}/{year}")
}

/// §session validation and admission, in order: session store, bound IP,
/// version, game state, IP ban, character preload, namelock, closing/closed
/// gates, one-per-account, account ban, wait-list, full load, placement.
pub fn perform_login(ctx: &mut GameContext, connection: Arc<Connection>, request: LoginRequest) {
    ctx.clients
        .insert(connection.id, ClientState::new(connection.clone()));

    if request.session_token.is_empty() || request.character_name.is_empty() {
        return refuse(ctx, &connection, "Malformed session data.");
    }

    let terminal = match connection.terminal() {
        Some(terminal) => terminal.clone(),
        None => return refuse(ctx, &connection, "Malformed session data."),
    };

    if terminal.version < TERMINAL_VERSION_MIN || terminal.version > TERMINAL_VERSION_MAX {
        return refuse(
            ctx,
            &connection,
            &format!("Only clients with protocol {TERMINAL_VERSION_STR} allowed!"),
        );
    }

    match ctx.world.game_state() {
        GameState::Startup => {
            return refuse(ctx, &connection, "Gameworld is starting up. Please wait.");
        }
        GameState::Maintain => {
            return refuse(
                ctx,
                &connection,
                "Gameworld is under maintenance. Please re-connect in a while.",
            );
        }
        _ => {}
    }

    if let Some(ban) = ctx.bans.ip_ban(connection.peer.ip()) {
        return refuse(ctx, &connection, &ip_ban_text(&ban));
    }

    let session = match ctx
        .sessions
        .load_session(&request.session_token, &request.character_name)
    {
        Some(session) if session.account_id.get() != 0 => session,
        _ => {
            return refuse(ctx, &connection, "Account name or password is not correct.");
        }
    };

    if session.bound_ip != connection.peer.ip() {
        return refuse(
            ctx,
            &connection,
            "Your game session is already locked to a different IP. Please log in again.",
        );
    }

    if ctx.world.player_by_guid(session.character_id).is_some() && !ctx.config.allow_clones {
        return refuse(ctx, &connection, "You are already logged in.");
    }

    let player = ctx.world.create_player(session.character_id, session.account_id);
    player.attach_connection(&connection);
    if let Some(client) = ctx.clients.get_mut(&connection.id) {
        client.player = Some(player.clone());
    }

    if !ctx.sessions.preload_player(&player) {
        return refuse(ctx, &connection, "Your character could not be loaded.");
    }

    if ctx.bans.is_namelocked(player.guid()) {
        return refuse(ctx, &connection, "Your character has been namelocked.");
    }

    match ctx.world.game_state() {
        GameState::Closing if !player.can_always_login() => {
            return refuse(
                ctx,
                &connection,
                "The game is just going down.\nPlease try again later.",
            );
        }
        GameState::Closed if !player.can_always_login() => {
            return refuse(
                ctx,
                &connection,
                "Server is currently closed.\nPlease try again later.",
            );
        }
        _ => {}
    }

    if ctx.config.one_player_per_account
        && !player.is_gamemaster_account()
        && ctx.world.player_by_account(player.account_id()).is_some()
    {
        return refuse(
            ctx,
            &connection,
            "You may only login with one character\nof your account at the same time.",
        );
    }

    if !player.cannot_be_banned() {
        if let Some(ban) = ctx.bans.account_ban(session.account_id) {
            return refuse(ctx, &connection, &account_ban_text(&ban));
        }
    }

    let privileged = player.can_always_login() || player.is_gamemaster_account();
    let decision = ctx.waitlist.evaluate(
        Instant::now(),
        player.guid(),
        player.is_premium(),
        privileged,
        ctx.world.players_online(),
        ctx.config.max_players,
    );
    if let WaitDecision::Wait {
        slot,
        retry_seconds,
    } = decision
    {
        if let Some(client) = ctx.clients.get(&connection.id) {
            send::send_wait_list(client, slot, retry_seconds);
        }
        connection.resolve_login(ConnectionState::Close);
        return;
    }

    if !ctx.sessions.load_player_by_id(&player, player.guid()) {
        return refuse(ctx, &connection, "Your character could not be loaded.");
    }

    if !ctx.world.place_creature(&player, player.login_position(), false)
        && !ctx.world.place_creature(&player, player.temple_position(), true)
    {
        return refuse(
            ctx,
            &connection,
            "Temple position is wrong. Contact the administrator.",
        );
    }

    if terminal.kind >= TERMINAL_OTCLIENT_LINUX {
        if let Some(client) = ctx.clients.get(&connection.id) {
            send::send_enable_extended_opcode(client);
        }
        ctx.world.register_creature_event(&player, EXTENDED_OPCODE_EVENT);
    }

    ctx.world.stamp_login(&player, connection.peer.ip());
    connection.resolve_login(ConnectionState::Ok);

    tracing::info!(
        "{} logged in from {} (terminal {}/{})",
        player.name(),
        connection.peer,
        terminal.kind,
        terminal.debug_label
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use otgate_network::TerminalInfo;
    use std::sync::Arc as StdArc;

    fn login_request(token: &str, name: &str) -> LoginRequest {
        LoginRequest {
            is_gamemaster: false,
            session_token: token.into(),
            character_name: name.into(),
        }
    }

    fn connection_with_terminal(id: u64) -> StdArc<Connection> {
        let connection = test_connection(id);
        connection.set_terminal(TerminalInfo {
            kind: 10,
            version: 1312,
            debug_label: "13.12".into(),
        });
        connection
    }

    fn error_text(bytes: &[u8]) -> String {
        assert_eq!(bytes[0], 0x14);
        let len = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
        String::from_utf8_lossy(&bytes[3..3 + len]).into_owned()
    }

    #[test]
    fn test_successful_login_resolves_ok_and_places_player() {
        let world = TestWorld::new();
        let mut ctx = context(
            &world,
            TestSessions::with_session(5, 1234, "127.0.0.1"),
            TestBans::default(),
        );
        let connection = connection_with_terminal(1);

        perform_login(&mut ctx, connection.clone(), login_request("tok", "Arkan"));

        assert_eq!(connection.state(), ConnectionState::Ok);
        let created = world.created_player().unwrap();
        assert!(created.connection_attached());
        assert_eq!(world.placed_at().len(), 1);
        assert!(world.ops().iter().any(|op| op.starts_with("stamp_login")));
        // Extended opcodes negotiated for an OTClient-class terminal.
        let client = ctx.clients.get(&connection.id).unwrap();
        let bytes = queued_bytes(client);
        assert_eq!(bytes[0], 0x32);
        assert!(world.ops().contains(&"register_event ExtendedOpcode".to_string()));
    }

    #[test]
    fn test_bad_session_is_refused() {
        let world = TestWorld::new();
        let mut ctx = context(&world, TestSessions::default(), TestBans::default());
        let connection = connection_with_terminal(2);

        perform_login(&mut ctx, connection.clone(), login_request("tok", "Arkan"));

        assert_eq!(connection.state(), ConnectionState::Close);
        let client = ctx.clients.get(&connection.id).unwrap();
        assert_eq!(
            error_text(&queued_bytes(client)),
            "Account name or password is not correct."
        );
    }

    #[test]
    fn test_session_bound_to_other_ip_is_refused() {
        let world = TestWorld::new();
        let mut ctx = context(
            &world,
            TestSessions::with_session(5, 1234, "10.1.2.3"),
            TestBans::default(),
        );
        let connection = connection_with_terminal(3);

        perform_login(&mut ctx, connection.clone(), login_request("tok", "Arkan"));

        assert_eq!(connection.state(), ConnectionState::Close);
        let client = ctx.clients.get(&connection.id).unwrap();
        assert!(error_text(&queued_bytes(client)).contains("locked to a different IP"));
    }

    #[test]
    fn test_old_terminal_is_refused() {
        let world = TestWorld::new();
        let mut ctx = context(
            &world,
            TestSessions::with_session(5, 1234, "127.0.0.1"),
            TestBans::default(),
        );
        let connection = test_connection(4);
        connection.set_terminal(TerminalInfo {
            kind: 10,
            version: 1200,
            debug_label: "12.00".into(),
        });

        perform_login(&mut ctx, connection.clone(), login_request("tok", "Arkan"));

        let client = ctx.clients.get(&connection.id).unwrap();
        assert!(error_text(&queued_bytes(client)).contains("Only clients with protocol"));
    }

    #[test]
    fn test_ip_ban_is_refused_before_session_lookup() {
        let world = TestWorld::new();
        let bans = TestBans {
            ip: Some(BanInfo {
                reason: "botting".into(),
                banned_by: "CM".into(),
                expires_at: 1_900_000_000,
            }),
            ..TestBans::default()
        };
        let mut ctx = context(&world, TestSessions::default(), bans);
        let connection = connection_with_terminal(5);

        perform_login(&mut ctx, connection.clone(), login_request("tok", "Arkan"));

        let client = ctx.clients.get(&connection.id).unwrap();
        let text = error_text(&queued_bytes(client));
        assert!(text.starts_with("Your IP has been banned until"));
        assert!(text.contains("botting"));
    }

    #[test]
    fn test_permanent_account_ban_text() {
        let world = TestWorld::new();
        let bans = TestBans {
            account: Some(BanInfo {
                reason: "abuse".into(),
                banned_by: "GM Lena".into(),
                expires_at: 0,
            }),
            ..TestBans::default()
        };
        let mut ctx = context(
            &world,
            TestSessions::with_session(5, 1234, "127.0.0.1"),
            bans,
        );
        let connection = connection_with_terminal(6);

        perform_login(&mut ctx, connection.clone(), login_request("tok", "Arkan"));

        let client = ctx.clients.get(&connection.id).unwrap();
        assert!(error_text(&queued_bytes(client))
            .starts_with("Your account has been permanently banned by GM Lena."));
    }

    #[test]
    fn test_full_world_puts_login_on_wait_list() {
        let world = TestWorld::new();
        world.set_online(900);
        let mut ctx = context(
            &world,
            TestSessions::with_session(5, 1234, "127.0.0.1"),
            TestBans::default(),
        );
        let connection = connection_with_terminal(7);

        perform_login(&mut ctx, connection.clone(), login_request("tok", "Arkan"));

        assert_eq!(connection.state(), ConnectionState::Close);
        let client = ctx.clients.get(&connection.id).unwrap();
        let bytes = queued_bytes(client);
        assert_eq!(bytes[0], 0x16);
        assert_eq!(*bytes.last().unwrap(), 5); // retry seconds
        assert_eq!(ctx.waitlist.len(), 1);
        // Never reached placement.
        assert!(world.placed_at().is_empty());
    }

    #[test]
    fn test_failed_placement_falls_back_to_temple_then_refuses() {
        let world = TestWorld::new();
        world.fail_placements(2);
        let mut ctx = context(
            &world,
            TestSessions::with_session(5, 1234, "127.0.0.1"),
            TestBans::default(),
        );
        let connection = connection_with_terminal(8);

        perform_login(&mut ctx, connection.clone(), login_request("tok", "Arkan"));

        assert_eq!(world.placed_at().len(), 2);
        let client = ctx.clients.get(&connection.id).unwrap();
        assert!(error_text(&queued_bytes(client)).contains("Temple position is wrong"));
    }

    #[test]
    fn test_one_player_per_account_gate() {
        let world = TestWorld::new();
        let online = StdArc::new(TestPlayer::new(999, otgate_core::Position::new(50, 50, 7)));
        world.register_online(online);

        let mut sessions = TestSessions::with_session(999, 1234, "127.0.0.1");
        sessions.preload_ok = true;
        let mut ctx = context(&world, sessions, TestBans::default());

        // The fresh player shares account 999 with the online one.
        let mut fresh = TestPlayer::new(1234, otgate_core::Position::new(60, 60, 7));
        fresh.account = otgate_core::AccountId::new(999);
        world.set_next_player(StdArc::new(fresh));

        let connection = connection_with_terminal(9);
        perform_login(&mut ctx, connection.clone(), login_request("tok", "Arkan"));

        let client = ctx.clients.get(&connection.id).unwrap();
        assert!(error_text(&queued_bytes(client)).contains("one character"));
    }

    #[test]
    fn test_date_formatting() {
        assert_eq!(format_date_short(0), "01/01/1970");
        assert_eq!(format_date_short(951_868_800), "01/03/2000");
    }
}
