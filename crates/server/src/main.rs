//! Gateway server binary
//!
//! Owns the two threads of the execution model: the main thread becomes the
//! I/O thread (a current-thread tokio runtime driving the accept loop and
//! every connection task), and one spawned thread runs the game dispatcher
//! loop. The network layer crosses into game logic only through
//! [`DispatcherSink`].
//!
//! The game façade wired here is the embedding seam. Standalone, the binary
//! runs as a maintenance-mode gateway: the handshake and wire protocol are
//! fully exercised while every admission is refused with "starting up"
//! until an engine provides real [`SessionStore`]/[`BanStore`]/[`GameWorld`]
//! implementations.

use std::net::IpAddr;
use std::sync::Arc;

use otgate_config::GatewayConfig;
use otgate_core::{
    AccountId, CharacterGuid, CreatureId, Direction, Dispatcher, DispatcherLoop, GameState,
    GatewayError, GuildEmblem, PartyShield, Position, Skull, WorldType,
};
use otgate_game::{
    handle_detach, handle_login, handle_packet, BanInfo, BanStore, CreatureView, GameContext,
    GameWorld, Player, SessionData, SessionStore, TileView, VipEntry,
};
use otgate_network::{Connection, GameSink, LoginRequest, Service, ServiceConfig};
use otgate_protocol::RsaDecryptor;

/// Posts network events onto the game thread, preserving arrival order.
struct DispatcherSink {
    dispatcher: Dispatcher<GameContext>,
}

impl GameSink for DispatcherSink {
    fn queue_login(&self, connection: Arc<Connection>, request: LoginRequest) {
        self.dispatcher
            .post(move |ctx| handle_login(ctx, connection, request));
    }

    fn queue_packet(&self, connection: Arc<Connection>, payload: Vec<u8>) {
        self.dispatcher
            .post(move |ctx| handle_packet(ctx, connection, payload));
    }

    fn queue_detach(&self, connection: Arc<Connection>) {
        self.dispatcher
            .post(move |ctx| handle_detach(ctx, connection));
    }
}

/// Stand-in player for the maintenance façade; never placed in a world.
struct OfflinePlayer {
    guid: CharacterGuid,
    account: AccountId,
}

impl Player for OfflinePlayer {
    fn id(&self) -> CreatureId {
        CreatureId::new(self.guid.get())
    }
    fn guid(&self) -> CharacterGuid {
        self.guid
    }
    fn account_id(&self) -> AccountId {
        self.account
    }
    fn name(&self) -> String {
        String::new()
    }
    fn level(&self) -> u16 {
        0
    }
    fn position(&self) -> Position {
        Position::new(0, 0, 7)
    }
    fn direction(&self) -> Direction {
        Direction::South
    }
    fn login_position(&self) -> Position {
        Position::new(0, 0, 7)
    }
    fn temple_position(&self) -> Position {
        Position::new(0, 0, 7)
    }
    fn is_premium(&self) -> bool {
        false
    }
    fn premium_end(&self) -> u32 {
        0
    }
    fn is_dead(&self) -> bool {
        false
    }
    fn is_removed(&self) -> bool {
        true
    }
    fn is_ghost(&self) -> bool {
        false
    }
    fn is_access_player(&self) -> bool {
        false
    }
    fn can_always_login(&self) -> bool {
        false
    }
    fn is_gamemaster_account(&self) -> bool {
        false
    }
    fn cannot_be_banned(&self) -> bool {
        false
    }
    fn can_see_creature(&self, _id: CreatureId) -> bool {
        false
    }
    fn can_walk_through(&self, _id: CreatureId) -> bool {
        false
    }
    fn skull_of(&self, _id: CreatureId) -> Skull {
        Skull::None
    }
    fn party_shield_of(&self, _id: CreatureId) -> PartyShield {
        PartyShield::None
    }
    fn guild_emblem_of(&self, _id: CreatureId) -> GuildEmblem {
        GuildEmblem::None
    }
    fn attach_connection(&self, _connection: &Arc<Connection>) {}
    fn clear_connection(&self) {}
    fn item_type_count(&self, _item_id: u16, _subtype: i8) -> u32 {
        0
    }
    fn all_item_counts(&self) -> Vec<(u16, u32)> {
        Vec::new()
    }
}

/// Maintenance façade: no sessions, no bans, a world that is forever
/// starting up. Replaced wholesale by the embedding engine.
struct MaintenanceFacade;

impl SessionStore for MaintenanceFacade {
    fn load_session(&self, _token: &str, _character_name: &str) -> Option<SessionData> {
        None
    }
    fn preload_player(&self, _player: &Arc<dyn Player>) -> bool {
        false
    }
    fn load_player_by_id(&self, _player: &Arc<dyn Player>, _guid: CharacterGuid) -> bool {
        false
    }
    fn vip_entries(&self, _account: AccountId) -> Vec<VipEntry> {
        Vec::new()
    }
}

impl BanStore for MaintenanceFacade {
    fn ip_ban(&self, _ip: IpAddr) -> Option<BanInfo> {
        None
    }
    fn account_ban(&self, _account: AccountId) -> Option<BanInfo> {
        None
    }
    fn is_namelocked(&self, _guid: CharacterGuid) -> bool {
        false
    }
}

impl GameWorld for MaintenanceFacade {
    fn game_state(&self) -> GameState {
        GameState::Startup
    }
    fn world_type(&self) -> WorldType {
        WorldType::Pvp
    }
    fn players_online(&self) -> u32 {
        0
    }
    fn creature(&self, _id: CreatureId) -> Option<CreatureView> {
        None
    }
    fn tile_at(&self, _pos: Position) -> Option<TileView> {
        None
    }
    fn player_by_guid(&self, _guid: CharacterGuid) -> Option<Arc<dyn Player>> {
        None
    }
    fn player_by_account(&self, _account: AccountId) -> Option<Arc<dyn Player>> {
        None
    }
    fn create_player(&self, guid: CharacterGuid, account: AccountId) -> Arc<dyn Player> {
        Arc::new(OfflinePlayer { guid, account })
    }
    fn place_creature(&self, _player: &Arc<dyn Player>, _pos: Position, _forced: bool) -> bool {
        false
    }
    fn remove_creature(&self, _player: &Arc<dyn Player>) {}
    fn release_creature(&self, _player: &Arc<dyn Player>) {}
}

/// The RSA key file holds the modulus and private exponent as two decimal
/// lines. Key generation and distribution are the operator's business.
fn load_rsa_key(path: &str) -> Result<RsaDecryptor, GatewayError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| GatewayError::Config(format!("failed to read {path}: {e}")))?;
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let n = lines
        .next()
        .ok_or_else(|| GatewayError::Config(format!("{path}: missing modulus line")))?;
    let d = lines
        .next()
        .ok_or_else(|| GatewayError::Config(format!("{path}: missing exponent line")))?;
    RsaDecryptor::from_decimal(n, d)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let config = match GatewayConfig::load_from_file("config.txt") {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("{}; using default configuration", e);
            GatewayConfig::default()
        }
    };
    tracing::info!(
        "world {:?}, game port {}, capacity {}",
        config.server_name,
        config.game_port,
        config.max_players
    );

    let rsa = load_rsa_key("key.txt")?;

    let (dispatcher, dispatcher_loop) = DispatcherLoop::<GameContext>::new();

    // Game thread: owns all mutable game-side state for its lifetime.
    let game_config = config.clone();
    let game_thread = std::thread::Builder::new()
        .name("game".into())
        .spawn(move || {
            let mut ctx = GameContext::new(
                game_config,
                Box::new(MaintenanceFacade),
                Box::new(MaintenanceFacade),
                Box::new(MaintenanceFacade),
            );
            dispatcher_loop.run(&mut ctx);
        })?;

    // I/O thread: a current-thread runtime drives every socket and timer.
    let service = Service::new(
        ServiceConfig {
            bind_address: config.bind_address(),
            world_name: config.server_name.clone(),
            max_packets_per_second: config.max_packets_per_second,
        },
        rsa,
        Arc::new(DispatcherSink { dispatcher }),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(service.run())?;
    drop(runtime);

    // With the service gone the last dispatcher handle is dropped and the
    // game thread drains out.
    drop(service);
    if game_thread.join().is_err() {
        tracing::error!("game thread panicked during shutdown");
    }
    Ok(())
}
