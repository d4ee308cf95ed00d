//! Shared test doubles for the game crate

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::net::IpAddr;
use std::rc::Rc;
use std::sync::{Arc, Mutex, Weak};

use otgate_core::{
    AccountId, CharacterGuid, CreatureId, CreatureKind, Direction, GameState, GuildEmblem,
    LightInfo, Outfit, PartyShield, Position, Skull, SpeechBubble, WorldType,
};
use otgate_network::Connection;

use crate::client::ClientState;
use crate::context::GameContext;
use crate::facade::*;

pub fn test_connection(id: u64) -> Arc<Connection> {
    Arc::new(Connection::new(id, "127.0.0.1:50000".parse().unwrap()))
}

/// Drain and concatenate everything queued on a client's connection.
pub fn queued_bytes(client: &ClientState) -> Vec<u8> {
    let mut bytes = Vec::new();
    while let Some(msg) = client.connection.pop_output() {
        bytes.extend_from_slice(msg.output());
    }
    bytes
}

pub fn creature_at(id: u32, pos: Position) -> CreatureView {
    CreatureView {
        id: CreatureId::new(id),
        name: format!("creature-{id}"),
        kind: CreatureKind::Monster,
        master: None,
        position: pos,
        removed: false,
        health_percent: 100,
        health_hidden: false,
        direction: Direction::South,
        outfit: Outfit {
            look_type: 130,
            ..Outfit::default()
        },
        ghost: false,
        light: LightInfo::default(),
        step_speed: 220,
        icons: Vec::new(),
        speech_bubble: SpeechBubble::None,
        vocation_client_id: 0,
        player_level: 0,
    }
}

pub struct TestPlayer {
    pub id: CreatureId,
    pub guid: CharacterGuid,
    pub account: AccountId,
    pub name: String,
    pub level: u16,
    pub position: Mutex<Position>,
    pub direction: Direction,
    pub login_position: Position,
    pub temple_position: Position,
    pub premium: bool,
    pub dead: bool,
    pub removed: bool,
    pub ghost: bool,
    pub access: bool,
    pub always_login: bool,
    pub gm_account: bool,
    pub unbannable: bool,
    pub item_counts: Vec<(u16, u32)>,
    pub connection: Mutex<Option<Weak<Connection>>>,
}

impl TestPlayer {
    pub fn new(id: u32, pos: Position) -> Self {
        Self {
            id: CreatureId::new(id),
            guid: CharacterGuid::new(id),
            account: AccountId::new(id),
            name: format!("player-{id}"),
            level: 20,
            position: Mutex::new(pos),
            direction: Direction::South,
            login_position: pos,
            temple_position: pos,
            premium: false,
            dead: false,
            removed: false,
            ghost: false,
            access: false,
            always_login: false,
            gm_account: false,
            unbannable: false,
            item_counts: Vec::new(),
            connection: Mutex::new(None),
        }
    }

    pub fn connection_attached(&self) -> bool {
        self.connection.lock().unwrap().is_some()
    }
}

impl Player for TestPlayer {
    fn id(&self) -> CreatureId {
        self.id
    }
    fn guid(&self) -> CharacterGuid {
        self.guid
    }
    fn account_id(&self) -> AccountId {
        self.account
    }
    fn name(&self) -> String {
        self.name.clone()
    }
    fn level(&self) -> u16 {
        self.level
    }
    fn position(&self) -> Position {
        *self.position.lock().unwrap()
    }
    fn direction(&self) -> Direction {
        self.direction
    }
    fn login_position(&self) -> Position {
        self.login_position
    }
    fn temple_position(&self) -> Position {
        self.temple_position
    }
    fn is_premium(&self) -> bool {
        self.premium
    }
    fn premium_end(&self) -> u32 {
        0
    }
    fn is_dead(&self) -> bool {
        self.dead
    }
    fn is_removed(&self) -> bool {
        self.removed
    }
    fn is_ghost(&self) -> bool {
        self.ghost
    }
    fn is_access_player(&self) -> bool {
        self.access
    }
    fn can_always_login(&self) -> bool {
        self.always_login
    }
    fn is_gamemaster_account(&self) -> bool {
        self.gm_account
    }
    fn cannot_be_banned(&self) -> bool {
        self.unbannable
    }
    fn can_see_creature(&self, _id: CreatureId) -> bool {
        true
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
    fn attach_connection(&self, connection: &Arc<Connection>) {
        *self.connection.lock().unwrap() = Some(Arc::downgrade(connection));
    }
    fn clear_connection(&self) {
        *self.connection.lock().unwrap() = None;
    }
    fn item_type_count(&self, item_id: u16, _subtype: i8) -> u32 {
        self.item_counts
            .iter()
            .find(|(id, _)| *id == item_id)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
    fn all_item_counts(&self) -> Vec<(u16, u32)> {
        self.item_counts.clone()
    }
}

#[derive(Default)]
struct TestWorldInner {
    tiles: RefCell<HashMap<Position, TileView>>,
    creatures: RefCell<HashMap<u32, CreatureView>>,
    tile_queries: RefCell<Vec<i32>>,
    ops: RefCell<Vec<String>>,
    state: Cell<Option<GameState>>,
    online: Cell<u32>,
    players_by_guid: RefCell<HashMap<u32, Arc<dyn Player>>>,
    players_by_account: RefCell<HashMap<u32, Arc<dyn Player>>>,
    next_player: RefCell<Option<Arc<TestPlayer>>>,
    created_player: RefCell<Option<Arc<TestPlayer>>>,
    place_fails: Cell<u32>,
    placed_at: RefCell<Vec<Position>>,
    released: Cell<u32>,
    removed: Cell<u32>,
    effects: RefCell<Vec<(Position, u8)>>,
    logout_check: Cell<Option<LogoutCheck>>,
    next_client_id: Cell<u32>,
}

#[derive(Clone, Default)]
pub struct TestWorld(Rc<TestWorldInner>);

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_with_player(&self, pos: Position) -> ClientState {
        let id = self.0.next_client_id.get() + 1;
        self.0.next_client_id.set(id);
        let connection = test_connection(u64::from(id));
        let mut client = ClientState::new(connection);
        client.player = Some(Arc::new(TestPlayer::new(1_000_000 + id, pos)));
        client
    }

    pub fn insert_tile(&self, pos: Position, tile: TileView) {
        self.0.tiles.borrow_mut().insert(pos, tile);
    }

    pub fn insert_creature(&self, view: CreatureView) {
        self.0.creatures.borrow_mut().insert(view.id.get(), view);
    }

    /// Z layers touched by tile queries, consecutive runs collapsed.
    pub fn queried_layers(&self) -> Vec<i32> {
        let mut layers = self.0.tile_queries.borrow().clone();
        layers.dedup();
        layers
    }

    pub fn ops(&self) -> Vec<String> {
        self.0.ops.borrow().clone()
    }

    fn record(&self, op: String) {
        self.0.ops.borrow_mut().push(op);
    }

    pub fn set_state(&self, state: GameState) {
        self.0.state.set(Some(state));
    }

    pub fn set_online(&self, online: u32) {
        self.0.online.set(online);
    }

    pub fn set_next_player(&self, player: Arc<TestPlayer>) {
        *self.0.next_player.borrow_mut() = Some(player);
    }

    pub fn created_player(&self) -> Option<Arc<TestPlayer>> {
        self.0.created_player.borrow().clone()
    }

    pub fn register_online(&self, player: Arc<TestPlayer>) {
        self.0
            .players_by_guid
            .borrow_mut()
            .insert(player.guid.get(), player.clone());
        self.0
            .players_by_account
            .borrow_mut()
            .insert(player.account.get(), player);
    }

    /// Make the next `n` placement attempts fail.
    pub fn fail_placements(&self, n: u32) {
        self.0.place_fails.set(n);
    }

    pub fn placed_at(&self) -> Vec<Position> {
        self.0.placed_at.borrow().clone()
    }

    pub fn released_count(&self) -> u32 {
        self.0.released.get()
    }

    pub fn removed_count(&self) -> u32 {
        self.0.removed.get()
    }

    pub fn effects(&self) -> Vec<(Position, u8)> {
        self.0.effects.borrow().clone()
    }

    pub fn set_logout_check(&self, check: LogoutCheck) {
        self.0.logout_check.set(Some(check));
    }
}

impl GameWorld for TestWorld {
    fn game_state(&self) -> GameState {
        self.0.state.get().unwrap_or(GameState::Normal)
    }
    fn world_type(&self) -> WorldType {
        WorldType::Pvp
    }
    fn players_online(&self) -> u32 {
        self.0.online.get()
    }
    fn creature(&self, id: CreatureId) -> Option<CreatureView> {
        self.0.creatures.borrow().get(&id.get()).cloned()
    }
    fn tile_at(&self, pos: Position) -> Option<TileView> {
        self.0.tile_queries.borrow_mut().push(pos.z as i32);
        self.0.tiles.borrow().get(&pos).cloned()
    }
    fn player_by_guid(&self, guid: CharacterGuid) -> Option<Arc<dyn Player>> {
        self.0.players_by_guid.borrow().get(&guid.get()).cloned()
    }
    fn player_by_account(&self, account: AccountId) -> Option<Arc<dyn Player>> {
        self.0
            .players_by_account
            .borrow()
            .get(&account.get())
            .cloned()
    }
    fn create_player(&self, guid: CharacterGuid, account: AccountId) -> Arc<dyn Player> {
        let player = self.0.next_player.borrow_mut().take().unwrap_or_else(|| {
            let mut player = TestPlayer::new(guid.get(), Position::new(100, 100, 7));
            player.account = account;
            Arc::new(player)
        });
        *self.0.created_player.borrow_mut() = Some(player.clone());
        player
    }
    fn place_creature(&self, _player: &Arc<dyn Player>, pos: Position, _forced: bool) -> bool {
        self.0.placed_at.borrow_mut().push(pos);
        if self.0.place_fails.get() > 0 {
            self.0.place_fails.set(self.0.place_fails.get() - 1);
            return false;
        }
        true
    }
    fn remove_creature(&self, _player: &Arc<dyn Player>) {
        self.0.removed.set(self.0.removed.get() + 1);
    }
    fn release_creature(&self, _player: &Arc<dyn Player>) {
        self.0.released.set(self.0.released.get() + 1);
    }
    fn register_creature_event(&self, _player: &Arc<dyn Player>, event: &str) {
        self.record(format!("register_event {event}"));
    }
    fn stamp_login(&self, _player: &Arc<dyn Player>, ip: IpAddr) {
        self.record(format!("stamp_login {ip}"));
    }
    fn logout_check(&self, _player: &Arc<dyn Player>) -> LogoutCheck {
        self.0.logout_check.get().unwrap_or(LogoutCheck::Allowed)
    }
    fn add_magic_effect(&self, pos: Position, effect: u8) {
        self.0.effects.borrow_mut().push((pos, effect));
    }

    fn receive_ping(&self, _player: &Arc<dyn Player>) {
        self.record("ping".into());
    }
    fn receive_ping_back(&self, _player: &Arc<dyn Player>) {
        self.record("ping_back".into());
    }
    fn walk(&self, _player: &Arc<dyn Player>, direction: Direction) {
        self.record(format!("walk {direction:?}"));
    }
    fn auto_walk(&self, _player: &Arc<dyn Player>, path: Vec<Direction>) {
        self.record(format!("auto_walk {path:?}"));
    }
    fn turn(&self, _player: &Arc<dyn Player>, direction: Direction) {
        self.record(format!("turn {direction:?}"));
    }
    fn say(&self, _player: &Arc<dyn Player>, channel_id: u16, kind: u8, receiver: String, text: String) {
        self.record(format!("say ch={channel_id} kind={kind} to={receiver:?} {text:?}"));
    }
    fn use_item(&self, _player: &Arc<dyn Player>, pos: Position, stackpos: u8, index: u8, sprite_id: u16) {
        self.record(format!("use_item {pos} stack={stackpos} index={index} sprite={sprite_id}"));
    }
    fn attack(&self, _player: &Arc<dyn Player>, creature: CreatureId) {
        self.record(format!("attack {}", creature.get()));
    }
    fn set_fight_modes(&self, _player: &Arc<dyn Player>, modes: FightModes) {
        self.record(format!(
            "fight_modes fight={} chase={} secure={}",
            modes.fight, modes.chase, modes.secure
        ));
    }
    fn market_browse(&self, _player: &Arc<dyn Player>, sprite_id: u16) {
        self.record(format!("market_browse {sprite_id}"));
    }
    fn market_browse_own_offers(&self, _player: &Arc<dyn Player>) {
        self.record("market_browse_own_offers".into());
    }
    fn move_thing(
        &self,
        _player: &Arc<dyn Player>,
        from: Position,
        sprite_id: u16,
        from_stackpos: u8,
        to: Position,
        count: u8,
    ) {
        self.record(format!(
            "move_thing {from} -> {to} sprite={sprite_id} stack={from_stackpos} count={count}"
        ));
    }
    fn unhandled_command(&self, _player: &Arc<dyn Player>, opcode: u8, payload: &[u8]) {
        self.record(format!("unhandled {opcode:#04x} len={}", payload.len()));
    }
}

pub struct TestSessions {
    pub session: Option<SessionData>,
    pub preload_ok: bool,
    pub load_ok: bool,
    pub vips: Vec<VipEntry>,
}

impl Default for TestSessions {
    fn default() -> Self {
        Self {
            session: None,
            preload_ok: true,
            load_ok: true,
            vips: Vec::new(),
        }
    }
}

impl TestSessions {
    pub fn with_session(account: u32, character: u32, bound_ip: &str) -> Self {
        Self {
            session: Some(SessionData {
                account_id: AccountId::new(account),
                character_id: CharacterGuid::new(character),
                bound_ip: bound_ip.parse().unwrap(),
            }),
            ..Self::default()
        }
    }
}

impl SessionStore for TestSessions {
    fn load_session(&self, _token: &str, _character_name: &str) -> Option<SessionData> {
        self.session.clone()
    }
    fn preload_player(&self, _player: &Arc<dyn Player>) -> bool {
        self.preload_ok
    }
    fn load_player_by_id(&self, _player: &Arc<dyn Player>, _guid: CharacterGuid) -> bool {
        self.load_ok
    }
    fn vip_entries(&self, _account: AccountId) -> Vec<VipEntry> {
        self.vips.clone()
    }
}

#[derive(Default)]
pub struct TestBans {
    pub ip: Option<BanInfo>,
    pub account: Option<BanInfo>,
    pub namelocked: bool,
}

impl BanStore for TestBans {
    fn ip_ban(&self, _ip: IpAddr) -> Option<BanInfo> {
        self.ip.clone()
    }
    fn account_ban(&self, _account: AccountId) -> Option<BanInfo> {
        self.account.clone()
    }
    fn is_namelocked(&self, _guid: CharacterGuid) -> bool {
        self.namelocked
    }
}

pub fn context(world: &TestWorld, sessions: TestSessions, bans: TestBans) -> GameContext {
    GameContext::new(
        otgate_config::GatewayConfig::default(),
        Box::new(sessions),
        Box::new(bans),
        Box::new(world.clone()),
    )
}
