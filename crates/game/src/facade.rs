//! Game façade
//!
//! The gateway consumes the game engine through these traits. They replace
//! ambient singletons with explicit context: the server constructs one
//! implementation of each at startup and the game thread holds them for its
//! lifetime. All methods are called on the game thread only.
//!
//! Snapshot types ([`CreatureView`], [`TileView`], value structs for shop,
//! market, chat and outfit data) carry fully resolved client-facing values;
//! the outbound builders write exactly what they are handed.

use std::net::IpAddr;
use std::sync::Arc;

use otgate_core::{
    AccountId, CharacterGuid, CreatureId, CreatureKind, Direction, GameState, GuildEmblem,
    LightInfo, Outfit, PartyShield, Position, Skull, SpeechBubble, WorldType,
};
use otgate_network::Connection;
use otgate_protocol::NetworkMessage;

/// Session record resolved from a login token.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub account_id: AccountId,
    pub character_id: CharacterGuid,
    /// The address the session was established from; logins from any other
    /// address are refused.
    pub bound_ip: IpAddr,
}

/// The session/account store behind the login portal.
pub trait SessionStore {
    fn load_session(&self, token: &str, character_name: &str) -> Option<SessionData>;

    /// Fill the lightweight part of a freshly created player (name, account
    /// standing, premium state). Enough for the admission checks.
    fn preload_player(&self, player: &Arc<dyn Player>) -> bool;

    /// Load the full character before placement.
    fn load_player_by_id(&self, player: &Arc<dyn Player>, guid: CharacterGuid) -> bool;

    fn vip_entries(&self, account: AccountId) -> Vec<VipEntry>;
}

/// Ban record; `expires_at == 0` means permanent.
#[derive(Debug, Clone)]
pub struct BanInfo {
    pub reason: String,
    pub banned_by: String,
    pub expires_at: i64,
}

pub trait BanStore {
    fn ip_ban(&self, ip: IpAddr) -> Option<BanInfo>;
    fn account_ban(&self, account: AccountId) -> Option<BanInfo>;
    fn is_namelocked(&self, guid: CharacterGuid) -> bool;
}

/// Why a voluntary logout was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutCheck {
    Allowed,
    /// Standing on a no-logout tile.
    NoLogoutHere,
    /// In fight and outside a protection zone.
    InFight,
    /// A scripted hook refused and already told the player why.
    Denied,
}

/// A player admitted (or being admitted) to the world. The engine owns the
/// registry entry; the gateway holds joint ownership until detach. The
/// back-pointer set through [`attach_connection`] must be non-owning.
///
/// [`attach_connection`]: Player::attach_connection
pub trait Player: Send + Sync {
    fn id(&self) -> CreatureId;
    fn guid(&self) -> CharacterGuid;
    fn account_id(&self) -> AccountId;
    fn name(&self) -> String;
    fn level(&self) -> u16;
    fn position(&self) -> Position;
    fn direction(&self) -> Direction;
    fn login_position(&self) -> Position;
    fn temple_position(&self) -> Position;

    fn is_premium(&self) -> bool;
    fn premium_end(&self) -> u32;
    fn is_dead(&self) -> bool;
    fn is_removed(&self) -> bool;
    fn is_ghost(&self) -> bool;
    /// Staff with full map sight (full light, walkthrough everything).
    fn is_access_player(&self) -> bool;
    fn can_always_login(&self) -> bool;
    /// Account standing at or above gamemaster.
    fn is_gamemaster_account(&self) -> bool;
    fn cannot_be_banned(&self) -> bool;

    /// Game-side visibility judgement (ghost mode, invisibility).
    fn can_see_creature(&self, id: CreatureId) -> bool;
    fn can_walk_through(&self, id: CreatureId) -> bool;
    /// Observer-relative creature annotations.
    fn skull_of(&self, id: CreatureId) -> Skull;
    fn party_shield_of(&self, id: CreatureId) -> PartyShield;
    fn guild_emblem_of(&self, id: CreatureId) -> GuildEmblem;

    /// Install the non-owning back-pointer to the session.
    fn attach_connection(&self, connection: &Arc<Connection>);
    /// Clear it again; [`crate::client::detach`] is the only caller.
    fn clear_connection(&self);

    /// Carried item count for one item type; `subtype < 0` matches any.
    fn item_type_count(&self, item_id: u16, subtype: i8) -> u32;
    /// Cached (item id, count) table of everything carried, sorted by id.
    fn all_item_counts(&self) -> Vec<(u16, u32)>;
}

/// Per-creature snapshot for the viewport and creature builders.
/// Observer-relative fields (skull, shield, emblem, walkthrough) are asked
/// of the observing [`Player`] instead.
#[derive(Debug, Clone)]
pub struct CreatureView {
    pub id: CreatureId,
    pub name: String,
    pub kind: CreatureKind,
    /// Owning player id when this is a player's summon.
    pub master: Option<CreatureId>,
    pub position: Position,
    pub removed: bool,
    pub health_percent: u8,
    pub health_hidden: bool,
    pub direction: Direction,
    pub outfit: Outfit,
    /// Ghost mode or invisibility; observers see a zeroed outfit.
    pub ghost: bool,
    pub light: LightInfo,
    pub step_speed: u16,
    pub icons: Vec<CreatureIcon>,
    pub speech_bubble: SpeechBubble,
    /// Client vocation id, players only.
    pub vocation_client_id: u8,
    /// Character level, players only; speak packets carry it.
    pub player_level: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct CreatureIcon {
    pub icon: u8,
    /// 1 for monster-special icons, 0 otherwise.
    pub category: u8,
    pub value: u16,
}

/// A fully client-resolved item reference: `count` is present for stackable
/// items (their count) and splash/fluid containers (the client fluid byte).
#[derive(Debug, Clone, Copy)]
pub struct ItemView {
    pub client_id: u16,
    pub count: Option<u8>,
}

impl ItemView {
    pub fn encode(&self, msg: &mut NetworkMessage) {
        msg.add_u16(self.client_id);
        if let Some(count) = self.count {
            msg.add_byte(count);
        }
    }
}

/// One tile, stack-ordered the way the client renders it.
#[derive(Debug, Clone, Default)]
pub struct TileView {
    pub ground: Option<ItemView>,
    pub top_items: Vec<ItemView>,
    /// Bottom-to-top; the description emits them in reverse.
    pub creatures: Vec<CreatureId>,
    pub down_items: Vec<ItemView>,
}

/// One open container page, already resolved for the wire.
#[derive(Debug, Clone)]
pub struct ContainerView {
    /// The container item itself (a bag stand-in for browse-field views).
    pub item: ItemView,
    pub name: String,
    pub capacity: u8,
    pub has_parent: bool,
    pub is_unlocked: bool,
    pub has_pagination: bool,
    /// Total item count across all pages.
    pub size: u16,
    pub first_index: u16,
    /// The visible page, at most one capacity's worth.
    pub items: Vec<ItemView>,
}

/// Readable or writable item text window.
#[derive(Debug, Clone)]
pub struct TextWindowView {
    pub window_id: u32,
    pub item: ItemView,
    pub text: String,
    /// Present when the client may edit the text.
    pub max_length: Option<u16>,
    pub writer: String,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct VipEntry {
    pub guid: CharacterGuid,
    pub name: String,
    pub description: String,
    pub icon: u32,
    pub notify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VipStatus {
    Offline = 0,
    Online = 1,
    Pending = 2,
}

/// Shop catalog entry, resolved for the wire.
#[derive(Debug, Clone)]
pub struct ShopEntry {
    pub item_id: u16,
    pub client_id: u16,
    pub name: String,
    pub weight: u32,
    pub buy_price: u32,
    pub sell_price: u32,
    pub subtype: u8,
    /// Non-stackable item type with meaningful subtypes.
    pub has_subtype: bool,
    /// Client fluid byte for splash/fluid containers.
    pub fluid_subtype: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct MarketOffer {
    pub timestamp: u32,
    pub counter: u16,
    pub item_client_id: u16,
    pub has_tier: bool,
    pub amount: u16,
    pub price: u64,
    pub player_name: String,
}

#[derive(Debug, Clone)]
pub struct MarketOfferEx {
    pub offer: MarketOffer,
    pub is_buy: bool,
}

#[derive(Debug, Clone)]
pub struct HistoryMarketOffer {
    pub timestamp: u32,
    pub item_client_id: u16,
    pub has_tier: bool,
    pub amount: u16,
    pub price: u64,
    pub state: u8,
}

/// Depot stock aggregated by ware id for the market enter packet.
#[derive(Debug, Clone, Copy)]
pub struct DepotWare {
    pub ware_id: u16,
    pub has_tier: bool,
    pub count: u16,
}

#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: u16,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ChannelDetails {
    pub id: u16,
    pub name: String,
    pub users: Option<Vec<String>>,
    pub invited: Option<Vec<String>>,
}

/// Server text message. The wire form depends on the class byte; the
/// variants carry the class-specific extras.
#[derive(Debug, Clone)]
pub struct TextMessage {
    pub kind: u8,
    pub text: String,
    pub effect: MessageEffect,
}

#[derive(Debug, Clone)]
pub enum MessageEffect {
    None,
    /// Damage classes: two value/color pairs at a position.
    Damage {
        position: Position,
        primary: (u32, u8),
        secondary: (u32, u8),
    },
    /// Heal/experience classes: one value/color pair at a position.
    Value {
        position: Position,
        value: u32,
        color: u8,
    },
    /// Guild/party classes route through a channel id.
    Channel { channel_id: u16 },
}

#[derive(Debug, Clone)]
pub struct ModalWindow {
    pub id: u32,
    pub title: String,
    pub message: String,
    pub buttons: Vec<(String, u8)>,
    pub choices: Vec<(String, u8)>,
    pub default_escape_button: u8,
    pub default_enter_button: u8,
    pub priority: bool,
}

#[derive(Debug, Clone)]
pub struct OutfitChoice {
    pub look_type: u16,
    pub name: String,
    pub addons: u8,
}

#[derive(Debug, Clone)]
pub struct MountChoice {
    pub client_id: u16,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct OutfitWindow {
    pub current: Outfit,
    pub mounted: bool,
    pub randomize_mount: bool,
    pub outfits: Vec<OutfitChoice>,
    pub mounts: Vec<MountChoice>,
}

#[derive(Debug, Clone)]
pub struct PodiumWindow {
    pub outfit: Outfit,
    pub outfits: Vec<OutfitChoice>,
    pub mounts: Vec<MountChoice>,
    pub position: Position,
    pub item_client_id: u16,
    pub stackpos: u8,
    pub show_mount: bool,
    pub show_platform: bool,
    pub direction: Direction,
}

/// Player stat block for the stats packet.
#[derive(Debug, Clone, Default)]
pub struct PlayerStats {
    pub health: u32,
    pub max_health: u32,
    pub free_capacity: u32,
    pub experience: u64,
    pub level: u16,
    pub level_percent: u8,
    pub exp_display: u16,
    pub lowlevel_bonus_display: u16,
    pub stamina_bonus_display: u16,
    pub mana: u32,
    pub max_mana: u32,
    pub soul: u8,
    pub stamina_minutes: u16,
    pub base_speed: u16,
    pub regeneration_seconds: u16,
    pub offline_training_minutes: u16,
    pub mana_shield: u32,
    pub max_mana_shield: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SkillRow {
    pub level: u16,
    pub base: u16,
    pub percent: u16,
}

/// Magic level, the seven standard skills, the five special skills and the
/// capacity pair, as the skills packet wants them.
#[derive(Debug, Clone, Default)]
pub struct PlayerSkills {
    pub magic: SkillRow,
    pub skills: [SkillRow; 7],
    pub special: [u16; 5],
    pub capacity: u32,
    pub base_capacity: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FightModes {
    pub fight: u8,
    pub chase: u8,
    pub secure: u8,
}

/// Combat analyzer impact direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerImpact {
    Received = 0,
    Dealt = 1,
}

/// The game engine and its per-opcode player operations. Query methods must
/// be implemented; operation methods default to no-ops so embedders wire up
/// only what their engine supports.
#[allow(unused_variables)]
pub trait GameWorld {
    // ---- engine queries -------------------------------------------------
    fn game_state(&self) -> GameState;
    fn world_type(&self) -> WorldType;
    fn players_online(&self) -> u32;
    fn creature(&self, id: CreatureId) -> Option<CreatureView>;
    fn tile_at(&self, pos: Position) -> Option<TileView>;
    fn player_by_guid(&self, guid: CharacterGuid) -> Option<Arc<dyn Player>>;
    fn player_by_account(&self, account: AccountId) -> Option<Arc<dyn Player>>;

    // ---- engine operations ----------------------------------------------
    /// Register a new player object for the character; admission fills it
    /// through the session store afterwards.
    fn create_player(&self, guid: CharacterGuid, account: AccountId) -> Arc<dyn Player>;
    fn place_creature(&self, player: &Arc<dyn Player>, pos: Position, forced: bool) -> bool;
    fn remove_creature(&self, player: &Arc<dyn Player>);
    /// Drop the creature registry's interest in a detached player.
    fn release_creature(&self, player: &Arc<dyn Player>);
    fn register_creature_event(&self, player: &Arc<dyn Player>, event: &str) {}
    /// Persist last-login time and address on admission.
    fn stamp_login(&self, player: &Arc<dyn Player>, ip: IpAddr) {}
    fn logout_check(&self, player: &Arc<dyn Player>) -> LogoutCheck {
        LogoutCheck::Allowed
    }
    /// Broadcast a magic effect to every observer of `pos`.
    fn add_magic_effect(&self, pos: Position, effect: u8) {}

    // ---- player operations, one per inbound opcode ----------------------
    fn receive_ping(&self, player: &Arc<dyn Player>) {}
    fn receive_ping_back(&self, player: &Arc<dyn Player>) {}
    fn extended_opcode(&self, player: &Arc<dyn Player>, opcode: u8, buffer: String) {}
    fn walk(&self, player: &Arc<dyn Player>, direction: Direction) {}
    fn auto_walk(&self, player: &Arc<dyn Player>, path: Vec<Direction>) {}
    fn stop_auto_walk(&self, player: &Arc<dyn Player>) {}
    fn turn(&self, player: &Arc<dyn Player>, direction: Direction) {}
    fn equip_object(&self, player: &Arc<dyn Player>, sprite_id: u16) {}
    fn move_thing(
        &self,
        player: &Arc<dyn Player>,
        from: Position,
        sprite_id: u16,
        from_stackpos: u8,
        to: Position,
        count: u8,
    ) {
    }
    fn look_in_shop(&self, player: &Arc<dyn Player>, item_id: u16, count: u8) {}
    fn purchase_item(
        &self,
        player: &Arc<dyn Player>,
        item_id: u16,
        count: u8,
        amount: u16,
        ignore_cap: bool,
        in_backpacks: bool,
    ) {
    }
    fn sell_item(
        &self,
        player: &Arc<dyn Player>,
        item_id: u16,
        count: u8,
        amount: u16,
        ignore_equipped: bool,
    ) {
    }
    fn close_shop(&self, player: &Arc<dyn Player>) {}
    fn request_trade(
        &self,
        player: &Arc<dyn Player>,
        pos: Position,
        stackpos: u8,
        partner: CreatureId,
        sprite_id: u16,
    ) {
    }
    fn look_in_trade(&self, player: &Arc<dyn Player>, counter_offer: bool, index: u8) {}
    fn accept_trade(&self, player: &Arc<dyn Player>) {}
    fn close_trade(&self, player: &Arc<dyn Player>) {}
    fn use_item(&self, player: &Arc<dyn Player>, pos: Position, stackpos: u8, index: u8, sprite_id: u16) {
    }
    fn use_item_ex(
        &self,
        player: &Arc<dyn Player>,
        from: Position,
        from_stackpos: u8,
        from_sprite_id: u16,
        to: Position,
        to_stackpos: u8,
        to_sprite_id: u16,
    ) {
    }
    fn use_with_creature(
        &self,
        player: &Arc<dyn Player>,
        from: Position,
        from_stackpos: u8,
        creature: CreatureId,
        sprite_id: u16,
    ) {
    }
    fn rotate_item(&self, player: &Arc<dyn Player>, pos: Position, stackpos: u8, sprite_id: u16) {}
    fn request_edit_podium(&self, player: &Arc<dyn Player>, pos: Position, stackpos: u8, sprite_id: u16) {
    }
    fn close_container(&self, player: &Arc<dyn Player>, container_id: u8) {}
    fn move_up_container(&self, player: &Arc<dyn Player>, container_id: u8) {}
    fn write_item(&self, player: &Arc<dyn Player>, window_id: u32, text: String) {}
    fn update_house_window(&self, player: &Arc<dyn Player>, door_id: u8, window_id: u32, text: String) {
    }
    fn wrap_item(&self, player: &Arc<dyn Player>, pos: Position, stackpos: u8, sprite_id: u16) {}
    fn look_at(&self, player: &Arc<dyn Player>, pos: Position, stackpos: u8) {}
    fn look_in_battle_list(&self, player: &Arc<dyn Player>, creature: CreatureId) {}
    fn quick_loot(
        &self,
        player: &Arc<dyn Player>,
        pos: Position,
        stackpos: u8,
        sprite_id: u16,
        loot_all_corpses: bool,
    ) {
    }
    fn say(
        &self,
        player: &Arc<dyn Player>,
        channel_id: u16,
        kind: u8,
        receiver: String,
        text: String,
    ) {
    }
    fn request_channels(&self, player: &Arc<dyn Player>) {}
    fn open_channel(&self, player: &Arc<dyn Player>, channel_id: u16) {}
    fn close_channel(&self, player: &Arc<dyn Player>, channel_id: u16) {}
    fn open_private_channel(&self, player: &Arc<dyn Player>, receiver: String) {}
    fn close_npc_channel(&self, player: &Arc<dyn Player>) {}
    fn set_fight_modes(&self, player: &Arc<dyn Player>, modes: FightModes) {}
    fn attack(&self, player: &Arc<dyn Player>, creature: CreatureId) {}
    fn follow(&self, player: &Arc<dyn Player>, creature: CreatureId) {}
    fn invite_to_party(&self, player: &Arc<dyn Player>, target: CreatureId) {}
    fn join_party(&self, player: &Arc<dyn Player>, target: CreatureId) {}
    fn revoke_party_invite(&self, player: &Arc<dyn Player>, target: CreatureId) {}
    fn pass_party_leadership(&self, player: &Arc<dyn Player>, target: CreatureId) {}
    fn leave_party(&self, player: &Arc<dyn Player>) {}
    fn enable_shared_party_experience(&self, player: &Arc<dyn Player>, active: bool) {}
    fn create_private_channel(&self, player: &Arc<dyn Player>) {}
    fn channel_invite(&self, player: &Arc<dyn Player>, name: String) {}
    fn channel_exclude(&self, player: &Arc<dyn Player>, name: String) {}
    fn cancel_attack_and_follow(&self, player: &Arc<dyn Player>) {}
    fn update_container(&self, player: &Arc<dyn Player>, container_id: u8) {}
    fn browse_field(&self, player: &Arc<dyn Player>, pos: Position) {}
    fn seek_in_container(&self, player: &Arc<dyn Player>, container_id: u8, index: u16) {}
    fn request_outfit(&self, player: &Arc<dyn Player>) {}
    fn change_outfit(&self, player: &Arc<dyn Player>, outfit: Outfit, randomize_mount: bool) {}
    fn edit_podium(
        &self,
        player: &Arc<dyn Player>,
        outfit: Outfit,
        pos: Position,
        stackpos: u8,
        sprite_id: u16,
        visible: bool,
        direction: Direction,
    ) {
    }
    fn add_vip(&self, player: &Arc<dyn Player>, name: String) {}
    fn remove_vip(&self, player: &Arc<dyn Player>, guid: CharacterGuid) {}
    fn edit_vip(
        &self,
        player: &Arc<dyn Player>,
        guid: CharacterGuid,
        description: String,
        icon: u32,
        notify: bool,
    ) {
    }
    fn debug_assert(
        &self,
        player: &Arc<dyn Player>,
        assert_line: String,
        date: String,
        description: String,
        comment: String,
    ) {
    }
    fn report_rule_violation(
        &self,
        player: &Arc<dyn Player>,
        target_name: String,
        report_type: u8,
        reason: u8,
        comment: String,
        translation: String,
    ) {
    }
    fn market_leave(&self, player: &Arc<dyn Player>) {}
    fn market_browse(&self, player: &Arc<dyn Player>, sprite_id: u16) {}
    fn market_browse_own_offers(&self, player: &Arc<dyn Player>) {}
    fn market_browse_own_history(&self, player: &Arc<dyn Player>) {}
    fn market_create_offer(
        &self,
        player: &Arc<dyn Player>,
        offer_type: u8,
        sprite_id: u16,
        amount: u16,
        price: u64,
        anonymous: bool,
    ) {
    }
    /// True when the sprite id maps to a marketable item type; drives
    /// whether the create-offer parser expects a tier byte.
    fn market_offer_tier_expected(&self, sprite_id: u16) -> Option<bool> {
        None
    }
    fn market_cancel_offer(&self, player: &Arc<dyn Player>, timestamp: u32, counter: u16) {}
    fn market_accept_offer(
        &self,
        player: &Arc<dyn Player>,
        timestamp: u32,
        counter: u16,
        amount: u16,
    ) {
    }
    fn answer_modal_window(&self, player: &Arc<dyn Player>, window_id: u32, button: u8, choice: u8) {
    }
    fn unhandled_command(&self, player: &Arc<dyn Player>, opcode: u8, payload: &[u8]) {}
}

/// Speak classes the dispatcher needs to tell apart; the rest pass through.
pub mod talk {
    pub const PRIVATE_TO: u8 = 5;
    pub const CHANNEL_Y: u8 = 7;
    pub const CHANNEL_R1: u8 = 14;
    pub const PRIVATE_RED_TO: u8 = 16;
}

/// Rule violation report types with extra fields.
pub mod report {
    pub const TYPE_NAME: u8 = 0;
    pub const TYPE_STATEMENT: u8 = 1;
}

/// Market browse/reply discriminators.
pub mod market {
    pub const REQUEST_OWN_OFFERS: u8 = 1;
    pub const REQUEST_OWN_HISTORY: u8 = 2;
    pub const REQUEST_ITEM: u8 = 3;
}
