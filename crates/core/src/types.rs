//! Core type definitions

use serde::{Deserialize, Serialize};

/// Creature ID (32-bit unsigned), unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreatureId(pub u32);

impl CreatureId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for CreatureId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Character GUID as persisted by the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterGuid(pub u32);

impl CharacterGuid {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Account ID as persisted by the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u32);

impl AccountId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Creature appearance. When `look_type` is zero the creature is displayed
/// as the item `look_item` instead (item disguises).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outfit {
    pub look_type: u16,
    pub look_item: u16,
    pub head: u8,
    pub body: u8,
    pub legs: u8,
    pub feet: u8,
    pub addons: u8,
    pub mount: u16,
    pub mount_head: u8,
    pub mount_body: u8,
    pub mount_legs: u8,
    pub mount_feet: u8,
}

/// Light emitted by a creature or item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightInfo {
    pub level: u8,
    pub color: u8,
}

/// PvP skull shown next to a creature name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Skull {
    #[default]
    None = 0,
    Yellow = 1,
    Green = 2,
    White = 3,
    Red = 4,
    Black = 5,
    Orange = 6,
}

/// Party status shield shown next to a creature name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyShield {
    #[default]
    None = 0,
    WhiteYellow = 1,
    WhiteBlue = 2,
    Blue = 3,
    Yellow = 4,
    BlueSharedExp = 5,
    YellowSharedExp = 6,
    BlueNoSharedExpBlink = 7,
    YellowNoSharedExpBlink = 8,
    BlueNoSharedExp = 9,
    YellowNoSharedExp = 10,
    Gray = 11,
}

/// Guild war emblem shown next to a creature name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuildEmblem {
    #[default]
    None = 0,
    Ally = 1,
    Enemy = 2,
    Neutral = 3,
    Member = 4,
    Other = 5,
}

/// Client-side creature category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreatureKind {
    Player = 0,
    Monster = 1,
    Npc = 2,
    SummonOwn = 3,
    SummonOthers = 4,
    Hidden = 5,
}

impl CreatureKind {
    pub fn client_byte(self) -> u8 {
        self as u8
    }
}

/// Speech bubble drawn over NPCs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechBubble {
    #[default]
    None = 0,
    Normal = 1,
    Trade = 2,
    Quest = 3,
    CompassQuest = 4,
    Normal2 = 5,
    Normal3 = 6,
    Hireling = 7,
}

/// Coarse world-wide game state, gating admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Startup,
    Normal,
    Closed,
    Shutdown,
    Closing,
    Maintain,
}

/// World PvP ruleset; only `Pvp` worlds broadcast skulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldType {
    Pvp,
    NoPvp,
    PvpEnforced,
}
