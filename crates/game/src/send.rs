//! Outbound message builders
//!
//! One short, typed function per packet. Each builds the payload in wire
//! order and appends it to the connection's output queue; none of them read
//! game state beyond their arguments, the observing player's annotations,
//! and the façade snapshots they are handed. Builders for events at a
//! position or about a creature check the visibility predicate first and
//! silently return when it fails.

use std::sync::atomic::{AtomicU32, Ordering};

use otgate_core::{CreatureId, Direction, Position, WorldType};
use otgate_protocol::NetworkMessage;

use crate::client::{ClientState, SessionEndReason};
use crate::facade::{
    market, AnalyzerImpact, ChannelDetails, ChannelInfo, ContainerView, CreatureView, DepotWare,
    FightModes, GameWorld, HistoryMarketOffer, ItemView, MarketOffer, MarketOfferEx, MessageEffect,
    ModalWindow, OutfitWindow, PlayerSkills, PlayerStats, PodiumWindow, SessionStore, ShopEntry,
    TextMessage, TextWindowView, VipEntry, VipStatus,
};
use crate::viewport::{
    add_creature, add_outfit, can_see_creature, can_see_position, get_map_description,
    get_tile_description, move_down_creature, move_up_creature, VIEWPORT_X, VIEWPORT_Y,
    MAX_STACKPOS,
};

/// Own-history replies cap each side at 810 offers, letting a short side
/// donate its headroom to the other.
const MARKET_HISTORY_LIMIT: usize = 810;

const MAGIC_EFFECTS_END_LOOP: u8 = 0x00;
const MAGIC_EFFECTS_CREATE_EFFECT: u8 = 0x03;
const MAGIC_EFFECTS_CREATE_DISTANCE_EFFECT: u8 = 0x04;

const PVP_MODE_DOVE: u8 = 0;

static STATEMENT_ID: AtomicU32 = AtomicU32::new(0);

fn next_statement_id() -> u32 {
    STATEMENT_ID.fetch_add(1, Ordering::Relaxed) + 1
}

fn enqueue(client: &ClientState, msg: &NetworkMessage) {
    client.connection.write_to_output_buffer(msg);
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub fn send_login_error(client: &ClientState, message: &str) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x14);
    msg.add_string(message);
    enqueue(client, &msg);
}

pub fn send_wait_list(client: &ClientState, slot: u32, retry_seconds: u32) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x16);
    msg.add_string(&format!(
        "Too many players online.\nYou are at place {slot} on the waiting list."
    ));
    msg.add_byte(retry_seconds.min(u8::MAX as u32) as u8);
    enqueue(client, &msg);
}

pub fn send_session_end(client: &ClientState, reason: SessionEndReason) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x18);
    msg.add_byte(reason as u8);
    enqueue(client, &msg);
}

pub fn send_pending_state_entered(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x0A);
    enqueue(client, &msg);
}

pub fn send_enter_world(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x0F);
    enqueue(client, &msg);
}

pub fn send_enable_extended_opcode(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x32);
    msg.add_byte(0x00);
    msg.add_u16(0x0000);
    enqueue(client, &msg);
}

/// World-entry features block: beat duration, walk speed curve, UI toggles.
pub fn send_client_features(
    client: &ClientState,
    player_id: CreatureId,
    speed_curve: [f64; 3],
    can_report_bugs: bool,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x17);

    msg.add_u32(player_id.get());
    msg.add_u16(50); // beat duration

    msg.add_double(speed_curve[0], 3);
    msg.add_double(speed_curve[1], 3);
    msg.add_double(speed_curve[2], 3);

    msg.add_byte(if can_report_bugs { 0x01 } else { 0x00 });

    msg.add_byte(0x00); // can change pvp framing option
    msg.add_byte(0x00); // expert mode button

    msg.add_u16(0x00); // store images url
    msg.add_u16(25); // premium coin package size

    msg.add_byte(0x00); // exiva button
    msg.add_byte(0x00); // tournament button

    enqueue(client, &msg);
}

pub fn send_basic_data(
    client: &ClientState,
    is_premium: bool,
    premium_until: u32,
    vocation_client_id: u8,
    has_magic_shield: bool,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x9F);
    if is_premium {
        msg.add_byte(1);
        msg.add_u32(premium_until);
    } else {
        msg.add_byte(0);
        msg.add_u32(0);
    }

    msg.add_byte(vocation_client_id);
    msg.add_byte(0x00); // prey system

    // Unlock every spell on the action bar.
    msg.add_u16(0xFF);
    for spell_id in 0x00..0xFFu16 {
        msg.add_u16(spell_id);
    }

    msg.add_byte(if has_magic_shield { 0x01 } else { 0x00 });
    enqueue(client, &msg);
}

pub fn send_relogin_window(client: &ClientState, unfair_fight_reduction: u8) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x28);
    msg.add_byte(0x00);
    msg.add_byte(unfair_fight_reduction);
    msg.add_byte(0x00); // death redemption
    enqueue(client, &msg);
}

pub fn send_fyi_box(client: &ClientState, message: &str) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x15);
    msg.add_string(message);
    enqueue(client, &msg);
}

// ---------------------------------------------------------------------------
// Player stats, skills, fight
// ---------------------------------------------------------------------------

pub fn send_stats(client: &ClientState, stats: &PlayerStats) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xA0);

    msg.add_u32(stats.health);
    msg.add_u32(stats.max_health);

    msg.add_u32(stats.free_capacity);
    msg.add_u64(stats.experience);

    msg.add_u16(stats.level);
    msg.add_byte(stats.level_percent);

    msg.add_u16(stats.exp_display);
    msg.add_u16(stats.lowlevel_bonus_display);
    msg.add_u16(0); // store exp bonus
    msg.add_u16(stats.stamina_bonus_display);

    msg.add_u32(stats.mana);
    msg.add_u32(stats.max_mana);

    msg.add_byte(stats.soul);
    msg.add_u16(stats.stamina_minutes);
    msg.add_u16(stats.base_speed / 2);

    msg.add_u16(stats.regeneration_seconds);
    msg.add_u16(stats.offline_training_minutes);

    msg.add_u16(0); // xp boost time
    msg.add_byte(0x00); // store xp boost button

    msg.add_u32(stats.mana_shield);
    msg.add_u32(stats.max_mana_shield);

    enqueue(client, &msg);
}

pub fn send_experience_tracker(client: &ClientState, raw_exp: i64, final_exp: i64) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xAF);
    msg.add_i64(raw_exp);
    msg.add_i64(final_exp);
    enqueue(client, &msg);
}

pub fn send_skills(client: &ClientState, skills: &PlayerSkills) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xA1);

    msg.add_u16(skills.magic.level);
    msg.add_u16(skills.magic.base);
    msg.add_u16(skills.magic.base); // base + loyalty bonus
    msg.add_u16(skills.magic.percent);

    for skill in &skills.skills {
        msg.add_u16(skill.level);
        msg.add_u16(skill.base);
        msg.add_u16(skill.base); // base + loyalty bonus
        msg.add_u16(skill.percent);
    }

    for special in &skills.special {
        msg.add_u16(*special);
        msg.add_u16(0); // base special skill
    }

    msg.add_byte(0); // element magic levels

    // fatal, dodge, momentum
    for _ in 0..3 {
        msg.add_u16(0);
        msg.add_u16(0);
    }

    msg.add_u32(skills.capacity);
    msg.add_u32(skills.base_capacity);
    enqueue(client, &msg);
}

pub fn send_fight_modes(client: &ClientState, modes: FightModes) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xA7);
    msg.add_byte(modes.fight);
    msg.add_byte(modes.chase);
    msg.add_byte(modes.secure);
    msg.add_byte(PVP_MODE_DOVE);
    enqueue(client, &msg);
}

pub fn send_icons(client: &ClientState, icons: u32) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xA2);
    msg.add_u32(icons);
    enqueue(client, &msg);
}

pub fn send_ping(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x1D);
    enqueue(client, &msg);
}

pub fn send_ping_back(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x1E);
    enqueue(client, &msg);
}

pub fn send_cancel_target(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xA3);
    msg.add_u32(0x00);
    enqueue(client, &msg);
}

pub fn send_cancel_walk(client: &ClientState, direction: Direction) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xB5);
    msg.add_byte(direction.client_byte());
    enqueue(client, &msg);
}

pub fn send_change_speed(client: &ClientState, creature: CreatureId, base_speed: u16, speed: u16) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x8F);
    msg.add_u32(creature.get());
    msg.add_u16(base_speed / 2);
    msg.add_u16(speed / 2);
    enqueue(client, &msg);
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

pub fn send_channels_dialog(client: &ClientState, channels: &[ChannelInfo]) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xAB);
    msg.add_byte(channels.len().min(u8::MAX as usize) as u8);
    for channel in channels {
        msg.add_u16(channel.id);
        msg.add_string(&channel.name);
    }
    enqueue(client, &msg);
}

pub fn send_channel(client: &ClientState, details: &ChannelDetails) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xAC);

    msg.add_u16(details.id);
    msg.add_string(&details.name);

    match &details.users {
        Some(users) => {
            msg.add_u16(users.len().min(u16::MAX as usize) as u16);
            for name in users {
                msg.add_string(name);
            }
        }
        None => msg.add_u16(0x00),
    }

    match &details.invited {
        Some(invited) => {
            msg.add_u16(invited.len().min(u16::MAX as usize) as u16);
            for name in invited {
                msg.add_string(name);
            }
        }
        None => msg.add_u16(0x00),
    }
    enqueue(client, &msg);
}

pub fn send_channel_message(
    client: &ClientState,
    author: &str,
    text: &str,
    kind: u8,
    channel_id: u16,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xAA);
    msg.add_u32(0x00);
    msg.add_string(author);
    msg.add_u16(0x00);
    msg.add_byte(kind);
    msg.add_u16(channel_id);
    msg.add_string(text);
    enqueue(client, &msg);
}

pub fn send_channel_event(client: &ClientState, channel_id: u16, player_name: &str, event: u8) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xF3);
    msg.add_u16(channel_id);
    msg.add_string(player_name);
    msg.add_byte(event);
    enqueue(client, &msg);
}

pub fn send_open_private_channel(client: &ClientState, receiver: &str) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xAD);
    msg.add_string(receiver);
    enqueue(client, &msg);
}

pub fn send_close_private(client: &ClientState, channel_id: u16) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xB3);
    msg.add_u16(channel_id);
    enqueue(client, &msg);
}

pub fn send_create_private_channel(client: &ClientState, channel_id: u16, channel_name: &str) {
    let owner = client
        .player
        .as_ref()
        .map(|p| p.name())
        .unwrap_or_default();

    let mut msg = NetworkMessage::new();
    msg.add_byte(0xB2);
    msg.add_u16(channel_id);
    msg.add_string(channel_name);
    msg.add_u16(0x01);
    msg.add_string(&owner);
    msg.add_u16(0x00);
    enqueue(client, &msg);
}

/// Speech on screen, with a monotonic statement id for reporting.
pub fn send_creature_say(
    client: &ClientState,
    speaker: &CreatureView,
    kind: u8,
    text: &str,
    pos: Option<Position>,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xAA);
    msg.add_u32(next_statement_id());

    msg.add_string(&speaker.name);
    msg.add_byte(0x00); // "(Traded)" name suffix
    msg.add_u16(speaker.player_level);

    msg.add_byte(kind);
    msg.add_position(pos.unwrap_or(speaker.position));
    msg.add_string(text);
    enqueue(client, &msg);
}

pub fn send_to_channel(
    client: &ClientState,
    speaker: Option<&CreatureView>,
    kind: u8,
    text: &str,
    channel_id: u16,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xAA);
    msg.add_u32(next_statement_id());
    match speaker {
        Some(speaker) => {
            msg.add_string(&speaker.name);
            msg.add_byte(0x00);
            msg.add_u16(speaker.player_level);
        }
        None => {
            msg.add_u32(0x00);
            msg.add_byte(0x00);
        }
    }
    msg.add_byte(kind);
    msg.add_u16(channel_id);
    msg.add_string(text);
    enqueue(client, &msg);
}

pub fn send_private_message(
    client: &ClientState,
    speaker: Option<(&str, u16)>,
    kind: u8,
    text: &str,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xAA);
    msg.add_u32(next_statement_id());
    match speaker {
        Some((name, level)) => {
            msg.add_string(name);
            msg.add_byte(0x00);
            msg.add_u16(level);
        }
        None => {
            msg.add_u32(0x00);
            msg.add_byte(0x00);
        }
    }
    msg.add_byte(kind);
    msg.add_string(text);
    enqueue(client, &msg);
}

pub fn send_text_message(client: &ClientState, message: &TextMessage) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xB4);
    msg.add_byte(message.kind);
    match &message.effect {
        MessageEffect::Damage {
            position,
            primary,
            secondary,
        } => {
            msg.add_position(*position);
            msg.add_u32(primary.0);
            msg.add_byte(primary.1);
            msg.add_u32(secondary.0);
            msg.add_byte(secondary.1);
        }
        MessageEffect::Value {
            position,
            value,
            color,
        } => {
            msg.add_position(*position);
            msg.add_u32(*value);
            msg.add_byte(*color);
        }
        MessageEffect::Channel { channel_id } => {
            msg.add_u16(*channel_id);
        }
        MessageEffect::None => {}
    }
    msg.add_string(&message.text);
    enqueue(client, &msg);
}

// ---------------------------------------------------------------------------
// World view
// ---------------------------------------------------------------------------

pub fn send_map_description(client: &mut ClientState, world: &dyn GameWorld, pos: Position) {
    let Some(player_pos) = client.player_position() else {
        return;
    };

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x64);
    msg.add_position(player_pos);
    get_map_description(
        client,
        world,
        &mut msg,
        pos.x as i32 - VIEWPORT_X,
        pos.y as i32 - VIEWPORT_Y,
        pos.z,
        VIEWPORT_X * 2 + 2,
        VIEWPORT_Y * 2 + 2,
    );
    enqueue(client, &msg);
}

pub fn send_add_tile_item(client: &ClientState, pos: Position, stackpos: u16, item: ItemView) {
    let Some(player_pos) = client.player_position() else {
        return;
    };
    if !can_see_position(player_pos, pos) {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x6A);
    msg.add_position(pos);
    msg.add_byte(stackpos as u8);
    item.encode(&mut msg);
    enqueue(client, &msg);
}

pub fn send_update_tile_item(client: &ClientState, pos: Position, stackpos: u16, item: ItemView) {
    let Some(player_pos) = client.player_position() else {
        return;
    };
    if !can_see_position(player_pos, pos) {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x6B);
    msg.add_position(pos);
    msg.add_byte(stackpos as u8);
    item.encode(&mut msg);
    enqueue(client, &msg);
}

fn remove_tile_thing(msg: &mut NetworkMessage, pos: Position, stackpos: u16) {
    if stackpos as usize >= MAX_STACKPOS {
        return;
    }
    msg.add_byte(0x6C);
    msg.add_position(pos);
    msg.add_byte(stackpos as u8);
}

fn remove_tile_creature(msg: &mut NetworkMessage, creature: CreatureId, pos: Position, stackpos: u16) {
    if (stackpos as usize) < MAX_STACKPOS {
        remove_tile_thing(msg, pos, stackpos);
        return;
    }

    // Beyond the addressable stack the creature is removed by id.
    msg.add_byte(0x6C);
    msg.add_u16(0xFFFF);
    msg.add_u32(creature.get());
}

pub fn send_remove_tile_thing(client: &ClientState, pos: Position, stackpos: u16) {
    let Some(player_pos) = client.player_position() else {
        return;
    };
    if !can_see_position(player_pos, pos) {
        return;
    }

    let mut msg = NetworkMessage::new();
    remove_tile_thing(&mut msg, pos, stackpos);
    enqueue(client, &msg);
}

pub fn send_remove_tile_creature(
    client: &ClientState,
    creature: CreatureId,
    pos: Position,
    stackpos: u16,
) {
    if (stackpos as usize) < MAX_STACKPOS {
        let Some(player_pos) = client.player_position() else {
            return;
        };
        if !can_see_position(player_pos, pos) {
            return;
        }
    }

    let mut msg = NetworkMessage::new();
    remove_tile_creature(&mut msg, creature, pos, stackpos);
    enqueue(client, &msg);
}

pub fn send_update_tile(
    client: &mut ClientState,
    world: &dyn GameWorld,
    tile: Option<&crate::facade::TileView>,
    pos: Position,
) {
    let Some(player_pos) = client.player_position() else {
        return;
    };
    if !can_see_position(player_pos, pos) {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x69);
    msg.add_position(pos);

    match tile {
        Some(tile) => {
            get_tile_description(client, world, &mut msg, tile);
            msg.add_byte(0x00);
            msg.add_byte(0xFF);
        }
        None => {
            msg.add_byte(0x01);
            msg.add_byte(0xFF);
        }
    }
    enqueue(client, &msg);
}

pub fn send_update_tile_creature(
    client: &mut ClientState,
    world: &dyn GameWorld,
    pos: Position,
    stackpos: u16,
    view: &CreatureView,
) {
    let Some(player_pos) = client.player_position() else {
        return;
    };
    if !can_see_position(player_pos, pos) {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x6B);
    msg.add_position(pos);
    msg.add_byte(stackpos as u8);
    add_creature(client, world, &mut msg, view, true);
    enqueue(client, &msg);
}

pub fn send_add_creature(
    client: &mut ClientState,
    world: &dyn GameWorld,
    view: &CreatureView,
    pos: Position,
    stackpos: i32,
    magic_effect: Option<u8>,
) {
    let Some(player_pos) = client.player_position() else {
        return;
    };
    if !can_see_position(player_pos, pos) {
        return;
    }

    if stackpos >= MAX_STACKPOS as i32 {
        // The stack overflowed; refresh the whole tile so the creature at
        // least lands in the battle list.
        let tile = world.tile_at(pos);
        send_update_tile(client, world, tile.as_ref(), pos);
    } else {
        let mut msg = NetworkMessage::new();
        msg.add_byte(0x6A);
        msg.add_position(pos);
        msg.add_byte(stackpos as u8);
        add_creature(client, world, &mut msg, view, false);
        enqueue(client, &msg);
    }

    if let Some(effect) = magic_effect {
        send_magic_effect(client, pos, effect);
    }
}

pub fn send_move_creature(
    client: &mut ClientState,
    world: &dyn GameWorld,
    view: &CreatureView,
    new_pos: Position,
    new_stackpos: i32,
    old_pos: Position,
    old_stackpos: u16,
    teleport: bool,
) {
    let Some(player_pos) = client.player_position() else {
        return;
    };
    let is_self = client.player_id() == Some(view.id);

    if is_self {
        if teleport {
            send_remove_tile_creature(client, view.id, old_pos, old_stackpos);
            send_map_description(client, world, new_pos);
            return;
        }

        let mut msg = NetworkMessage::new();
        if old_pos.z == 7 && new_pos.z >= 8 {
            remove_tile_creature(&mut msg, view.id, old_pos, old_stackpos);
        } else {
            msg.add_byte(0x6D);
            if (old_stackpos as usize) < MAX_STACKPOS {
                msg.add_position(old_pos);
                msg.add_byte(old_stackpos as u8);
            } else {
                msg.add_u16(0xFFFF);
                msg.add_u32(view.id.get());
            }
            msg.add_position(new_pos);
        }

        if new_pos.z > old_pos.z {
            move_down_creature(client, world, &mut msg, view.id, new_pos, old_pos);
        } else if new_pos.z < old_pos.z {
            move_up_creature(client, world, &mut msg, view.id, new_pos, old_pos);
        }

        let width = VIEWPORT_X * 2 + 2;
        let height = VIEWPORT_Y * 2 + 2;
        let ox = old_pos.x as i32;
        let nx = new_pos.x as i32;
        let oy = old_pos.y as i32;
        let ny = new_pos.y as i32;

        if oy > ny {
            // north, for the old x
            msg.add_byte(0x65);
            get_map_description(
                client,
                world,
                &mut msg,
                ox - VIEWPORT_X,
                ny - VIEWPORT_Y,
                new_pos.z,
                width,
                1,
            );
        } else if oy < ny {
            // south, for the old x
            msg.add_byte(0x67);
            get_map_description(
                client,
                world,
                &mut msg,
                ox - VIEWPORT_X,
                ny + VIEWPORT_Y + 1,
                new_pos.z,
                width,
                1,
            );
        }

        if ox < nx {
            // east, with the new y
            msg.add_byte(0x66);
            get_map_description(
                client,
                world,
                &mut msg,
                nx + VIEWPORT_X + 1,
                ny - VIEWPORT_Y,
                new_pos.z,
                1,
                height,
            );
        } else if ox > nx {
            // west, with the new y
            msg.add_byte(0x68);
            get_map_description(
                client,
                world,
                &mut msg,
                nx - VIEWPORT_X,
                ny - VIEWPORT_Y,
                new_pos.z,
                1,
                height,
            );
        }
        enqueue(client, &msg);
        return;
    }

    let sees_old = can_see_position(player_pos, old_pos);
    let sees_new = can_see_position(player_pos, view.position);
    if sees_old && sees_new {
        if teleport || (old_pos.z == 7 && new_pos.z >= 8) {
            send_remove_tile_creature(client, view.id, old_pos, old_stackpos);
            send_add_creature(client, world, view, new_pos, new_stackpos, None);
        } else {
            let mut msg = NetworkMessage::new();
            msg.add_byte(0x6D);
            if (old_stackpos as usize) < MAX_STACKPOS {
                msg.add_position(old_pos);
                msg.add_byte(old_stackpos as u8);
            } else {
                msg.add_u16(0xFFFF);
                msg.add_u32(view.id.get());
            }
            msg.add_position(view.position);
            enqueue(client, &msg);
        }
    } else if sees_old {
        send_remove_tile_creature(client, view.id, old_pos, old_stackpos);
    } else if sees_new {
        send_add_creature(client, world, view, new_pos, new_stackpos, None);
    }
}

pub fn send_magic_effect(client: &ClientState, pos: Position, effect: u8) {
    let Some(player_pos) = client.player_position() else {
        return;
    };
    if !can_see_position(player_pos, pos) {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x83);
    msg.add_position(pos);
    msg.add_byte(MAGIC_EFFECTS_CREATE_EFFECT);
    msg.add_byte(effect);
    msg.add_byte(MAGIC_EFFECTS_END_LOOP);
    enqueue(client, &msg);
}

pub fn send_distance_shoot(client: &ClientState, from: Position, to: Position, effect: u8) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x83);
    msg.add_position(from);
    msg.add_byte(MAGIC_EFFECTS_CREATE_DISTANCE_EFFECT);
    msg.add_byte(effect);
    msg.add_byte((to.x as i32 - from.x as i32) as i8 as u8);
    msg.add_byte((to.y as i32 - from.y as i32) as i8 as u8);
    msg.add_byte(MAGIC_EFFECTS_END_LOOP);
    enqueue(client, &msg);
}

// ---------------------------------------------------------------------------
// Creature updates
// ---------------------------------------------------------------------------

pub fn send_creature_health(client: &ClientState, view: &CreatureView) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x8C);
    msg.add_u32(view.id.get());
    msg.add_byte(if view.health_hidden {
        0
    } else {
        view.health_percent
    });
    enqueue(client, &msg);
}

pub fn send_creature_outfit(client: &ClientState, view: &CreatureView, outfit: &otgate_core::Outfit) {
    if !can_see_creature(client, view) {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x8E);
    msg.add_u32(view.id.get());
    add_outfit(&mut msg, outfit);
    enqueue(client, &msg);
}

pub fn send_creature_light(client: &ClientState, view: &CreatureView) {
    if !can_see_creature(client, view) {
        return;
    }
    let Some(player) = &client.player else {
        return;
    };

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x8D);
    msg.add_u32(view.id.get());
    msg.add_byte(if player.is_access_player() {
        0xFF
    } else {
        view.light.level
    });
    msg.add_byte(view.light.color);
    enqueue(client, &msg);
}

pub fn send_creature_walkthrough(client: &ClientState, view: &CreatureView, walkthrough: bool) {
    if !can_see_creature(client, view) {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x92);
    msg.add_u32(view.id.get());
    msg.add_byte(if walkthrough { 0x00 } else { 0x01 });
    enqueue(client, &msg);
}

pub fn send_creature_shield(client: &ClientState, view: &CreatureView) {
    if !can_see_creature(client, view) {
        return;
    }
    let Some(player) = &client.player else {
        return;
    };

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x91);
    msg.add_u32(view.id.get());
    msg.add_byte(player.party_shield_of(view.id) as u8);
    enqueue(client, &msg);
}

pub fn send_creature_skull(client: &ClientState, world_type: WorldType, view: &CreatureView) {
    if world_type != WorldType::Pvp {
        return;
    }
    if !can_see_creature(client, view) {
        return;
    }
    let Some(player) = &client.player else {
        return;
    };

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x90);
    msg.add_u32(view.id.get());
    msg.add_byte(player.skull_of(view.id) as u8);
    enqueue(client, &msg);
}

pub fn send_creature_square(client: &ClientState, view: &CreatureView, color: u8) {
    if !can_see_creature(client, view) {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x93);
    msg.add_u32(view.id.get());
    msg.add_byte(0x01);
    msg.add_byte(color);
    enqueue(client, &msg);
}

pub fn send_creature_turn(client: &ClientState, view: &CreatureView, stackpos: u16) {
    if !can_see_creature(client, view) {
        return;
    }
    let Some(player) = &client.player else {
        return;
    };

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x6B);
    if stackpos as usize >= MAX_STACKPOS {
        msg.add_u16(0xFFFF);
        msg.add_u32(view.id.get());
    } else {
        msg.add_position(view.position);
        msg.add_byte(stackpos as u8);
    }

    msg.add_u16(0x63);
    msg.add_u32(view.id.get());
    msg.add_byte(view.direction.client_byte());
    msg.add_byte(if player.can_walk_through(view.id) {
        0x00
    } else {
        0x01
    });
    enqueue(client, &msg);
}

pub fn send_update_creature_icons(client: &ClientState, view: &CreatureView) {
    let Some(player_pos) = client.player_position() else {
        return;
    };
    if !can_see_position(player_pos, view.position) {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x8B);
    msg.add_u32(view.id.get());
    msg.add_byte(14); // event: player icons
    msg.add_byte(view.icons.len().min(u8::MAX as usize) as u8);
    for icon in &view.icons {
        msg.add_byte(icon.icon);
        msg.add_byte(icon.category);
        msg.add_u16(icon.value);
    }
    enqueue(client, &msg);
}

// ---------------------------------------------------------------------------
// Containers and inventory
// ---------------------------------------------------------------------------

pub fn send_container(client: &ClientState, container_id: u8, container: &ContainerView) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x6E);

    msg.add_byte(container_id);
    container.item.encode(&mut msg);
    msg.add_string(&container.name);

    msg.add_byte(container.capacity);
    msg.add_byte(if container.has_parent { 0x01 } else { 0x00 });
    msg.add_byte(0x00); // show search icon
    msg.add_byte(if container.is_unlocked { 0x01 } else { 0x00 });
    msg.add_byte(if container.has_pagination { 0x01 } else { 0x00 });

    msg.add_u16(container.size);
    msg.add_u16(container.first_index);

    msg.add_byte(container.items.len().min(u8::MAX as usize) as u8);
    for item in container.items.iter().take(u8::MAX as usize) {
        item.encode(&mut msg);
    }
    enqueue(client, &msg);
}

pub fn send_empty_container(client: &ClientState, container_id: u8) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x6E);

    msg.add_byte(container_id);
    ItemView {
        client_id: 0x0B3A,
        count: Some(1),
    }
    .encode(&mut msg);
    msg.add_string("Placeholder");

    msg.add_byte(8);
    msg.add_byte(0x00);
    msg.add_byte(0x00);
    msg.add_byte(0x01);
    msg.add_byte(0x00);
    msg.add_u16(0);
    msg.add_u16(0);
    msg.add_byte(0x00);
    enqueue(client, &msg);
}

pub fn send_close_container(client: &ClientState, container_id: u8) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x6F);
    msg.add_byte(container_id);
    enqueue(client, &msg);
}

pub fn send_add_container_item(
    client: &ClientState,
    container_id: u8,
    slot: u16,
    item: Option<ItemView>,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x70);
    msg.add_byte(container_id);
    msg.add_u16(slot);
    match item {
        Some(item) => item.encode(&mut msg),
        None => msg.add_u16(0x00),
    }
    enqueue(client, &msg);
}

pub fn send_update_container_item(client: &ClientState, container_id: u8, slot: u16, item: ItemView) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x71);
    msg.add_byte(container_id);
    msg.add_u16(slot);
    item.encode(&mut msg);
    enqueue(client, &msg);
}

pub fn send_remove_container_item(
    client: &ClientState,
    container_id: u8,
    slot: u16,
    last_item: Option<ItemView>,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x72);
    msg.add_byte(container_id);
    msg.add_u16(slot);
    match last_item {
        Some(item) => item.encode(&mut msg),
        None => msg.add_u16(0x00),
    }
    enqueue(client, &msg);
}

pub fn send_inventory_item(client: &ClientState, slot: u8, item: Option<ItemView>) {
    let mut msg = NetworkMessage::new();
    match item {
        Some(item) => {
            msg.add_byte(0x78);
            msg.add_byte(slot);
            item.encode(&mut msg);
        }
        None => {
            msg.add_byte(0x79);
            msg.add_byte(slot);
        }
    }
    enqueue(client, &msg);
}

/// Consolidated carried-items list: eleven fixed slot rows, then one row
/// per carried item type.
pub fn send_items(client: &ClientState, inventory: &[(u16, u16)]) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xF5);

    msg.add_u16(inventory.len() as u16 + 11);
    for slot in 1..=11u16 {
        msg.add_u16(slot);
        msg.add_byte(0);
        msg.add_u16(1);
    }

    for (client_id, count) in inventory {
        msg.add_u16(*client_id);
        msg.add_byte(0);
        msg.add_u16(*count);
    }
    enqueue(client, &msg);
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

pub fn send_text_window(client: &ClientState, window: &TextWindowView) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x96);
    msg.add_u32(window.window_id);
    window.item.encode(&mut msg);

    match window.max_length {
        Some(max_length) => {
            msg.add_u16(max_length);
            msg.add_string(&window.text);
        }
        None => {
            msg.add_u16(window.text.len().min(u16::MAX as usize) as u16);
            msg.add_string(&window.text);
        }
    }

    if !window.writer.is_empty() {
        msg.add_string(&window.writer);
    } else {
        msg.add_u16(0x00);
    }

    msg.add_byte(0x00); // "(traded)" name suffix

    if !window.date.is_empty() {
        msg.add_string(&window.date);
    } else {
        msg.add_u16(0x00);
    }
    enqueue(client, &msg);
}

pub fn send_house_window(client: &ClientState, window_id: u32, text: &str) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x97);
    msg.add_byte(0x00);
    msg.add_u32(window_id);
    msg.add_string(text);
    enqueue(client, &msg);
}

pub fn send_modal_window(client: &ClientState, window: &ModalWindow) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xFA);

    msg.add_u32(window.id);
    msg.add_string(&window.title);
    msg.add_string(&window.message);

    msg.add_byte(window.buttons.len().min(u8::MAX as usize) as u8);
    for (text, id) in &window.buttons {
        msg.add_string(text);
        msg.add_byte(*id);
    }

    msg.add_byte(window.choices.len().min(u8::MAX as usize) as u8);
    for (text, id) in &window.choices {
        msg.add_string(text);
        msg.add_byte(*id);
    }

    msg.add_byte(window.default_escape_button);
    msg.add_byte(window.default_enter_button);
    msg.add_byte(if window.priority { 0x01 } else { 0x00 });
    enqueue(client, &msg);
}

pub fn send_outfit_window(client: &ClientState, window: &OutfitWindow) {
    if window.outfits.is_empty() {
        return;
    }

    let mut msg = NetworkMessage::new();
    msg.add_byte(0xC8);

    add_outfit(&mut msg, &window.current);
    // Mount color bytes are expected even without a mount.
    if window.current.mount == 0 {
        msg.add_byte(window.current.mount_head);
        msg.add_byte(window.current.mount_body);
        msg.add_byte(window.current.mount_legs);
        msg.add_byte(window.current.mount_feet);
    }

    msg.add_u16(0); // current familiar

    msg.add_u16(window.outfits.len().min(u16::MAX as usize) as u16);
    for outfit in &window.outfits {
        msg.add_u16(outfit.look_type);
        msg.add_string(&outfit.name);
        msg.add_byte(outfit.addons);
        msg.add_byte(0x00); // availability mode
    }

    msg.add_u16(window.mounts.len().min(u16::MAX as usize) as u16);
    for mount in &window.mounts {
        msg.add_u16(mount.client_id);
        msg.add_string(&mount.name);
        msg.add_byte(0x00); // availability mode
    }

    msg.add_u16(0x00); // familiars

    msg.add_byte(0x00); // try-outfit mode
    msg.add_byte(if window.mounted { 0x01 } else { 0x00 });
    msg.add_byte(if window.randomize_mount { 0x01 } else { 0x00 });
    enqueue(client, &msg);
}

pub fn send_podium_window(client: &ClientState, window: &PodiumWindow) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xC8);

    // Current outfit, colors written even for an empty look.
    msg.add_u16(window.outfit.look_type);
    msg.add_byte(window.outfit.head);
    msg.add_byte(window.outfit.body);
    msg.add_byte(window.outfit.legs);
    msg.add_byte(window.outfit.feet);
    msg.add_byte(window.outfit.addons);

    msg.add_u16(window.outfit.mount);
    msg.add_byte(window.outfit.mount_head);
    msg.add_byte(window.outfit.mount_body);
    msg.add_byte(window.outfit.mount_legs);
    msg.add_byte(window.outfit.mount_feet);

    msg.add_u16(0); // familiar, unused on podiums

    msg.add_u16(window.outfits.len().min(u16::MAX as usize) as u16);
    for outfit in &window.outfits {
        msg.add_u16(outfit.look_type);
        msg.add_string(&outfit.name);
        msg.add_byte(outfit.addons);
        msg.add_byte(0x00);
    }

    msg.add_u16(window.mounts.len().min(u16::MAX as usize) as u16);
    for mount in &window.mounts {
        msg.add_u16(mount.client_id);
        msg.add_string(&mount.name);
        msg.add_byte(0x00);
    }

    msg.add_u16(0); // familiars, unused on podiums

    msg.add_byte(0x05); // window mode: podium
    msg.add_byte(if window.show_mount { 0x01 } else { 0x00 });
    msg.add_u16(0); // unknown
    msg.add_position(window.position);
    msg.add_u16(window.item_client_id);
    msg.add_byte(window.stackpos);

    msg.add_byte(if window.show_platform { 0x01 } else { 0x00 });
    msg.add_byte(0x01); // "outfit" checkbox, ignored by the client
    msg.add_byte(window.direction.client_byte());
    enqueue(client, &msg);
}

// ---------------------------------------------------------------------------
// Trade and shop
// ---------------------------------------------------------------------------

pub fn send_trade_item_request(client: &ClientState, trader_name: &str, items: &[ItemView], ack: bool) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(if ack { 0x7D } else { 0x7E });
    msg.add_string(trader_name);

    msg.add_byte(items.len().min(u8::MAX as usize) as u8);
    for item in items.iter().take(u8::MAX as usize) {
        item.encode(&mut msg);
    }
    enqueue(client, &msg);
}

pub fn send_close_trade(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x7F);
    enqueue(client, &msg);
}

pub fn send_shop(client: &ClientState, npc_name: &str, currency_client_id: u16, entries: &[ShopEntry]) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x7A);
    msg.add_string(npc_name);

    msg.add_u16(currency_client_id);
    msg.add_string(""); // currency name, unused by the client

    let items_to_send = entries.len().min(u16::MAX as usize);
    msg.add_u16(items_to_send as u16);

    for entry in entries.iter().take(items_to_send) {
        msg.add_u16(entry.client_id);
        msg.add_byte(entry.fluid_subtype.unwrap_or(0x00));
        msg.add_string(&entry.name);
        msg.add_u32(entry.weight);
        msg.add_u32(entry.buy_price);
        msg.add_u32(entry.sell_price);
    }
    enqueue(client, &msg);
}

pub fn send_close_shop(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x7C);
    enqueue(client, &msg);
}

/// What the player could sell to the open shop. Small shops are scanned
/// directly; larger ones go through the cached full inventory count.
pub fn send_sale_item_list(client: &ClientState, bank: u64, money: u64, shop: &[ShopEntry]) {
    send_resource_balance(client, resource::BANK_BALANCE, bank);
    send_resource_balance(client, resource::GOLD_EQUIPPED, money);

    let Some(player) = &client.player else {
        return;
    };

    let mut msg = NetworkMessage::new();
    msg.add_byte(0x7B);

    let mut sale_map: Vec<(u16, u32)> = Vec::new();
    let mut push = |item_id: u16, count: u32| {
        match sale_map.binary_search_by_key(&item_id, |(id, _)| *id) {
            Ok(index) => sale_map[index].1 = count,
            Err(index) => sale_map.insert(index, (item_id, count)),
        }
    };

    if shop.len() <= 5 {
        for entry in shop {
            if entry.sell_price == 0 {
                continue;
            }
            let subtype: i8 = if entry.has_subtype {
                if entry.subtype == 0 {
                    -1
                } else {
                    entry.subtype as i8
                }
            } else {
                -1
            };
            let count = player.item_type_count(entry.item_id, subtype);
            if count > 0 {
                push(entry.item_id, count);
            }
        }
    } else {
        let counts = player.all_item_counts();
        for entry in shop {
            if entry.sell_price == 0 {
                continue;
            }
            let subtype: i8 = if entry.has_subtype {
                if entry.subtype == 0 {
                    -1
                } else {
                    entry.subtype as i8
                }
            } else {
                -1
            };
            if subtype != -1 {
                let count = if entry.fluid_subtype.is_some() {
                    player.item_type_count(entry.item_id, subtype)
                } else {
                    subtype as u32
                };
                if count > 0 {
                    push(entry.item_id, count);
                }
            } else if let Ok(index) = counts.binary_search_by_key(&entry.item_id, |(id, _)| *id) {
                if counts[index].1 > 0 {
                    push(entry.item_id, counts[index].1);
                }
            }
        }
    }

    let items_to_send = sale_map.len().min(u8::MAX as usize);
    msg.add_byte(items_to_send as u8);
    for (item_id, count) in sale_map.iter().take(items_to_send) {
        msg.add_u16(*item_id);
        msg.add_u16((*count).min(u16::MAX as u32) as u16);
    }
    enqueue(client, &msg);
}

pub mod resource {
    pub const BANK_BALANCE: u8 = 0x00;
    pub const GOLD_EQUIPPED: u8 = 0x01;
}

pub fn send_resource_balance(client: &ClientState, resource_type: u8, amount: u64) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xEE);
    msg.add_byte(resource_type);
    msg.add_u64(amount);
    enqueue(client, &msg);
}

pub fn send_store_balance(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xDF);
    msg.add_byte(0x01);

    msg.add_u32(0); // total store coins
    msg.add_u32(0); // transferable coins
    msg.add_u32(0); // reserved auction coins
    msg.add_u32(0); // tournament coins
    enqueue(client, &msg);
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

fn add_market_item_id(msg: &mut NetworkMessage, client_id: u16, has_tier: bool) {
    msg.add_u16(client_id);
    if has_tier {
        msg.add_byte(0);
    }
}

pub fn send_market_enter(
    client: &ClientState,
    own_offer_count: u32,
    depot: &[DepotWare],
    bank: u64,
    money: u64,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xF6);
    msg.add_byte(own_offer_count.min(u8::MAX as u32) as u8);

    let wares_to_send = depot.len().min(u16::MAX as usize);
    msg.add_u16(wares_to_send as u16);
    for ware in depot.iter().take(wares_to_send) {
        msg.add_u16(ware.ware_id);
        if ware.has_tier {
            msg.add_byte(0);
        }
        msg.add_u16(ware.count);
    }
    enqueue(client, &msg);

    send_resource_balance(client, resource::BANK_BALANCE, bank);
    send_resource_balance(client, resource::GOLD_EQUIPPED, money);
    send_store_balance(client);
}

pub fn send_market_leave(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xF7);
    enqueue(client, &msg);
}

pub fn send_market_browse_item(
    client: &ClientState,
    item_client_id: u16,
    has_tier: bool,
    buy_offers: &[MarketOffer],
    sell_offers: &[MarketOffer],
) {
    send_store_balance(client);

    let mut msg = NetworkMessage::new();
    msg.add_byte(0xF9);
    msg.add_byte(market::REQUEST_ITEM);
    add_market_item_id(&mut msg, item_client_id, has_tier);

    msg.add_u32(buy_offers.len() as u32);
    for offer in buy_offers {
        msg.add_u32(offer.timestamp);
        msg.add_u16(offer.counter);
        msg.add_u16(offer.amount);
        msg.add_u64(offer.price);
        msg.add_string(&offer.player_name);
    }

    msg.add_u32(sell_offers.len() as u32);
    for offer in sell_offers {
        msg.add_u32(offer.timestamp);
        msg.add_u16(offer.counter);
        msg.add_u16(offer.amount);
        msg.add_u64(offer.price);
        msg.add_string(&offer.player_name);
    }
    enqueue(client, &msg);
}

pub fn send_market_accept_offer(client: &ClientState, offer: &MarketOfferEx) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xF9);
    msg.add_byte(market::REQUEST_ITEM);
    add_market_item_id(&mut msg, offer.offer.item_client_id, offer.offer.has_tier);

    if offer.is_buy {
        msg.add_u32(0x01);
        msg.add_u32(offer.offer.timestamp);
        msg.add_u16(offer.offer.counter);
        msg.add_u16(offer.offer.amount);
        msg.add_u64(offer.offer.price);
        msg.add_string(&offer.offer.player_name);
        msg.add_u32(0x00);
    } else {
        msg.add_u32(0x00);
        msg.add_u32(0x01);
        msg.add_u32(offer.offer.timestamp);
        msg.add_u16(offer.offer.counter);
        msg.add_u16(offer.offer.amount);
        msg.add_u64(offer.offer.price);
        msg.add_string(&offer.offer.player_name);
    }
    enqueue(client, &msg);
}

pub fn send_market_browse_own_offers(
    client: &ClientState,
    buy_offers: &[MarketOffer],
    sell_offers: &[MarketOffer],
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xF9);
    msg.add_byte(market::REQUEST_OWN_OFFERS);

    msg.add_u32(buy_offers.len() as u32);
    for offer in buy_offers {
        msg.add_u32(offer.timestamp);
        msg.add_u16(offer.counter);
        add_market_item_id(&mut msg, offer.item_client_id, offer.has_tier);
        msg.add_u16(offer.amount);
        msg.add_u64(offer.price);
    }

    msg.add_u32(sell_offers.len() as u32);
    for offer in sell_offers {
        msg.add_u32(offer.timestamp);
        msg.add_u16(offer.counter);
        add_market_item_id(&mut msg, offer.item_client_id, offer.has_tier);
        msg.add_u16(offer.amount);
        msg.add_u64(offer.price);
    }
    enqueue(client, &msg);
}

pub fn send_market_cancel_offer(client: &ClientState, offer: &MarketOfferEx) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xF9);
    msg.add_byte(market::REQUEST_OWN_OFFERS);

    if offer.is_buy {
        msg.add_u32(0x01);
        msg.add_u32(offer.offer.timestamp);
        msg.add_u16(offer.offer.counter);
        add_market_item_id(&mut msg, offer.offer.item_client_id, offer.offer.has_tier);
        msg.add_u16(offer.offer.amount);
        msg.add_u64(offer.offer.price);
        msg.add_u32(0x00);
    } else {
        msg.add_u32(0x00);
        msg.add_u32(0x01);
        msg.add_u32(offer.offer.timestamp);
        msg.add_u16(offer.offer.counter);
        add_market_item_id(&mut msg, offer.offer.item_client_id, offer.offer.has_tier);
        msg.add_u16(offer.offer.amount);
        msg.add_u64(offer.offer.price);
    }
    enqueue(client, &msg);
}

pub fn send_market_browse_own_history(
    client: &ClientState,
    buy_offers: &[HistoryMarketOffer],
    sell_offers: &[HistoryMarketOffer],
) {
    // Each side may borrow the other's unused headroom, capped at 810.
    let buy_to_send = buy_offers
        .len()
        .min(MARKET_HISTORY_LIMIT + MARKET_HISTORY_LIMIT.saturating_sub(sell_offers.len()));
    let sell_to_send = sell_offers
        .len()
        .min(MARKET_HISTORY_LIMIT + MARKET_HISTORY_LIMIT.saturating_sub(buy_offers.len()));

    let mut msg = NetworkMessage::new();
    msg.add_byte(0xF9);
    msg.add_byte(market::REQUEST_OWN_HISTORY);

    let mut counter_map: std::collections::HashMap<u32, u16> = std::collections::HashMap::new();

    msg.add_u32(buy_to_send as u32);
    for offer in buy_offers.iter().take(buy_to_send) {
        let counter = counter_map.entry(offer.timestamp).or_insert(0);
        msg.add_u32(offer.timestamp);
        msg.add_u16(*counter);
        *counter += 1;
        add_market_item_id(&mut msg, offer.item_client_id, offer.has_tier);
        msg.add_u16(offer.amount);
        msg.add_u64(offer.price);
        msg.add_byte(offer.state);
    }

    counter_map.clear();

    msg.add_u32(sell_to_send as u32);
    for offer in sell_offers.iter().take(sell_to_send) {
        let counter = counter_map.entry(offer.timestamp).or_insert(0);
        msg.add_u32(offer.timestamp);
        msg.add_u16(*counter);
        *counter += 1;
        add_market_item_id(&mut msg, offer.item_client_id, offer.has_tier);
        msg.add_u16(offer.amount);
        msg.add_u64(offer.price);
        msg.add_byte(offer.state);
    }
    enqueue(client, &msg);
}

// ---------------------------------------------------------------------------
// VIP, cooldowns, misc
// ---------------------------------------------------------------------------

pub fn send_vip(client: &ClientState, entry: &VipEntry, status: VipStatus) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xD2);
    msg.add_u32(entry.guid.get());
    msg.add_string(&entry.name);
    msg.add_string(&entry.description);
    msg.add_u32(entry.icon.min(10));
    msg.add_byte(if entry.notify { 0x01 } else { 0x00 });
    msg.add_byte(status as u8);
    msg.add_byte(0x00); // vip groups
    enqueue(client, &msg);
}

pub fn send_updated_vip_status(client: &ClientState, guid: otgate_core::CharacterGuid, status: VipStatus) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xD3);
    msg.add_u32(guid.get());
    msg.add_byte(status as u8);
    enqueue(client, &msg);
}

pub fn send_vip_entries(client: &ClientState, sessions: &dyn SessionStore, world: &dyn GameWorld) {
    let Some(player) = client.player.clone() else {
        return;
    };

    for entry in sessions.vip_entries(player.account_id()) {
        let online = world
            .player_by_guid(entry.guid)
            .map(|vip| player.can_see_creature(vip.id()))
            .unwrap_or(false);
        let status = if online {
            VipStatus::Online
        } else {
            VipStatus::Offline
        };
        send_vip(client, &entry, status);
    }
}

pub fn send_item_classes(client: &ClientState) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0x86);

    let class_count = 4u8;
    let tier_count = 10u8;

    msg.add_byte(class_count);
    for class_id in 0..class_count {
        msg.add_byte(class_id + 1);

        msg.add_byte(tier_count);
        for tier_id in 0..tier_count {
            msg.add_byte(tier_id);
            msg.add_u64(10_000); // upgrade cost
        }
    }

    for _ in 0..=tier_count {
        msg.add_byte(0);
    }
    enqueue(client, &msg);
}

pub fn send_spell_cooldown(client: &ClientState, spell_id: u8, millis: u32) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xA4);
    msg.add_u16(u16::from(spell_id));
    msg.add_u32(millis);
    enqueue(client, &msg);
}

pub fn send_spell_group_cooldown(client: &ClientState, group_id: u8, millis: u32) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xA5);
    msg.add_byte(group_id);
    msg.add_u32(millis);
    enqueue(client, &msg);
}

pub fn send_use_item_cooldown(client: &ClientState, millis: u32) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xA6);
    msg.add_u32(millis);
    enqueue(client, &msg);
}

pub fn send_supply_used(client: &ClientState, item_client_id: u16) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xCE);
    msg.add_u16(item_client_id);
    enqueue(client, &msg);
}

pub fn send_combat_analyzer(
    client: &ClientState,
    impact: AnalyzerImpact,
    amount: u32,
    damage_type: u8,
    target: &str,
) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xCC);
    msg.add_byte(impact as u8);
    msg.add_u32(amount);

    match impact {
        AnalyzerImpact::Received => {
            msg.add_byte(damage_type);
            msg.add_string(target);
        }
        AnalyzerImpact::Dealt => {
            msg.add_byte(damage_type);
        }
    }
    enqueue(client, &msg);
}

pub fn send_tutorial(client: &ClientState, tutorial_id: u8) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xDC);
    msg.add_byte(tutorial_id);
    enqueue(client, &msg);
}

pub fn send_add_marker(client: &ClientState, pos: Position, mark_type: u8, description: &str) {
    let mut msg = NetworkMessage::new();
    msg.add_byte(0xDD);
    msg.add_byte(0x00);
    msg.add_position(pos);
    msg.add_byte(mark_type);
    msg.add_string(description);
    enqueue(client, &msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{creature_at, queued_bytes, TestWorld};
    use otgate_core::Position;

    #[test]
    fn test_login_error_layout() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));
        send_login_error(&client, "nope");
        assert_eq!(queued_bytes(&client), vec![0x14, 0x04, 0x00, b'n', b'o', b'p', b'e']);
    }

    #[test]
    fn test_wait_list_carries_slot_and_retry() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));
        send_wait_list(&client, 3, 10);

        let bytes = queued_bytes(&client);
        assert_eq!(bytes[0], 0x16);
        let text_len = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
        let text = String::from_utf8_lossy(&bytes[3..3 + text_len]).into_owned();
        assert!(text.contains("place 3"));
        assert_eq!(bytes[3 + text_len], 10); // retry byte is last
        assert_eq!(bytes.len(), 3 + text_len + 1);
    }

    #[test]
    fn test_session_end_reason_byte() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));
        send_session_end(&client, SessionEndReason::ForceClose);
        assert_eq!(queued_bytes(&client), vec![0x18, 0x02]);
    }

    #[test]
    fn test_stats_packet_is_fixed_size() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));
        let stats = PlayerStats {
            health: 150,
            max_health: 150,
            free_capacity: 4700,
            experience: 4200,
            level: 8,
            level_percent: 42,
            mana: 90,
            max_mana: 90,
            soul: 100,
            stamina_minutes: 2520,
            base_speed: 220,
            ..PlayerStats::default()
        };
        send_stats(&client, &stats);

        let bytes = queued_bytes(&client);
        assert_eq!(bytes[0], 0xA0);
        // opcode + 3*u32 + u64 + u16 + u8 + 4*u16 + 2*u32 + u8 + 5*u16 +
        // u8 + 2*u32 = 60 bytes
        assert_eq!(bytes.len(), 60);
        assert_eq!(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 150);
    }

    #[test]
    fn test_magic_effect_is_visibility_gated() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));

        // Below ground is out of sight for a surface observer.
        send_magic_effect(&client, Position::new(100, 100, 8), 13);
        assert!(queued_bytes(&client).is_empty());

        send_magic_effect(&client, Position::new(102, 101, 7), 13);
        let bytes = queued_bytes(&client);
        assert_eq!(bytes[0], 0x83);
        assert_eq!(bytes[7], 13); // effect id after opcode + position + marker
    }

    #[test]
    fn test_creature_events_gated_by_creature_visibility() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));

        let far = creature_at(9, Position::new(500, 500, 7));
        send_creature_square(&client, &far, 2);
        assert!(queued_bytes(&client).is_empty());

        let near = creature_at(9, Position::new(101, 101, 7));
        send_creature_square(&client, &near, 2);
        let bytes = queued_bytes(&client);
        assert_eq!(bytes[0], 0x93);
        assert_eq!(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 9);
    }

    #[test]
    fn test_skull_only_broadcast_on_pvp_worlds() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));
        let near = creature_at(5, Position::new(101, 101, 7));

        send_creature_skull(&client, WorldType::NoPvp, &near);
        assert!(queued_bytes(&client).is_empty());

        send_creature_skull(&client, WorldType::Pvp, &near);
        assert_eq!(queued_bytes(&client)[0], 0x90);
    }

    #[test]
    fn test_statement_ids_are_monotonic() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));
        let speaker = creature_at(11, Position::new(101, 100, 7));

        send_creature_say(&client, &speaker, 1, "hello", None);
        send_creature_say(&client, &speaker, 1, "again", None);

        let bytes = queued_bytes(&client);
        let first = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        // Locate the second packet: 0xAA + u32 + string(name) + ...
        let name_len = u16::from_le_bytes([bytes[5], bytes[6]]) as usize;
        let second_start = 1 + 4 + 2 + name_len + 1 + 2 + 1 + 5 + 2 + 5;
        assert_eq!(bytes[second_start], 0xAA);
        let second = u32::from_le_bytes([
            bytes[second_start + 1],
            bytes[second_start + 2],
            bytes[second_start + 3],
            bytes[second_start + 4],
        ]);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn test_sale_list_small_shop_uses_direct_scan() {
        let world = TestWorld::new();
        let mut client = world.client_with_player(Position::new(100, 100, 7));
        // Swap in a stocked player.
        let mut player = crate::testutil::TestPlayer::new(77, Position::new(100, 100, 7));
        player.item_counts = vec![(2148, 30), (2674, 4)];
        client.player = Some(std::sync::Arc::new(player));

        let shop = vec![
            ShopEntry {
                item_id: 2148,
                client_id: 3031,
                name: "gold coin".into(),
                weight: 10,
                buy_price: 0,
                sell_price: 1,
                subtype: 0,
                has_subtype: false,
                fluid_subtype: None,
            },
            ShopEntry {
                item_id: 2674,
                client_id: 3586,
                name: "red apple".into(),
                weight: 50,
                buy_price: 3,
                sell_price: 1,
                subtype: 0,
                has_subtype: false,
                fluid_subtype: None,
            },
        ];
        send_sale_item_list(&client, 1000, 50, &shop);

        let bytes = queued_bytes(&client);
        // Two resource-balance packets precede the sale list.
        assert_eq!(bytes[0], 0xEE);
        let sale_start = 2 * (1 + 1 + 8);
        assert_eq!(bytes[sale_start], 0x7B);
        assert_eq!(bytes[sale_start + 1], 2); // both entries sellable
    }

    #[test]
    fn test_market_history_caps_and_redistributes() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));

        let offer = |ts: u32| HistoryMarketOffer {
            timestamp: ts,
            item_client_id: 3031,
            has_tier: false,
            amount: 1,
            price: 100,
            state: 0,
        };
        // 900 buys vs 100 sells: sells leave 710 headroom, so 810 + 90 not
        // needed; buys send min(900, 810 + 710) = 900.
        let buys: Vec<_> = (0..900).map(|i| offer(i)).collect();
        let sells: Vec<_> = (0..100).map(|i| offer(i)).collect();
        send_market_browse_own_history(&client, &buys, &sells);

        let bytes = queued_bytes(&client);
        assert_eq!(bytes[0], 0xF9);
        assert_eq!(bytes[1], market::REQUEST_OWN_HISTORY);
        let buy_count = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        assert_eq!(buy_count, 900);
    }

    #[test]
    fn test_items_list_prefixes_eleven_slots() {
        let world = TestWorld::new();
        let client = world.client_with_player(Position::new(100, 100, 7));
        send_items(&client, &[(3031, 100), (3586, 2)]);

        let bytes = queued_bytes(&client);
        assert_eq!(bytes[0], 0xF5);
        assert_eq!(u16::from_le_bytes([bytes[1], bytes[2]]), 13);
        // First fixed row: slot 1, 0, count 1.
        assert_eq!(u16::from_le_bytes([bytes[3], bytes[4]]), 1);
        assert_eq!(bytes[5], 0);
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 1);
    }
}
