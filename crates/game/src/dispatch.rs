//! Inbound command dispatch
//!
//! One deciphered payload at a time, on the game thread. The first byte
//! selects a parser; parsers decode the remaining fields, validate bounds
//! and invoke the matching operation on the game façade. A parser that runs
//! past the end of the buffer leaves it overrun, which detaches the
//! connection after the parse returns.

use std::sync::Arc;

use otgate_core::{CharacterGuid, CreatureId, Direction, GameState, Outfit};
use otgate_network::Connection;
use otgate_protocol::{opcodes, NetworkMessage};

use crate::client::{detach, logout};
use crate::context::GameContext;
use crate::facade::{market, report, talk, FightModes, GameWorld, Player};

/// Longest accepted chat line.
const MAX_SAY_LENGTH: usize = 255;

pub fn parse_packet(ctx: &mut GameContext, connection: &Arc<Connection>, payload: &[u8]) {
    let mut input = NetworkMessage::from_payload(payload);
    if !input.can_read(1) || ctx.world.game_state() == GameState::Shutdown {
        return;
    }

    let command = input.get_byte();

    let player = ctx
        .clients
        .get(&connection.id)
        .and_then(|client| client.player.clone());

    let player = match player {
        None => {
            detach(ctx, connection);
            return;
        }
        Some(player) if player.is_dead() || player.is_removed() => {
            if command == opcodes::ENTER_WORLD {
                detach(ctx, connection);
            } else if command == opcodes::LOGOUT {
                logout(ctx, connection, true, false);
            }
            return;
        }
        Some(player) => player,
    };

    dispatch_command(ctx, connection, &player, command, &mut input);

    if input.is_overrun() {
        tracing::warn!(
            "connection {}: command {:#04x} overran its payload",
            connection.id,
            command
        );
        detach(ctx, connection);
    }
}

fn dispatch_command(
    ctx: &mut GameContext,
    connection: &Arc<Connection>,
    player: &Arc<dyn Player>,
    command: u8,
    input: &mut NetworkMessage,
) {
    let world = ctx.world.as_ref();
    match command {
        opcodes::LOGOUT => logout(ctx, connection, true, false),
        opcodes::PING_BACK => world.receive_ping_back(player),
        opcodes::PING => world.receive_ping(player),
        opcodes::EXTENDED_OPCODE => parse_extended_opcode(world, player, input),

        opcodes::AUTO_WALK => parse_auto_walk(ctx, connection, player, input),
        opcodes::WALK_NORTH => world.walk(player, Direction::North),
        opcodes::WALK_EAST => world.walk(player, Direction::East),
        opcodes::WALK_SOUTH => world.walk(player, Direction::South),
        opcodes::WALK_WEST => world.walk(player, Direction::West),
        opcodes::STOP_AUTO_WALK => world.stop_auto_walk(player),
        opcodes::WALK_NORTHEAST => world.walk(player, Direction::NorthEast),
        opcodes::WALK_SOUTHEAST => world.walk(player, Direction::SouthEast),
        opcodes::WALK_SOUTHWEST => world.walk(player, Direction::SouthWest),
        opcodes::WALK_NORTHWEST => world.walk(player, Direction::NorthWest),
        opcodes::TURN_NORTH => world.turn(player, Direction::North),
        opcodes::TURN_EAST => world.turn(player, Direction::East),
        opcodes::TURN_SOUTH => world.turn(player, Direction::South),
        opcodes::TURN_WEST => world.turn(player, Direction::West),

        opcodes::EQUIP_OBJECT => parse_equip_object(world, player, input),
        opcodes::THROW => parse_throw(world, player, input),
        opcodes::LOOK_IN_SHOP => parse_look_in_shop(world, player, input),
        opcodes::SHOP_PURCHASE => parse_purchase(world, player, input),
        opcodes::SHOP_SALE => parse_sale(world, player, input),
        opcodes::CLOSE_SHOP => world.close_shop(player),
        opcodes::REQUEST_TRADE => parse_request_trade(world, player, input),
        opcodes::LOOK_IN_TRADE => parse_look_in_trade(world, player, input),
        opcodes::ACCEPT_TRADE => world.accept_trade(player),
        opcodes::CLOSE_TRADE => world.close_trade(player),
        opcodes::USE_ITEM => parse_use_item(world, player, input),
        opcodes::USE_ITEM_EX => parse_use_item_ex(world, player, input),
        opcodes::USE_WITH_CREATURE => parse_use_with_creature(world, player, input),
        opcodes::ROTATE_ITEM => parse_rotate_item(world, player, input),
        opcodes::EDIT_PODIUM => parse_edit_podium_request(world, player, input),
        opcodes::CLOSE_CONTAINER => world.close_container(player, input.get_byte()),
        opcodes::UP_ARROW_CONTAINER => world.move_up_container(player, input.get_byte()),
        opcodes::TEXT_WINDOW => parse_text_window(world, player, input),
        opcodes::HOUSE_WINDOW => parse_house_window(world, player, input),
        opcodes::WRAP_ITEM => parse_wrap_item(world, player, input),
        opcodes::LOOK_AT => parse_look_at(world, player, input),
        opcodes::LOOK_IN_BATTLE_LIST => {
            let creature = CreatureId::new(input.get_u32());
            world.look_in_battle_list(player, creature);
        }
        opcodes::JOIN_AGGRESSION => {}
        opcodes::QUICK_LOOT => parse_quick_loot(world, player, input),

        opcodes::SAY => parse_say(world, player, input),
        opcodes::REQUEST_CHANNELS => world.request_channels(player),
        opcodes::OPEN_CHANNEL => world.open_channel(player, input.get_u16()),
        opcodes::CLOSE_CHANNEL => world.close_channel(player, input.get_u16()),
        opcodes::OPEN_PRIVATE_CHANNEL => {
            let receiver = input.get_string();
            world.open_private_channel(player, receiver);
        }
        opcodes::CLOSE_NPC_CHANNEL => world.close_npc_channel(player),

        opcodes::FIGHT_MODES => parse_fight_modes(world, player, input),
        opcodes::ATTACK => {
            let creature = CreatureId::new(input.get_u32());
            input.get_u32(); // target sequence
            world.attack(player, creature);
        }
        opcodes::FOLLOW => {
            let creature = CreatureId::new(input.get_u32());
            input.get_u32(); // target sequence
            world.follow(player, creature);
        }
        opcodes::INVITE_TO_PARTY => world.invite_to_party(player, CreatureId::new(input.get_u32())),
        opcodes::JOIN_PARTY => world.join_party(player, CreatureId::new(input.get_u32())),
        opcodes::REVOKE_PARTY_INVITE => {
            world.revoke_party_invite(player, CreatureId::new(input.get_u32()));
        }
        opcodes::PASS_PARTY_LEADERSHIP => {
            world.pass_party_leadership(player, CreatureId::new(input.get_u32()));
        }
        opcodes::LEAVE_PARTY => world.leave_party(player),
        opcodes::SHARE_PARTY_EXPERIENCE => {
            world.enable_shared_party_experience(player, input.get_byte() == 1);
        }
        opcodes::CREATE_PRIVATE_CHANNEL => world.create_private_channel(player),
        opcodes::CHANNEL_INVITE => {
            let name = input.get_string();
            world.channel_invite(player, name);
        }
        opcodes::CHANNEL_EXCLUDE => {
            let name = input.get_string();
            world.channel_exclude(player, name);
        }
        opcodes::CANCEL_ATTACK_AND_FOLLOW => world.cancel_attack_and_follow(player),

        opcodes::UPDATE_TILE => {}
        opcodes::UPDATE_CONTAINER => world.update_container(player, input.get_byte()),
        opcodes::BROWSE_FIELD => {
            let pos = input.get_position();
            world.browse_field(player, pos);
        }
        opcodes::SEEK_IN_CONTAINER => {
            let container_id = input.get_byte();
            let index = input.get_u16();
            world.seek_in_container(player, container_id, index);
        }

        opcodes::REQUEST_OUTFIT => world.request_outfit(player),
        opcodes::SET_OUTFIT => parse_set_outfit(world, player, input),
        opcodes::ADD_VIP => {
            let name = input.get_string();
            world.add_vip(player, name);
        }
        opcodes::REMOVE_VIP => world.remove_vip(player, CharacterGuid::new(input.get_u32())),
        opcodes::EDIT_VIP => parse_edit_vip(world, player, input),

        opcodes::THANK_YOU => {}
        opcodes::DEBUG_ASSERT => parse_debug_assert(ctx, connection, player, input),
        opcodes::RULE_VIOLATION => parse_rule_violation(world, player, input),
        opcodes::GET_OBJECT_INFO => {}
        opcodes::MARKET_LEAVE => world.market_leave(player),
        opcodes::MARKET_BROWSE => parse_market_browse(world, player, input),
        opcodes::MARKET_CREATE_OFFER => parse_market_create_offer(world, player, input),
        opcodes::MARKET_CANCEL_OFFER => {
            let timestamp = input.get_u32();
            let counter = input.get_u16();
            world.market_cancel_offer(player, timestamp, counter);
        }
        opcodes::MARKET_ACCEPT_OFFER => {
            let timestamp = input.get_u32();
            let counter = input.get_u16();
            let amount = input.get_u16();
            world.market_accept_offer(player, timestamp, counter, amount);
        }
        opcodes::MODAL_WINDOW_ANSWER => {
            let window_id = input.get_u32();
            let button = input.get_byte();
            let choice = input.get_byte();
            world.answer_modal_window(player, window_id, button, choice);
        }

        _ => world.unhandled_command(player, command, input.remaining()),
    }
}

fn parse_extended_opcode(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let opcode = input.get_byte();
    let buffer = input.get_string();
    world.extended_opcode(player, opcode, buffer);
}

fn parse_auto_walk(
    ctx: &mut GameContext,
    connection: &Arc<Connection>,
    player: &Arc<dyn Player>,
    input: &mut NetworkMessage,
) {
    let step_count = input.get_byte() as usize;
    if !input.can_read(step_count) {
        if let Some(client) = ctx.clients.get(&connection.id) {
            crate::send::send_cancel_walk(client, player.direction());
        }
        return;
    }

    let mut path = Vec::with_capacity(step_count);
    for _ in 0..step_count {
        if let Some(direction) = Direction::from_path_step(input.get_byte()) {
            path.push(direction);
        }
    }

    if !path.is_empty() {
        path.reverse();
        ctx.world.auto_walk(player, path);
    }
}

fn parse_equip_object(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let sprite_id = input.get_u16();
    input.get_byte(); // smart-equip mode
    world.equip_object(player, sprite_id);
}

fn parse_throw(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let from = input.get_position();
    let sprite_id = input.get_u16();
    let from_stackpos = input.get_byte();
    let to = input.get_position();
    let count = input.get_byte();

    if to != from {
        world.move_thing(player, from, sprite_id, from_stackpos, to, count);
    }
}

fn parse_look_in_shop(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let item_id = input.get_u16();
    let count = input.get_byte();
    world.look_in_shop(player, item_id, count);
}

fn parse_purchase(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let item_id = input.get_u16();
    let count = input.get_byte();
    let amount = input.get_u16();
    let ignore_cap = input.get_byte() != 0;
    let in_backpacks = input.get_byte() != 0;
    world.purchase_item(player, item_id, count, amount, ignore_cap, in_backpacks);
}

fn parse_sale(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let item_id = input.get_u16();
    let count = input.get_byte();
    let amount = input.get_u16();
    let ignore_equipped = input.get_byte() != 0;
    world.sell_item(player, item_id, count, amount, ignore_equipped);
}

fn parse_request_trade(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let pos = input.get_position();
    let sprite_id = input.get_u16();
    let stackpos = input.get_byte();
    let partner = CreatureId::new(input.get_u32());
    world.request_trade(player, pos, stackpos, partner, sprite_id);
}

fn parse_look_in_trade(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let counter_offer = input.get_byte() == 0x01;
    let index = input.get_byte();
    world.look_in_trade(player, counter_offer, index);
}

fn parse_use_item(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let pos = input.get_position();
    let sprite_id = input.get_u16();
    let stackpos = input.get_byte();
    let index = input.get_byte();
    world.use_item(player, pos, stackpos, index, sprite_id);
}

fn parse_use_item_ex(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let from = input.get_position();
    let from_sprite_id = input.get_u16();
    let from_stackpos = input.get_byte();
    let to = input.get_position();
    let to_sprite_id = input.get_u16();
    let to_stackpos = input.get_byte();
    world.use_item_ex(
        player,
        from,
        from_stackpos,
        from_sprite_id,
        to,
        to_stackpos,
        to_sprite_id,
    );
}

fn parse_use_with_creature(
    world: &dyn GameWorld,
    player: &Arc<dyn Player>,
    input: &mut NetworkMessage,
) {
    let from = input.get_position();
    let sprite_id = input.get_u16();
    let from_stackpos = input.get_byte();
    let creature = CreatureId::new(input.get_u32());
    world.use_with_creature(player, from, from_stackpos, creature, sprite_id);
}

fn parse_rotate_item(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let pos = input.get_position();
    let sprite_id = input.get_u16();
    let stackpos = input.get_byte();
    world.rotate_item(player, pos, stackpos, sprite_id);
}

fn parse_edit_podium_request(
    world: &dyn GameWorld,
    player: &Arc<dyn Player>,
    input: &mut NetworkMessage,
) {
    let pos = input.get_position();
    let sprite_id = input.get_u16();
    let stackpos = input.get_byte();
    world.request_edit_podium(player, pos, stackpos, sprite_id);
}

fn parse_text_window(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let window_id = input.get_u32();
    let text = input.get_string();
    world.write_item(player, window_id, text);
}

fn parse_house_window(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let door_id = input.get_byte();
    let window_id = input.get_u32();
    let text = input.get_string();
    world.update_house_window(player, door_id, window_id, text);
}

fn parse_wrap_item(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let pos = input.get_position();
    let sprite_id = input.get_u16();
    let stackpos = input.get_byte();
    world.wrap_item(player, pos, stackpos, sprite_id);
}

fn parse_look_at(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let pos = input.get_position();
    input.get_u16(); // sprite id
    let stackpos = input.get_byte();
    world.look_at(player, pos, stackpos);
}

fn parse_quick_loot(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let pos = input.get_position();
    let sprite_id = input.get_u16();
    let stackpos = input.get_byte();
    let loot_all_corpses = input.get_byte() != 0;
    world.quick_loot(player, pos, stackpos, sprite_id, loot_all_corpses);
}

fn parse_say(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let kind = input.get_byte();

    let mut receiver = String::new();
    let mut channel_id = 0u16;
    match kind {
        talk::PRIVATE_TO | talk::PRIVATE_RED_TO => receiver = input.get_string(),
        talk::CHANNEL_Y | talk::CHANNEL_R1 => channel_id = input.get_u16(),
        _ => {}
    }

    let text = input.get_string();
    if text.len() > MAX_SAY_LENGTH {
        return;
    }

    world.say(player, channel_id, kind, receiver, text);
}

fn parse_fight_modes(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let raw_fight = input.get_byte(); // 1 offensive, 2 balanced, 3 defensive
    let chase = input.get_byte();
    let secure = input.get_byte();

    let fight = match raw_fight {
        1 | 2 => raw_fight,
        _ => 3,
    };
    world.set_fight_modes(
        player,
        FightModes {
            fight,
            chase,
            secure,
        },
    );
}

fn parse_set_outfit(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let outfit_type = input.get_byte();

    let mut outfit = Outfit {
        look_type: input.get_u16(),
        head: input.get_byte(),
        body: input.get_byte(),
        legs: input.get_byte(),
        feet: input.get_byte(),
        addons: input.get_byte(),
        ..Outfit::default()
    };

    match outfit_type {
        // Regular outfit window.
        0 => {
            outfit.mount = input.get_u16();
            if outfit.mount != 0 {
                outfit.mount_head = input.get_byte();
                outfit.mount_body = input.get_byte();
                outfit.mount_legs = input.get_byte();
                outfit.mount_feet = input.get_byte();
            } else {
                input.get_u32(); // discarded mount colors
            }

            input.get_u16(); // familiar look type
            let randomize_mount = input.get_byte() == 0x01;
            world.change_outfit(player, outfit, randomize_mount);
        }
        // Store try-outfit window; nothing to apply.
        1 => {
            input.get_byte();
            input.get_byte();
            input.get_byte();
            input.get_byte();
        }
        // Podium interaction.
        2 => {
            let pos = input.get_position();
            let sprite_id = input.get_u16();
            let stackpos = input.get_byte();
            outfit.mount = input.get_u16();
            outfit.mount_head = input.get_byte();
            outfit.mount_body = input.get_byte();
            outfit.mount_legs = input.get_byte();
            outfit.mount_feet = input.get_byte();
            let direction = match input.get_byte() {
                0 => Direction::North,
                1 => Direction::East,
                3 => Direction::West,
                _ => Direction::South,
            };
            let visible = input.get_byte() == 1;
            world.edit_podium(player, outfit, pos, stackpos, sprite_id, visible, direction);
        }
        _ => {}
    }
}

fn parse_edit_vip(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let guid = CharacterGuid::new(input.get_u32());
    let description = input.get_string();
    let icon = input.get_u32().min(10);
    let notify = input.get_byte() != 0;
    world.edit_vip(player, guid, description, icon, notify);
}

fn parse_debug_assert(
    ctx: &mut GameContext,
    connection: &Arc<Connection>,
    player: &Arc<dyn Player>,
    input: &mut NetworkMessage,
) {
    // Only the first report per connection is forwarded.
    let Some(client) = ctx.clients.get_mut(&connection.id) else {
        return;
    };
    if client.debug_assert_received {
        return;
    }
    client.debug_assert_received = true;

    let assert_line = input.get_string();
    let date = input.get_string();
    let description = input.get_string();
    let comment = input.get_string();
    ctx.world
        .debug_assert(player, assert_line, date, description, comment);
}

fn parse_rule_violation(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let report_type = input.get_byte();
    let reason = input.get_byte();
    let target_name = input.get_string();
    let comment = input.get_string();
    let translation = match report_type {
        report::TYPE_NAME => input.get_string(),
        report::TYPE_STATEMENT => {
            let translation = input.get_string();
            input.get_u32(); // statement id, not logged
            translation
        }
        _ => String::new(),
    };
    world.report_rule_violation(player, target_name, report_type, reason, comment, translation);
}

fn parse_market_browse(world: &dyn GameWorld, player: &Arc<dyn Player>, input: &mut NetworkMessage) {
    let browse_id = input.get_byte();
    if browse_id == market::REQUEST_OWN_OFFERS {
        world.market_browse_own_offers(player);
    } else if browse_id == market::REQUEST_OWN_HISTORY {
        world.market_browse_own_history(player);
    } else {
        let sprite_id = input.get_u16();
        world.market_browse(player, sprite_id);
    }
}

fn parse_market_create_offer(
    world: &dyn GameWorld,
    player: &Arc<dyn Player>,
    input: &mut NetworkMessage,
) {
    let offer_type = input.get_byte();
    let sprite_id = input.get_u16();

    // Unknown or unmarketable item types end the parse here.
    let Some(has_tier) = world.market_offer_tier_expected(sprite_id) else {
        return;
    };
    if has_tier {
        input.get_byte(); // item tier
    }

    let amount = input.get_u16();
    let price = input.get_u64();
    let anonymous = input.get_byte() != 0;
    world.market_create_offer(player, offer_type, sprite_id, amount, price, anonymous);
}
