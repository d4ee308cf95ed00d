//! Viewport and delta descriptions
//!
//! Everything a client learns about the map flows through here: the
//! visibility predicates, tile/floor/map descriptions with run-length
//! encoded gaps, creature introductions against the per-connection
//! known-creature set, and the floor-change strips sent when the controlled
//! player moves between layers.

use std::sync::Arc;

use otgate_core::{CreatureId, CreatureKind, Outfit, Position};
use otgate_protocol::NetworkMessage;

use crate::client::{ClientState, KNOWN_CREATURE_LIMIT};
use crate::facade::{CreatureView, GameWorld, Player, TileView};

/// Half-extent of the client viewport around the player.
pub const VIEWPORT_X: i32 = 8;
pub const VIEWPORT_Y: i32 = 6;

/// Number of Z layers in the map.
pub const MAP_MAX_LAYERS: i32 = 16;

/// Things the client can address by stack position within one tile.
pub const MAX_STACKPOS: usize = 10;

/// Whether `pos` lies inside the window an observer at `observer` can see.
///
/// Above ground (`z <= 7`) nothing below ground is visible; underground the
/// observer sees at most two layers up or down. The layer difference shifts
/// the XY window by one tile per layer.
pub fn can_see_position(observer: Position, pos: Position) -> bool {
    let z_offset = observer.z as i32 - pos.z as i32;
    if observer.z <= 7 && pos.z > 7 {
        return false;
    }
    if observer.z >= 8 && z_offset.abs() > 2 {
        return false;
    }

    let x = pos.x as i32;
    let y = pos.y as i32;
    let ox = observer.x as i32;
    let oy = observer.y as i32;
    x >= ox - VIEWPORT_X + z_offset
        && x <= ox + VIEWPORT_X + z_offset
        && y >= oy - VIEWPORT_Y + z_offset
        && y <= oy + VIEWPORT_Y + z_offset
}

/// Position visibility plus the game-side judgement about the creature.
pub fn can_see_creature(client: &ClientState, view: &CreatureView) -> bool {
    match &client.player {
        Some(player) => visible_to(player, view),
        None => false,
    }
}

fn visible_to(player: &Arc<dyn Player>, view: &CreatureView) -> bool {
    !view.removed
        && player.can_see_creature(view.id)
        && can_see_position(player.position(), view.position)
}

fn tile_at(world: &dyn GameWorld, x: i32, y: i32, z: i32) -> Option<TileView> {
    if x < 0 || x > u16::MAX as i32 || y < 0 || y > u16::MAX as i32 || !(0..MAP_MAX_LAYERS).contains(&z)
    {
        return None;
    }
    world.tile_at(Position::new(x as u16, y as u16, z as u8))
}

/// Creature appearance fields shared by the 0x61 and 0x62 forms.
pub fn add_outfit(msg: &mut NetworkMessage, outfit: &Outfit) {
    msg.add_u16(outfit.look_type);
    if outfit.look_type != 0 {
        msg.add_byte(outfit.head);
        msg.add_byte(outfit.body);
        msg.add_byte(outfit.legs);
        msg.add_byte(outfit.feet);
        msg.add_byte(outfit.addons);
    } else {
        msg.add_u16(outfit.look_item);
    }

    msg.add_u16(outfit.mount);
    if outfit.mount != 0 {
        msg.add_byte(outfit.mount_head);
        msg.add_byte(outfit.mount_body);
        msg.add_byte(outfit.mount_legs);
        msg.add_byte(outfit.mount_feet);
    }
}

fn add_creature_icons(msg: &mut NetworkMessage, view: &CreatureView) {
    msg.add_byte(view.icons.len().min(u8::MAX as usize) as u8);
    for icon in &view.icons {
        msg.add_byte(icon.icon);
        msg.add_byte(icon.category);
        msg.add_u16(icon.value);
    }
}

/// Track `creature_id` in the bounded known set. Returns `(newly_known,
/// remove_id)`. When the set is full, the first id whose creature is no
/// longer visible is replaced and reported as `remove_id`; with no such
/// slot the creature cannot be introduced and the client stays slightly
/// desynchronized, which the session tolerates.
fn make_creature_known(
    client: &mut ClientState,
    world: &dyn GameWorld,
    creature_id: CreatureId,
) -> (bool, CreatureId) {
    if client.known_creatures.contains(&creature_id) {
        return (false, CreatureId::new(0));
    }

    let Some(player) = client.player.clone() else {
        return (false, CreatureId::new(0));
    };

    if client.known_creatures.len() >= KNOWN_CREATURE_LIMIT {
        for known in client.known_creatures.iter_mut() {
            let still_visible = world
                .creature(*known)
                .map(|view| visible_to(&player, &view))
                .unwrap_or(false);
            if !still_visible {
                let removed = *known;
                *known = creature_id;
                return (true, removed);
            }
        }
        (false, CreatureId::new(0))
    } else {
        client.known_creatures.push(creature_id);
        (true, CreatureId::new(0))
    }
}

/// Resolve the wire creature kind relative to the observer and the summon
/// master, if any.
fn kind_for_observer(view: &CreatureView, observer: CreatureId) -> (CreatureKind, Option<CreatureId>) {
    if view.kind == CreatureKind::Monster {
        if let Some(master) = view.master {
            let kind = if master == observer {
                CreatureKind::SummonOwn
            } else {
                CreatureKind::SummonOthers
            };
            return (kind, Some(master));
        }
    }
    (view.kind, view.master)
}

/// Describe a creature, introducing it (0x61, with the id to evict) the
/// first time and referencing it as known (0x62) afterwards.
pub fn add_creature(
    client: &mut ClientState,
    world: &dyn GameWorld,
    msg: &mut NetworkMessage,
    view: &CreatureView,
    force_update: bool,
) {
    let Some(player) = client.player.clone() else {
        return;
    };

    let (kind, master) = kind_for_observer(view, player.id());
    let (mut newly_known, mut remove_id) = make_creature_known(client, world, view.id);
    if !newly_known && force_update {
        newly_known = true;
        remove_id = view.id;
    }

    if !newly_known {
        msg.add_u16(0x62);
        msg.add_u32(view.id.get());
    } else {
        msg.add_u16(0x61);
        msg.add_u32(remove_id.get());
        msg.add_u32(view.id.get());
        let kind_byte = if view.health_hidden {
            CreatureKind::Hidden.client_byte()
        } else {
            kind.client_byte()
        };
        msg.add_byte(kind_byte);
        if kind == CreatureKind::SummonOwn {
            msg.add_u32(master.map(|id| CreatureId::get(&id)).unwrap_or(0));
        }
        msg.add_string(if view.health_hidden { "" } else { &view.name });
    }

    msg.add_byte(if view.health_hidden {
        0
    } else {
        view.health_percent
    });
    msg.add_byte(view.direction.client_byte());

    if !view.ghost {
        add_outfit(msg, &view.outfit);
    } else {
        add_outfit(msg, &Outfit::default());
    }

    msg.add_byte(if player.is_access_player() {
        0xFF
    } else {
        view.light.level
    });
    msg.add_byte(view.light.color);

    msg.add_u16(view.step_speed / 2);

    add_creature_icons(msg, view);

    msg.add_byte(player.skull_of(view.id) as u8);
    msg.add_byte(player.party_shield_of(view.id) as u8);

    if newly_known {
        msg.add_byte(player.guild_emblem_of(view.id) as u8);
    }

    let kind_byte = if view.health_hidden {
        CreatureKind::Hidden.client_byte()
    } else {
        kind.client_byte()
    };
    msg.add_byte(kind_byte);
    if kind == CreatureKind::SummonOwn {
        msg.add_u32(master.map(|id| CreatureId::get(&id)).unwrap_or(0));
    }

    if kind == CreatureKind::Player {
        msg.add_byte(view.vocation_client_id);
    }

    msg.add_byte(view.speech_bubble as u8);

    msg.add_byte(0xFF); // unmarked
    msg.add_byte(0x00); // inspection

    msg.add_byte(if player.can_walk_through(view.id) {
        0x00
    } else {
        0x01
    });
}

/// Describe one tile: ground, top items, creatures in reverse order, then
/// down items, capped at [`MAX_STACKPOS`] things.
pub fn get_tile_description(
    client: &mut ClientState,
    world: &dyn GameWorld,
    msg: &mut NetworkMessage,
    tile: &TileView,
) {
    let mut count = 0usize;
    if let Some(ground) = tile.ground {
        ground.encode(msg);
        count = 1;
    }

    for item in &tile.top_items {
        item.encode(msg);
        count += 1;
        if count == MAX_STACKPOS {
            break;
        }
    }

    let player = client.player.clone();
    for creature_id in tile.creatures.iter().rev() {
        let Some(view) = world.creature(*creature_id) else {
            continue;
        };
        let visible = player
            .as_ref()
            .map(|p| p.can_see_creature(view.id))
            .unwrap_or(false);
        if !visible {
            continue;
        }
        add_creature(client, world, msg, &view, false);
        count += 1;
    }

    if count < MAX_STACKPOS {
        for item in &tile.down_items {
            item.encode(msg);
            count += 1;
            if count == MAX_STACKPOS {
                return;
            }
        }
    }
}

/// Describe one floor of a `width x height` window, run-length encoding
/// missing tiles: runs emit `(skip, 0xFF)` and are flushed at 255.
pub fn get_floor_description(
    client: &mut ClientState,
    world: &dyn GameWorld,
    msg: &mut NetworkMessage,
    x: i32,
    y: i32,
    z: i32,
    width: i32,
    height: i32,
    offset: i32,
    skip: &mut i32,
) {
    for nx in 0..width {
        for ny in 0..height {
            match tile_at(world, x + nx + offset, y + ny + offset, z) {
                Some(tile) => {
                    if *skip >= 0 {
                        msg.add_byte(*skip as u8);
                        msg.add_byte(0xFF);
                    }
                    *skip = 0;
                    get_tile_description(client, world, msg, &tile);
                }
                None => {
                    if *skip == 0xFE {
                        msg.add_byte(0xFF);
                        msg.add_byte(0xFF);
                        *skip = -1;
                    } else {
                        *skip += 1;
                    }
                }
            }
        }
    }
}

/// Describe the visible floor stack for a window anchored at `(x, y)`:
/// surface views walk layers 7 down to 0, underground views the two layers
/// around the observer, each with the per-floor XY offset.
pub fn get_map_description(
    client: &mut ClientState,
    world: &dyn GameWorld,
    msg: &mut NetworkMessage,
    x: i32,
    y: i32,
    z: u8,
    width: i32,
    height: i32,
) {
    let mut skip = -1i32;
    let (start_z, end_z, z_step) = if z > 7 {
        (
            z as i32 - 2,
            (MAP_MAX_LAYERS - 1).min(z as i32 + 2),
            1i32,
        )
    } else {
        (7, 0, -1i32)
    };

    let mut nz = start_z;
    while nz != end_z + z_step {
        get_floor_description(
            client,
            world,
            msg,
            x,
            y,
            nz,
            width,
            height,
            z as i32 - nz,
            &mut skip,
        );
        nz += z_step;
    }

    if skip >= 0 {
        msg.add_byte(skip as u8);
        msg.add_byte(0xFF);
    }
}

/// Floor-change delta when the controlled player moves a layer up:
/// marker 0xBE, newly visible layers, then west and north strips at the
/// destination layer.
pub fn move_up_creature(
    client: &mut ClientState,
    world: &dyn GameWorld,
    msg: &mut NetworkMessage,
    creature: CreatureId,
    new_pos: Position,
    old_pos: Position,
) {
    if client.player_id() != Some(creature) {
        return;
    }

    msg.add_byte(0xBE);

    let ox = old_pos.x as i32;
    let oy = old_pos.y as i32;
    let width = VIEWPORT_X * 2 + 2;
    let height = VIEWPORT_Y * 2 + 2;

    if new_pos.z == 7 {
        // Surfacing: layers 7 and 6 are already known to the client.
        let mut skip = -1i32;
        for i in (0..=5).rev() {
            get_floor_description(
                client,
                world,
                msg,
                ox - VIEWPORT_X,
                oy - VIEWPORT_Y,
                i,
                width,
                height,
                8 - i,
                &mut skip,
            );
        }
        if skip >= 0 {
            msg.add_byte(skip as u8);
            msg.add_byte(0xFF);
        }
    } else if new_pos.z > 7 {
        // Still underground: one new layer scrolls into view.
        let mut skip = -1i32;
        get_floor_description(
            client,
            world,
            msg,
            ox - VIEWPORT_X,
            oy - VIEWPORT_Y,
            old_pos.z as i32 - 3,
            width,
            height,
            3,
            &mut skip,
        );
        if skip >= 0 {
            msg.add_byte(skip as u8);
            msg.add_byte(0xFF);
        }
    }

    // The vertical shift desynchronizes the window; refresh its edges.
    msg.add_byte(0x68); // west strip
    get_map_description(
        client,
        world,
        msg,
        ox - VIEWPORT_X,
        oy - (VIEWPORT_Y - 1),
        new_pos.z,
        1,
        height,
    );

    msg.add_byte(0x65); // north strip
    get_map_description(
        client,
        world,
        msg,
        ox - VIEWPORT_X,
        oy - VIEWPORT_Y,
        new_pos.z,
        width,
        1,
    );
}

/// Floor-change delta when the controlled player moves a layer down:
/// marker 0xBF, newly visible layers, then east and south strips.
pub fn move_down_creature(
    client: &mut ClientState,
    world: &dyn GameWorld,
    msg: &mut NetworkMessage,
    creature: CreatureId,
    new_pos: Position,
    old_pos: Position,
) {
    if client.player_id() != Some(creature) {
        return;
    }

    msg.add_byte(0xBF);

    let ox = old_pos.x as i32;
    let oy = old_pos.y as i32;
    let width = VIEWPORT_X * 2 + 2;
    let height = VIEWPORT_Y * 2 + 2;

    if new_pos.z == 8 {
        // Leaving the surface: the three underground layers appear at once.
        let mut skip = -1i32;
        for i in 0..3 {
            get_floor_description(
                client,
                world,
                msg,
                ox - VIEWPORT_X,
                oy - VIEWPORT_Y,
                new_pos.z as i32 + i,
                width,
                height,
                -i - 1,
                &mut skip,
            );
        }
        if skip >= 0 {
            msg.add_byte(skip as u8);
            msg.add_byte(0xFF);
        }
    } else if new_pos.z > old_pos.z && new_pos.z > 8 && new_pos.z < 14 {
        let mut skip = -1i32;
        get_floor_description(
            client,
            world,
            msg,
            ox - VIEWPORT_X,
            oy - VIEWPORT_Y,
            new_pos.z as i32 + 2,
            width,
            height,
            -3,
            &mut skip,
        );
        if skip >= 0 {
            msg.add_byte(skip as u8);
            msg.add_byte(0xFF);
        }
    }

    msg.add_byte(0x66); // east strip
    get_map_description(
        client,
        world,
        msg,
        ox + VIEWPORT_X + 1,
        oy - (VIEWPORT_Y + 1),
        new_pos.z,
        1,
        height,
    );

    msg.add_byte(0x67); // south strip
    get_map_description(
        client,
        world,
        msg,
        ox - VIEWPORT_X,
        oy + VIEWPORT_Y + 1,
        new_pos.z,
        width,
        1,
    );
}
