//! Tank movement and everything a tank does by driving around.

use super::{builder_tasks, destroy_tank, detonate_mines, SimContext, TankControl};
use crate::entities::{BuilderStep, Entities, ShellOwner};
use crate::world::{Tile, World};
use shared::{BuildOrder, SoundKind, TerrainType, WATER_DRAIN_TICKS};
use std::collections::BTreeMap;

/// Whether a tank currently on `from` may move its centre to `(x, y)`.
///
/// The destination must be on the map, drivable, and free of an armed
/// pillbox other than one sharing the tank's current tile.
pub fn can_enter(world: &World, entities: &Entities, from: Option<Tile>, x: f32, y: f32) -> bool {
    let Some(tile) = World::tile_at_world(x, y) else {
        return false;
    };
    if !world.cell(tile).terrain.is_passable() {
        return false;
    }
    Some(tile) == from || entities.armed_pillbox_at(tile).is_none()
}

/// Lowest speed multiplier under the tank's centre and leading corners.
fn terrain_multiplier(world: &World, points: &[(f32, f32)]) -> f32 {
    points
        .iter()
        .map(|&(x, y)| world.terrain_at_world(x, y).speed_multiplier())
        .fold(1.0, f32::min)
}

/// Simulates every tank in id order with this tick's controls.
pub fn update(ctx: &mut SimContext<'_>, controls: &BTreeMap<u32, TankControl>) {
    let tank_ids: Vec<u32> = ctx.entities.tanks.keys().copied().collect();
    for tank_id in tank_ids {
        let control = controls.get(&tank_id).copied().unwrap_or_default();
        update_tank(ctx, tank_id, &control);
        update_builder(ctx, tank_id, control.build);
    }
}

fn update_tank(ctx: &mut SimContext<'_>, tank_id: u32, control: &TankControl) {
    let Some(tank) = ctx.entities.tanks.get_mut(&tank_id) else {
        return;
    };
    tank.tick_reload();
    if !tank.is_alive() {
        return;
    }

    tank.turn(control.turn_left, control.turn_right);
    let multiplier = if tank.on_boat {
        1.0
    } else {
        terrain_multiplier(ctx.world, &tank.sample_points())
    };
    tank.update_speed(control.accelerate, control.decelerate, multiplier);

    let old_tile = tank.tile();
    let (vx, vy) = tank.velocity();
    let (nx, ny) = (tank.x + vx, tank.y + vy);
    if tank.speed > 0.0 {
        let passable = can_enter(ctx.world, ctx.entities, old_tile, nx, ny);
        if let Some(tank) = ctx.entities.tanks.get_mut(&tank_id) {
            if passable {
                tank.x = nx;
                tank.y = ny;
            } else {
                tank.speed = 0.0;
            }
        }
    }

    if boat_and_water(ctx, tank_id, old_tile) {
        return;
    }
    fire(ctx, tank_id, control.shoot);
    pick_up_pillbox(ctx, tank_id);

    let tile = ctx.entities.tanks.get(&tank_id).and_then(|t| t.tile());
    if let Some(tile) = tile {
        if ctx.world.has_mine(tile) {
            detonate_mines(ctx, tile);
        }
    }
}

/// Boarding, disembarking, sinking and water attrition. Returns true if the tank died.
fn boat_and_water(ctx: &mut SimContext<'_>, tank_id: u32, old_tile: Option<Tile>) -> bool {
    let Some(tank) = ctx.entities.tanks.get_mut(&tank_id) else {
        return true;
    };
    let Some(tile) = tank.tile() else {
        return false;
    };
    let terrain = ctx.world.cell(tile).terrain;

    if old_tile != Some(tile) {
        if tank.on_boat && !terrain.is_water() {
            tank.on_boat = false;
            if let Some(old) = old_tile {
                if ctx.world.cell(old).terrain == TerrainType::River {
                    ctx.world.place_boat(old, tank.direction.wrapping_add(128));
                }
            }
        } else if !tank.on_boat && terrain == TerrainType::Boat {
            ctx.world.set_terrain(tile, TerrainType::River);
            tank.on_boat = true;
        }
    }

    if !tank.on_boat && terrain == TerrainType::DeepSea {
        tank.take_damage(tank.armor);
        destroy_tank(ctx, tank_id);
        return true;
    }

    if !tank.on_boat && terrain == TerrainType::River {
        tank.water_ticks += 1;
        if tank.water_ticks % WATER_DRAIN_TICKS == 0 {
            // Alternates, a shell first and then a mine.
            if (tank.water_ticks / WATER_DRAIN_TICKS) % 2 == 1 {
                tank.shells = tank.shells.saturating_sub(1);
            } else {
                tank.mines = tank.mines.saturating_sub(1);
            }
            ctx.events.sound(SoundKind::Bubbles, tank.position());
        }
    } else {
        tank.water_ticks = 0;
    }
    false
}

fn fire(ctx: &mut SimContext<'_>, tank_id: u32, shoot: bool) {
    let Some(tank) = ctx.entities.tanks.get_mut(&tank_id) else {
        return;
    };
    if !shoot || !tank.can_shoot() {
        return;
    }
    tank.fire();
    let (x, y) = tank.position();
    let (direction, range) = (tank.direction, tank.firing_range);
    ctx.entities
        .spawn_shell(x, y, direction, ShellOwner::Tank(tank_id), range);
    ctx.events.sound(SoundKind::ShotFired, (x, y));
}

/// Captures and repairs a disarmed pillbox under the tank, carrying it if the
/// tank has room.
fn pick_up_pillbox(ctx: &mut SimContext<'_>, tank_id: u32) {
    let Some(tank) = ctx.entities.tanks.get_mut(&tank_id) else {
        return;
    };
    let Some(tile) = tank.tile() else {
        return;
    };
    let Some(pillbox) = ctx
        .entities
        .pillboxes
        .values_mut()
        .find(|p| !p.in_tank && p.armor == 0 && p.tile() == tile)
    else {
        return;
    };
    pillbox.capture_and_repair(tank.team);
    if tank.carried_pillbox.is_none() {
        pillbox.in_tank = true;
        tank.carried_pillbox = Some(pillbox.id);
    }
}

fn update_builder(ctx: &mut SimContext<'_>, tank_id: u32, order: Option<BuildOrder>) {
    if let Some(order) = order {
        builder_tasks::dispatch(ctx, tank_id, order);
    }

    let Some(tank) = ctx.entities.tanks.get(&tank_id) else {
        return;
    };
    let owner = tank.is_alive().then(|| tank.position());
    let builder_id = tank.builder_id;
    let Some(builder) = ctx.entities.builders.get_mut(&builder_id) else {
        return;
    };

    match builder.update(owner) {
        BuilderStep::AtWorkSite => builder_tasks::execute(ctx, builder_id),
        BuilderStep::Entered => {
            let (trees, mines) = builder.unload();
            if let Some(tank) = ctx.entities.tanks.get_mut(&tank_id) {
                tank.add_trees(trees);
                tank.add_mines(mines);
            }
        }
        BuilderStep::Idle | BuilderStep::Moving => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::tests::Fixture;
    use assert_approx_eq::assert_approx_eq;
    use shared::{tile_center, PILLBOX_MAX_ARMOR, TANK_MAX_SHELLS, TANK_MAX_SPEED};

    fn drive() -> TankControl {
        TankControl {
            accelerate: true,
            ..Default::default()
        }
    }

    fn step(fx: &mut Fixture, tank_id: u32, control: TankControl) {
        let controls = BTreeMap::from([(tank_id, control)]);
        update(&mut fx.ctx(), &controls);
        fx.tick += 1;
    }

    #[test]
    fn test_tank_drives_east_on_road() {
        let mut fx = Fixture::new(TerrainType::Road);
        let tank_id = fx.entities.spawn_tank(1, 0, tile_center(10), tile_center(10));
        for _ in 0..4 {
            step(&mut fx, tank_id, drive());
        }
        let tank = &fx.entities.tanks[&tank_id];
        assert_approx_eq!(tank.speed, 1.0);
        assert_approx_eq!(tank.x, tile_center(10) + 0.25 + 0.5 + 0.75 + 1.0);
    }

    #[test]
    fn test_building_blocks_without_partial_move() {
        let mut fx = Fixture::new(TerrainType::Road);
        fx.world.paint((11, 10), (11, 10), TerrainType::Building);
        let x0 = tile_center(11) - 256.0 / 2.0 - 2.0;
        let tank_id = fx.entities.spawn_tank(1, 0, x0, tile_center(10));
        fx.entities.tanks.get_mut(&tank_id).unwrap().speed = 4.0;

        step(&mut fx, tank_id, drive());
        let tank = &fx.entities.tanks[&tank_id];
        assert_eq!(tank.speed, 0.0);
        assert_eq!(tank.x, x0);
    }

    #[test]
    fn test_tank_against_building_drives_away() {
        let mut fx = Fixture::new(TerrainType::Road);
        fx.world.paint((9, 9), (9, 11), TerrainType::Building);
        let (x0, y0) = (10.0 * 256.0 + 20.0, tile_center(10));
        let tank_id = fx.entities.spawn_tank(1, 0, x0, y0);

        for direction in [224u8, 240, 0, 16, 32] {
            {
                let tank = fx.entities.tanks.get_mut(&tank_id).unwrap();
                tank.x = x0;
                tank.y = y0;
                tank.speed = 0.0;
                tank.direction = direction;
            }
            for _ in 0..20 {
                step(&mut fx, tank_id, drive());
            }
            let tank = &fx.entities.tanks[&tank_id];
            assert!(tank.speed > 0.0, "stuck facing {}", direction);
            assert!(tank.x > x0, "no progress facing {}", direction);
        }
    }

    #[test]
    fn test_leading_edge_slows_tank_before_centre_arrives() {
        let mut fx = Fixture::new(TerrainType::Road);
        fx.world.paint((11, 0), (20, 30), TerrainType::Swamp);
        // Centre still on road, leading corners already over swamp.
        let x = tile_center(11) - 128.0 - 10.0;
        let tank_id = fx.entities.spawn_tank(1, 0, x, tile_center(10));
        fx.entities.tanks.get_mut(&tank_id).unwrap().speed = TANK_MAX_SPEED;

        step(&mut fx, tank_id, drive());
        assert_approx_eq!(fx.entities.tanks[&tank_id].speed, TANK_MAX_SPEED - 0.25);
    }

    #[test]
    fn test_deep_sea_sinks_tank_without_boat() {
        let mut fx = Fixture::new(TerrainType::DeepSea);
        let tank_id = fx.entities.spawn_tank(1, 0, tile_center(10), tile_center(10));
        step(&mut fx, tank_id, TankControl::default());
        assert!(!fx.entities.tanks[&tank_id].is_alive());
        assert_eq!(fx.events.deaths, vec![tank_id]);
        assert!(fx.events.sounds.iter().any(|s| s.kind == SoundKind::TankSunk));
    }

    #[test]
    fn test_river_drains_a_shell_then_a_mine() {
        let mut fx = Fixture::new(TerrainType::River);
        let tank_id = fx.entities.spawn_tank(1, 0, tile_center(10), tile_center(10));
        fx.entities.tanks.get_mut(&tank_id).unwrap().mines = 3;
        for _ in 0..WATER_DRAIN_TICKS {
            step(&mut fx, tank_id, TankControl::default());
        }
        let tank = &fx.entities.tanks[&tank_id];
        assert_eq!(tank.shells, TANK_MAX_SHELLS - 1);
        assert_eq!(tank.mines, 3);

        for _ in 0..WATER_DRAIN_TICKS {
            step(&mut fx, tank_id, TankControl::default());
        }
        let tank = &fx.entities.tanks[&tank_id];
        assert_eq!(tank.shells, TANK_MAX_SHELLS - 1);
        assert_eq!(tank.mines, 2);

        for _ in 0..WATER_DRAIN_TICKS {
            step(&mut fx, tank_id, TankControl::default());
        }
        assert_eq!(fx.entities.tanks[&tank_id].shells, TANK_MAX_SHELLS - 2);
    }

    #[test]
    fn test_boarding_and_leaving_a_boat() {
        let mut fx = Fixture::new(TerrainType::River);
        fx.world.paint((12, 0), (20, 20), TerrainType::Grass);
        fx.world.place_boat((10, 10), 0);
        let tank_id = fx.entities.spawn_tank(1, 0, tile_center(9) + 125.0, tile_center(10));
        fx.entities.tanks.get_mut(&tank_id).unwrap().speed = 8.0;

        step(&mut fx, tank_id, drive());
        assert!(fx.entities.tanks[&tank_id].on_boat);
        assert_eq!(fx.world.cell((10, 10)).terrain, TerrainType::River);

        for _ in 0..80 {
            step(&mut fx, tank_id, drive());
            if !fx.entities.tanks[&tank_id].on_boat {
                break;
            }
        }
        let tank = &fx.entities.tanks[&tank_id];
        assert!(!tank.on_boat);
        assert_eq!(fx.world.cell((11, 10)).terrain, TerrainType::Boat);
        assert_eq!(fx.world.boat_facing((11, 10)), Some(128));
    }

    #[test]
    fn test_shooting_spawns_shell_and_reloads() {
        let mut fx = Fixture::new(TerrainType::Grass);
        let tank_id = fx.entities.spawn_tank(1, 0, tile_center(10), tile_center(10));
        let shoot = TankControl {
            shoot: true,
            ..Default::default()
        };
        step(&mut fx, tank_id, shoot);
        step(&mut fx, tank_id, shoot);
        assert_eq!(fx.entities.shells.len(), 1);
        assert_eq!(fx.entities.tanks[&tank_id].shells, TANK_MAX_SHELLS - 1);
    }

    #[test]
    fn test_disarmed_pillbox_is_picked_up() {
        let mut fx = Fixture::new(TerrainType::Grass);
        let pillbox_id = fx.entities.add_pillbox((10, 10), 7);
        fx.entities.pillboxes.get_mut(&pillbox_id).unwrap().armor = 0;
        let tank_id = fx.entities.spawn_tank(1, 2, tile_center(10), tile_center(10));

        step(&mut fx, tank_id, TankControl::default());

        let pillbox = &fx.entities.pillboxes[&pillbox_id];
        assert_eq!(pillbox.owner_team, 2);
        assert_eq!(pillbox.armor, PILLBOX_MAX_ARMOR);
        assert!(pillbox.in_tank);
        assert_eq!(fx.entities.tanks[&tank_id].carried_pillbox, Some(pillbox_id));
    }

    #[test]
    fn test_armed_pillbox_blocks_tank() {
        let mut fx = Fixture::new(TerrainType::Road);
        fx.entities.add_pillbox((11, 10), 7);
        let x0 = tile_center(11) - 130.0;
        let tank_id = fx.entities.spawn_tank(1, 2, x0, tile_center(10));
        fx.entities.tanks.get_mut(&tank_id).unwrap().speed = 4.0;
        step(&mut fx, tank_id, drive());
        assert_eq!(fx.entities.tanks[&tank_id].x, x0);
    }

    #[test]
    fn test_driving_onto_mine_detonates_it() {
        let mut fx = Fixture::new(TerrainType::Grass);
        fx.world.set_mine((10, 10), true);
        let tank_id = fx.entities.spawn_tank(1, 0, tile_center(10), tile_center(10));
        step(&mut fx, tank_id, TankControl::default());
        assert!(!fx.world.has_mine((10, 10)));
        assert!(fx.entities.tanks[&tank_id].armor < shared::TANK_MAX_ARMOR);
    }
}
