//! The per-tick simulation systems.
//!
//! Each system takes the session state through an explicit [`SimContext`]
//! and reports side effects into the tick's event list. The orchestrator in
//! `game` runs them in a fixed order.

pub mod bot_input;
pub mod builder_tasks;
pub mod combat;
pub mod player_sim;
pub mod respawn;
pub mod structures;
pub mod terrain_effects;

use crate::entities::{distance_sq, Entities};
use crate::events::{HudScope, TickEvents};
use crate::match_state::MatchState;
use crate::world::{neighbours8, Tile, World};
use shared::{
    tile_center, BuildOrder, SoundKind, MAX_MINE_DETONATIONS, MINE_DAMAGE, TILE_SIZE,
};
use std::collections::{BTreeSet, VecDeque};

/// Mutable view of the session handed to every system.
pub struct SimContext<'a> {
    pub tick: u32,
    pub world: &'a mut World,
    pub entities: &'a mut Entities,
    pub match_state: &'a mut MatchState,
    pub events: &'a mut TickEvents,
}

/// The controls applied to one tank for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TankControl {
    pub accelerate: bool,
    pub decelerate: bool,
    pub turn_left: bool,
    pub turn_right: bool,
    pub shoot: bool,
    pub build: Option<BuildOrder>,
}

/// Kills a tank whose armor just ran out and records the death.
pub fn destroy_tank(ctx: &mut SimContext<'_>, tank_id: u32) {
    let Some(tank) = ctx.entities.tanks.get_mut(&tank_id) else {
        return;
    };
    let position = tank.position();
    let sunk = ctx.world.terrain_at_world(position.0, position.1).is_water();
    let player_id = tank.player_id;
    let dropped = tank.carried_pillbox.take();
    let tile = tank.tile();
    tank.kill();

    if let (Some(pillbox_id), Some(tile)) = (dropped, tile) {
        if let Some(pillbox) = ctx.entities.pillboxes.get_mut(&pillbox_id) {
            pillbox.drop_at(tile);
        }
    }

    let (kind, verb) = if sunk {
        (SoundKind::TankSunk, "sunk")
    } else {
        (SoundKind::TankExplode, "destroyed")
    };
    ctx.events.sound(kind, position);
    ctx.events
        .system(HudScope::Everyone, format!("Player {}'s tank was {}", player_id, verb));
    ctx.events.deaths.push(tank_id);
}

/// Detonates the mine on `start`, then spreads breadth-first through every
/// mine touching one that went off. Returns the number of mines that exploded,
/// never more than the cap.
pub fn detonate_mines(ctx: &mut SimContext<'_>, start: Tile) -> usize {
    let mut queue = VecDeque::from([start]);
    let mut visited = BTreeSet::from([start]);

    let mut detonated = 0;
    while let Some(tile) = queue.pop_front() {
        if detonated >= MAX_MINE_DETONATIONS {
            break;
        }
        if !ctx.world.has_mine(tile) {
            continue;
        }
        detonated += 1;
        ctx.world.set_mine(tile, false);
        ctx.world.explode(tile);
        ctx.match_state.forget_mine(tile);

        let center = (tile_center(tile.0), tile_center(tile.1));
        ctx.events.sound(SoundKind::MineExplosion, center);
        blast(ctx, center);

        for next in neighbours8(tile) {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }
    detonated
}

/// Damages tanks and kills exposed builders within one tile of `center`.
fn blast(ctx: &mut SimContext<'_>, center: (f32, f32)) {
    let radius_sq = TILE_SIZE * TILE_SIZE;

    let hit: Vec<u32> = ctx
        .entities
        .tanks
        .values()
        .filter(|t| t.is_alive() && distance_sq(t.position(), center) < radius_sq)
        .map(|t| t.id)
        .collect();
    for tank_id in hit {
        let died = ctx
            .entities
            .tanks
            .get_mut(&tank_id)
            .is_some_and(|t| t.take_damage(MINE_DAMAGE));
        if died {
            destroy_tank(ctx, tank_id);
        }
    }

    for builder in ctx.entities.builders.values_mut() {
        if builder.is_exposed() && distance_sq((builder.x, builder.y), center) < radius_sq {
            builder.kill();
            ctx.events.sound(SoundKind::BuilderKilled, (builder.x, builder.y));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use shared::{TerrainType, TANK_MAX_ARMOR};

    pub(crate) struct Fixture {
        pub world: World,
        pub entities: Entities,
        pub match_state: MatchState,
        pub events: TickEvents,
        pub tick: u32,
    }

    impl Fixture {
        pub fn new(fill: TerrainType) -> Self {
            Self {
                world: World::new("test", fill),
                entities: Entities::new(),
                match_state: MatchState::new(),
                events: TickEvents::new(),
                tick: 1,
            }
        }

        pub fn ctx(&mut self) -> SimContext<'_> {
            SimContext {
                tick: self.tick,
                world: &mut self.world,
                entities: &mut self.entities,
                match_state: &mut self.match_state,
                events: &mut self.events,
            }
        }
    }

    #[test]
    fn test_mine_field_detonation_is_capped() {
        let mut fx = Fixture::new(TerrainType::Grass);
        for y in 0..40 {
            for x in 0..40 {
                fx.world.set_mine((x, y), true);
            }
        }
        let count = detonate_mines(&mut fx.ctx(), (20, 20));
        assert_eq!(count, MAX_MINE_DETONATIONS);
        assert!(!fx.world.has_mine((20, 20)));
        assert_eq!(fx.world.mined_tiles().count(), 40 * 40 - MAX_MINE_DETONATIONS);
    }

    #[test]
    fn test_mine_chain_follows_a_line_of_mines() {
        let mut fx = Fixture::new(TerrainType::Grass);
        for x in 10..16 {
            fx.world.set_mine((x, 10), true);
        }
        // Not touching the line, so it survives.
        fx.world.set_mine((18, 10), true);

        assert_eq!(detonate_mines(&mut fx.ctx(), (10, 10)), 6);
        assert!(!fx.world.has_mine((15, 10)));
        assert!(fx.world.has_mine((18, 10)));
    }

    #[test]
    fn test_single_mine_damages_tank_and_cratered_tile() {
        let mut fx = Fixture::new(TerrainType::Grass);
        fx.world.set_mine((10, 10), true);
        let tank_id = fx
            .entities
            .spawn_tank(1, 0, tile_center(10), tile_center(10));

        assert_eq!(detonate_mines(&mut fx.ctx(), (10, 10)), 1);
        assert_eq!(fx.entities.tanks[&tank_id].armor, TANK_MAX_ARMOR - MINE_DAMAGE);
        assert_eq!(fx.world.cell((10, 10)).terrain, TerrainType::Crater);
        assert!(fx
            .events
            .sounds
            .iter()
            .any(|s| s.kind == SoundKind::MineExplosion));
    }

    #[test]
    fn test_no_mine_no_detonation() {
        let mut fx = Fixture::new(TerrainType::Grass);
        assert_eq!(detonate_mines(&mut fx.ctx(), (3, 3)), 0);
    }

    #[test]
    fn test_destroy_tank_drops_pillbox_and_records_death() {
        let mut fx = Fixture::new(TerrainType::Grass);
        let tank_id = fx.entities.spawn_tank(1, 0, tile_center(4), tile_center(4));
        let pillbox_id = fx.entities.add_pillbox((0, 0), 0);
        fx.entities.pillboxes.get_mut(&pillbox_id).unwrap().in_tank = true;
        fx.entities.tanks.get_mut(&tank_id).unwrap().carried_pillbox = Some(pillbox_id);

        destroy_tank(&mut fx.ctx(), tank_id);

        assert!(!fx.entities.tanks[&tank_id].is_alive());
        assert_eq!(fx.entities.pillboxes[&pillbox_id].tile(), (4, 4));
        assert!(!fx.entities.pillboxes[&pillbox_id].in_tank);
        assert_eq!(fx.events.deaths, vec![tank_id]);
        assert_eq!(fx.events.sounds[0].kind, SoundKind::TankExplode);
    }
}
