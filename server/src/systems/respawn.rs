use crate::entities::{distance_sq, Entities};
use crate::world::{Tile, World};
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use shared::{tile_center, TerrainType, MAP_SIZE, RESPAWN_DELAY_TICKS, TILE_SIZE};
use std::collections::BTreeMap;

/// Where a tank comes back into the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnSite {
    pub x: f32,
    pub y: f32,
    pub on_boat: bool,
}

/// Picks a spawn point for a new or respawning tank.
///
/// Prefers map spawn points that are drivable and clear of living tanks,
/// chosen with the session RNG so runs with the same seed agree. Falls back
/// to any drivable spawn point, then to the map centre.
pub fn pick_spawn(world: &World, entities: &Entities, rng: &mut StdRng) -> SpawnSite {
    let drivable = |tile: &Tile| {
        let terrain = world.cell(*tile).terrain;
        terrain.is_passable() && terrain != TerrainType::DeepSea
    };
    let clear = |tile: &Tile| {
        let center = (tile_center(tile.0), tile_center(tile.1));
        !entities
            .tanks
            .values()
            .any(|t| t.is_alive() && distance_sq(t.position(), center) < TILE_SIZE * TILE_SIZE)
    };

    let mut candidates: Vec<Tile> = world
        .spawn_points
        .iter()
        .copied()
        .filter(|t| drivable(t) && clear(t))
        .collect();
    if candidates.is_empty() {
        candidates = world.spawn_points.iter().copied().filter(drivable).collect();
    }

    let tile = if candidates.is_empty() {
        let mid = (MAP_SIZE / 2) as u16;
        (mid, mid)
    } else {
        candidates[rng.gen_range(0..candidates.len())]
    };
    SpawnSite {
        x: tile_center(tile.0),
        y: tile_center(tile.1),
        on_boat: world.cell(tile).terrain.is_water(),
    }
}

/// Delayed respawns for dead tanks.
#[derive(Debug, Clone, Default)]
pub struct RespawnSystem {
    /// Tank id to the tick it comes back.
    pending: BTreeMap<u32, u32>,
}

impl RespawnSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, tank_id: u32, tick: u32) {
        self.pending
            .entry(tank_id)
            .or_insert(tick.saturating_add(RESPAWN_DELAY_TICKS));
    }

    pub fn cancel(&mut self, tank_id: u32) {
        self.pending.remove(&tank_id);
    }

    pub fn is_pending(&self, tank_id: u32) -> bool {
        self.pending.contains_key(&tank_id)
    }

    /// Respawns every tank whose delay has elapsed. Returns their ids.
    pub fn update(
        &mut self,
        world: &mut World,
        entities: &mut Entities,
        rng: &mut StdRng,
        tick: u32,
    ) -> Vec<u32> {
        let due: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, &at)| at <= tick)
            .map(|(&id, _)| id)
            .collect();

        let mut respawned = Vec::with_capacity(due.len());
        for tank_id in due {
            self.pending.remove(&tank_id);
            let site = pick_spawn(world, entities, rng);
            if let Some(tank) = entities.tanks.get_mut(&tank_id) {
                tank.respawn(site.x, site.y, site.on_boat);
                if site.on_boat {
                    if let Some(tile) = tank.tile() {
                        if world.cell(tile).terrain == TerrainType::Boat {
                            world.set_terrain(tile, TerrainType::River);
                        }
                    }
                }
                debug!("Tank {} respawned at ({:.0}, {:.0})", tank_id, site.x, site.y);
                respawned.push(tank_id);
            }
        }
        respawned
    }
}
