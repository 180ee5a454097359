//! Per-entity state machines and the id-addressed arena that owns them.
//!
//! Relations between entities (tank to builder, tank to carried pillbox,
//! shell to shooter) are plain ids resolved through [`Entities`] each tick.
//! Every map is a `BTreeMap` so iteration order is stable across runs.

pub mod base;
pub mod builder;
pub mod pillbox;
pub mod shell;
pub mod tank;

pub use base::Base;
pub use builder::{Builder, BuilderStep};
pub use pillbox::Pillbox;
pub use shell::{Shell, ShellOwner};
pub use tank::Tank;

use crate::world::Tile;
use shared::{PlayerId, Team};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Entities {
    pub tanks: BTreeMap<u32, Tank>,
    pub builders: BTreeMap<u32, Builder>,
    pub shells: BTreeMap<u32, Shell>,
    pub pillboxes: BTreeMap<u32, Pillbox>,
    pub bases: BTreeMap<u32, Base>,
    next_tank_id: u32,
    next_builder_id: u32,
    next_shell_id: u32,
    next_pillbox_id: u32,
    next_base_id: u32,
}

fn allocate(counter: &mut u32) -> u32 {
    *counter += 1;
    *counter
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tank together with the builder it owns for its whole lifetime.
    pub fn spawn_tank(&mut self, player_id: PlayerId, team: Team, x: f32, y: f32) -> u32 {
        let tank_id = allocate(&mut self.next_tank_id);
        let builder_id = allocate(&mut self.next_builder_id);
        self.tanks
            .insert(tank_id, Tank::new(tank_id, player_id, team, builder_id, x, y));
        self.builders
            .insert(builder_id, Builder::new(builder_id, tank_id, x, y));
        tank_id
    }

    /// Removes a tank and its builder. A carried pillbox is dropped where the tank was.
    pub fn despawn_tank(&mut self, tank_id: u32) -> Option<Tank> {
        let tank = self.tanks.remove(&tank_id)?;
        self.builders.remove(&tank.builder_id);
        if let Some(pillbox_id) = tank.carried_pillbox {
            if let (Some(pillbox), Some(tile)) = (
                self.pillboxes.get_mut(&pillbox_id),
                crate::world::World::tile_at_world(tank.x, tank.y),
            ) {
                pillbox.drop_at(tile);
            }
        }
        Some(tank)
    }

    pub fn spawn_shell(&mut self, x: f32, y: f32, direction: u8, owner: ShellOwner, range_tiles: f32) -> u32 {
        let id = allocate(&mut self.next_shell_id);
        self.shells
            .insert(id, Shell::new(id, x, y, direction, owner, range_tiles));
        id
    }

    pub fn add_pillbox(&mut self, tile: Tile, owner_team: Team) -> u32 {
        let id = allocate(&mut self.next_pillbox_id);
        self.pillboxes.insert(id, Pillbox::new(id, tile, owner_team));
        id
    }

    pub fn add_base(&mut self, tile: Tile, owner_team: Team) -> u32 {
        let id = allocate(&mut self.next_base_id);
        self.bases.insert(id, Base::new(id, tile, owner_team));
        id
    }

    pub fn builder_of(&self, tank_id: u32) -> Option<&Builder> {
        let tank = self.tanks.get(&tank_id)?;
        self.builders.get(&tank.builder_id)
    }

    /// The armed, uncarried pillbox standing on `tile`, if any.
    pub fn armed_pillbox_at(&self, tile: Tile) -> Option<u32> {
        self.pillboxes
            .values()
            .find(|p| p.is_active() && p.tile() == tile)
            .map(|p| p.id)
    }

    /// Any uncarried pillbox on `tile`, armed or not.
    pub fn pillbox_at(&self, tile: Tile) -> Option<u32> {
        self.pillboxes
            .values()
            .find(|p| !p.in_tank && p.tile() == tile)
            .map(|p| p.id)
    }

    pub fn base_at(&self, tile: Tile) -> Option<u32> {
        self.bases.values().find(|b| b.tile() == tile).map(|b| b.id)
    }

    pub fn live_tank_count(&self) -> usize {
        self.tanks.values().filter(|t| t.is_alive()).count()
    }
}

/// Squared distance between two world points.
pub fn distance_sq(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tank_spawns_with_its_own_builder() {
        let mut entities = Entities::new();
        let a = entities.spawn_tank(1, 0, 100.0, 100.0);
        let b = entities.spawn_tank(2, 1, 500.0, 500.0);
        assert_ne!(a, b);

        let builder = entities.builder_of(a).unwrap();
        assert_eq!(builder.owner_tank, a);
        assert_eq!(entities.builders.len(), 2);
    }

    #[test]
    fn test_despawn_drops_carried_pillbox() {
        let mut entities = Entities::new();
        let tank_id = entities.spawn_tank(1, 0, 1000.0, 1000.0);
        let pillbox_id = entities.add_pillbox((0, 0), 0);
        entities.pillboxes.get_mut(&pillbox_id).unwrap().in_tank = true;
        entities.tanks.get_mut(&tank_id).unwrap().carried_pillbox = Some(pillbox_id);

        entities.despawn_tank(tank_id);

        let pillbox = &entities.pillboxes[&pillbox_id];
        assert!(!pillbox.in_tank);
        assert_eq!(pillbox.tile(), (3, 3));
        assert!(entities.builders.is_empty());
    }

    #[test]
    fn test_shell_ids_are_unique_and_increasing() {
        let mut entities = Entities::new();
        let first = entities.spawn_shell(0.0, 0.0, 0, ShellOwner::Tank(1), 7.0);
        let second = entities.spawn_shell(0.0, 0.0, 0, ShellOwner::Pillbox(1), 7.0);
        assert!(second > first);
    }
}
