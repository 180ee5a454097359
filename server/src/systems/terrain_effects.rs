use crate::events::TickEvents;
use crate::world::{neighbours4, Tile, TerrainChange, World};
use shared::{
    tile_center, SoundKind, TerrainType, FLOOD_INTERVAL_TICKS, FOREST_REGROWTH_TICKS, MAP_SIZE,
};
use std::collections::BTreeMap;

/// Forest regrowth timers and crater flooding.
#[derive(Debug, Clone, Default)]
pub struct TerrainEffects {
    /// Tile to the tick its forest grows back.
    regrowth: BTreeMap<Tile, u32>,
}

impl TerrainEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a regrowth countdown for every forest that disappeared.
    pub fn observe_changes(&mut self, changes: &[TerrainChange], tick: u32) {
        for change in changes {
            if change.from == TerrainType::Forest && change.to != TerrainType::Forest {
                self.regrowth
                    .insert(change.tile, tick.saturating_add(FOREST_REGROWTH_TICKS));
            } else if change.to == TerrainType::Forest {
                self.regrowth.remove(&change.tile);
            }
        }
    }

    pub fn pending_regrowth(&self) -> usize {
        self.regrowth.len()
    }

    pub fn update(&mut self, world: &mut World, events: &mut TickEvents, tick: u32) {
        if tick % FLOOD_INTERVAL_TICKS == 0 {
            flood_craters(world, events);
        }

        let due: Vec<Tile> = self
            .regrowth
            .iter()
            .filter(|(_, &at)| at <= tick)
            .map(|(&tile, _)| tile)
            .collect();
        for tile in due {
            self.regrowth.remove(&tile);
            if matches!(
                world.cell(tile).terrain,
                TerrainType::Grass | TerrainType::Crater
            ) {
                world.set_terrain(tile, TerrainType::Forest);
            }
        }
    }
}

/// Turns every crater next to water into river. Candidates are collected
/// first so a flood never cascades within one pass.
fn flood_craters(world: &mut World, events: &mut TickEvents) {
    let mut flooded = Vec::new();
    for y in 0..MAP_SIZE as u16 {
        for x in 0..MAP_SIZE as u16 {
            let tile = (x, y);
            if world.cell(tile).terrain != TerrainType::Crater {
                continue;
            }
            if neighbours4(tile)
                .into_iter()
                .any(|n| world.cell(n).terrain.is_water())
            {
                flooded.push(tile);
            }
        }
    }
    for tile in flooded {
        world.set_terrain(tile, TerrainType::River);
        events.sound(SoundKind::Bubbles, (tile_center(tile.0), tile_center(tile.1)));
    }
}
