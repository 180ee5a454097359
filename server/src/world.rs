//! The 256x256 terrain grid.
//!
//! Cells hold a terrain type, its remaining shell-hit life and a mine flag.
//! Every mutation is appended to a change log which the tick orchestrator
//! drains once per tick, so systems never call back into each other.

use shared::{tile_of, TerrainType, MAP_SIZE};
use std::collections::BTreeMap;

pub type Tile = (u16, u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub terrain: TerrainType,
    pub life: u8,
    pub mine: bool,
}

impl Cell {
    pub fn new(terrain: TerrainType) -> Self {
        Self {
            terrain,
            life: terrain.initial_life(),
            mine: false,
        }
    }
}

/// One recorded mutation. `from == to` means only life or the mine flag changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainChange {
    pub tile: Tile,
    pub from: TerrainType,
    pub to: TerrainType,
    /// Set only when a mine was laid and nothing else about the cell changed.
    pub mine_laid: bool,
}

#[derive(Debug, Clone)]
pub struct World {
    name: String,
    cells: Vec<Cell>,
    boat_facing: BTreeMap<Tile, u8>,
    changes: Vec<TerrainChange>,
    pub spawn_points: Vec<Tile>,
}

impl World {
    pub fn new(name: &str, fill: TerrainType) -> Self {
        Self {
            name: name.to_string(),
            cells: vec![Cell::new(fill); MAP_SIZE * MAP_SIZE],
            boat_facing: BTreeMap::new(),
            changes: Vec::new(),
            spawn_points: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn in_bounds(x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < MAP_SIZE && (y as usize) < MAP_SIZE
    }

    /// Tile under a world-space point, if the point is on the map.
    pub fn tile_at_world(x: f32, y: f32) -> Option<Tile> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let (tx, ty) = (tile_of(x), tile_of(y));
        Self::in_bounds(tx, ty).then_some((tx as u16, ty as u16))
    }

    fn index(tile: Tile) -> usize {
        tile.1 as usize * MAP_SIZE + tile.0 as usize
    }

    pub fn cell(&self, tile: Tile) -> Cell {
        self.cells[Self::index(tile)]
    }

    /// Terrain at a signed tile coordinate. Everything off the map is deep sea.
    pub fn terrain_at(&self, x: i32, y: i32) -> TerrainType {
        if Self::in_bounds(x, y) {
            self.cells[Self::index((x as u16, y as u16))].terrain
        } else {
            TerrainType::DeepSea
        }
    }

    pub fn terrain_at_world(&self, x: f32, y: f32) -> TerrainType {
        match Self::tile_at_world(x, y) {
            Some(tile) => self.cell(tile).terrain,
            None => TerrainType::DeepSea,
        }
    }

    /// Replaces a tile's terrain and resets its life counter.
    pub fn set_terrain(&mut self, tile: Tile, terrain: TerrainType) {
        let cell = &mut self.cells[Self::index(tile)];
        let from = cell.terrain;
        cell.terrain = terrain;
        cell.life = terrain.initial_life();
        if terrain != TerrainType::Boat {
            self.boat_facing.remove(&tile);
        }
        self.changes.push(TerrainChange {
            tile,
            from,
            to: terrain,
            mine_laid: false,
        });
    }

    /// Drops a boat onto a tile, remembering which way it faces.
    pub fn place_boat(&mut self, tile: Tile, facing: u8) {
        self.set_terrain(tile, TerrainType::Boat);
        self.boat_facing.insert(tile, facing);
    }

    pub fn boat_facing(&self, tile: Tile) -> Option<u8> {
        self.boat_facing.get(&tile).copied()
    }

    /// Applies one direct shell hit. Returns the terrain after the hit when it changed type.
    pub fn damage_by_shell(&mut self, tile: Tile) -> Option<TerrainType> {
        let cell = self.cell(tile);
        let next = cell.terrain.degraded()?;
        let life = cell.life.saturating_sub(1);
        if life == 0 {
            self.set_terrain(tile, next);
            Some(next)
        } else {
            self.cells[Self::index(tile)].life = life;
            self.changes.push(TerrainChange {
                tile,
                from: cell.terrain,
                to: cell.terrain,
                mine_laid: false,
            });
            None
        }
    }

    /// Applies the explosion mapping. Returns true if the terrain changed.
    pub fn explode(&mut self, tile: Tile) -> bool {
        let current = self.cell(tile).terrain;
        let result = current.exploded();
        if result == current {
            return false;
        }
        self.set_terrain(tile, result);
        true
    }

    pub fn has_mine(&self, tile: Tile) -> bool {
        self.cell(tile).mine
    }

    pub fn set_mine(&mut self, tile: Tile, mine: bool) {
        let cell = &mut self.cells[Self::index(tile)];
        if cell.mine == mine {
            return;
        }
        cell.mine = mine;
        let terrain = cell.terrain;
        self.changes.push(TerrainChange {
            tile,
            from: terrain,
            to: terrain,
            mine_laid: mine,
        });
    }

    /// Number of mines currently on the map.
    pub fn mine_count(&self) -> usize {
        self.cells.iter().filter(|c| c.mine).count()
    }

    pub fn mined_tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        self.cells.iter().enumerate().filter_map(|(i, c)| {
            c.mine
                .then_some(((i % MAP_SIZE) as u16, (i / MAP_SIZE) as u16))
        })
    }

    /// Row-major terrain codes for the welcome message.
    pub fn terrain_codes(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.terrain.code()).collect()
    }

    pub fn terrain_life(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.life).collect()
    }

    /// Drains the change log accumulated since the last call.
    pub fn take_changes(&mut self) -> Vec<TerrainChange> {
        std::mem::take(&mut self.changes)
    }

    /// Fills an inclusive rectangle of tiles without recording changes; used while building maps.
    pub fn paint(&mut self, from: Tile, to: Tile, terrain: TerrainType) {
        for y in from.1.min(to.1)..=from.1.max(to.1) {
            for x in from.0.min(to.0)..=from.0.max(to.0) {
                self.cells[Self::index((x, y))] = Cell::new(terrain);
            }
        }
    }
}

/// The eight tiles around `tile` that lie on the map, in row-major order.
pub fn neighbours8(tile: Tile) -> Vec<Tile> {
    let mut out = Vec::with_capacity(8);
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (x, y) = (tile.0 as i32 + dx, tile.1 as i32 + dy);
            if World::in_bounds(x, y) {
                out.push((x as u16, y as u16));
            }
        }
    }
    out
}

/// The four orthogonal neighbours of `tile` that lie on the map.
pub fn neighbours4(tile: Tile) -> Vec<Tile> {
    [(0, -1), (-1, 0), (1, 0), (0, 1)]
        .iter()
        .map(|(dx, dy)| (tile.0 as i32 + dx, tile.1 as i32 + dy))
        .filter(|&(x, y)| World::in_bounds(x, y))
        .map(|(x, y)| (x as u16, y as u16))
        .collect()
}
