//! Built-in map layouts.
//!
//! Maps are assembled in code; there is no map file format.

use crate::world::{Tile, World};
use shared::TerrainType;

/// A playable layout: terrain plus where the neutral structures stand.
#[derive(Debug, Clone)]
pub struct Map {
    pub world: World,
    pub pillboxes: Vec<Tile>,
    pub bases: Vec<Tile>,
}

pub const TRAINING_GROUND: &str = "training-ground";
pub const OPEN_FIELD: &str = "open-field";

pub fn names() -> [&'static str; 2] {
    [TRAINING_GROUND, OPEN_FIELD]
}

pub fn builtin(name: &str) -> Option<Map> {
    match name {
        TRAINING_GROUND => Some(training_ground()),
        OPEN_FIELD => Some(open_field()),
        _ => None,
    }
}

/// An island with a shallow shore, split by a river with one bridge.
/// Forest belts, a swamp and a small walled town break up the open ground.
pub fn training_ground() -> Map {
    let mut world = World::new(TRAINING_GROUND, TerrainType::DeepSea);
    world.paint((14, 14), (241, 241), TerrainType::River);
    world.paint((18, 18), (237, 237), TerrainType::Grass);

    // River and the bridge over it
    world.paint((120, 18), (123, 237), TerrainType::River);
    world.paint((24, 128), (231, 129), TerrainType::Road);
    world.paint((127, 24), (128, 231), TerrainType::Road);

    world.paint((40, 30), (70, 55), TerrainType::Forest);
    world.paint((170, 160), (210, 190), TerrainType::Forest);
    world.paint((150, 40), (175, 52), TerrainType::Forest);
    world.paint((60, 170), (85, 200), TerrainType::Swamp);

    // Town block with an open courtyard
    world.paint((140, 100), (152, 112), TerrainType::Building);
    world.paint((142, 102), (150, 110), TerrainType::Grass);
    world.paint((146, 100), (146, 101), TerrainType::Road);

    world.paint((90, 140), (92, 150), TerrainType::Rubble);
    world.paint((100, 70), (104, 72), TerrainType::Crater);

    world.spawn_points = vec![
        (30, 30),
        (226, 30),
        (30, 226),
        (226, 226),
        (128, 30),
        (128, 226),
        (30, 128),
        (226, 128),
    ];

    Map {
        world,
        pillboxes: vec![
            (100, 100),
            (156, 96),
            (100, 156),
            (156, 156),
            (136, 60),
            (136, 196),
        ],
        bases: vec![(60, 64), (196, 60), (60, 206), (196, 210)],
    }
}

/// Flat grass with a sea border, two bases and two pillboxes.
pub fn open_field() -> Map {
    let mut world = World::new(OPEN_FIELD, TerrainType::DeepSea);
    world.paint((16, 16), (239, 239), TerrainType::Grass);
    world.spawn_points = vec![(40, 40), (215, 40), (40, 215), (215, 215)];
    Map {
        world,
        pillboxes: vec![(100, 128), (156, 128)],
        bases: vec![(64, 128), (192, 128)],
    }
}
