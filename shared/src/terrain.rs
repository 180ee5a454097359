//! Terrain vocabulary and the two degradation tables: shell hits walk a
//! life counter down before stepping to the next type, explosions jump
//! straight to their result.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum TerrainType {
    Building = 0,
    River = 1,
    Swamp = 2,
    Crater = 3,
    Road = 4,
    Forest = 5,
    Rubble = 6,
    Grass = 7,
    ShotBuilding = 8,
    Boat = 9,
    DeepSea = 10,
}

impl Default for TerrainType {
    fn default() -> Self {
        TerrainType::Grass
    }
}

impl TerrainType {
    pub const ALL: [TerrainType; 11] = [
        TerrainType::Building,
        TerrainType::River,
        TerrainType::Swamp,
        TerrainType::Crater,
        TerrainType::Road,
        TerrainType::Forest,
        TerrainType::Rubble,
        TerrainType::Grass,
        TerrainType::ShotBuilding,
        TerrainType::Boat,
        TerrainType::DeepSea,
    ];

    pub fn from_u8(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Fraction of the tank top speed allowed on this terrain. Zero means impassable.
    pub fn speed_multiplier(self) -> f32 {
        match self {
            TerrainType::Building | TerrainType::ShotBuilding => 0.0,
            TerrainType::River
            | TerrainType::Swamp
            | TerrainType::Crater
            | TerrainType::Rubble => 0.25,
            TerrainType::Forest | TerrainType::DeepSea => 0.5,
            TerrainType::Grass => 0.75,
            TerrainType::Road | TerrainType::Boat => 1.0,
        }
    }

    pub fn is_passable(self) -> bool {
        self.speed_multiplier() > 0.0
    }

    pub fn is_water(self) -> bool {
        matches!(
            self,
            TerrainType::River | TerrainType::DeepSea | TerrainType::Boat
        )
    }

    /// Terrain that stops shells in flight.
    pub fn is_solid(self) -> bool {
        matches!(
            self,
            TerrainType::Building
                | TerrainType::ShotBuilding
                | TerrainType::Rubble
                | TerrainType::Forest
                | TerrainType::Boat
        )
    }

    /// Shell hits absorbed before the terrain degrades one step.
    pub fn initial_life(self) -> u8 {
        match self {
            TerrainType::Building | TerrainType::Boat => 1,
            TerrainType::ShotBuilding => 3,
            TerrainType::Rubble | TerrainType::Forest => 2,
            _ => 0,
        }
    }

    /// Next type once the life counter runs out.
    pub fn degraded(self) -> Option<TerrainType> {
        match self {
            TerrainType::Building => Some(TerrainType::ShotBuilding),
            TerrainType::ShotBuilding => Some(TerrainType::Rubble),
            TerrainType::Rubble => Some(TerrainType::Crater),
            TerrainType::Forest => Some(TerrainType::Grass),
            TerrainType::Boat => Some(TerrainType::River),
            _ => None,
        }
    }

    /// Result of an explosion on this terrain. Roads and open water are immune.
    pub fn exploded(self) -> TerrainType {
        match self {
            TerrainType::Building | TerrainType::ShotBuilding => TerrainType::Rubble,
            TerrainType::Rubble | TerrainType::Grass | TerrainType::Swamp | TerrainType::Forest => {
                TerrainType::Crater
            }
            TerrainType::Boat => TerrainType::River,
            other => other,
        }
    }
}
