//! Types shared between the tank-arena server and its clients: gameplay
//! constants, the terrain vocabulary and the wire protocol.

pub mod protocol;
pub mod terrain;

pub use protocol::*;
pub use terrain::TerrainType;

/// World units per tile edge.
pub const TILE_SIZE: f32 = 256.0;
/// Map edge length in tiles.
pub const MAP_SIZE: usize = 256;
/// Map edge length in world units.
pub const WORLD_SIZE: f32 = MAP_SIZE as f32 * TILE_SIZE;

/// Simulation step in milliseconds (50Hz).
pub const TICK_MILLIS: u64 = 20;

pub const MAX_PLAYERS: usize = 16;
pub const NEUTRAL_TEAM: Team = 255;

pub const TANK_MAX_SPEED: f32 = 16.0;
pub const TANK_ACCELERATION: f32 = 0.25;
pub const TANK_COAST_DECELERATION: f32 = TANK_ACCELERATION / 2.0;
pub const TANK_SLOW_TURN: u8 = 2;
pub const TANK_FAST_TURN: u8 = 4;
/// Consecutive turning ticks before the turn rate doubles.
pub const TANK_TURN_RAMP_TICKS: u32 = 10;
/// Half the edge of the tank footprint used for terrain sampling.
pub const TANK_HALF_SIZE: f32 = 64.0;
pub const TANK_MAX_ARMOR: u8 = 40;
pub const TANK_MAX_SHELLS: u8 = 40;
pub const TANK_MAX_MINES: u8 = 40;
pub const TANK_MAX_TREES: u8 = 40;
pub const TANK_RELOAD_TICKS: u8 = 13;
pub const TANK_DEFAULT_RANGE: f32 = 7.0;
pub const TANK_MIN_RANGE: f32 = 1.0;
pub const TANK_MAX_RANGE: f32 = 9.0;
pub const TANK_RANGE_STEP: f32 = 0.5;
pub const WATER_DRAIN_TICKS: u32 = 15;
pub const RESPAWN_DELAY_TICKS: u32 = 150;

pub const SHELL_SPEED: f32 = 32.0;
pub const SHELL_DAMAGE: u8 = 5;
pub const TANK_HIT_RADIUS: f32 = 128.0;
pub const BUILDER_HIT_RADIUS: f32 = 64.0;

pub const MINE_DAMAGE: u8 = 10;
pub const MAX_MINE_DETONATIONS: usize = 20;

pub const PILLBOX_MAX_ARMOR: u8 = 15;
pub const PILLBOX_RANGE_TILES: f32 = 8.0;
pub const PILLBOX_MIN_FIRE_INTERVAL: u8 = 6;
pub const PILLBOX_MAX_FIRE_INTERVAL: u8 = 100;
pub const PILLBOX_INITIAL_FIRE_INTERVAL: u8 = 100;
/// Quiet ticks after which an aggravated pillbox slows down by one step.
pub const PILLBOX_COOLDOWN_TICKS: u32 = 32;

pub const BASE_MAX_ARMOR: u8 = 90;
pub const BASE_MAX_SHELLS: u8 = 40;
pub const BASE_MAX_MINES: u8 = 40;
pub const BASE_REFUEL_RADIUS: f32 = TILE_SIZE;
pub const BASE_TRANSFER_COOLDOWN: u32 = 5;
pub const BASE_REGEN_TICKS: u32 = 100;

pub const BUILDER_SPEED: f32 = 8.0;
pub const BUILDER_DEAD_TICKS: u32 = 300;
pub const BUILDER_PARACHUTE_TICKS: u32 = 100;

pub const FOREST_REGROWTH_TICKS: u32 = 3000;
pub const FLOOD_INTERVAL_TICKS: u32 = 10;

/// Half extent of a player's viewport in tiles, excluding the prefetch ring.
pub const VIEWPORT_HALF_TILES: i32 = 14;
pub const PREFETCH_MARGIN_TILES: i32 = 1;

pub const MAX_CHAT_LENGTH: usize = 256;

/// Converts a world coordinate to the tile index containing it.
pub fn tile_of(world: f32) -> i32 {
    (world / TILE_SIZE).floor() as i32
}

/// World coordinate of a tile's centre.
pub fn tile_center(tile: u16) -> f32 {
    tile as f32 * TILE_SIZE + TILE_SIZE / 2.0
}

/// Unit vector for a 0..256 direction, clockwise with 0 pointing east.
pub fn direction_vector(direction: u8) -> (f32, f32) {
    let angle = direction as f32 * std::f32::consts::TAU / 256.0;
    (angle.cos(), angle.sin())
}

/// Direction (0..256) pointing from `from` to `to`. Zero-length vectors map to east.
pub fn direction_towards(from: (f32, f32), to: (f32, f32)) -> u8 {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    if (dx == 0.0 && dy == 0.0) || !dx.is_finite() || !dy.is_finite() {
        return 0;
    }
    let turns = dy.atan2(dx) / std::f32::consts::TAU;
    let steps = (turns * 256.0).round() as i32;
    steps.rem_euclid(256) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_tile_of_and_center() {
        assert_eq!(tile_of(0.0), 0);
        assert_eq!(tile_of(255.9), 0);
        assert_eq!(tile_of(256.0), 1);
        assert_eq!(tile_of(-1.0), -1);
        assert_eq!(tile_center(2), 640.0);
    }

    #[test]
    fn test_direction_vector_cardinals() {
        let (ex, ey) = direction_vector(0);
        assert_approx_eq!(ex, 1.0, 1e-6);
        assert_approx_eq!(ey, 0.0, 1e-6);

        // Clockwise on a y-down screen: a quarter turn points down.
        let (sx, sy) = direction_vector(64);
        assert_approx_eq!(sx, 0.0, 1e-6);
        assert_approx_eq!(sy, 1.0, 1e-6);
    }

    #[test]
    fn test_direction_towards() {
        assert_eq!(direction_towards((0.0, 0.0), (10.0, 0.0)), 0);
        assert_eq!(direction_towards((0.0, 0.0), (0.0, 10.0)), 64);
        assert_eq!(direction_towards((0.0, 0.0), (-10.0, 0.0)), 128);
        assert_eq!(direction_towards((0.0, 0.0), (0.0, -10.0)), 192);
        assert_eq!(direction_towards((5.0, 5.0), (5.0, 5.0)), 0);
        assert_eq!(direction_towards((0.0, 0.0), (f32::NAN, 1.0)), 0);
    }
}
