use crate::world::World;
use shared::{
    direction_vector, PlayerId, RangeAdjust, TankSnapshot, Team, TANK_ACCELERATION,
    TANK_COAST_DECELERATION, TANK_DEFAULT_RANGE, TANK_FAST_TURN, TANK_HALF_SIZE, TANK_MAX_ARMOR,
    TANK_MAX_MINES, TANK_MAX_RANGE, TANK_MAX_SHELLS, TANK_MAX_SPEED, TANK_MAX_TREES,
    TANK_MIN_RANGE, TANK_RANGE_STEP, TANK_RELOAD_TICKS, TANK_SLOW_TURN, TANK_TURN_RAMP_TICKS,
};

/// A player's tank. Armor at zero means dead; dead tanks keep their record
/// (and builder) until the respawn system brings them back.
#[derive(Debug, Clone, PartialEq)]
pub struct Tank {
    pub id: u32,
    pub player_id: PlayerId,
    pub team: Team,
    pub x: f32,
    pub y: f32,
    /// 0..256, clockwise, 0 = east.
    pub direction: u8,
    pub speed: f32,
    /// Consecutive ticks spent turning.
    pub turn_ticks: u32,
    pub armor: u8,
    pub shells: u8,
    pub mines: u8,
    pub trees: u8,
    pub on_boat: bool,
    pub reload: u8,
    /// Shell range in tiles, 1..=9 in half-tile steps.
    pub firing_range: f32,
    pub water_ticks: u32,
    pub builder_id: u32,
    pub carried_pillbox: Option<u32>,
}

impl Tank {
    pub fn new(id: u32, player_id: PlayerId, team: Team, builder_id: u32, x: f32, y: f32) -> Self {
        Self {
            id,
            player_id,
            team,
            x,
            y,
            direction: 0,
            speed: 0.0,
            turn_ticks: 0,
            armor: TANK_MAX_ARMOR,
            shells: TANK_MAX_SHELLS,
            mines: 0,
            trees: 0,
            on_boat: false,
            reload: 0,
            firing_range: TANK_DEFAULT_RANGE,
            water_ticks: 0,
            builder_id,
            carried_pillbox: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.armor > 0
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn tile(&self) -> Option<crate::world::Tile> {
        World::tile_at_world(self.x, self.y)
    }

    /// Velocity in world units per tick.
    pub fn velocity(&self) -> (f32, f32) {
        let (dx, dy) = direction_vector(self.direction);
        (dx * self.speed, dy * self.speed)
    }

    /// Applies one tick of steering. Turning ramps from the slow to the fast
    /// rate after a run of consecutive turning ticks; releasing resets the ramp.
    pub fn turn(&mut self, left: bool, right: bool) {
        if left == right {
            self.turn_ticks = 0;
            return;
        }
        self.turn_ticks += 1;
        let rate = if self.turn_ticks <= TANK_TURN_RAMP_TICKS {
            TANK_SLOW_TURN
        } else {
            TANK_FAST_TURN
        };
        self.direction = if right {
            self.direction.wrapping_add(rate)
        } else {
            self.direction.wrapping_sub(rate)
        };
    }

    /// Applies one tick of throttle against a terrain speed multiplier.
    /// Speed above the terrain cap bleeds off at the full rate, never snaps.
    pub fn update_speed(&mut self, accelerate: bool, decelerate: bool, multiplier: f32) {
        let multiplier = if multiplier.is_finite() {
            multiplier.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let max_speed = TANK_MAX_SPEED * multiplier;

        self.speed = if decelerate {
            (self.speed - TANK_ACCELERATION).max(0.0)
        } else if self.speed > max_speed {
            (self.speed - TANK_ACCELERATION).max(max_speed)
        } else if accelerate {
            (self.speed + TANK_ACCELERATION).min(max_speed)
        } else {
            (self.speed - TANK_COAST_DECELERATION).max(0.0)
        };
    }

    /// Centre plus the middle and corners of the leading edge.
    ///
    /// The footprint turns with the heading, and no point lies behind the
    /// centre, so a tank touching a wall can always drive away from it.
    pub fn sample_points(&self) -> [(f32, f32); 4] {
        let (dx, dy) = direction_vector(self.direction);
        let (fx, fy) = (self.x + dx * TANK_HALF_SIZE, self.y + dy * TANK_HALF_SIZE);
        let (px, py) = (-dy * TANK_HALF_SIZE, dx * TANK_HALF_SIZE);
        [
            (self.x, self.y),
            (fx, fy),
            (fx + px, fy + py),
            (fx - px, fy - py),
        ]
    }

    pub fn adjust_range(&mut self, adjust: RangeAdjust) {
        let delta = match adjust {
            RangeAdjust::Decrease => -TANK_RANGE_STEP,
            RangeAdjust::Hold => return,
            RangeAdjust::Increase => TANK_RANGE_STEP,
        };
        self.firing_range = (self.firing_range + delta).clamp(TANK_MIN_RANGE, TANK_MAX_RANGE);
    }

    pub fn can_shoot(&self) -> bool {
        self.is_alive() && self.shells > 0 && self.reload == 0
    }

    /// Spends a shell and starts the reload countdown.
    pub fn fire(&mut self) {
        self.shells = self.shells.saturating_sub(1);
        self.reload = TANK_RELOAD_TICKS;
    }

    pub fn tick_reload(&mut self) {
        self.reload = self.reload.saturating_sub(1);
    }

    /// Returns true if this hit killed the tank.
    pub fn take_damage(&mut self, amount: u8) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.armor = self.armor.saturating_sub(amount);
        !self.is_alive()
    }

    pub fn kill(&mut self) {
        self.armor = 0;
        self.speed = 0.0;
        self.turn_ticks = 0;
        self.water_ticks = 0;
        self.on_boat = false;
    }

    pub fn respawn(&mut self, x: f32, y: f32, on_boat: bool) {
        self.x = x;
        self.y = y;
        self.direction = 0;
        self.speed = 0.0;
        self.turn_ticks = 0;
        self.armor = TANK_MAX_ARMOR;
        self.shells = TANK_MAX_SHELLS;
        self.mines = 0;
        self.trees = 0;
        self.on_boat = on_boat;
        self.reload = 0;
        self.water_ticks = 0;
        self.firing_range = TANK_DEFAULT_RANGE;
    }

    pub fn add_trees(&mut self, trees: u8) {
        self.trees = self.trees.saturating_add(trees).min(TANK_MAX_TREES);
    }

    pub fn add_mines(&mut self, mines: u8) {
        self.mines = self.mines.saturating_add(mines).min(TANK_MAX_MINES);
    }

    pub fn snapshot(&self) -> TankSnapshot {
        TankSnapshot {
            id: self.id,
            player_id: self.player_id,
            team: self.team,
            x: self.x,
            y: self.y,
            direction: self.direction,
            speed: self.speed,
            armor: self.armor,
            shells: self.shells,
            mines: self.mines,
            trees: self.trees,
            on_boat: self.on_boat,
            reload: self.reload,
            firing_range: self.firing_range,
            alive: self.is_alive(),
            carrying_pillbox: self.carried_pillbox.is_some(),
        }
    }
}
