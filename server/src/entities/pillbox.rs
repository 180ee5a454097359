use crate::world::Tile;
use shared::{
    tile_center, PillboxSnapshot, Team, PILLBOX_COOLDOWN_TICKS, PILLBOX_INITIAL_FIRE_INTERVAL,
    PILLBOX_MAX_ARMOR, PILLBOX_MAX_FIRE_INTERVAL, PILLBOX_MIN_FIRE_INTERVAL,
};

/// A fixed gun emplacement. Damage aggravates it (shorter fire interval);
/// quiet periods calm it back down one step at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct Pillbox {
    pub id: u32,
    pub tile_x: u16,
    pub tile_y: u16,
    pub armor: u8,
    pub owner_team: Team,
    /// Carried by a tank, off the map and inert.
    pub in_tank: bool,
    /// Ticks since the last shot.
    pub reload: u8,
    pub fire_interval: u8,
    /// Ticks since the interval last changed.
    pub cooldown: u32,
    pub target: Option<u32>,
    /// Set once the current target has been held for one update.
    pub armed: bool,
}

impl Pillbox {
    pub fn new(id: u32, tile: Tile, owner_team: Team) -> Self {
        Self {
            id,
            tile_x: tile.0,
            tile_y: tile.1,
            armor: PILLBOX_MAX_ARMOR,
            owner_team,
            in_tank: false,
            reload: 0,
            fire_interval: PILLBOX_INITIAL_FIRE_INTERVAL,
            cooldown: 0,
            target: None,
            armed: false,
        }
    }

    pub fn tile(&self) -> Tile {
        (self.tile_x, self.tile_y)
    }

    pub fn center(&self) -> (f32, f32) {
        (tile_center(self.tile_x), tile_center(self.tile_y))
    }

    /// On the map with armor left.
    pub fn is_active(&self) -> bool {
        self.armor > 0 && !self.in_tank
    }

    /// Returns true if the hit disarmed the pillbox.
    pub fn take_damage(&mut self, amount: u8) -> bool {
        self.armor = self.armor.saturating_sub(amount);
        self.fire_interval = (self.fire_interval / 2).max(PILLBOX_MIN_FIRE_INTERVAL);
        self.cooldown = 0;
        self.armor == 0
    }

    /// Per-tick reload and calm-down bookkeeping.
    pub fn tick(&mut self) {
        self.reload = self.reload.saturating_add(1);
        self.cooldown += 1;
        if self.cooldown >= PILLBOX_COOLDOWN_TICKS {
            self.cooldown = 0;
            self.fire_interval = (self.fire_interval + 1).min(PILLBOX_MAX_FIRE_INTERVAL);
        }
    }

    /// Switches target. A new target has to be held one update before firing.
    pub fn acquire(&mut self, target: Option<u32>) {
        if self.target != target {
            self.target = target;
            self.armed = false;
        }
    }

    /// Returns true when a shot should be fired this tick.
    pub fn try_fire(&mut self) -> bool {
        if self.target.is_none() {
            return false;
        }
        if !self.armed {
            self.armed = true;
            return false;
        }
        if self.reload >= self.fire_interval {
            self.reload = 0;
            return true;
        }
        false
    }

    /// Full repair under a new owner, as when a tank collects it.
    pub fn capture_and_repair(&mut self, team: Team) {
        self.owner_team = team;
        self.armor = PILLBOX_MAX_ARMOR;
        self.target = None;
        self.armed = false;
    }

    pub fn drop_at(&mut self, tile: Tile) {
        self.tile_x = tile.0;
        self.tile_y = tile.1;
        self.in_tank = false;
        self.target = None;
        self.armed = false;
    }

    pub fn snapshot(&self) -> PillboxSnapshot {
        PillboxSnapshot {
            id: self.id,
            tile_x: self.tile_x,
            tile_y: self.tile_y,
            armor: self.armor,
            owner_team: self.owner_team,
            in_tank: self.in_tank,
            reload: self.reload,
            fire_interval: self.fire_interval,
        }
    }
}
