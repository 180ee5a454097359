use crate::entities::Tank;
use crate::world::Tile;
use shared::{
    tile_center, BaseSnapshot, Team, BASE_MAX_ARMOR, BASE_MAX_MINES, BASE_MAX_SHELLS,
    BASE_REGEN_TICKS, BASE_TRANSFER_COOLDOWN, NEUTRAL_TEAM, TANK_MAX_ARMOR, TANK_MAX_MINES,
    TANK_MAX_SHELLS,
};

/// A refuelling base. Its stock flows into nearby friendly tanks and slowly regenerates.
#[derive(Debug, Clone, PartialEq)]
pub struct Base {
    pub id: u32,
    pub tile_x: u16,
    pub tile_y: u16,
    pub armor: u8,
    pub shells: u8,
    pub mines: u8,
    pub owner_team: Team,
    pub refuel_cooldown: u32,
    pub regen_timer: u32,
}

impl Base {
    pub fn new(id: u32, tile: Tile, owner_team: Team) -> Self {
        Self {
            id,
            tile_x: tile.0,
            tile_y: tile.1,
            armor: BASE_MAX_ARMOR,
            shells: BASE_MAX_SHELLS,
            mines: BASE_MAX_MINES,
            owner_team,
            refuel_cooldown: 0,
            regen_timer: 0,
        }
    }

    pub fn tile(&self) -> Tile {
        (self.tile_x, self.tile_y)
    }

    pub fn center(&self) -> (f32, f32) {
        (tile_center(self.tile_x), tile_center(self.tile_y))
    }

    pub fn is_neutral(&self) -> bool {
        self.owner_team == NEUTRAL_TEAM
    }

    /// Returns true if the hit emptied the base's armor.
    pub fn take_damage(&mut self, amount: u8) -> bool {
        self.armor = self.armor.saturating_sub(amount);
        self.armor == 0
    }

    pub fn capture(&mut self, team: Team) {
        self.owner_team = team;
        self.refuel_cooldown = 0;
    }

    /// Regenerates stock and counts down the transfer cooldown.
    pub fn tick(&mut self) {
        self.refuel_cooldown = self.refuel_cooldown.saturating_sub(1);
        self.regen_timer += 1;
        if self.regen_timer >= BASE_REGEN_TICKS {
            self.regen_timer = 0;
            self.armor = (self.armor + 1).min(BASE_MAX_ARMOR);
            self.shells = (self.shells + 1).min(BASE_MAX_SHELLS);
            self.mines = (self.mines + 1).min(BASE_MAX_MINES);
        }
    }

    /// Moves one unit each of armor, shells and mines into the tank where
    /// both sides allow it. Returns true if anything moved.
    pub fn refuel(&mut self, tank: &mut Tank) -> bool {
        if self.refuel_cooldown > 0 || !tank.is_alive() {
            return false;
        }
        let mut moved = false;
        if tank.armor < TANK_MAX_ARMOR && self.armor > 0 {
            tank.armor += 1;
            self.armor -= 1;
            moved = true;
        }
        if tank.shells < TANK_MAX_SHELLS && self.shells > 0 {
            tank.shells += 1;
            self.shells -= 1;
            moved = true;
        }
        if tank.mines < TANK_MAX_MINES && self.mines > 0 {
            tank.mines += 1;
            self.mines -= 1;
            moved = true;
        }
        if moved {
            self.refuel_cooldown = BASE_TRANSFER_COOLDOWN;
        }
        moved
    }

    pub fn snapshot(&self) -> BaseSnapshot {
        BaseSnapshot {
            id: self.id,
            tile_x: self.tile_x,
            tile_y: self.tile_y,
            armor: self.armor,
            shells: self.shells,
            mines: self.mines,
            owner_team: self.owner_team,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refuel_moves_one_of_each_then_cools_down() {
        let mut base = Base::new(1, (4, 4), 0);
        let mut tank = Tank::new(1, 1, 0, 1, 0.0, 0.0);
        tank.armor = 10;
        tank.shells = 10;
        tank.mines = 0;

        assert!(base.refuel(&mut tank));
        assert_eq!((tank.armor, tank.shells, tank.mines), (11, 11, 1));
        assert_eq!(base.shells, BASE_MAX_SHELLS - 1);

        assert!(!base.refuel(&mut tank));
        for _ in 0..BASE_TRANSFER_COOLDOWN {
            base.tick();
        }
        assert!(base.refuel(&mut tank));
    }

    #[test]
    fn test_full_tank_takes_nothing() {
        let mut base = Base::new(1, (4, 4), 0);
        let mut tank = Tank::new(1, 1, 0, 1, 0.0, 0.0);
        tank.mines = TANK_MAX_MINES;
        assert!(!base.refuel(&mut tank));
        assert_eq!(base.refuel_cooldown, 0);
    }

    #[test]
    fn test_regenerates_up_to_maximum() {
        let mut base = Base::new(1, (4, 4), NEUTRAL_TEAM);
        base.shells = 0;
        for _ in 0..BASE_REGEN_TICKS {
            base.tick();
        }
        assert_eq!(base.shells, 1);
        assert_eq!(base.armor, BASE_MAX_ARMOR);
        assert!(base.is_neutral());
    }
}
