use crate::world::{Tile, World};
use shared::{direction_vector, ShellSnapshot, SHELL_SPEED, TILE_SIZE};

/// Who fired a shell. On the wire tanks are positive ids and pillboxes are
/// `-pillbox_id`, so a pillbox can never be mistaken for the tank sharing its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellOwner {
    Tank(u32),
    Pillbox(u32),
}

impl ShellOwner {
    pub fn wire_id(self) -> i32 {
        match self {
            ShellOwner::Tank(id) => id as i32,
            ShellOwner::Pillbox(id) => -(id as i32),
        }
    }

    #[cfg(test)]
    pub fn from_wire(id: i32) -> Option<Self> {
        match id {
            0 => None,
            id if id > 0 => Some(ShellOwner::Tank(id as u32)),
            id => Some(ShellOwner::Pillbox(id.unsigned_abs())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shell {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub direction: u8,
    pub owner: ShellOwner,
    /// Maximum travel in world units.
    pub range: f32,
    pub traveled: f32,
    pub alive: bool,
    /// Set only when the shell ran out of range or left the map.
    pub should_explode: bool,
}

impl Shell {
    pub fn new(id: u32, x: f32, y: f32, direction: u8, owner: ShellOwner, range_tiles: f32) -> Self {
        Self {
            id,
            x,
            y,
            direction,
            owner,
            range: range_tiles * TILE_SIZE,
            traveled: 0.0,
            alive: true,
            should_explode: false,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn tile(&self) -> Option<Tile> {
        World::tile_at_world(self.x, self.y)
    }

    /// Moves one tick. A shell that has used up its range dies in place and explodes.
    pub fn update(&mut self) {
        if !self.alive {
            return;
        }
        if self.traveled >= self.range {
            self.expire();
            return;
        }
        let (dx, dy) = direction_vector(self.direction);
        self.x += dx * SHELL_SPEED;
        self.y += dy * SHELL_SPEED;
        self.traveled += SHELL_SPEED;
        if self.tile().is_none() {
            self.expire();
        }
    }

    fn expire(&mut self) {
        self.alive = false;
        self.should_explode = true;
    }

    /// Stopped by something it hit; direct hits never leave an explosion.
    pub fn collide(&mut self) {
        self.alive = false;
        self.should_explode = false;
    }

    pub fn snapshot(&self) -> ShellSnapshot {
        ShellSnapshot {
            id: self.id,
            x: self.x,
            y: self.y,
            direction: self.direction,
            owner: self.owner.wire_id(),
        }
    }
}
