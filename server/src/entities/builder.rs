use crate::world::Tile;
use shared::{
    tile_center, BuildAction, BuilderSnapshot, BuilderState, BUILDER_DEAD_TICKS,
    BUILDER_PARACHUTE_TICKS, BUILDER_SPEED,
};

/// What a builder did during its movement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderStep {
    Idle,
    Moving,
    /// Standing on its work tile with a work order.
    AtWorkSite,
    /// Climbed back into its tank this tick.
    Entered,
}

/// The tank's dismountable worker ("LGM").
#[derive(Debug, Clone, PartialEq)]
pub struct Builder {
    pub id: u32,
    pub owner_tank: u32,
    pub x: f32,
    pub y: f32,
    pub target_x: f32,
    pub target_y: f32,
    pub state: BuilderState,
    pub trees: u8,
    pub has_mine: bool,
    pub has_pillbox: bool,
    /// Work cadence counter at the site, or the countdown while down or parachuting.
    pub timer: u32,
}

impl Builder {
    pub fn new(id: u32, owner_tank: u32, x: f32, y: f32) -> Self {
        Self {
            id,
            owner_tank,
            x,
            y,
            target_x: x,
            target_y: y,
            state: BuilderState::InTank,
            trees: 0,
            has_mine: false,
            has_pillbox: false,
            timer: 0,
        }
    }

    pub fn is_in_tank(&self) -> bool {
        self.state == BuilderState::InTank
    }

    /// Out of the tank and on the ground where shells can reach it.
    pub fn is_exposed(&self) -> bool {
        !matches!(
            self.state,
            BuilderState::InTank | BuilderState::Parachuting | BuilderState::Waiting
        )
    }

    pub fn is_work_order(&self) -> bool {
        Self::work_action(self.state).is_some()
    }

    pub fn work_state(action: BuildAction) -> BuilderState {
        match action {
            BuildAction::Harvest => BuilderState::Harvesting,
            BuildAction::BuildRoad => BuilderState::BuildingRoad,
            BuildAction::BuildWall => BuilderState::BuildingWall,
            BuildAction::BuildBoat => BuilderState::BuildingBoat,
            BuildAction::Repair => BuilderState::Repairing,
            BuildAction::PlacePillbox => BuilderState::PlacingPillbox,
            BuildAction::LayMine => BuilderState::LayingMine,
        }
    }

    pub fn work_action(state: BuilderState) -> Option<BuildAction> {
        match state {
            BuilderState::Harvesting => Some(BuildAction::Harvest),
            BuilderState::BuildingRoad => Some(BuildAction::BuildRoad),
            BuilderState::BuildingWall => Some(BuildAction::BuildWall),
            BuilderState::BuildingBoat => Some(BuildAction::BuildBoat),
            BuilderState::Repairing => Some(BuildAction::Repair),
            BuilderState::PlacingPillbox => Some(BuildAction::PlacePillbox),
            BuilderState::LayingMine => Some(BuildAction::LayMine),
            _ => None,
        }
    }

    pub fn target_tile(&self) -> Option<Tile> {
        crate::world::World::tile_at_world(self.target_x, self.target_y)
    }

    pub fn at_target(&self) -> bool {
        self.x == self.target_x && self.y == self.target_y
    }

    /// Leaves the tank at `(x, y)` heading for the centre of `tile`.
    pub fn dispatch(&mut self, action: BuildAction, tile: Tile, x: f32, y: f32) {
        self.state = Self::work_state(action);
        self.x = x;
        self.y = y;
        self.target_x = tile_center(tile.0);
        self.target_y = tile_center(tile.1);
        self.timer = 0;
    }

    pub fn recall(&mut self) {
        self.state = BuilderState::Returning;
        self.timer = 0;
    }

    /// Shot or blown up. Cargo is lost; a replacement parachutes in later.
    pub fn kill(&mut self) {
        self.state = BuilderState::Waiting;
        self.timer = BUILDER_DEAD_TICKS;
        self.trees = 0;
        self.has_mine = false;
        self.has_pillbox = false;
    }

    /// Hands back whatever the builder carries as `(trees, mines)`.
    pub fn unload(&mut self) -> (u8, u8) {
        let cargo = (self.trees, u8::from(self.has_mine));
        self.trees = 0;
        self.has_mine = false;
        self.has_pillbox = false;
        cargo
    }

    fn step_towards(&mut self, tx: f32, ty: f32) -> bool {
        let dx = tx - self.x;
        let dy = ty - self.y;
        let distance = (dx * dx + dy * dy).sqrt();
        if !distance.is_finite() || distance <= BUILDER_SPEED {
            self.x = tx;
            self.y = ty;
            return true;
        }
        self.x += dx / distance * BUILDER_SPEED;
        self.y += dy / distance * BUILDER_SPEED;
        false
    }

    /// Advances movement and the down/parachute timers. `owner` is the owning
    /// tank's position while it is alive.
    pub fn update(&mut self, owner: Option<(f32, f32)>) -> BuilderStep {
        match self.state {
            BuilderState::InTank => {
                if let Some((x, y)) = owner {
                    self.x = x;
                    self.y = y;
                }
                BuilderStep::Idle
            }
            BuilderState::Waiting => {
                if self.timer > 0 {
                    self.timer -= 1;
                    if self.timer == 0 {
                        if let Some((x, y)) = owner {
                            self.x = x;
                            self.y = y;
                            self.state = BuilderState::Parachuting;
                            self.timer = BUILDER_PARACHUTE_TICKS;
                        }
                    }
                } else if owner.is_some() {
                    self.state = BuilderState::Returning;
                }
                BuilderStep::Idle
            }
            BuilderState::Parachuting => {
                self.timer = self.timer.saturating_sub(1);
                if self.timer == 0 {
                    self.state = BuilderState::Returning;
                }
                BuilderStep::Idle
            }
            BuilderState::Returning => match owner {
                None => {
                    self.state = BuilderState::Waiting;
                    self.timer = 0;
                    BuilderStep::Idle
                }
                Some((x, y)) => {
                    self.target_x = x;
                    self.target_y = y;
                    if self.step_towards(x, y) {
                        self.state = BuilderState::InTank;
                        self.timer = 0;
                        BuilderStep::Entered
                    } else {
                        BuilderStep::Moving
                    }
                }
            },
            _ if owner.is_none() => {
                self.state = BuilderState::Waiting;
                self.timer = 0;
                BuilderStep::Idle
            }
            _ => {
                if self.at_target() || self.step_towards(self.target_x, self.target_y) {
                    BuilderStep::AtWorkSite
                } else {
                    BuilderStep::Moving
                }
            }
        }
    }

    pub fn snapshot(&self) -> BuilderSnapshot {
        BuilderSnapshot {
            id: self.id,
            owner_tank: self.owner_tank,
            x: self.x,
            y: self.y,
            state: self.state,
        }
    }
}
