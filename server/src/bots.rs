//! Server-side bot controllers.
//!
//! A bot is a player whose input frames come from a [`BotController`]
//! instead of a socket. Controllers see a [`BotObservation`] of their own
//! tank and the enemies, and answer with a [`BotCommand`] that is queued
//! exactly like a human input frame.

use log::{error, info};
use shared::{
    direction_towards, tile_center, BuildOrder, BuildOrderFrame, InputState, PlayerId,
    RangeAdjust, TankSnapshot, TILE_SIZE,
};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// What a bot wants its tank to do next tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BotCommand {
    pub accelerate: bool,
    pub decelerate: bool,
    pub turn_left: bool,
    pub turn_right: bool,
    pub shoot: bool,
    pub build: Option<BuildOrder>,
}

impl BotCommand {
    /// Translates the command into a wire-shaped input frame.
    pub fn to_input(&self, sequence: u32, tick: u32) -> InputState {
        InputState {
            sequence,
            tick,
            accelerate: self.accelerate,
            decelerate: self.decelerate,
            turn_left: self.turn_left,
            turn_right: self.turn_right,
            shoot: self.shoot,
            range: RangeAdjust::Hold,
            build: self.build.map(|order| BuildOrderFrame {
                action: order.action.code(),
                x: tile_center(order.tile_x),
                y: tile_center(order.tile_y),
            }),
        }
    }
}

/// A bot's view of the world for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct BotObservation {
    pub tick: u32,
    /// The bot's own tank, unredacted.
    pub tank: TankSnapshot,
    /// Living non-allied tanks, redacted and sorted by id.
    pub enemies: Vec<TankSnapshot>,
}

pub trait BotController: Send {
    fn think(&mut self, observation: &BotObservation) -> BotCommand;
}

/// Does nothing, forever.
#[derive(Debug, Default)]
pub struct IdleBot;

impl BotController for IdleBot {
    fn think(&mut self, _observation: &BotObservation) -> BotCommand {
        BotCommand::default()
    }
}

/// Turns toward the nearest enemy and fires once lined up and in range.
#[derive(Debug, Default)]
pub struct HunterBot;

impl HunterBot {
    const AIM_TOLERANCE: i8 = 4;
    const CLOSE_IN_TILES: f32 = 3.0;
}

impl BotController for HunterBot {
    fn think(&mut self, observation: &BotObservation) -> BotCommand {
        let me = &observation.tank;
        let mut command = BotCommand::default();
        if !me.alive {
            return command;
        }

        let nearest = observation
            .enemies
            .iter()
            .map(|e| {
                let d = (e.x - me.x).hypot(e.y - me.y);
                (d, e)
            })
            .filter(|(d, _)| d.is_finite())
            .min_by(|a, b| a.0.total_cmp(&b.0));
        let Some((distance, enemy)) = nearest else {
            return command;
        };

        let wanted = direction_towards((me.x, me.y), (enemy.x, enemy.y));
        let diff = wanted.wrapping_sub(me.direction) as i8;
        if diff > Self::AIM_TOLERANCE / 2 {
            command.turn_right = true;
        } else if diff < -Self::AIM_TOLERANCE / 2 {
            command.turn_left = true;
        }

        command.accelerate = distance > Self::CLOSE_IN_TILES * TILE_SIZE;
        command.decelerate = !command.accelerate;
        command.shoot = diff.unsigned_abs() <= Self::AIM_TOLERANCE as u8
            && distance <= me.firing_range * TILE_SIZE
            && me.shells > 0;
        command
    }
}

/// Drives forward and swings clockwise whenever it stops making progress.
#[derive(Debug, Default)]
pub struct PatrolBot {
    last_position: Option<(f32, f32)>,
    stuck_ticks: u32,
    turning_ticks: u32,
}

impl PatrolBot {
    const STUCK_LIMIT: u32 = 10;
    const TURN_TICKS: u32 = 16;
}

impl BotController for PatrolBot {
    fn think(&mut self, observation: &BotObservation) -> BotCommand {
        let me = &observation.tank;
        if !me.alive {
            self.last_position = None;
            self.stuck_ticks = 0;
            self.turning_ticks = 0;
            return BotCommand::default();
        }

        let position = (me.x, me.y);
        let moved = self
            .last_position
            .map_or(f32::MAX, |(x, y)| (position.0 - x).hypot(position.1 - y));
        self.last_position = Some(position);

        if self.turning_ticks > 0 {
            self.turning_ticks -= 1;
            return BotCommand {
                accelerate: true,
                turn_right: true,
                ..Default::default()
            };
        }

        if moved < 1.0 {
            self.stuck_ticks += 1;
            if self.stuck_ticks >= Self::STUCK_LIMIT {
                self.stuck_ticks = 0;
                self.turning_ticks = Self::TURN_TICKS;
            }
        } else {
            self.stuck_ticks = 0;
        }

        BotCommand {
            accelerate: true,
            ..Default::default()
        }
    }
}

pub type BotFactory = fn() -> Box<dyn BotController>;

fn idle() -> Box<dyn BotController> {
    Box::new(IdleBot)
}

fn hunter() -> Box<dyn BotController> {
    Box::new(HunterBot)
}

fn patrol() -> Box<dyn BotController> {
    Box::new(PatrolBot::default())
}

/// Controller factories keyed by profile name.
pub struct BotRegistry {
    factories: BTreeMap<String, BotFactory>,
}

impl BotRegistry {
    pub const FALLBACK_PROFILE: &'static str = "idle";

    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, factory: BotFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn profiles(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds a controller for `name`, falling back to the idle profile.
    /// Returns the profile actually used.
    pub fn create(&self, name: &str) -> (String, Box<dyn BotController>) {
        match self.factories.get(name) {
            Some(factory) => (name.to_string(), factory()),
            None => (Self::FALLBACK_PROFILE.to_string(), idle()),
        }
    }
}

impl Default for BotRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("idle", idle);
        registry.register("hunter", hunter);
        registry.register("patrol", patrol);
        registry
    }
}

/// Owns the live controllers and isolates their failures from the tick.
pub struct BotRuntimeAdapter {
    registry: BotRegistry,
    controllers: BTreeMap<PlayerId, Box<dyn BotController>>,
    max_bots: usize,
}

impl BotRuntimeAdapter {
    pub fn new(registry: BotRegistry, max_bots: usize) -> Self {
        Self {
            registry,
            controllers: BTreeMap::new(),
            max_bots,
        }
    }

    pub fn set_max_bots(&mut self, max_bots: usize) {
        self.max_bots = max_bots;
    }

    pub fn has_capacity(&self) -> bool {
        self.controllers.len() < self.max_bots
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn is_bot(&self, player_id: PlayerId) -> bool {
        self.controllers.contains_key(&player_id)
    }

    /// Takes a runtime slot for `player_id`. Returns the profile in use, or
    /// None when every slot is taken.
    pub fn attach(&mut self, player_id: PlayerId, profile: &str) -> Option<String> {
        if !self.has_capacity() && !self.is_bot(player_id) {
            return None;
        }
        let (used, controller) = self.registry.create(profile);
        if used != profile {
            info!("Unknown bot profile '{}', using '{}'", profile, used);
        }
        self.controllers.insert(player_id, controller);
        Some(used)
    }

    pub fn release(&mut self, player_id: PlayerId) -> bool {
        self.controllers.remove(&player_id).is_some()
    }

    /// Runs one controller. A panicking controller yields a neutral command.
    pub fn think(&mut self, player_id: PlayerId, observation: &BotObservation) -> BotCommand {
        let Some(controller) = self.controllers.get_mut(&player_id) else {
            return BotCommand::default();
        };
        match catch_unwind(AssertUnwindSafe(|| controller.think(observation))) {
            Ok(command) => command,
            Err(_) => {
                error!(
                    "Bot controller for player {} failed at tick {}, substituting no-op",
                    player_id, observation.tick
                );
                BotCommand::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::BuildAction;

    fn snapshot(id: u32, x: f32, y: f32, direction: u8) -> TankSnapshot {
        TankSnapshot {
            id,
            player_id: id,
            team: id as u8,
            x,
            y,
            direction,
            speed: 0.0,
            armor: 40,
            shells: 40,
            mines: 0,
            trees: 0,
            on_boat: false,
            reload: 0,
            firing_range: 7.0,
            alive: true,
            carrying_pillbox: false,
        }
    }

    fn observe(me: TankSnapshot, enemies: Vec<TankSnapshot>) -> BotObservation {
        BotObservation {
            tick: 1,
            tank: me,
            enemies,
        }
    }

    struct PanickingBot;

    fn broken() -> Box<dyn BotController> {
        Box::new(PanickingBot)
    }

    impl BotController for PanickingBot {
        fn think(&mut self, _observation: &BotObservation) -> BotCommand {
            panic!("controller bug");
        }
    }

    #[test]
    fn test_hunter_fires_when_aligned() {
        let mut bot = HunterBot;
        let me = snapshot(1, 1000.0, 1000.0, 0);
        let enemy = snapshot(2, 1000.0 + 4.0 * TILE_SIZE, 1000.0, 0);
        let command = bot.think(&observe(me, vec![enemy]));
        assert!(command.shoot);
        assert!(!command.turn_left && !command.turn_right);
        assert!(command.accelerate);
    }

    #[test]
    fn test_hunter_turns_toward_enemy() {
        let mut bot = HunterBot;
        // Enemy due south is direction 64, clockwise from east.
        let me = snapshot(1, 1000.0, 1000.0, 0);
        let enemy = snapshot(2, 1000.0, 1000.0 + 2.0 * TILE_SIZE, 0);
        let command = bot.think(&observe(me, vec![enemy]));
        assert!(command.turn_right);
        assert!(!command.shoot);

        let me = snapshot(1, 1000.0, 1000.0, 128);
        let command = bot.think(&observe(me, vec![snapshot(2, 1000.0, 1000.0 + 512.0, 0)]));
        assert!(command.turn_left);
    }

    #[test]
    fn test_hunter_without_enemies_idles() {
        let mut bot = HunterBot;
        let command = bot.think(&observe(snapshot(1, 0.0, 0.0, 0), vec![]));
        assert_eq!(command, BotCommand::default());
    }

    #[test]
    fn test_patrol_turns_when_stuck() {
        let mut bot = PatrolBot::default();
        let me = snapshot(1, 500.0, 500.0, 0);
        let obs = observe(me, vec![]);
        let mut turned = false;
        for _ in 0..(PatrolBot::STUCK_LIMIT + 2) {
            let command = bot.think(&obs);
            assert!(command.accelerate);
            turned |= command.turn_right;
        }
        assert!(turned);
    }

    #[test]
    fn test_registry_falls_back_to_idle() {
        let registry = BotRegistry::default();
        assert_eq!(registry.profiles(), vec!["hunter", "idle", "patrol"]);
        let (used, _) = registry.create("sniper");
        assert_eq!(used, "idle");
    }

    #[test]
    fn test_adapter_respects_capacity() {
        let mut adapter = BotRuntimeAdapter::new(BotRegistry::default(), 1);
        assert_eq!(adapter.attach(1, "hunter").as_deref(), Some("hunter"));
        assert_eq!(adapter.attach(2, "hunter"), None);
        assert!(adapter.release(1));
        assert!(adapter.has_capacity());
        assert!(!adapter.release(1));
    }

    #[test]
    fn test_panicking_controller_yields_noop() {
        let mut registry = BotRegistry::empty();
        registry.register("broken", broken);
        let mut adapter = BotRuntimeAdapter::new(registry, 4);
        adapter.attach(7, "broken");

        let command = adapter.think(7, &observe(snapshot(7, 0.0, 0.0, 0), vec![]));
        assert_eq!(command, BotCommand::default());
        // The slot survives and keeps answering.
        assert!(adapter.is_bot(7));
    }

    #[test]
    fn test_command_build_becomes_tile_centre_frame() {
        let command = BotCommand {
            build: Some(BuildOrder {
                action: BuildAction::BuildRoad,
                tile_x: 3,
                tile_y: 4,
            }),
            ..Default::default()
        };
        let input = command.to_input(9, 100);
        assert_eq!(input.sequence, 9);
        let frame = input.build.unwrap();
        assert_eq!(frame.validate(), command.build);
    }
}
