use crate::bots::{BotRegistry, BotRuntimeAdapter};
use crate::entities::Entities;
use crate::error::AllianceError;
use crate::events::{HudScope, ScopedHud, TickEvents};
use crate::maps::Map;
use crate::match_state::MatchState;
use crate::systems::respawn::{pick_spawn, RespawnSystem};
use crate::systems::terrain_effects::TerrainEffects;
use crate::systems::{bot_input, combat, player_sim, structures, SimContext, TankControl};
use crate::world::{TerrainChange, World};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    cap_recipients, sanitize_chat, AllianceAction, BuildOrder, HudKind, InputState, PlayerId,
    RangeAdjust, SoundEvent, Team, WelcomeMessage, MAX_PLAYERS, NEUTRAL_TEAM,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlType {
    Human,
    Bot { profile: String },
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub team: Team,
    pub tank_id: u32,
    pub control: ControlType,
    /// Held controls from the latest input frame.
    input: InputState,
    /// One-shot build order, consumed by the next tick.
    pending_build: Option<BuildOrder>,
    last_sequence: Option<u32>,
    /// Range steps requested since the last tick, positive is longer.
    range_steps: i32,
}

impl Player {
    pub fn is_bot(&self) -> bool {
        matches!(self.control, ControlType::Bot { .. })
    }
}

/// Everything a tick produced that the broadcaster needs.
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub tick: u32,
    pub terrain_changes: Vec<TerrainChange>,
    pub sounds: Vec<SoundEvent>,
    pub hud: Vec<ScopedHud>,
    /// Set on the one tick the match ended.
    pub match_ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub tick: u32,
    pub players: usize,
    pub bots: usize,
    pub live_tanks: usize,
    pub shells: usize,
    pub mines: usize,
}

/// The authoritative session. Owns the world, the entity arena and every
/// system, and advances them one tick at a time in a fixed order.
pub struct GameState {
    pub tick: u32,
    pub world: World,
    pub entities: Entities,
    pub match_state: MatchState,
    pub players: BTreeMap<PlayerId, Player>,
    terrain_effects: TerrainEffects,
    respawn: RespawnSystem,
    bots: BotRuntimeAdapter,
    events: TickEvents,
    rng: StdRng,
    next_player_id: PlayerId,
}

impl GameState {
    pub fn new(map: Map, seed: u64) -> Self {
        let mut entities = Entities::new();
        for tile in &map.pillboxes {
            entities.add_pillbox(*tile, NEUTRAL_TEAM);
        }
        for tile in &map.bases {
            entities.add_base(*tile, NEUTRAL_TEAM);
        }
        Self {
            tick: 0,
            world: map.world,
            entities,
            match_state: MatchState::new(),
            players: BTreeMap::new(),
            terrain_effects: TerrainEffects::new(),
            respawn: RespawnSystem::new(),
            bots: BotRuntimeAdapter::new(BotRegistry::default(), 0),
            events: TickEvents::new(),
            rng: StdRng::seed_from_u64(seed),
            next_player_id: 1,
        }
    }

    pub fn set_max_bots(&mut self, max_bots: usize) {
        self.bots.set_max_bots(max_bots);
    }

    pub fn bot_capacity(&self) -> bool {
        self.bots.has_capacity()
    }

    /// The lowest team nobody plays for, or the least crowded one.
    fn assign_team(&self) -> Team {
        let mut counts: BTreeMap<Team, usize> = BTreeMap::new();
        for player in self.players.values() {
            *counts.entry(player.team).or_default() += 1;
        }
        let teams = 0..MAX_PLAYERS as Team;
        if let Some(free) = teams.clone().find(|t| !counts.contains_key(t)) {
            return free;
        }
        teams.min_by_key(|t| counts.get(t).copied().unwrap_or(0)).unwrap_or(0)
    }

    fn spawn_player(&mut self, team: Team, control: ControlType) -> PlayerId {
        let player_id = self.next_player_id;
        self.next_player_id += 1;

        let site = pick_spawn(&self.world, &self.entities, &mut self.rng);
        let tank_id = self.entities.spawn_tank(player_id, team, site.x, site.y);
        if site.on_boat {
            if let Some(tank) = self.entities.tanks.get_mut(&tank_id) {
                tank.on_boat = true;
            }
        }

        info!(
            "Added player {} on team {} at ({:.0}, {:.0})",
            player_id, team, site.x, site.y
        );
        self.events.system(
            HudScope::Everyone,
            format!("Player {} joined the game", player_id),
        );
        self.players.insert(
            player_id,
            Player {
                id: player_id,
                team,
                tank_id,
                control,
                input: InputState::default(),
                pending_build: None,
                last_sequence: None,
                range_steps: 0,
            },
        );
        player_id
    }

    pub fn add_player(&mut self) -> PlayerId {
        let team = self.assign_team();
        self.spawn_player(team, ControlType::Human)
    }

    /// Adds a bot-controlled player. Returns None when no runtime slot is free.
    pub fn add_bot(&mut self, profile: &str, team: Option<Team>) -> Option<PlayerId> {
        if !self.bots.has_capacity() {
            return None;
        }
        let team = team.unwrap_or_else(|| self.assign_team());
        let player_id = self.next_player_id;
        let profile = self.bots.attach(player_id, profile)?;
        Some(self.spawn_player(team, ControlType::Bot { profile }))
    }

    /// Removes a player and their tank. A bot's runtime slot is released first.
    pub fn remove_player(&mut self, player_id: PlayerId) {
        let Some(player) = self.players.remove(&player_id) else {
            return;
        };
        if player.is_bot() {
            self.bots.release(player_id);
        }
        self.respawn.cancel(player.tank_id);
        self.entities.despawn_tank(player.tank_id);

        if !self.players.values().any(|p| p.team == player.team) {
            self.match_state.forget_team(player.team);
        }
        self.events
            .system(HudScope::Everyone, format!("Player {} left the game", player_id));
        info!("Removed player {}", player_id);
    }

    /// Queues an input frame. Frames older than the last accepted one are dropped.
    pub fn queue_input(&mut self, player_id: PlayerId, input: InputState) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        if player.last_sequence.is_some_and(|last| input.sequence <= last) {
            return;
        }
        player.last_sequence = Some(input.sequence);
        match input.range {
            RangeAdjust::Increase => player.range_steps += 1,
            RangeAdjust::Decrease => player.range_steps -= 1,
            RangeAdjust::Hold => {}
        }
        if let Some(order) = input.build.as_ref().and_then(|frame| frame.validate()) {
            player.pending_build = Some(order);
        }
        player.input = input;
    }

    pub fn handle_chat(
        &mut self,
        player_id: PlayerId,
        text: &str,
        alliance_only: bool,
        recipients: Option<Vec<PlayerId>>,
    ) {
        let Some(player) = self.players.get(&player_id) else {
            return;
        };
        let Some(text) = sanitize_chat(text) else {
            return;
        };
        let scope = match recipients {
            Some(recipients) => {
                let mut recipients = cap_recipients(recipients);
                if !recipients.contains(&player_id) {
                    recipients.push(player_id);
                }
                HudScope::Players(recipients)
            }
            None if alliance_only => HudScope::Alliance(player.team),
            None => HudScope::Everyone,
        };
        self.events.hud(scope, HudKind::Chat, Some(player_id), text);
    }

    pub fn handle_alliance(
        &mut self,
        player_id: PlayerId,
        action: AllianceAction,
    ) -> Result<(), AllianceError> {
        let Some(team) = self.players.get(&player_id).map(|p| p.team) else {
            return Ok(());
        };
        let from = Some(player_id);
        match action {
            AllianceAction::Request { team: other } => {
                self.match_state.request_alliance(team, other)?;
                let text = format!("Team {} requests an alliance with team {}", team, other);
                self.events
                    .hud(HudScope::Alliance(other), HudKind::Alliance, from, text.clone());
                self.events
                    .hud(HudScope::Alliance(team), HudKind::Alliance, from, text);
            }
            AllianceAction::Accept { team: other } => {
                self.match_state.accept_alliance(team, other)?;
                self.events.hud(
                    HudScope::Alliance(team),
                    HudKind::Alliance,
                    from,
                    format!("Teams {} and {} are now allied", team, other),
                );
            }
            AllianceAction::Cancel { team: other } => {
                self.match_state.cancel_request(team, other)?;
                self.events.hud(
                    HudScope::Alliance(team),
                    HudKind::Alliance,
                    from,
                    format!("Team {} withdrew its request to team {}", team, other),
                );
            }
            AllianceAction::Break { team: other } => {
                self.match_state.break_alliance(team, other)?;
                let text = format!("Team {} broke its alliance with team {}", team, other);
                self.events
                    .hud(HudScope::Alliance(team), HudKind::Alliance, from, text.clone());
                self.events
                    .hud(HudScope::Alliance(other), HudKind::Alliance, from, text);
            }
            AllianceAction::Leave => {
                let partner = self.match_state.leave_alliance(team)?;
                let text = format!("Team {} broke its alliance with team {}", team, partner);
                self.events
                    .hud(HudScope::Alliance(team), HudKind::Alliance, from, text.clone());
                self.events
                    .hud(HudScope::Alliance(partner), HudKind::Alliance, from, text);
            }
        }
        Ok(())
    }

    /// Turns queued inputs into this tick's controls, keyed by tank id.
    fn apply_inputs(&mut self) -> BTreeMap<u32, TankControl> {
        let mut controls = BTreeMap::new();
        for player in self.players.values_mut() {
            let build = player.pending_build.take();
            let steps = std::mem::take(&mut player.range_steps);
            let Some(tank) = self.entities.tanks.get_mut(&player.tank_id) else {
                continue;
            };
            let adjust = if steps > 0 {
                RangeAdjust::Increase
            } else {
                RangeAdjust::Decrease
            };
            for _ in 0..steps.unsigned_abs() {
                tank.adjust_range(adjust);
            }

            let input = &player.input;
            controls.insert(
                player.tank_id,
                TankControl {
                    accelerate: input.accelerate,
                    decelerate: input.decelerate,
                    turn_left: input.turn_left,
                    turn_right: input.turn_right,
                    shoot: input.shoot,
                    build,
                },
            );
        }
        controls
    }

    /// Advances the session one tick.
    pub fn tick(&mut self) -> TickOutput {
        self.tick += 1;
        let controls = self.apply_inputs();

        self.terrain_effects
            .update(&mut self.world, &mut self.events, self.tick);
        {
            let mut ctx = SimContext {
                tick: self.tick,
                world: &mut self.world,
                entities: &mut self.entities,
                match_state: &mut self.match_state,
                events: &mut self.events,
            };
            player_sim::update(&mut ctx, &controls);
            combat::update(&mut ctx);
            structures::update(&mut ctx);
        }

        let owners: Vec<Team> = self.entities.bases.values().map(|b| b.owner_team).collect();
        let match_ended = self.match_state.evaluate_win(owners);
        if match_ended {
            let winners = self.match_state.winning_teams().to_vec();
            self.events.system(
                HudScope::Everyone,
                format!("Match over, teams {:?} hold every base", winners),
            );
        }

        for tank_id in std::mem::take(&mut self.events.deaths) {
            self.respawn.schedule(tank_id, self.tick);
        }
        self.respawn
            .update(&mut self.world, &mut self.entities, &mut self.rng, self.tick);

        self.run_bots();

        let terrain_changes = self.world.take_changes();
        self.terrain_effects
            .observe_changes(&terrain_changes, self.tick);
        let events = self.events.take();

        if self.tick % 250 == 0 {
            let stats = self.stats();
            debug!(
                "Tick {}: {} players ({} bots), {} tanks alive, {} shells, {} mines",
                stats.tick, stats.players, stats.bots, stats.live_tanks, stats.shells, stats.mines
            );
        }

        TickOutput {
            tick: self.tick,
            terrain_changes,
            sounds: events.sounds,
            hud: events.hud,
            match_ended,
        }
    }

    /// Asks every bot for its next move and queues it as an input frame.
    fn run_bots(&mut self) {
        if self.bots.is_empty() {
            return;
        }
        let bots: Vec<(PlayerId, u32)> = self
            .players
            .values()
            .filter(|p| p.is_bot())
            .map(|p| (p.id, p.tank_id))
            .collect();
        let commands = bot_input::collect_commands(
            &mut self.bots,
            &bots,
            &self.entities,
            &self.match_state,
            self.tick,
        );
        for (player_id, command) in commands {
            let sequence = self
                .players
                .get(&player_id)
                .and_then(|p| p.last_sequence)
                .map_or(0, |s| s.wrapping_add(1));
            self.queue_input(player_id, command.to_input(sequence, self.tick));
        }
    }

    /// Full state for a newly connected player. Terrain is unfiltered;
    /// opponents' resources and stock are hidden.
    pub fn welcome_for(&self, player_id: PlayerId) -> Option<WelcomeMessage> {
        let player = self.players.get(&player_id)?;
        let team = player.team;

        let tanks = self
            .entities
            .tanks
            .values()
            .map(|t| {
                if t.id == player.tank_id {
                    t.snapshot()
                } else {
                    t.snapshot().redacted()
                }
            })
            .collect();
        let pillboxes = self
            .entities
            .pillboxes
            .values()
            .map(|p| {
                if self.match_state.are_teams_allied(team, p.owner_team) {
                    p.snapshot()
                } else {
                    p.snapshot().redacted()
                }
            })
            .collect();
        let bases = self
            .entities
            .bases
            .values()
            .map(|b| {
                if self.match_state.are_teams_allied(team, b.owner_team) {
                    b.snapshot()
                } else {
                    b.snapshot().redacted()
                }
            })
            .collect();
        let mines = self
            .world
            .mined_tiles()
            .filter(|&tile| self.match_state.is_mine_visible_to(tile, team))
            .collect();

        let ended = self.match_state.is_ended();
        Some(WelcomeMessage {
            player_id,
            team,
            tick: self.tick,
            map_name: self.world.name().to_string(),
            terrain: self.world.terrain_codes(),
            terrain_life: self.world.terrain_life(),
            mines,
            tanks,
            pillboxes,
            bases,
            alliances: Some(self.match_state.alliance_snapshots()),
            match_ended: ended.then_some(true),
            winning_teams: ended.then(|| self.match_state.winning_teams().to_vec()),
        })
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            tick: self.tick,
            players: self.players.len(),
            bots: self.bots.len(),
            live_tanks: self.entities.live_tank_count(),
            shells: self.entities.shells.len(),
            mines: self.world.mine_count(),
        }
    }
}
