//! Per-player delta messages.
//!
//! Every connected player has a view: the tile region around their tank
//! (viewport plus prefetch margin) and the last state of each entity they
//! were sent. After each tick the broadcaster diffs the settled state against
//! each view and builds one [`UpdateMessage`] per player.

use crate::events::HudScope;
use crate::game::{GameState, TickOutput};
use crate::world::{Tile, World};
use shared::{
    BaseSnapshot, BuilderSnapshot, PillboxSnapshot, PlayerId, TankSnapshot, Team, TerrainUpdate,
    UpdateMessage, PREFETCH_MARGIN_TILES, VIEWPORT_HALF_TILES,
};
use std::collections::{BTreeMap, BTreeSet};

/// Inclusive tile rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Region {
    pub fn around(tile: Tile) -> Self {
        let reach = VIEWPORT_HALF_TILES + PREFETCH_MARGIN_TILES;
        let (x, y) = (tile.0 as i32, tile.1 as i32);
        Self {
            min_x: x - reach,
            min_y: y - reach,
            max_x: x + reach,
            max_y: y + reach,
        }
    }

    pub fn contains(&self, tile: Tile) -> bool {
        let (x, y) = (tile.0 as i32, tile.1 as i32);
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        World::tile_at_world(x, y).is_some_and(|tile| self.contains(tile))
    }
}

#[derive(Debug, Default)]
struct PlayerView {
    /// The tank tile the region was last computed for.
    anchor: Option<Tile>,
    region: Option<Region>,
    tanks: BTreeMap<u32, TankSnapshot>,
    shells: BTreeSet<u32>,
    builders: BTreeMap<u32, BuilderSnapshot>,
    pillboxes: BTreeMap<u32, PillboxSnapshot>,
    bases: BTreeMap<u32, BaseSnapshot>,
    /// Changed tiles withheld because they were out of view.
    stale_tiles: BTreeSet<Tile>,
}

impl PlayerView {
    fn sees(&self, tile: Tile) -> bool {
        self.region.is_some_and(|r| r.contains(tile))
    }

    fn sees_point(&self, x: f32, y: f32) -> bool {
        self.region.is_some_and(|r| r.contains_point(x, y))
    }
}

#[derive(Debug, Default)]
pub struct VisibilityBroadcaster {
    views: BTreeMap<PlayerId, PlayerView>,
}

impl VisibilityBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a player right after their welcome was built, so the
    /// entities the welcome carried count as already sent.
    pub fn register(&mut self, player_id: PlayerId, game: &GameState) {
        let mut view = PlayerView::default();
        if let Some(welcome) = game.welcome_for(player_id) {
            view.tanks = welcome.tanks.into_iter().map(|t| (t.id, t)).collect();
            view.pillboxes = welcome.pillboxes.into_iter().map(|p| (p.id, p)).collect();
            view.bases = welcome.bases.into_iter().map(|b| (b.id, b)).collect();
        }
        self.views.insert(player_id, view);
    }

    pub fn unregister(&mut self, player_id: PlayerId) {
        self.views.remove(&player_id);
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Builds the non-empty updates for every registered player.
    pub fn build_updates(
        &mut self,
        game: &GameState,
        output: &TickOutput,
    ) -> Vec<(PlayerId, UpdateMessage)> {
        // Per tile: true while every change this tick was a mine being laid.
        let mut changed: BTreeMap<Tile, bool> = BTreeMap::new();
        for change in &output.terrain_changes {
            *changed.entry(change.tile).or_insert(true) &= change.mine_laid;
        }

        let mut updates = Vec::with_capacity(self.views.len());
        for (&player_id, view) in self.views.iter_mut() {
            let Some(player) = game.players.get(&player_id) else {
                continue;
            };
            let mut update = UpdateMessage::new(output.tick);
            let own_tank = player.tank_id;

            let anchor = game.entities.tanks.get(&own_tank).and_then(|t| t.tile());
            if anchor.is_some() && anchor != view.anchor {
                view.anchor = anchor;
                view.region = anchor.map(Region::around);
                catch_up_terrain(view, game, player.team, &mut update);
            }

            diff_terrain(view, game, player.team, &changed, &mut update);
            diff_tanks(view, game, own_tank, &mut update);
            diff_shells(view, game, &mut update);
            diff_builders(view, game, own_tank, &mut update);
            diff_structures(view, game, player.team, &mut update);

            update.sounds = output
                .sounds
                .iter()
                .filter(|s| view.sees_point(s.x, s.y))
                .copied()
                .collect();
            update.hud = output
                .hud
                .iter()
                .filter(|h| hud_reaches(&h.scope, player_id, player.team, game))
                .map(|h| h.message.clone())
                .collect();

            if output.match_ended {
                update.match_ended = Some(true);
                update.winning_teams = Some(game.match_state.winning_teams().to_vec());
            }

            if !update.is_empty() {
                updates.push((player_id, update));
            }
        }
        updates
    }
}

fn terrain_update(game: &GameState, team: Team, tile: Tile) -> TerrainUpdate {
    let cell = game.world.cell(tile);
    TerrainUpdate {
        x: tile.0,
        y: tile.1,
        terrain: cell.terrain.code(),
        life: cell.life,
        mine: cell.mine && game.match_state.is_mine_visible_to(tile, team),
    }
}

/// Sends the withheld tiles that the new region now covers.
fn catch_up_terrain(view: &mut PlayerView, game: &GameState, team: Team, update: &mut UpdateMessage) {
    let Some(region) = view.region else {
        return;
    };
    let ready: Vec<Tile> = view
        .stale_tiles
        .iter()
        .copied()
        .filter(|&t| region.contains(t))
        .collect();
    for tile in ready {
        view.stale_tiles.remove(&tile);
        update.terrain.push(terrain_update(game, team, tile));
    }
}

fn diff_terrain(
    view: &mut PlayerView,
    game: &GameState,
    team: Team,
    changed: &BTreeMap<Tile, bool>,
    update: &mut UpdateMessage,
) {
    for (&tile, &mine_laid) in changed {
        // A mine this team cannot see leaves nothing to report.
        if mine_laid && !game.match_state.is_mine_visible_to(tile, team) {
            continue;
        }
        if view.sees(tile) {
            view.stale_tiles.remove(&tile);
            update.terrain.push(terrain_update(game, team, tile));
        } else {
            view.stale_tiles.insert(tile);
        }
    }
}

fn diff_tanks(view: &mut PlayerView, game: &GameState, own_tank: u32, update: &mut UpdateMessage) {
    for tank in game.entities.tanks.values() {
        let own = tank.id == own_tank;
        if !own && !view.sees_point(tank.x, tank.y) {
            continue;
        }
        let snapshot = if own {
            tank.snapshot()
        } else {
            tank.snapshot().redacted()
        };
        if view.tanks.get(&tank.id) != Some(&snapshot) {
            view.tanks.insert(tank.id, snapshot.clone());
            update.tanks.push(snapshot);
        }
    }
    let gone: Vec<u32> = view
        .tanks
        .keys()
        .copied()
        .filter(|id| !game.entities.tanks.contains_key(id))
        .collect();
    for id in gone {
        view.tanks.remove(&id);
        update.removed_tank_ids.push(id);
    }
}

fn diff_shells(view: &mut PlayerView, game: &GameState, update: &mut UpdateMessage) {
    for shell in game.entities.shells.values() {
        if view.sees_point(shell.x, shell.y) {
            view.shells.insert(shell.id);
            update.shells.push(shell.snapshot());
        }
    }
    let gone: Vec<u32> = view
        .shells
        .iter()
        .copied()
        .filter(|id| !game.entities.shells.contains_key(id))
        .collect();
    for id in gone {
        view.shells.remove(&id);
        update.removed_shell_ids.push(id);
    }
}

fn diff_builders(view: &mut PlayerView, game: &GameState, own_tank: u32, update: &mut UpdateMessage) {
    for builder in game.entities.builders.values() {
        let own = builder.owner_tank == own_tank;
        if !own && !view.sees_point(builder.x, builder.y) {
            continue;
        }
        let snapshot = builder.snapshot();
        if view.builders.get(&builder.id) != Some(&snapshot) {
            view.builders.insert(builder.id, snapshot.clone());
            update.builders.push(snapshot);
        }
    }
    let gone: Vec<u32> = view
        .builders
        .keys()
        .copied()
        .filter(|id| !game.entities.builders.contains_key(id))
        .collect();
    for id in gone {
        view.builders.remove(&id);
        update.removed_builder_ids.push(id);
    }
}

/// Pillboxes and bases go to everyone regardless of position. Stock and
/// reload state only reach the owner's alliance.
fn diff_structures(view: &mut PlayerView, game: &GameState, team: Team, update: &mut UpdateMessage) {
    let allied = |owner: Team| game.match_state.are_teams_allied(team, owner);

    for pillbox in game.entities.pillboxes.values() {
        let mut snapshot = pillbox.snapshot();
        if !allied(pillbox.owner_team) {
            snapshot = snapshot.redacted();
        }
        if view.pillboxes.get(&pillbox.id) != Some(&snapshot) {
            view.pillboxes.insert(pillbox.id, snapshot.clone());
            update.pillboxes.push(snapshot);
        }
    }
    for base in game.entities.bases.values() {
        let mut snapshot = base.snapshot();
        if !allied(base.owner_team) {
            snapshot = snapshot.redacted();
        }
        if view.bases.get(&base.id) != Some(&snapshot) {
            view.bases.insert(base.id, snapshot.clone());
            update.bases.push(snapshot);
        }
    }
}

fn hud_reaches(scope: &HudScope, player_id: PlayerId, team: Team, game: &GameState) -> bool {
    match scope {
        HudScope::Everyone => true,
        HudScope::Alliance(sender_team) => game.match_state.are_teams_allied(*sender_team, team),
        HudScope::Players(ids) => ids.contains(&player_id),
    }
}
