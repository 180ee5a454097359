//! Shell flight and hit resolution.
//!
//! Each shell moves first, then is tested against terrain, tanks, pillboxes,
//! bases and builders in that order. The first hit stops it.

use super::{destroy_tank, detonate_mines, SimContext};
use crate::entities::{distance_sq, Shell, ShellOwner};
use shared::{
    tile_center, SoundKind, Team, TerrainType, BUILDER_HIT_RADIUS, NEUTRAL_TEAM, SHELL_DAMAGE,
    TANK_HIT_RADIUS,
};

/// What a shell ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hit {
    Terrain,
    Tank(u32),
    Pillbox(u32),
    Base(u32),
    Builder(u32),
}

pub fn update(ctx: &mut SimContext<'_>) {
    let shell_ids: Vec<u32> = ctx.entities.shells.keys().copied().collect();
    for shell_id in shell_ids {
        let Some(shell) = ctx.entities.shells.get_mut(&shell_id) else {
            continue;
        };
        shell.update();
        let shell = shell.clone();

        if !shell.alive {
            if shell.should_explode {
                explode(ctx, &shell);
            }
            continue;
        }
        if let Some(hit) = find_hit(ctx, &shell) {
            if let Some(s) = ctx.entities.shells.get_mut(&shell_id) {
                s.collide();
            }
            apply_hit(ctx, &shell, hit);
        }
    }
    ctx.entities.shells.retain(|_, shell| shell.alive);
}

/// The team a shell fires for. Shells of a removed shooter fight for nobody.
fn shooter_team(ctx: &SimContext<'_>, owner: ShellOwner) -> Team {
    match owner {
        ShellOwner::Tank(id) => ctx.entities.tanks.get(&id).map(|t| t.team),
        ShellOwner::Pillbox(id) => ctx.entities.pillboxes.get(&id).map(|p| p.owner_team),
    }
    .unwrap_or(NEUTRAL_TEAM)
}

fn find_hit(ctx: &SimContext<'_>, shell: &Shell) -> Option<Hit> {
    let tile = shell.tile()?;
    if ctx.world.cell(tile).terrain.is_solid() {
        return Some(Hit::Terrain);
    }

    let position = shell.position();
    let tank_radius_sq = TANK_HIT_RADIUS * TANK_HIT_RADIUS;

    let tank = ctx.entities.tanks.values().find(|t| {
        t.is_alive()
            && shell.owner != ShellOwner::Tank(t.id)
            && distance_sq(t.position(), position) < tank_radius_sq
    });
    if let Some(tank) = tank {
        return Some(Hit::Tank(tank.id));
    }

    let pillbox = ctx.entities.pillboxes.values().find(|p| {
        p.is_active()
            && shell.owner != ShellOwner::Pillbox(p.id)
            && distance_sq(p.center(), position) < tank_radius_sq
    });
    if let Some(pillbox) = pillbox {
        return Some(Hit::Pillbox(pillbox.id));
    }

    let base = ctx
        .entities
        .bases
        .values()
        .find(|b| b.armor > 0 && distance_sq(b.center(), position) < tank_radius_sq);
    if let Some(base) = base {
        return Some(Hit::Base(base.id));
    }

    let builder_radius_sq = BUILDER_HIT_RADIUS * BUILDER_HIT_RADIUS;
    let builder = ctx.entities.builders.values().find(|b| {
        b.is_exposed()
            && shell.owner != ShellOwner::Tank(b.owner_tank)
            && distance_sq((b.x, b.y), position) < builder_radius_sq
    });
    builder.map(|b| Hit::Builder(b.id))
}

fn apply_hit(ctx: &mut SimContext<'_>, shell: &Shell, hit: Hit) {
    let team = shooter_team(ctx, shell.owner);
    match hit {
        Hit::Terrain => {
            let Some(tile) = shell.tile() else {
                return;
            };
            let kind = if ctx.world.cell(tile).terrain == TerrainType::Forest {
                SoundKind::ShotTree
            } else {
                SoundKind::ShotBuilding
            };
            ctx.world.damage_by_shell(tile);
            ctx.events.sound(kind, shell.position());
        }
        Hit::Tank(tank_id) => {
            let Some(tank) = ctx.entities.tanks.get_mut(&tank_id) else {
                return;
            };
            let died = tank.take_damage(SHELL_DAMAGE);
            ctx.events.sound(SoundKind::HitTank, tank.position());
            if died {
                destroy_tank(ctx, tank_id);
            }
        }
        Hit::Pillbox(pillbox_id) => {
            let Some(owner) = ctx.entities.pillboxes.get(&pillbox_id).map(|p| p.owner_team)
            else {
                return;
            };
            let capture = team != NEUTRAL_TEAM && !ctx.match_state.are_teams_allied(team, owner);
            if let Some(pillbox) = ctx.entities.pillboxes.get_mut(&pillbox_id) {
                let disarmed = pillbox.take_damage(SHELL_DAMAGE);
                if !disarmed && capture {
                    pillbox.owner_team = team;
                }
                ctx.events.sound(SoundKind::ShotBuilding, pillbox.center());
            }
        }
        Hit::Base(base_id) => {
            let Some(owner) = ctx.entities.bases.get(&base_id).map(|b| b.owner_team) else {
                return;
            };
            let capture = team != NEUTRAL_TEAM && !ctx.match_state.are_teams_allied(team, owner);
            if let Some(base) = ctx.entities.bases.get_mut(&base_id) {
                let emptied = base.take_damage(SHELL_DAMAGE);
                if !emptied && capture {
                    base.capture(team);
                }
                ctx.events.sound(SoundKind::ShotBuilding, base.center());
            }
        }
        Hit::Builder(builder_id) => {
            if let Some(builder) = ctx.entities.builders.get_mut(&builder_id) {
                builder.kill();
                ctx.events.sound(SoundKind::BuilderKilled, (builder.x, builder.y));
            }
        }
    }
}

/// A shell that ran out of range or left the map explodes where it stopped.
fn explode(ctx: &mut SimContext<'_>, shell: &Shell) {
    let Some(tile) = shell.tile() else {
        return;
    };
    ctx.world.explode(tile);
    ctx.events.sound(
        SoundKind::Explosion,
        (tile_center(tile.0), tile_center(tile.1)),
    );
    if ctx.world.has_mine(tile) {
        detonate_mines(ctx, tile);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::tests::Fixture;
    use shared::{PILLBOX_MAX_ARMOR, TANK_MAX_ARMOR, TILE_SIZE};

    #[test]
    fn test_shell_hits_enemy_tank() {
        let mut fx = Fixture::new(TerrainType::Grass);
        let shooter = fx.entities.spawn_tank(1, 0, tile_center(10), tile_center(10));
        let target = fx.entities.spawn_tank(2, 1, tile_center(12), tile_center(10));
        fx.entities
            .spawn_shell(tile_center(10), tile_center(10), 0, ShellOwner::Tank(shooter), 7.0);

        for _ in 0..20 {
            update(&mut fx.ctx());
        }

        assert_eq!(fx.entities.tanks[&shooter].armor, TANK_MAX_ARMOR);
        assert_eq!(fx.entities.tanks[&target].armor, TANK_MAX_ARMOR - SHELL_DAMAGE);
        assert!(fx.entities.shells.is_empty());
        assert!(fx.events.sounds.iter().any(|s| s.kind == SoundKind::HitTank));
    }

    #[test]
    fn test_shell_degrades_building_without_explosion() {
        let mut fx = Fixture::new(TerrainType::Grass);
        fx.world.paint((12, 10), (12, 10), TerrainType::Building);
        fx.entities
            .spawn_shell(tile_center(10), tile_center(10), 0, ShellOwner::Tank(99), 7.0);

        for _ in 0..20 {
            update(&mut fx.ctx());
        }
        assert_eq!(fx.world.cell((12, 10)).terrain, TerrainType::ShotBuilding);
        assert!(!fx.events.sounds.iter().any(|s| s.kind == SoundKind::Explosion));
    }

    #[test]
    fn test_expired_shell_explodes_terrain() {
        let mut fx = Fixture::new(TerrainType::Grass);
        fx.entities
            .spawn_shell(tile_center(10), tile_center(10), 0, ShellOwner::Tank(99), 1.0);
        for _ in 0..10 {
            update(&mut fx.ctx());
        }
        // One tile of travel ends on the next tile's centre.
        assert_eq!(fx.world.cell((11, 10)).terrain, TerrainType::Crater);
        assert!(fx.entities.shells.is_empty());
    }

    #[test]
    fn test_road_survives_explosion() {
        let mut fx = Fixture::new(TerrainType::Road);
        fx.entities
            .spawn_shell(tile_center(10), tile_center(10), 0, ShellOwner::Tank(99), 1.0);
        for _ in 0..10 {
            update(&mut fx.ctx());
        }
        assert_eq!(fx.world.cell((11, 10)).terrain, TerrainType::Road);
    }

    #[test]
    fn test_pillbox_never_hits_itself() {
        let mut fx = Fixture::new(TerrainType::Grass);
        let pillbox_id = fx.entities.add_pillbox((10, 10), 0);
        fx.entities
            .spawn_shell(tile_center(10), tile_center(10), 0, ShellOwner::Pillbox(pillbox_id), 3.0);
        for _ in 0..30 {
            update(&mut fx.ctx());
        }
        assert_eq!(fx.entities.pillboxes[&pillbox_id].armor, PILLBOX_MAX_ARMOR);
    }

    #[test]
    fn test_surviving_enemy_pillbox_changes_hands() {
        let mut fx = Fixture::new(TerrainType::Grass);
        let shooter = fx.entities.spawn_tank(1, 3, tile_center(10), tile_center(10));
        let pillbox_id = fx.entities.add_pillbox((12, 10), 5);
        fx.entities
            .spawn_shell(tile_center(10), tile_center(10), 0, ShellOwner::Tank(shooter), 7.0);
        for _ in 0..20 {
            update(&mut fx.ctx());
        }
        let pillbox = &fx.entities.pillboxes[&pillbox_id];
        assert_eq!(pillbox.armor, PILLBOX_MAX_ARMOR - SHELL_DAMAGE);
        assert_eq!(pillbox.owner_team, 3);
        assert_eq!(pillbox.fire_interval, shared::PILLBOX_INITIAL_FIRE_INTERVAL / 2);
    }

    #[test]
    fn test_own_builder_is_not_hit() {
        let mut fx = Fixture::new(TerrainType::Grass);
        let shooter = fx.entities.spawn_tank(1, 0, tile_center(10), tile_center(10));
        let other = fx.entities.spawn_tank(2, 1, tile_center(10), tile_center(40));
        let own_builder = fx.entities.tanks[&shooter].builder_id;
        let other_builder = fx.entities.tanks[&other].builder_id;
        for (id, x) in [(own_builder, 1.5), (other_builder, 3.5)] {
            let b = fx.entities.builders.get_mut(&id).unwrap();
            b.state = shared::BuilderState::Harvesting;
            b.x = tile_center(10) + x * TILE_SIZE;
            b.y = tile_center(10);
        }
        fx.entities
            .spawn_shell(tile_center(10), tile_center(10), 0, ShellOwner::Tank(shooter), 7.0);
        for _ in 0..40 {
            update(&mut fx.ctx());
        }
        assert!(fx.entities.builders[&own_builder].is_exposed());
        assert!(!fx.entities.builders[&other_builder].is_exposed());
    }
}
