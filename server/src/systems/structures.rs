//! Pillbox targeting and fire, base capture and refuelling.

use super::SimContext;
use crate::entities::{distance_sq, Entities, ShellOwner};
use crate::events::HudScope;
use shared::{
    direction_towards, SoundKind, Team, TerrainType, BASE_REFUEL_RADIUS, PILLBOX_RANGE_TILES,
    SHELL_SPEED, TANK_MAX_RANGE, TILE_SIZE,
};

pub fn update(ctx: &mut SimContext<'_>) {
    update_pillboxes(ctx);
    update_bases(ctx);
}

fn update_pillboxes(ctx: &mut SimContext<'_>) {
    let pillbox_ids: Vec<u32> = ctx.entities.pillboxes.keys().copied().collect();
    for pillbox_id in pillbox_ids {
        let Some(pillbox) = ctx.entities.pillboxes.get(&pillbox_id) else {
            continue;
        };
        if !pillbox.is_active() {
            if let Some(p) = ctx.entities.pillboxes.get_mut(&pillbox_id) {
                p.acquire(None);
            }
            continue;
        }
        let (center, owner) = (pillbox.center(), pillbox.owner_team);
        let target = nearest_target(ctx, center, owner);

        let Some(pillbox) = ctx.entities.pillboxes.get_mut(&pillbox_id) else {
            continue;
        };
        pillbox.tick();
        pillbox.acquire(target);
        if !pillbox.try_fire() {
            continue;
        }
        let Some(tank) = target.and_then(|id| ctx.entities.tanks.get(&id)) else {
            continue;
        };

        // Aim where the tank will be when a shell covers the distance.
        let distance = distance_sq(center, tank.position()).sqrt();
        let flight = distance / SHELL_SPEED;
        let (vx, vy) = tank.velocity();
        let predicted = (tank.x + vx * flight, tank.y + vy * flight);
        let direction = direction_towards(center, predicted);
        let range = (distance_sq(center, predicted).sqrt() / TILE_SIZE + 1.0).min(TANK_MAX_RANGE);

        ctx.entities
            .spawn_shell(center.0, center.1, direction, ShellOwner::Pillbox(pillbox_id), range);
        ctx.events.sound(SoundKind::PillboxFire, center);
    }
}

/// Nearest living tank the pillbox may shoot at. Allied tanks and tanks
/// hiding in forest are ignored. Ties go to the lower id.
fn nearest_target(ctx: &SimContext<'_>, center: (f32, f32), owner: Team) -> Option<u32> {
    let range = PILLBOX_RANGE_TILES * TILE_SIZE;
    let range_sq = range * range;

    let mut best: Option<(f32, u32)> = None;
    for tank in ctx.entities.tanks.values() {
        if !tank.is_alive() || ctx.match_state.are_teams_allied(owner, tank.team) {
            continue;
        }
        if ctx.world.terrain_at_world(tank.x, tank.y) == TerrainType::Forest {
            continue;
        }
        let d = distance_sq(center, tank.position());
        if !d.is_finite() || d >= range_sq {
            continue;
        }
        if best.map_or(true, |(best_d, _)| d < best_d) {
            best = Some((d, tank.id));
        }
    }
    best.map(|(_, id)| id)
}

fn update_bases(ctx: &mut SimContext<'_>) {
    let Entities { tanks, bases, .. } = &mut *ctx.entities;

    for base in bases.values_mut() {
        base.tick();

        let occupant = tanks
            .values()
            .find(|t| t.is_alive() && t.tile() == Some(base.tile()));
        if let Some(tank) = occupant {
            let enemy = !ctx.match_state.are_teams_allied(tank.team, base.owner_team);
            if base.is_neutral() || (enemy && base.armor == 0) {
                base.capture(tank.team);
                ctx.events.system(
                    HudScope::Everyone,
                    format!("Player {} captured a base", tank.player_id),
                );
            }
        }

        let radius_sq = BASE_REFUEL_RADIUS * BASE_REFUEL_RADIUS;
        let neutral = base.is_neutral();
        let customer = tanks.values_mut().find(|t| {
            t.is_alive()
                && distance_sq(t.position(), base.center()) < radius_sq
                && (neutral || ctx.match_state.are_teams_allied(t.team, base.owner_team))
        });
        if let Some(tank) = customer {
            base.refuel(tank);
        }
    }
}
