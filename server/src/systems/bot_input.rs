//! Builds bot observations from the settled tick state and collects the
//! commands for the next tick.

use crate::bots::{BotCommand, BotObservation, BotRuntimeAdapter};
use crate::entities::Entities;
use crate::match_state::MatchState;
use shared::PlayerId;

/// Observation for the bot driving `tank_id`, or None if the tank is gone.
/// The enemy list is sorted by tank id so equal states give equal answers.
pub fn observe(
    entities: &Entities,
    match_state: &MatchState,
    tank_id: u32,
    tick: u32,
) -> Option<BotObservation> {
    let tank = entities.tanks.get(&tank_id)?;
    let enemies = entities
        .tanks
        .values()
        .filter(|t| {
            t.id != tank_id && t.is_alive() && !match_state.are_teams_allied(tank.team, t.team)
        })
        .map(|t| t.snapshot().redacted())
        .collect();
    Some(BotObservation {
        tick,
        tank: tank.snapshot(),
        enemies,
    })
}

/// Runs every bot controller once. `bots` maps player ids to tank ids.
pub fn collect_commands(
    adapter: &mut BotRuntimeAdapter,
    bots: &[(PlayerId, u32)],
    entities: &Entities,
    match_state: &MatchState,
    tick: u32,
) -> Vec<(PlayerId, BotCommand)> {
    let mut commands = Vec::with_capacity(bots.len());
    for &(player_id, tank_id) in bots {
        let Some(observation) = observe(entities, match_state, tank_id, tick) else {
            continue;
        };
        commands.push((player_id, adapter.think(player_id, &observation)));
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bots::BotRegistry;
    use shared::tile_center;

    #[test]
    fn test_observation_lists_enemies_by_id() {
        let mut entities = Entities::new();
        let mut match_state = MatchState::new();
        let me = entities.spawn_tank(1, 0, tile_center(10), tile_center(10));
        let enemy_b = entities.spawn_tank(2, 1, tile_center(20), tile_center(10));
        let friend = entities.spawn_tank(3, 2, tile_center(12), tile_center(10));
        let enemy_a = entities.spawn_tank(4, 3, tile_center(11), tile_center(10));
        match_state.request_alliance(0, 2).unwrap();
        match_state.accept_alliance(2, 0).unwrap();

        let obs = observe(&entities, &match_state, me, 5).unwrap();
        let ids: Vec<u32> = obs.enemies.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![enemy_b, enemy_a]);
        assert!(!ids.contains(&friend));
        assert_eq!(obs.tank.shells, shared::TANK_MAX_SHELLS);
        assert!(obs.enemies.iter().all(|e| e.shells == 0));
    }

    #[test]
    fn test_commands_skip_missing_tanks() {
        let mut entities = Entities::new();
        let match_state = MatchState::new();
        let tank_id = entities.spawn_tank(1, 0, tile_center(10), tile_center(10));
        let mut adapter = BotRuntimeAdapter::new(BotRegistry::default(), 4);
        adapter.attach(1, "patrol");

        let commands = collect_commands(
            &mut adapter,
            &[(1, tank_id), (2, 999)],
            &entities,
            &match_state,
            1,
        );
        assert_eq!(commands.len(), 1);
        assert!(commands[0].1.accelerate);
    }
}
