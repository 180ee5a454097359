//! Builder work orders: dispatch from the tank and execution on site.

use super::SimContext;
use crate::entities::Builder;
use crate::world::Tile;
use shared::{
    tile_center, BuildAction, BuildOrder, SoundKind, TerrainType, PILLBOX_MAX_ARMOR,
    TANK_MAX_TREES,
};

const HARVEST_YIELD: u8 = 4;
const ROAD_COST: u8 = 2;
const WALL_COST: u8 = 2;
const BOAT_COST: u8 = 20;
const PILLBOX_COST: u8 = 4;
const BUILDING_REPAIR_COST: u8 = 1;
/// Full repair of a disarmed pillbox.
const MAX_PILLBOX_REPAIR_COST: u8 = 4;

/// Ticks on site between arrival and the work being done.
fn cadence(action: BuildAction) -> u32 {
    match action {
        BuildAction::Harvest | BuildAction::BuildRoad | BuildAction::LayMine => 10,
        BuildAction::BuildWall
        | BuildAction::BuildBoat
        | BuildAction::Repair
        | BuildAction::PlacePillbox => 20,
    }
}

/// Trees a repair of `armor` back to full costs, scaled to the damage taken.
pub fn pillbox_repair_cost(armor: u8) -> u8 {
    let missing = PILLBOX_MAX_ARMOR.saturating_sub(armor) as u32;
    let full = MAX_PILLBOX_REPAIR_COST as u32;
    let max = PILLBOX_MAX_ARMOR as u32;
    ((missing * full + max - 1) / max) as u8
}

/// Sends the tank's builder out with an order, loading the cargo the job needs.
/// Returns false when the tank is dead or its builder is already out.
pub fn dispatch(ctx: &mut SimContext<'_>, tank_id: u32, order: BuildOrder) -> bool {
    let Some(tank) = ctx.entities.tanks.get_mut(&tank_id) else {
        return false;
    };
    if !tank.is_alive() {
        return false;
    }
    let Some(builder) = ctx.entities.builders.get_mut(&tank.builder_id) else {
        return false;
    };
    if !builder.is_in_tank() {
        return false;
    }

    let trees = match order.action {
        BuildAction::Harvest | BuildAction::LayMine => 0,
        BuildAction::BuildRoad => ROAD_COST,
        BuildAction::BuildWall => WALL_COST,
        BuildAction::BuildBoat => BOAT_COST,
        BuildAction::Repair => tank.trees.min(MAX_PILLBOX_REPAIR_COST),
        BuildAction::PlacePillbox if tank.carried_pillbox.is_some() => 0,
        BuildAction::PlacePillbox => PILLBOX_COST,
    };
    if tank.trees >= trees {
        tank.trees -= trees;
        builder.trees = trees;
    }
    if order.action == BuildAction::LayMine && tank.mines > 0 {
        tank.mines -= 1;
        builder.has_mine = true;
    }
    builder.has_pillbox =
        order.action == BuildAction::PlacePillbox && tank.carried_pillbox.is_some();

    builder.dispatch(order.action, (order.tile_x, order.tile_y), tank.x, tank.y);
    true
}

/// Advances a builder standing on its work site. The work happens once the
/// cadence elapses; success or failure, the builder then heads home.
pub fn execute(ctx: &mut SimContext<'_>, builder_id: u32) {
    let Some(builder) = ctx.entities.builders.get_mut(&builder_id) else {
        return;
    };
    let Some(action) = Builder::work_action(builder.state) else {
        return;
    };
    builder.timer += 1;
    if builder.timer < cadence(action) {
        return;
    }
    let Some(tile) = builder.target_tile() else {
        builder.recall();
        return;
    };

    let done = perform(ctx, builder_id, action, tile);
    if let Some(builder) = ctx.entities.builders.get_mut(&builder_id) {
        builder.recall();
    }
    if done {
        ctx.events.sound(
            SoundKind::BuildComplete,
            (tile_center(tile.0), tile_center(tile.1)),
        );
    }
}

fn perform(ctx: &mut SimContext<'_>, builder_id: u32, action: BuildAction, tile: Tile) -> bool {
    let terrain = ctx.world.cell(tile).terrain;
    let Some(builder) = ctx.entities.builders.get(&builder_id) else {
        return false;
    };
    let owner_tank = builder.owner_tank;

    match action {
        BuildAction::Harvest => {
            if terrain != TerrainType::Forest {
                return false;
            }
            ctx.world.set_terrain(tile, TerrainType::Grass);
            if let Some(b) = ctx.entities.builders.get_mut(&builder_id) {
                b.trees = b.trees.saturating_add(HARVEST_YIELD).min(TANK_MAX_TREES);
            }
            true
        }
        BuildAction::BuildRoad => {
            if terrain != TerrainType::Grass || !spend_trees(ctx, builder_id, ROAD_COST) {
                return false;
            }
            ctx.world.set_terrain(tile, TerrainType::Road);
            true
        }
        BuildAction::BuildWall => {
            if terrain != TerrainType::Grass
                || occupied(ctx, tile)
                || !spend_trees(ctx, builder_id, WALL_COST)
            {
                return false;
            }
            ctx.world.set_terrain(tile, TerrainType::Building);
            true
        }
        BuildAction::BuildBoat => {
            if terrain != TerrainType::River || !spend_trees(ctx, builder_id, BOAT_COST) {
                return false;
            }
            ctx.world.place_boat(tile, 0);
            true
        }
        BuildAction::Repair => {
            if let Some(pillbox_id) = ctx.entities.pillbox_at(tile) {
                let armor = ctx.entities.pillboxes[&pillbox_id].armor;
                let cost = pillbox_repair_cost(armor);
                if cost == 0 || !spend_trees(ctx, builder_id, cost) {
                    return false;
                }
                if let Some(pillbox) = ctx.entities.pillboxes.get_mut(&pillbox_id) {
                    pillbox.armor = PILLBOX_MAX_ARMOR;
                }
                true
            } else if terrain == TerrainType::ShotBuilding
                && spend_trees(ctx, builder_id, BUILDING_REPAIR_COST)
            {
                ctx.world.set_terrain(tile, TerrainType::Building);
                true
            } else {
                false
            }
        }
        BuildAction::PlacePillbox => {
            if matches!(
                terrain,
                TerrainType::DeepSea | TerrainType::Boat | TerrainType::Forest
            ) || occupied(ctx, tile)
            {
                return false;
            }
            let carrying = ctx
                .entities
                .builders
                .get(&builder_id)
                .is_some_and(|b| b.has_pillbox);
            let carried = ctx
                .entities
                .tanks
                .get(&owner_tank)
                .and_then(|t| t.carried_pillbox);
            if let (true, Some(pillbox_id)) = (carrying, carried) {
                if let Some(pillbox) = ctx.entities.pillboxes.get_mut(&pillbox_id) {
                    pillbox.drop_at(tile);
                }
                if let Some(tank) = ctx.entities.tanks.get_mut(&owner_tank) {
                    tank.carried_pillbox = None;
                }
                if let Some(b) = ctx.entities.builders.get_mut(&builder_id) {
                    b.has_pillbox = false;
                }
                return true;
            }
            let Some(team) = ctx.entities.tanks.get(&owner_tank).map(|t| t.team) else {
                return false;
            };
            if !spend_trees(ctx, builder_id, PILLBOX_COST) {
                return false;
            }
            ctx.entities.add_pillbox(tile, team);
            true
        }
        BuildAction::LayMine => {
            let has_mine = ctx
                .entities
                .builders
                .get(&builder_id)
                .is_some_and(|b| b.has_mine);
            if !has_mine
                || terrain.is_water()
                || matches!(terrain, TerrainType::Building | TerrainType::ShotBuilding)
                || ctx.world.has_mine(tile)
            {
                return false;
            }
            let Some(team) = ctx.entities.tanks.get(&owner_tank).map(|t| t.team) else {
                return false;
            };
            ctx.world.set_mine(tile, true);
            ctx.match_state.record_mine(tile, team);
            if let Some(b) = ctx.entities.builders.get_mut(&builder_id) {
                b.has_mine = false;
            }
            true
        }
    }
}

fn spend_trees(ctx: &mut SimContext<'_>, builder_id: u32, cost: u8) -> bool {
    match ctx.entities.builders.get_mut(&builder_id) {
        Some(builder) if builder.trees >= cost => {
            builder.trees -= cost;
            true
        }
        _ => false,
    }
}

/// A pillbox or base already stands on the tile.
fn occupied(ctx: &SimContext<'_>, tile: Tile) -> bool {
    ctx.entities.pillbox_at(tile).is_some() || ctx.entities.base_at(tile).is_some()
}
