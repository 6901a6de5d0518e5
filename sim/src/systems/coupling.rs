//! Coupling - automatic coupling on contact and player-driven uncoupling.
//!
//! The train is a tree rooted at the engine (see [`Coupling`]). A free wagon
//! joins the tree as a child of whichever train member touched it. The linear
//! order of the train is never stored; [`ordered_train`] derives it by
//! sorting the members on world y.

use crate::components::*;
use crate::config::SimConfig;
use crate::error::Fault;
use crate::rail::{advance, position_to_world};
use crate::systems::movement::{PlannedMove, TickPlan};
use crate::systems::rules::RuleEngine;
use crate::track::TrackGrid;
use bevy_ecs::prelude::*;
use log::{debug, info};

/// System that pairs free wagons with the train member about to reach them.
///
/// A wagon couples only if it sits on the tile the member would enter next
/// in its direction of travel AND the member's proposed pose is within the
/// coupling distance. A wagon on a parallel branch never couples, however
/// close it is.
pub fn coupling_system(
    grid: Res<TrackGrid>,
    config: Res<SimConfig>,
    mut plan: ResMut<TickPlan>,
    wagons: Query<(Entity, &VehicleId, &TrackPos, &Pose, &Coupling), With<Wagon>>,
) {
    if plan.distance == 0.0 {
        return;
    }
    let look_ahead = plan.distance.signum() * grid.tile_size;
    let reach = config.coupling_distance * grid.tile_size;

    // Projected next tile of every member, computed once.
    let ahead: Vec<(Entity, (i32, i32), Pose)> = plan
        .moves
        .iter()
        .filter_map(|m| {
            advance(&grid, m.pos, look_ahead, None)
                .ok()
                .map(|next| (m.entity, next.tile(), m.pose))
        })
        .collect();

    let mut formed = Vec::new();
    for (wagon, id, pos, pose, coupling) in wagons.iter() {
        if coupling.is_attached() || plan.proposed(wagon).is_some() {
            continue;
        }
        let partner = ahead
            .iter()
            .find(|(_, tile, member)| *tile == pos.tile() && member.distance_to(pose) < reach);
        if let Some((member, _, _)) = partner {
            debug!("wagon {} couples at ({}, {})", id.0, pos.tile_x, pos.tile_y);
            formed.push((wagon, *member));
        }
    }
    plan.couplings.extend(formed);
}

fn engine_entity(world: &mut World) -> Option<Entity> {
    let mut engines = world.query_filtered::<Entity, With<Engine>>();
    engines.iter(world).next()
}

/// Wagons coupled to the engine, sorted by world y (top to bottom).
///
/// The engine itself is not included.
pub fn ordered_train(world: &mut World) -> Vec<Entity> {
    let Some(engine) = engine_entity(world) else {
        return Vec::new();
    };
    let mut members = train_members(engine, |e| {
        world.get::<Coupling>(e).map(|c| c.children.clone()).unwrap_or_default()
    });
    members.retain(|&e| e != engine);
    members.sort_by(|a, b| {
        let ay = world.get::<Pose>(*a).map_or(0.0, |p| p.y);
        let by = world.get::<Pose>(*b).map_or(0.0, |p| p.y);
        ay.total_cmp(&by)
    });
    members
}

/// Detach `wagon` and every wagon on its far side of the train.
///
/// With the train ordered top to bottom, a wagon above the engine takes
/// everything above it along; a wagon below takes everything below. The
/// detached wagons are pushed a little away from the train and become free.
///
/// Returns the detached wagons in train order. Nothing happens, and an empty
/// list is returned, if the wagon is moving or is not coupled. If a detached
/// wagon would come to rest off a siding the uncouple is refused as well, and
/// an `InvalidParking` fault is left pending on the [`RuleEngine`].
pub fn uncouple(world: &mut World, wagon: Entity) -> Vec<Entity> {
    let config = world.resource::<SimConfig>().clone();
    let moving = world
        .get::<Speed>(wagon)
        .is_some_and(|s| s.0.abs() > config.speed_epsilon);
    if moving {
        debug!("wagon {:?} is moving, not uncoupling", wagon);
        return Vec::new();
    }
    let attached = world.get::<Coupling>(wagon).is_some_and(Coupling::is_attached);
    if !attached || world.get::<Wagon>(wagon).is_none() {
        return Vec::new();
    }
    let Some(engine) = engine_entity(world) else {
        return Vec::new();
    };

    let train = ordered_train(world);
    let Some(index) = train.iter().position(|&e| e == wagon) else {
        return Vec::new();
    };
    let engine_y = world.get::<Pose>(engine).map_or(0.0, |p| p.y);
    let wagon_y = world.get::<Pose>(wagon).map_or(0.0, |p| p.y);
    let (detached, direction) = if wagon_y < engine_y {
        (train[..=index].to_vec(), -1.0)
    } else {
        (train[index..].to_vec(), 1.0)
    };

    let moves = match nudge_moves(world, &detached, direction * config.uncouple_nudge) {
        Ok(moves) => moves,
        Err(fault) => {
            world.resource_mut::<RuleEngine>().raise(fault);
            return Vec::new();
        }
    };

    for PlannedMove { entity, pos, pose } in moves {
        if let Some(mut current) = world.get_mut::<TrackPos>(entity) {
            *current = pos;
        }
        if let Some(mut current) = world.get_mut::<Pose>(entity) {
            *current = pose;
        }
        if let Some(mut speed) = world.get_mut::<Speed>(entity) {
            speed.0 = 0.0;
        }
    }

    // Cut every edge touching a detached wagon.
    for &entity in &detached {
        if let Some(mut coupling) = world.get_mut::<Coupling>(entity) {
            coupling.parent = None;
            coupling.children.clear();
        }
    }
    let mut orphans = Vec::new();
    for &entity in train.iter().filter(|e| !detached.contains(*e)).chain([&engine]) {
        let Some(mut coupling) = world.get_mut::<Coupling>(entity) else {
            continue;
        };
        coupling.children.retain(|c| !detached.contains(c));
        if coupling.parent.is_some_and(|p| detached.contains(&p)) {
            coupling.parent = Some(engine);
            orphans.push(entity);
        }
    }
    if let Some(mut coupling) = world.get_mut::<Coupling>(engine) {
        coupling.children.extend(orphans);
    }

    let ids: Vec<u32> = detached
        .iter()
        .filter_map(|&e| world.get::<VehicleId>(e).map(|id| id.0))
        .collect();
    info!("uncoupled wagons {:?}", ids);
    detached
}

/// Nudged positions for the detached wagons, `tiles` along the track.
fn nudge_moves(world: &World, detached: &[Entity], tiles: f32) -> Result<Vec<PlannedMove>, Fault> {
    let grid = world.resource::<TrackGrid>();
    let distance = tiles * grid.tile_size;
    let mut moves = Vec::with_capacity(detached.len());
    for &entity in detached {
        let (Some(pos), Some(id)) = (world.get::<TrackPos>(entity), world.get::<VehicleId>(entity))
        else {
            continue;
        };
        let next = advance(grid, *pos, distance, None)?;
        let pose = position_to_world(grid, next)?;
        if !grid.is_parking_valid(next.tile_x, next.tile_y) {
            return Err(Fault::InvalidParking { id: id.0, x: next.tile_x, y: next.tile_y });
        }
        moves.push(PlannedMove { entity, pos: next, pose });
    }
    Ok(moves)
}
