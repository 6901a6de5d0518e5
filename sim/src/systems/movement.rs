//! Movement systems - throttle handling and motion planning.

use crate::components::*;
use crate::config::SimConfig;
use crate::rail::{advance, position_to_world};
use crate::systems::rules::RuleEngine;
use crate::track::TrackGrid;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Resource containing the frame time for the current tick, in milliseconds.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Discrete throttle input from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThrottleCommand {
    Increase,
    Decrease,
    Neutral,
}

/// Commanded throttle position of the engine.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Throttle {
    pub notch: i8,
}

impl Throttle {
    pub fn apply(&mut self, command: ThrottleCommand, max_notch: i8) {
        let limit = max_notch.max(0);
        self.notch = match command {
            ThrottleCommand::Increase => self.notch.saturating_add(1),
            ThrottleCommand::Decrease => self.notch.saturating_sub(1),
            ThrottleCommand::Neutral => 0,
        }
        .clamp(-limit, limit);
    }

    pub fn speed(&self, config: &SimConfig) -> f32 {
        self.notch as f32 * config.speed_per_notch
    }
}

/// Proposed new state for one vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedMove {
    pub entity: Entity,
    pub pos: TrackPos,
    pub pose: Pose,
}

/// Everything a tick wants to change, held back until it is validated.
#[derive(Resource, Debug, Default)]
pub struct TickPlan {
    /// Signed distance every coupled vehicle travels this tick.
    pub distance: f32,
    pub moves: Vec<PlannedMove>,
    /// `(free wagon, train member it couples to)`.
    pub couplings: Vec<(Entity, Entity)>,
}

impl TickPlan {
    pub fn clear(&mut self) {
        self.distance = 0.0;
        self.moves.clear();
        self.couplings.clear();
    }

    pub fn proposed(&self, entity: Entity) -> Option<&PlannedMove> {
        self.moves.iter().find(|m| m.entity == entity)
    }
}

/// System that turns the throttle into speed and syncs it down the train.
pub fn throttle_system(
    config: Res<SimConfig>,
    throttle: Res<Throttle>,
    engine: Query<Entity, With<Engine>>,
    mut vehicles: Query<(&mut Speed, &Coupling)>,
) {
    let speed = throttle.speed(&config);
    for root in engine.iter() {
        let members = train_members(root, |e| {
            vehicles.get(e).map(|(_, c)| c.children.clone()).unwrap_or_default()
        });
        for member in members {
            if let Ok((mut s, _)) = vehicles.get_mut(member) {
                s.0 = speed;
            }
        }
    }
}

/// System that plans this tick's movement for the engine and its train.
///
/// Every coupled vehicle moves by the engine's distance. Crossings are
/// checked by the rule engine; nothing is committed here.
pub fn plan_motion_system(
    dt: Res<DeltaTime>,
    grid: Res<TrackGrid>,
    mut rules: ResMut<RuleEngine>,
    mut plan: ResMut<TickPlan>,
    engine: Query<Entity, With<Engine>>,
    vehicles: Query<(&TrackPos, &Pose, &Speed, &Coupling)>,
) {
    plan.clear();
    let Some(root) = engine.iter().next() else {
        return;
    };
    let Ok((_, _, speed, _)) = vehicles.get(root) else {
        return;
    };
    let distance = speed.0 * dt.0 / 1000.0;
    plan.distance = distance;

    let members = train_members(root, |e| {
        vehicles.get(e).map(|(_, _, _, c)| c.children.clone()).unwrap_or_default()
    });
    for entity in members {
        let Ok((pos, pose, _, _)) = vehicles.get(entity) else {
            continue;
        };
        let next = match advance(&grid, *pos, distance, Some(&mut *rules)) {
            Ok(next) => next,
            Err(fault) => {
                rules.raise(fault);
                *pos
            }
        };
        if !rules.check_track(&grid, next.tile_x, next.tile_y) {
            plan.moves.push(PlannedMove { entity, pos: *pos, pose: *pose });
            continue;
        }
        let next_pose = match position_to_world(&grid, next) {
            Ok(p) => p,
            Err(fault) => {
                rules.raise(fault);
                *pose
            }
        };
        plan.moves.push(PlannedMove { entity, pos: next, pose: next_pose });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;

    fn setup(throttle: i8, dt_ms: f32) -> (World, Schedule, Entity, Entity) {
        let grid = TrackGrid::parse(1, 4, 64.0, "tttt", "sss ", "    ").unwrap();
        let mut world = World::new();
        world.insert_resource(SimConfig::default());
        world.insert_resource(Throttle { notch: throttle });
        world.insert_resource(DeltaTime(dt_ms));
        world.insert_resource(RuleEngine::new(2.0));
        world.insert_resource(TickPlan::default());

        let engine_pos = TrackPos::centered(0, 0);
        let wagon_pos = TrackPos::centered(0, 1);
        let engine_pose = position_to_world(&grid, engine_pos).unwrap();
        let wagon_pose = position_to_world(&grid, wagon_pos).unwrap();
        world.insert_resource(grid);

        let engine = world.spawn(EngineBundle::new(0, engine_pos, engine_pose)).id();
        let wagon = world.spawn(WagonBundle::new(1, wagon_pos, wagon_pose)).id();
        world.get_mut::<Coupling>(engine).unwrap().children.push(wagon);
        world.get_mut::<Coupling>(wagon).unwrap().parent = Some(engine);

        let mut schedule = Schedule::default();
        schedule.add_systems((throttle_system, plan_motion_system).chain());
        (world, schedule, engine, wagon)
    }

    #[test]
    fn test_throttle_steps_and_clamps() {
        let mut throttle = Throttle::default();
        throttle.apply(ThrottleCommand::Increase, 2);
        throttle.apply(ThrottleCommand::Increase, 2);
        throttle.apply(ThrottleCommand::Increase, 2);
        assert_eq!(throttle.notch, 2);
        throttle.apply(ThrottleCommand::Neutral, 2);
        throttle.apply(ThrottleCommand::Decrease, 2);
        assert_eq!(throttle.notch, -1);
        assert_eq!(throttle.speed(&SimConfig::default()), -50.0);
    }

    #[test]
    fn test_speed_synced_to_train() {
        let (mut world, mut schedule, _, wagon) = setup(1, 100.0);
        schedule.run(&mut world);
        assert_eq!(world.get::<Speed>(wagon).unwrap().0, 50.0);
    }

    #[test]
    fn test_coupled_vehicles_move_same_distance() {
        let (mut world, mut schedule, engine, wagon) = setup(1, 128.0);
        schedule.run(&mut world);

        let plan = world.resource::<TickPlan>();
        assert!((plan.distance - 6.4).abs() < 1e-4);
        let e = plan.proposed(engine).unwrap();
        let w = plan.proposed(wagon).unwrap();
        assert!((e.pos.rel - 0.6).abs() < 1e-5);
        assert!((w.pos.rel - 0.6).abs() < 1e-5);
        assert!((w.pose.y - e.pose.y - 64.0).abs() < 1e-3);

        // Nothing committed yet.
        assert_eq!(world.get::<TrackPos>(engine).unwrap().rel, 0.5);
        assert_eq!(world.resource::<RuleEngine>().pending(), None);
    }

    #[test]
    fn test_running_off_the_track_raises() {
        let (mut world, mut schedule, _, wagon) = setup(1, 100.0);
        world.get_mut::<TrackPos>(wagon).unwrap().tile_y = 2;
        world.get_mut::<TrackPos>(wagon).unwrap().rel = 0.99;
        schedule.run(&mut world);
        assert_eq!(world.resource::<RuleEngine>().pending(), Some(Fault::NoTrack { x: 0, y: 3 }));
    }
}
