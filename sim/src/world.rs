//! Session bookkeeping and snapshot types.
//!
//! The `Snapshot` struct provides a serializable, owned view of the
//! simulation state for renderers. Taking one never mutates the world.

use crate::components::*;
use crate::error::Fault;
use crate::systems::coupling::ordered_train;
use crate::systems::rules::{Goals, RuleEngine, SessionState};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Score of the current session. Never feeds back into the simulation.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scoreboard {
    /// Successful uncouplings.
    pub moves: u32,
    /// Simulated time of every executed tick, in milliseconds.
    pub elapsed_ms: f64,
}

/// Snapshot of a single vehicle's state for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: u32,
    /// `"Engine"` or `"Wagon"`.
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub tile_x: i32,
    pub tile_y: i32,
    pub rel: f32,
    pub speed: f32,
    /// Part of the engine's train (always true for the engine).
    pub coupled: bool,
    /// Id of the vehicle this one hangs off in the coupling tree.
    pub parent: Option<u32>,
}

/// One edge of the coupling tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplingSnapshot {
    pub parent: u32,
    pub child: u32,
}

/// Goal marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSnapshot {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    /// A free wagon with this id is parked on the tile.
    pub reached: bool,
}

/// Complete simulation state snapshot for renderers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Executed ticks so far.
    pub tick: u64,
    pub elapsed_ms: f64,
    pub moves: u32,
    pub state: SessionState,
    pub label: String,
    /// All vehicles, sorted by id.
    pub vehicles: Vec<VehicleSnapshot>,
    /// Ids of the coupled wagons, top to bottom.
    pub train: Vec<u32>,
    pub couplings: Vec<CouplingSnapshot>,
    pub goals: Vec<GoalSnapshot>,
    pub last_fault: Option<Fault>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, label: &str) -> Self {
        let mut query = world.query::<(
            Entity,
            &VehicleId,
            &TrackPos,
            &Pose,
            &Speed,
            &Coupling,
            Has<Engine>,
        )>();

        let ids: Vec<(Entity, u32)> = query.iter(world).map(|(e, id, ..)| (e, id.0)).collect();
        let id_of = |entity: Entity| ids.iter().find(|(e, _)| *e == entity).map(|(_, id)| *id);

        let mut vehicles = Vec::new();
        let mut couplings = Vec::new();
        for (_, id, pos, pose, speed, coupling, is_engine) in query.iter(world) {
            let kind = if is_engine { "Engine" } else { "Wagon" };
            vehicles.push(VehicleSnapshot {
                id: id.0,
                kind: kind.to_string(),
                x: pose.x,
                y: pose.y,
                angle: pose.angle,
                tile_x: pos.tile_x,
                tile_y: pos.tile_y,
                rel: pos.rel,
                speed: speed.0,
                coupled: is_engine || coupling.is_attached(),
                parent: coupling.parent.and_then(id_of),
            });
            for child in coupling.children.iter().filter_map(|c| id_of(*c)) {
                couplings.push(CouplingSnapshot { parent: id.0, child });
            }
        }
        vehicles.sort_by_key(|v| v.id);
        couplings.sort_by_key(|c| (c.parent, c.child));

        let goals = world
            .get_resource::<Goals>()
            .map(|goals| {
                goals
                    .0
                    .iter()
                    .map(|goal| GoalSnapshot {
                        id: goal.id,
                        x: goal.x,
                        y: goal.y,
                        reached: vehicles.iter().any(|v| {
                            !v.coupled && v.id == goal.id && (v.tile_x, v.tile_y) == (goal.x, goal.y)
                        }),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let train = ordered_train(world).into_iter().filter_map(id_of).collect();
        let score = world.get_resource::<Scoreboard>().copied().unwrap_or_default();
        let (state, last_fault) = world
            .get_resource::<RuleEngine>()
            .map_or((SessionState::Running, None), |r| (r.state(), r.last_fault()));

        Self {
            tick,
            elapsed_ms: score.elapsed_ms,
            moves: score.moves,
            state,
            label: label.to_string(),
            vehicles,
            train,
            couplings,
            goals,
            last_fault,
        }
    }

    pub fn vehicle(&self, id: u32) -> Option<&VehicleSnapshot> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::rules::Goal;

    #[test]
    fn test_snapshot_from_world() {
        let mut world = World::new();
        world.insert_resource(Goals(vec![Goal { id: 7, x: 0, y: 3 }, Goal { id: 8, x: 0, y: 1 }]));
        world.insert_resource(Scoreboard { moves: 2, elapsed_ms: 1500.0 });

        let engine = world
            .spawn(EngineBundle::new(1, TrackPos::centered(0, 0), Pose::new(32.0, 32.0, 0.0)))
            .id();
        let coupled = world
            .spawn(WagonBundle::new(8, TrackPos::centered(0, 1), Pose::new(32.0, 96.0, 0.0)))
            .id();
        world.spawn(WagonBundle::new(7, TrackPos::centered(0, 3), Pose::new(32.0, 224.0, 0.0)));
        world.get_mut::<Coupling>(engine).unwrap().children.push(coupled);
        world.get_mut::<Coupling>(coupled).unwrap().parent = Some(engine);

        let snapshot = Snapshot::from_world(&mut world, 12, "Test yard");
        assert_eq!(snapshot.tick, 12);
        assert_eq!(snapshot.moves, 2);
        assert_eq!(snapshot.label, "Test yard");
        assert_eq!(snapshot.vehicles.iter().map(|v| v.id).collect::<Vec<_>>(), vec![1, 7, 8]);
        assert_eq!(snapshot.vehicle(8).unwrap().parent, Some(1));
        assert!(!snapshot.vehicle(7).unwrap().coupled);
        assert_eq!(snapshot.train, vec![8]);
        assert_eq!(snapshot.couplings, vec![CouplingSnapshot { parent: 1, child: 8 }]);

        // Wagon 8 is on its goal tile but still coupled.
        assert!(snapshot.goals[0].reached);
        assert!(!snapshot.goals[1].reached);
        assert_eq!(snapshot.state, SessionState::Running);
    }

    #[test]
    fn test_snapshot_json() {
        let snapshot = Snapshot { label: "Yard".to_string(), ..Default::default() };
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"label\":\"Yard\""));
        assert!(json.contains("\"state\":\"Running\""));
    }
}
