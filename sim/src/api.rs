//! Public API for the simulation.
//!
//! [`Session`] is the main interface for a host (renderer, input layer,
//! scorekeeper) to drive one play-through of a level.
//!
//! ## Frame stepping
//!
//! Every call to [`Session::step`] runs one complete tick: plan the motion,
//! couple, validate, then commit or roll back, then look for a win. Frames
//! longer than the stall threshold are dropped without simulating anything.

use crate::components::*;
use crate::config::SimConfig;
use crate::error::LevelError;
use crate::level::LevelDesc;
use crate::rail::position_to_world;
use crate::systems::*;
use crate::track::{TrackGrid, TrackSnapshot};
use crate::world::{Scoreboard, Snapshot};
use bevy_ecs::prelude::*;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// What a click on the playfield did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClickOutcome {
    TurnoutThrown,
    /// The turnout is occupied and was left alone. Carries how the fault
    /// was settled.
    TurnoutBlocked(TickOutcome),
    Uncoupled,
    /// A detached wagon would have been left off a siding.
    UncoupleRefused(TickOutcome),
    Ignored,
}

/// One play session of a level.
///
/// Owns the ECS world (track grid, vehicles, rule engine) and the tick
/// schedule.
pub struct Session {
    world: World,
    schedule: Schedule,
    tick: u64,
    label: String,
}

impl Session {
    /// Build a session from a level description.
    pub fn from_level(level: &LevelDesc, config: SimConfig) -> Result<Self, LevelError> {
        let grid = level.grid()?;
        level.check_ids()?;

        let mut world = World::new();

        let engine_pos = TrackPos::centered(level.engine.x, level.engine.y);
        let engine_pose = position_to_world(&grid, engine_pos)
            .map_err(|fault| LevelError::OffTrack { id: level.engine.id, fault })?;
        world.spawn(EngineBundle::new(level.engine.id, engine_pos, engine_pose));

        for wagon in &level.wagons {
            let pos = TrackPos::centered(wagon.x, wagon.y);
            let pose = position_to_world(&grid, pos)
                .map_err(|fault| LevelError::OffTrack { id: wagon.id, fault })?;
            if !grid.is_parking_valid(wagon.x, wagon.y) {
                return Err(LevelError::StartsOffSiding { id: wagon.id, x: wagon.x, y: wagon.y });
            }
            world.spawn(WagonBundle::new(wagon.id, pos, pose));
        }

        // Core resources
        world.insert_resource(RuleEngine::new(config.curve_epsilon));
        world.insert_resource(config);
        world.insert_resource(grid);
        world.insert_resource(Goals(level.goal_list()));
        world.insert_resource(DeltaTime::default());
        world.insert_resource(Throttle::default());
        world.insert_resource(TickPlan::default());
        world.insert_resource(TickReport::default());
        world.insert_resource(Scoreboard::default());

        let mut schedule = Schedule::default();

        // Phase 1: build the tick plan.
        schedule.add_systems((throttle_system, plan_motion_system, coupling_system).chain());

        // Phase 2: validate, commit or discard, then check for a win.
        schedule.add_systems(
            (parking_check_system, resolve_tick_system, win_check_system)
                .chain()
                .after(coupling_system),
        );

        info!(
            "session created for {:?}: {}x{} tiles, {} wagons, {} goals",
            level.label,
            level.cols,
            level.rows,
            level.wagons.len(),
            level.goals.len()
        );

        Ok(Self {
            world,
            schedule,
            tick: 0,
            label: level.label.clone(),
        })
    }

    /// Advance the simulation by `dt_ms` milliseconds.
    pub fn step(&mut self, dt_ms: f32) -> TickOutcome {
        if matches!(self.state(), SessionState::Won | SessionState::Stopped) {
            return TickOutcome::Halted;
        }
        let stall = self.world.resource::<SimConfig>().stall_threshold_ms;
        if !(0.0..=stall).contains(&dt_ms) {
            debug!("skipping stalled frame of {dt_ms} ms");
            return TickOutcome::Skipped;
        }

        self.world.resource_mut::<DeltaTime>().0 = dt_ms;
        self.schedule.run(&mut self.world);

        self.tick += 1;
        self.world.resource_mut::<Scoreboard>().elapsed_ms += f64::from(dt_ms);
        self.world.resource::<TickReport>().outcome
    }

    /// Run a zero-length tick: validates the current state without moving.
    pub fn check(&mut self) -> TickOutcome {
        self.step(0.0)
    }

    /// Move the throttle one notch, or back to neutral.
    pub fn throttle(&mut self, command: ThrottleCommand) {
        if self.state() != SessionState::Running {
            return;
        }
        let max_notch = self.world.resource::<SimConfig>().max_notch;
        let mut throttle = self.world.resource_mut::<Throttle>();
        throttle.apply(command, max_notch);
        debug!("throttle {:?} -> notch {}", command, throttle.notch);
    }

    pub fn throttle_notch(&self) -> i8 {
        self.world.resource::<Throttle>().notch
    }

    /// Handle a click at world coordinates.
    ///
    /// A click on a turnout tile throws the turnout. Otherwise the nearest
    /// coupled wagon within the click radius is uncoupled.
    pub fn click(&mut self, x: f32, y: f32) -> ClickOutcome {
        if self.state() != SessionState::Running {
            return ClickOutcome::Ignored;
        }
        let grid = self.world.resource::<TrackGrid>();
        if let Some((tx, ty)) = grid.tile_from_pixel(x, y) {
            if grid.turnout_at(tx, ty).is_some() {
                return self.throw_turnout(tx, ty);
            }
        }

        let radius = self.world.resource::<SimConfig>().click_radius * grid.tile_size;
        let mut wagons = self.world.query_filtered::<(Entity, &Pose, &Coupling), With<Wagon>>();
        let hit = wagons
            .iter(&self.world)
            .filter(|(_, _, coupling)| coupling.is_attached())
            .map(|(entity, pose, _)| (entity, pose.distance_to_point(x, y)))
            .filter(|(_, d)| *d < radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(entity, _)| entity);

        match hit.map(|wagon| self.uncouple_entity(wagon)) {
            Some(Ok(detached)) if !detached.is_empty() => ClickOutcome::Uncoupled,
            Some(Err(outcome)) => ClickOutcome::UncoupleRefused(outcome),
            _ => ClickOutcome::Ignored,
        }
    }

    /// Throw the turnout at a tile unless a vehicle stands on it.
    ///
    /// A blocked throw is an `IllegalTurnoutThrow` fault: the train is
    /// stopped and the fault policy applies. Clicks on tiles without a
    /// turnout, and any click once the session has ended, are ignored.
    pub fn throw_turnout(&mut self, x: i32, y: i32) -> ClickOutcome {
        if self.state() != SessionState::Running
            || self.world.resource::<TrackGrid>().turnout_at(x, y).is_none()
        {
            return ClickOutcome::Ignored;
        }
        let mut positions = self.world.query::<&TrackPos>();
        let occupied: Vec<(i32, i32)> = positions.iter(&self.world).map(TrackPos::tile).collect();

        let free = self
            .world
            .resource_mut::<RuleEngine>()
            .check_car_on_turnout((x, y), occupied);
        if !free {
            return match resolve_refused_action(&mut self.world) {
                Some(outcome) => ClickOutcome::TurnoutBlocked(outcome),
                None => ClickOutcome::Ignored,
            };
        }
        match self.world.resource_mut::<TrackGrid>().toggle_turnout(x, y) {
            Some(code) => {
                debug!("turnout ({x}, {y}) thrown to {:?}", code.to_char());
                ClickOutcome::TurnoutThrown
            }
            None => ClickOutcome::Ignored,
        }
    }

    /// Uncouple a wagon by id. Returns the ids of the detached wagons.
    ///
    /// A refused uncouple is settled like a faulted tick; the error carries
    /// the outcome.
    pub fn uncouple(&mut self, id: u32) -> Result<Vec<u32>, TickOutcome> {
        let Some(entity) = self.find_vehicle(id) else {
            return Ok(Vec::new());
        };
        let detached = self.uncouple_entity(entity)?;
        Ok(detached
            .into_iter()
            .filter_map(|e| self.world.get::<VehicleId>(e).map(|v| v.0))
            .collect())
    }

    fn uncouple_entity(&mut self, wagon: Entity) -> Result<Vec<Entity>, TickOutcome> {
        if self.state() != SessionState::Running {
            return Ok(Vec::new());
        }
        let detached = uncouple(&mut self.world, wagon);
        if let Some(outcome) = resolve_refused_action(&mut self.world) {
            return Err(outcome);
        }
        if !detached.is_empty() {
            self.world.resource_mut::<Scoreboard>().moves += 1;
        }
        Ok(detached)
    }

    fn find_vehicle(&mut self, id: u32) -> Option<Entity> {
        let mut query = self.world.query::<(Entity, &VehicleId)>();
        query
            .iter(&self.world)
            .find(|(_, vid)| vid.0 == id)
            .map(|(e, _)| e)
    }

    pub fn state(&self) -> SessionState {
        self.world.resource::<RuleEngine>().state()
    }

    /// Stop the session; later ticks are halted.
    pub fn stop(&mut self) {
        self.world.resource_mut::<RuleEngine>().set_state(SessionState::Stopped);
    }

    /// Track position and world pose of a vehicle.
    pub fn vehicle_position(&mut self, id: u32) -> Option<(TrackPos, Pose)> {
        let entity = self.find_vehicle(id)?;
        let pos = self.world.get::<TrackPos>(entity)?;
        let pose = self.world.get::<Pose>(entity)?;
        Some((*pos, *pose))
    }

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world, self.tick, &self.label)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    /// Get the current track layers.
    pub fn track_snapshot(&self) -> TrackSnapshot {
        TrackSnapshot::from_grid(self.world.resource::<TrackGrid>())
    }

    /// Get the track snapshot as JSON.
    pub fn track_snapshot_json(&self) -> String {
        track_to_json_string(&self.track_snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Number of executed ticks.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn scoreboard(&self) -> Scoreboard {
        *self.world.resource::<Scoreboard>()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}
