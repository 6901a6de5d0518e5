//! Rule engine - fault collection, end-of-tick resolution and the win check.
//!
//! Checks never abort a tick. They raise a deferred fault flag on the
//! [`RuleEngine`] and the tick keeps going; `resolve_tick_system` then either
//! commits the [`TickPlan`] or throws it away.
//!
//! ## Tick phases
//! - Phase 1 (`throttle_system`, `plan_motion_system`, `coupling_system`):
//!   build the plan; committed state is not touched except speeds.
//! - Phase 2 (`parking_check_system`, `resolve_tick_system`, `win_check_system`):
//!   validate, then commit or discard, then look for a win.

use crate::components::*;
use crate::config::{FaultPolicy, SimConfig};
use crate::error::Fault;
use crate::rail::position_to_world;
use crate::systems::movement::{PlannedMove, Throttle, TickPlan};
use crate::track::TrackGrid;
use bevy_ecs::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Lifecycle of a play session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Running,
    /// A fault is being resolved. Never observable between ticks.
    Faulted,
    Won,
    Stopped,
}

/// Result of one call to `Session::step`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum TickOutcome {
    /// The tick was applied.
    #[default]
    Committed,
    /// The frame was too long and was dropped.
    Skipped,
    /// A fault was raised; the tick was undone and the train stopped.
    RolledBack(Fault),
    /// The tick was applied and the level is solved.
    Won,
    /// A fault ended the session (fatal fault policy).
    SessionTerminated(Fault),
    /// The session already ended; nothing was simulated.
    Halted,
}

/// Outcome of the most recent tick, written by the phase 2 systems.
#[derive(Resource, Debug, Default)]
pub struct TickReport {
    pub outcome: TickOutcome,
}

/// Target tile for a wagon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: u32,
    pub x: i32,
    pub y: i32,
}

#[derive(Resource, Debug, Default, Clone)]
pub struct Goals(pub Vec<Goal>);

/// Deferred fault flag and session state.
#[derive(Resource, Debug)]
pub struct RuleEngine {
    state: SessionState,
    pending: Option<Fault>,
    last_fault: Option<Fault>,
    curve_epsilon: f32,
}

impl RuleEngine {
    pub fn new(curve_epsilon: f32) -> Self {
        Self {
            state: SessionState::Running,
            pending: None,
            last_fault: None,
            curve_epsilon,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Fault raised during the current tick, if any.
    pub fn pending(&self) -> Option<Fault> {
        self.pending
    }

    /// Most recent fault that was resolved.
    pub fn last_fault(&self) -> Option<Fault> {
        self.last_fault
    }

    /// Raise the fault flag. The first fault of a tick is the one reported.
    pub fn raise(&mut self, fault: Fault) {
        warn!("rule violation: {fault}");
        if self.pending.is_none() {
            self.pending = Some(fault);
        }
    }

    /// Clear the fault flag, returning what was raised.
    pub fn take_fault(&mut self) -> Option<Fault> {
        let fault = self.pending.take();
        if fault.is_some() {
            self.last_fault = fault;
        }
        fault
    }

    /// Fault when a position query finds no track.
    pub fn check_track(&mut self, grid: &TrackGrid, x: i32, y: i32) -> bool {
        let ok = grid.track_at(x, y).is_some();
        if !ok {
            self.raise(Fault::NoTrack { x, y });
        }
        ok
    }

    /// Compare both sides of a tile boundary crossed in direction `fac`.
    pub fn check_rail_transition(
        &mut self,
        grid: &TrackGrid,
        from: (i32, i32),
        to: (i32, i32),
        fac: i32,
    ) -> bool {
        let (leave, enter) = if fac > 0 { (1.0, 0.0) } else { (0.0, 1.0) };
        let exit = position_to_world(grid, TrackPos::new(from.0, from.1, leave));
        let entry = position_to_world(grid, TrackPos::new(to.0, to.1, enter));
        match (exit, entry) {
            (Ok(a), Ok(b)) => {
                let gap = a.distance_to(&b);
                if gap > self.curve_epsilon {
                    self.raise(Fault::IllegalTransition {
                        from_x: from.0,
                        from_y: from.1,
                        to_x: to.0,
                        to_y: to.1,
                        gap,
                    });
                    return false;
                }
                true
            }
            (Err(fault), _) | (_, Err(fault)) => {
                self.raise(fault);
                false
            }
        }
    }

    /// Fault if any vehicle stands on the turnout tile.
    pub fn check_car_on_turnout(
        &mut self,
        tile: (i32, i32),
        occupied: impl IntoIterator<Item = (i32, i32)>,
    ) -> bool {
        let blocked = occupied.into_iter().any(|t| t == tile);
        if blocked {
            self.raise(Fault::IllegalTurnoutThrow { x: tile.0, y: tile.1 });
        }
        !blocked
    }

    /// Settle a fault according to `policy`.
    ///
    /// Callers must already have discarded the faulted changes and stopped
    /// the train.
    pub fn conclude(&mut self, fault: Fault, policy: FaultPolicy) -> TickOutcome {
        self.state = SessionState::Faulted;
        match policy {
            FaultPolicy::Rollback => {
                self.state = SessionState::Running;
                TickOutcome::RolledBack(fault)
            }
            FaultPolicy::Fatal => {
                warn!("session terminated by {fault}");
                self.state = SessionState::Stopped;
                TickOutcome::SessionTerminated(fault)
            }
        }
    }
}

/// Settle a fault raised by a refused player action, between ticks.
///
/// The action itself was never applied. Otherwise the fault is handled like
/// a faulted tick: the throttle goes to neutral, every vehicle stops and the
/// fault policy decides whether the session goes on. Returns `None` when no
/// fault is pending.
pub fn resolve_refused_action(world: &mut World) -> Option<TickOutcome> {
    let fault = world.resource_mut::<RuleEngine>().take_fault()?;
    let policy = world.resource::<SimConfig>().fault_policy;

    if let Some(mut throttle) = world.get_resource_mut::<Throttle>() {
        throttle.notch = 0;
    }
    let mut speeds = world.query::<&mut Speed>();
    for mut speed in speeds.iter_mut(world) {
        speed.0 = 0.0;
    }

    warn!("action refused: {fault}");
    let outcome = world.resource_mut::<RuleEngine>().conclude(fault, policy);
    if let Some(mut report) = world.get_resource_mut::<TickReport>() {
        report.outcome = outcome;
    }
    Some(outcome)
}

/// Whether every goal wagon is parked on its goal tile with the engine empty.
///
/// A level without goals cannot be won.
pub fn goals_satisfied(
    goals: &[Goal],
    engine_empty: bool,
    free_wagons: impl IntoIterator<Item = (u32, (i32, i32))> + Clone,
) -> bool {
    !goals.is_empty()
        && engine_empty
        && goals.iter().all(|goal| {
            free_wagons
                .clone()
                .into_iter()
                .any(|(id, tile)| id == goal.id && tile == (goal.x, goal.y))
        })
}

/// Free wagons must rest on sidings.
pub fn parking_check_system(
    grid: Res<TrackGrid>,
    plan: Res<TickPlan>,
    mut rules: ResMut<RuleEngine>,
    wagons: Query<(Entity, &VehicleId, &TrackPos, &Coupling), With<Wagon>>,
) {
    for (entity, id, pos, coupling) in wagons.iter() {
        if coupling.is_attached() || plan.couplings.iter().any(|(w, _)| *w == entity) {
            continue;
        }
        if !grid.is_parking_valid(pos.tile_x, pos.tile_y) {
            rules.raise(Fault::InvalidParking { id: id.0, x: pos.tile_x, y: pos.tile_y });
        }
    }
}

/// Commit the plan, or discard it and stop the train if anything faulted.
pub fn resolve_tick_system(
    config: Res<SimConfig>,
    mut plan: ResMut<TickPlan>,
    mut rules: ResMut<RuleEngine>,
    mut throttle: ResMut<Throttle>,
    mut report: ResMut<TickReport>,
    mut vehicles: Query<(&mut TrackPos, &mut Pose, &mut Speed, &mut Coupling)>,
) {
    if let Some(fault) = rules.take_fault() {
        plan.clear();
        throttle.notch = 0;
        for (_, _, mut speed, _) in vehicles.iter_mut() {
            speed.0 = 0.0;
        }
        warn!("tick rolled back: {fault}");
        report.outcome = rules.conclude(fault, config.fault_policy);
        return;
    }

    for PlannedMove { entity, pos, pose } in plan.moves.drain(..) {
        if let Ok((mut current, mut current_pose, _, _)) = vehicles.get_mut(entity) {
            *current = pos;
            *current_pose = pose;
        }
    }
    for (wagon, partner) in plan.couplings.drain(..) {
        if let Ok((_, _, _, mut coupling)) = vehicles.get_mut(wagon) {
            coupling.parent = Some(partner);
        }
        if let Ok((_, _, _, mut coupling)) = vehicles.get_mut(partner) {
            coupling.children.push(wagon);
        }
    }
    report.outcome = TickOutcome::Committed;
}

/// Declare the win after a committed tick.
pub fn win_check_system(
    goals: Res<Goals>,
    mut rules: ResMut<RuleEngine>,
    mut report: ResMut<TickReport>,
    engine: Query<&Coupling, With<Engine>>,
    wagons: Query<(&VehicleId, &TrackPos, &Coupling), With<Wagon>>,
) {
    if report.outcome != TickOutcome::Committed {
        return;
    }
    let engine_empty = engine.iter().all(|c| c.children.is_empty());
    let free: Vec<(u32, (i32, i32))> = wagons
        .iter()
        .filter(|(_, _, c)| !c.is_attached())
        .map(|(id, pos, _)| (id.0, pos.tile()))
        .collect();
    if goals_satisfied(&goals.0, engine_empty, free.iter().copied()) {
        info!("all wagons parked on their goals");
        rules.set_state(SessionState::Won);
        report.outcome = TickOutcome::Won;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> TrackGrid {
        TrackGrid::parse(1, 3, 64.0, "ttt", "s s", "   ").unwrap()
    }

    #[test]
    fn test_first_fault_wins() {
        let mut rules = RuleEngine::new(2.0);
        rules.raise(Fault::NoTrack { x: 1, y: 1 });
        rules.raise(Fault::IllegalTurnoutThrow { x: 0, y: 0 });
        assert_eq!(rules.take_fault(), Some(Fault::NoTrack { x: 1, y: 1 }));
        assert_eq!(rules.take_fault(), None);
        assert_eq!(rules.last_fault(), Some(Fault::NoTrack { x: 1, y: 1 }));
    }

    fn refused_world(policy: FaultPolicy) -> (World, Entity) {
        let mut world = World::new();
        world.insert_resource(SimConfig { fault_policy: policy, ..Default::default() });
        world.insert_resource(RuleEngine::new(2.0));
        world.insert_resource(Throttle { notch: 2 });
        world.insert_resource(TickReport::default());
        let engine = world.spawn(EngineBundle::new(0, TrackPos::centered(0, 0), Pose::default())).id();
        world.get_mut::<Speed>(engine).unwrap().0 = 100.0;
        (world, engine)
    }

    #[test]
    fn test_refused_action_stops_train() {
        let (mut world, engine) = refused_world(FaultPolicy::Rollback);
        let fault = Fault::InvalidParking { id: 3, x: 0, y: 2 };
        world.resource_mut::<RuleEngine>().raise(fault);

        assert_eq!(resolve_refused_action(&mut world), Some(TickOutcome::RolledBack(fault)));
        assert_eq!(world.resource::<Throttle>().notch, 0);
        assert_eq!(world.get::<Speed>(engine).unwrap().0, 0.0);
        let rules = world.resource::<RuleEngine>();
        assert_eq!(rules.pending(), None);
        assert_eq!(rules.last_fault(), Some(fault));
        assert_eq!(rules.state(), SessionState::Running);
    }

    #[test]
    fn test_refused_action_under_fatal_policy() {
        let (mut world, _) = refused_world(FaultPolicy::Fatal);
        let fault = Fault::IllegalTurnoutThrow { x: 0, y: 0 };
        world.resource_mut::<RuleEngine>().raise(fault);

        assert_eq!(
            resolve_refused_action(&mut world),
            Some(TickOutcome::SessionTerminated(fault))
        );
        assert_eq!(world.resource::<RuleEngine>().state(), SessionState::Stopped);
        assert_eq!(world.resource::<TickReport>().outcome, TickOutcome::SessionTerminated(fault));
    }

    #[test]
    fn test_nothing_to_refuse() {
        let (mut world, engine) = refused_world(FaultPolicy::Fatal);
        assert_eq!(resolve_refused_action(&mut world), None);
        assert_eq!(world.resource::<Throttle>().notch, 2);
        assert_eq!(world.get::<Speed>(engine).unwrap().0, 100.0);
    }

    #[test]
    fn test_check_track() {
        let grid = line();
        let mut rules = RuleEngine::new(2.0);
        assert!(rules.check_track(&grid, 0, 0));
        assert!(!rules.check_track(&grid, 0, 1));
        assert_eq!(rules.pending(), Some(Fault::NoTrack { x: 0, y: 1 }));
    }

    #[test]
    fn test_transition_into_blank_tile() {
        let grid = line();
        let mut rules = RuleEngine::new(2.0);
        assert!(!rules.check_rail_transition(&grid, (0, 0), (0, 1), 1));
        assert_eq!(rules.pending(), Some(Fault::NoTrack { x: 0, y: 1 }));
    }

    #[test]
    fn test_car_on_turnout() {
        let mut rules = RuleEngine::new(2.0);
        assert!(rules.check_car_on_turnout((2, 2), [(1, 2), (2, 3)]));
        assert_eq!(rules.pending(), None);
        assert!(!rules.check_car_on_turnout((2, 2), [(1, 2), (2, 2)]));
        assert_eq!(rules.pending(), Some(Fault::IllegalTurnoutThrow { x: 2, y: 2 }));
    }

    #[test]
    fn test_conclude_policies() {
        let fault = Fault::NoTrack { x: 0, y: 0 };
        let mut rules = RuleEngine::new(2.0);
        assert_eq!(rules.conclude(fault, FaultPolicy::Rollback), TickOutcome::RolledBack(fault));
        assert_eq!(rules.state(), SessionState::Running);
        assert_eq!(
            rules.conclude(fault, FaultPolicy::Fatal),
            TickOutcome::SessionTerminated(fault)
        );
        assert_eq!(rules.state(), SessionState::Stopped);
    }

    #[test]
    fn test_goals_satisfied() {
        let goals = [Goal { id: 5, x: 2, y: 3 }];
        assert!(goals_satisfied(&goals, true, [(5, (2, 3))]));
        assert!(!goals_satisfied(&goals, true, [(5, (2, 4))]));
        assert!(!goals_satisfied(&goals, false, [(5, (2, 3))]));
        assert!(!goals_satisfied(&[], true, [(5, (2, 3))]));
    }

    #[test]
    fn test_parking_check_system() {
        let mut world = World::new();
        world.insert_resource(TrackGrid::parse(2, 1, 64.0, "tg", "ss", "  ").unwrap());
        world.insert_resource(TickPlan::default());
        world.insert_resource(RuleEngine::new(2.0));
        world.spawn(WagonBundle::new(1, TrackPos::centered(0, 0), Pose::default()));
        world.spawn(WagonBundle::new(2, TrackPos::centered(1, 0), Pose::default()));

        let mut schedule = Schedule::default();
        schedule.add_systems(parking_check_system);
        schedule.run(&mut world);

        let rules = world.resource::<RuleEngine>();
        assert_eq!(rules.pending(), Some(Fault::InvalidParking { id: 2, x: 1, y: 0 }));
    }
}
