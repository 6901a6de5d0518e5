//! ECS components for the shunting simulation.
//!
//! Components are pure data containers attached to vehicle entities.
//! All game logic lives in systems and in the `rail` module.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// TRACK-BOUND POSITION
// ============================================================================

/// Position along the track: a tile plus fractional progress through it.
///
/// `rel` runs from 0 to 1 in the tile's canonical direction, which always
/// points towards increasing world y.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackPos {
    pub tile_x: i32,
    pub tile_y: i32,
    pub rel: f32,
}

impl TrackPos {
    pub fn new(tile_x: i32, tile_y: i32, rel: f32) -> Self {
        Self { tile_x, tile_y, rel }
    }

    /// Vehicles are placed in the middle of their starting tile.
    pub fn centered(tile_x: i32, tile_y: i32) -> Self {
        Self::new(tile_x, tile_y, 0.5)
    }

    pub fn tile(&self) -> (i32, i32) {
        (self.tile_x, self.tile_y)
    }
}

/// World pose derived from [`TrackPos`]. Never the source of truth.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    /// Heading in radians, 0 = along +y.
    pub angle: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, angle: f32) -> Self {
        Self { x, y, angle }
    }

    pub fn distance_to(&self, other: &Pose) -> f32 {
        self.distance_to_point(other.x, other.y)
    }

    pub fn distance_to_point(&self, x: f32, y: f32) -> f32 {
        let dx = self.x - x;
        let dy = self.y - y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Signed speed along the track in world units per second.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Speed(pub f32);

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Vehicle type id (sprite id in the level description).
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

/// Marker for the engine, root of the coupling tree.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Engine;

/// Marker for rolling stock.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Wagon;

// ============================================================================
// COUPLING COMPONENTS
// ============================================================================

/// Edges of the coupling tree rooted at the engine.
///
/// A wagon with `parent == None` is free-standing. Only direct neighbours are
/// stored; the order of the train is derived by sorting on world y.
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct Coupling {
    pub parent: Option<Entity>,
    pub children: Vec<Entity>,
}

impl Coupling {
    pub fn is_attached(&self) -> bool {
        self.parent.is_some()
    }
}

// ============================================================================
// BUNDLES
// ============================================================================

/// Bundle for spawning the engine.
#[derive(Bundle)]
pub struct EngineBundle {
    pub id: VehicleId,
    pub engine: Engine,
    pub position: TrackPos,
    pub pose: Pose,
    pub speed: Speed,
    pub coupling: Coupling,
}

impl EngineBundle {
    pub fn new(id: u32, position: TrackPos, pose: Pose) -> Self {
        Self {
            id: VehicleId(id),
            engine: Engine,
            position,
            pose,
            speed: Speed::default(),
            coupling: Coupling::default(),
        }
    }
}

/// Bundle for spawning a free-standing wagon.
#[derive(Bundle)]
pub struct WagonBundle {
    pub id: VehicleId,
    pub wagon: Wagon,
    pub position: TrackPos,
    pub pose: Pose,
    pub speed: Speed,
    pub coupling: Coupling,
}

impl WagonBundle {
    pub fn new(id: u32, position: TrackPos, pose: Pose) -> Self {
        Self {
            id: VehicleId(id),
            wagon: Wagon,
            position,
            pose,
            speed: Speed::default(),
            coupling: Coupling::default(),
        }
    }
}

/// Collect the engine and everything coupled to it, depth first.
pub fn train_members(root: Entity, children: impl Fn(Entity) -> Vec<Entity>) -> Vec<Entity> {
    let mut members = Vec::new();
    let mut stack = vec![root];
    while let Some(entity) = stack.pop() {
        if members.contains(&entity) {
            continue;
        }
        members.push(entity);
        let mut next = children(entity);
        next.reverse();
        stack.extend(next);
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_distance() {
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(3.0, 4.0, 1.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_train_members_walks_tree() {
        let mut world = World::new();
        let engine = world.spawn(Coupling::default()).id();
        let a = world.spawn(Coupling::default()).id();
        let b = world.spawn(Coupling::default()).id();
        let c = world.spawn(Coupling::default()).id();
        let tree = [(engine, vec![a, c]), (a, vec![b])];
        let members = train_members(engine, |e| {
            tree.iter()
                .find(|(parent, _)| *parent == e)
                .map(|(_, kids)| kids.clone())
                .unwrap_or_default()
        });
        assert_eq!(members, vec![engine, a, b, c]);
    }
}
