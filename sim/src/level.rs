//! Level descriptions.
//!
//! A level is three row-major layer strings plus vehicle placements and
//! goals. Levels arrive as JSON from the host; `LevelDesc::demo` is the
//! built-in yard.

use crate::error::LevelError;
use crate::systems::rules::Goal;
use crate::track::TrackGrid;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_tile_size() -> f32 {
    64.0
}

/// A vehicle or goal on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub id: u32,
    pub x: i32,
    pub y: i32,
}

impl Placement {
    pub fn new(id: u32, x: i32, y: i32) -> Self {
        Self { id, x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDesc {
    /// Display name, passed through to snapshots.
    #[serde(default)]
    pub label: String,
    pub cols: usize,
    pub rows: usize,
    #[serde(default = "default_tile_size")]
    pub tile_size: f32,
    pub ground: String,
    pub track: String,
    pub turnout: String,
    pub engine: Placement,
    #[serde(default)]
    pub wagons: Vec<Placement>,
    #[serde(default)]
    pub goals: Vec<Placement>,
}

impl LevelDesc {
    pub fn from_json(data: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(data)?)
    }

    /// Decode the layer strings.
    pub fn grid(&self) -> Result<TrackGrid, LevelError> {
        TrackGrid::parse(
            self.cols,
            self.rows,
            self.tile_size,
            &self.ground,
            &self.track,
            &self.turnout,
        )
    }

    /// Check vehicle ids are unique and every goal names a wagon.
    pub fn check_ids(&self) -> Result<(), LevelError> {
        let mut seen = HashSet::new();
        for p in std::iter::once(&self.engine).chain(&self.wagons) {
            if !seen.insert(p.id) {
                return Err(LevelError::DuplicateVehicle(p.id));
            }
        }
        for goal in &self.goals {
            if !self.wagons.iter().any(|w| w.id == goal.id) {
                return Err(LevelError::UnknownGoal(goal.id));
            }
        }
        Ok(())
    }

    pub fn goal_list(&self) -> Vec<Goal> {
        self.goals.iter().map(|g| Goal { id: g.id, x: g.x, y: g.y }).collect()
    }

    /// The built-in six-column yard.
    ///
    /// Two wagons wait on the left line; each has to be moved across the
    /// crossovers to a siding on the right.
    pub fn demo() -> Self {
        let ground = [
            "gtgtgg", "gtgtgg", "gtgggg", "gggggg", "ggttgg", "gggtgg", "gggggg", "gtgggg",
            "gtgttg", "gtgttg", "gggggg",
        ];
        let track = [
            " s s  ", " s s  ", " s V  ", " srs  ", " Wss  ", " sws  ", " sLW  ", " s wl ",
            " s ss ", " s ss ", "      ",
        ];
        let turnout = [
            "      ", "      ", "   M  ", "      ", " N    ", "  n   ", "   N  ", "   n  ",
            "      ", "      ", "      ",
        ];
        Self {
            label: "Yard 1".to_string(),
            cols: 6,
            rows: 11,
            tile_size: default_tile_size(),
            ground: ground.concat(),
            track: track.concat(),
            turnout: turnout.concat(),
            engine: Placement::new(0, 1, 0),
            wagons: vec![Placement::new(1, 1, 2), Placement::new(2, 1, 7)],
            goals: vec![Placement::new(1, 4, 9), Placement::new(2, 3, 0)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_decodes() {
        let demo = LevelDesc::demo();
        let grid = demo.grid().unwrap();
        assert_eq!(grid.cols, 6);
        assert_eq!(grid.rows, 11);
        assert!(demo.check_ids().is_ok());
        for goal in &demo.goals {
            assert!(grid.is_parking_valid(goal.x, goal.y));
        }
    }

    #[test]
    fn test_from_json_defaults() {
        let json = r#"{
            "cols": 1, "rows": 2,
            "ground": "tt", "track": "ss", "turnout": "  ",
            "engine": { "id": 0, "x": 0, "y": 0 }
        }"#;
        let level = LevelDesc::from_json(json).unwrap();
        assert_eq!(level.tile_size, 64.0);
        assert!(level.wagons.is_empty());
        assert!(level.label.is_empty());
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(LevelDesc::from_json("{"), Err(LevelError::Parse(_))));
    }

    #[test]
    fn test_check_ids() {
        let mut level = LevelDesc::demo();
        level.wagons.push(Placement::new(1, 4, 8));
        assert!(matches!(level.check_ids(), Err(LevelError::DuplicateVehicle(1))));

        let mut level = LevelDesc::demo();
        level.goals.push(Placement::new(0, 3, 1));
        assert!(matches!(level.check_ids(), Err(LevelError::UnknownGoal(0))));
    }
}
