//! Error types for the shunting simulation.
//!
//! `Fault` is a rule violation raised during a tick. Faults never escape a
//! tick as `Err`: the rule engine collects them and the session rolls the tick
//! back (or terminates, depending on the configured policy).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A rule violation detected while simulating a tick.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
pub enum Fault {
    /// Position query over a tile without track.
    #[error("no track at tile ({x}, {y})")]
    NoTrack { x: i32, y: i32 },
    /// Curve family mismatch across a tile boundary.
    #[error("illegal transition ({from_x}, {from_y}) -> ({to_x}, {to_y}), gap {gap:.2}")]
    IllegalTransition {
        from_x: i32,
        from_y: i32,
        to_x: i32,
        to_y: i32,
        gap: f32,
    },
    /// Turnout thrown under a vehicle.
    #[error("turnout at ({x}, {y}) is occupied")]
    IllegalTurnoutThrow { x: i32, y: i32 },
    /// Free wagon resting on ground that is not a siding.
    #[error("wagon {id} parked on invalid ground at ({x}, {y})")]
    InvalidParking { id: u32, x: i32, y: i32 },
}

/// Errors from the track grid mutation API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("tile ({x}, {y}) is outside the {cols}x{rows} grid")]
    OutOfBounds { x: i32, y: i32, cols: usize, rows: usize },
    #[error("code {code:?} is not valid on the {layer} layer")]
    InvalidCode { layer: &'static str, code: char },
    #[error("turnout {turnout:?} at ({x}, {y}) does not match track {track:?}")]
    TurnoutMismatch { x: usize, y: usize, track: char, turnout: char },
}

/// Errors raised while building a session from a level description.
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("layer {layer} has {actual} cells, expected {expected}")]
    LayerSize {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("grid must have at least one column and one row")]
    EmptyGrid,
    #[error("grid of {cols}x{rows} tiles is too large")]
    Dimensions { cols: usize, rows: usize },
    #[error("tile size must be positive, got {0}")]
    TileSize(f32),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("vehicle {id} placed off track: {fault}")]
    OffTrack { id: u32, fault: Fault },
    #[error("duplicate vehicle id {0}")]
    DuplicateVehicle(u32),
    #[error("goal refers to unknown wagon {0}")]
    UnknownGoal(u32),
    #[error("wagon {id} starts on invalid parking ground at ({x}, {y})")]
    StartsOffSiding { id: u32, x: i32, y: i32 },
    #[error("level parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
