//! Simulation tuning.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// What happens after a tick raises a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FaultPolicy {
    /// Discard the tick, stop the train and keep playing.
    #[default]
    Rollback,
    /// Discard the tick and end the session.
    Fatal,
}

/// Configuration for the shunting simulation.
///
/// Distances given "in tiles" are multiplied by the level's tile size.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Frames longer than this (milliseconds) are dropped without simulating.
    pub stall_threshold_ms: f32,
    /// Maximum world-distance gap allowed across a tile boundary.
    pub curve_epsilon: f32,
    /// A wagon moving faster than this cannot be uncoupled.
    pub speed_epsilon: f32,
    /// Commanded speed per throttle notch (world units per second).
    pub speed_per_notch: f32,
    /// Highest throttle notch in either direction.
    pub max_notch: i8,
    /// Coupling reach, in tiles.
    pub coupling_distance: f32,
    /// Hit radius for clicking a wagon, in tiles.
    pub click_radius: f32,
    /// How far detached wagons are pushed away from the train, in tiles.
    pub uncouple_nudge: f32,
    pub fault_policy: FaultPolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            stall_threshold_ms: 200.0,
            curve_epsilon: 2.0,
            speed_epsilon: 0.01,
            speed_per_notch: 50.0,
            max_notch: 1,
            coupling_distance: 1.0,
            click_radius: 0.5,
            uncouple_nudge: 0.1,
            fault_policy: FaultPolicy::Rollback,
        }
    }
}

impl SimConfig {
    /// Read a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimConfig::from_json(r#"{ "max_notch": 3, "fault_policy": "Fatal" }"#).unwrap();
        assert_eq!(config.max_notch, 3);
        assert_eq!(config.fault_policy, FaultPolicy::Fatal);
        assert_eq!(config.stall_threshold_ms, 200.0);
        assert_eq!(config.speed_per_notch, 50.0);
    }
}
