//! Shunting Yard - Simulation Core
//!
//! A frame-stepped ECS simulation of a shunting puzzle: an engine drives
//! along tile-based track with curves and turnouts, couples and drops off
//! wagons, and every tick is validated and rolled back on a rule violation.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod bridge;
pub mod components;
pub mod config;
pub mod error;
pub mod level;
pub mod rail;
pub mod systems;
pub mod track;
pub mod world;

pub use api::{ClickOutcome, Session};
pub use components::*;
pub use config::{FaultPolicy, SimConfig};
pub use error::{Fault, GridError, LevelError};
pub use level::{LevelDesc, Placement};
pub use systems::*;
pub use track::{Layer, TrackGrid, TrackSnapshot};
pub use world::{Scoreboard, Snapshot};
