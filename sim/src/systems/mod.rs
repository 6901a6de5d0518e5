//! ECS Systems for the shunting simulation.
//!
//! Systems contain the game logic that operates on components.
//!
//! ## Tick Phases
//!
//! Every tick runs the same chain, in order:
//!
//! **Phase 1 (Plan)** - Build the `TickPlan`; committed positions are untouched:
//! - `throttle_system` - Turns the throttle into speed for the whole train
//! - `plan_motion_system` - Advances every coupled vehicle along the track
//! - `coupling_system` - Pairs free wagons with the member about to reach them
//!
//! **Phase 2 (Resolve)** - Validate, then commit or discard:
//! - `parking_check_system` - Free wagons must rest on sidings
//! - `resolve_tick_system` - Commits the plan, or drops it and stops the train
//! - `win_check_system` - Declares the win after a committed tick

pub mod coupling;
pub mod movement;
pub mod rules;
pub mod serialization;

pub use coupling::*;
pub use movement::*;
pub use rules::*;
pub use serialization::*;
