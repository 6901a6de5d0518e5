//! Renderer Bridge
//!
//! Converts a [`Snapshot`] into a flat `f32` buffer for renderers that sit on
//! the other side of an FFI boundary and would rather not parse JSON every
//! frame.
//!
//! # Buffer Layout (Version 1.0)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ HEADER (2 elements)                                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ [0] vehicle_count (as f32)                                      │
//! │ [1] state         - Session state (see STATE_* constants)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ VEHICLE DATA (vehicle_count × VEHICLE_STRIDE elements)          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ For each vehicle i (offset = 2 + i * VEHICLE_STRIDE):           │
//! │   [+0]  id          - Vehicle type id (u32 as f32)              │
//! │   [+1]  x           - X position (world units)                  │
//! │   [+2]  y           - Y position (world units)                  │
//! │   [+3]  angle       - Heading (radians, 0 = along +y)           │
//! │   [+4]  kind        - See KIND_* constants                      │
//! │   [+5]  tile_x      - Tile column                               │
//! │   [+6]  tile_y      - Tile row                                  │
//! │   [+7]  parent      - Id of the coupling parent, -1 if none     │
//! │   [+8]  speed       - Signed speed (units/sec)                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Vehicles appear in snapshot order, which is sorted by id, so the same
//! snapshot always produces the same buffer.

use crate::systems::rules::SessionState;
use crate::world::Snapshot;

// ============================================================================
// CONSTANTS - STABLE FFI CONTRACT
// ============================================================================

/// Number of f32 values per vehicle in the flat buffer.
///
/// **This is part of the stable FFI contract. Do not change without versioning.**
pub const VEHICLE_STRIDE: usize = 9;

/// Number of f32 values in the buffer header: vehicle count and state.
pub const HEADER_SIZE: usize = 2;

/// Vehicle kind: the engine.
pub const KIND_ENGINE: f32 = 0.0;
/// Vehicle kind: wagon coupled to the train.
pub const KIND_COUPLED: f32 = 1.0;
/// Vehicle kind: free-standing wagon.
pub const KIND_FREE: f32 = 2.0;

pub const STATE_RUNNING: f32 = 0.0;
pub const STATE_FAULTED: f32 = 1.0;
pub const STATE_WON: f32 = 2.0;
pub const STATE_STOPPED: f32 = 3.0;

/// Parent field value for vehicles without a coupling parent.
pub const NO_PARENT: f32 = -1.0;

#[inline]
pub fn state_to_id(state: SessionState) -> f32 {
    match state {
        SessionState::Running => STATE_RUNNING,
        SessionState::Faulted => STATE_FAULTED,
        SessionState::Won => STATE_WON,
        SessionState::Stopped => STATE_STOPPED,
    }
}

#[inline]
fn kind_to_id(kind: &str, coupled: bool) -> f32 {
    match (kind, coupled) {
        ("Engine", _) => KIND_ENGINE,
        (_, true) => KIND_COUPLED,
        _ => KIND_FREE,
    }
}

/// Convert a snapshot to a flat buffer. See the module docs for the layout.
pub fn snapshot_to_flatbuffer(snapshot: &Snapshot) -> Vec<f32> {
    let count = snapshot.vehicles.len();
    let buffer_size = calculate_buffer_size(count);

    let mut buffer = Vec::with_capacity(buffer_size);
    buffer.push(count as f32);
    buffer.push(state_to_id(snapshot.state));

    for v in &snapshot.vehicles {
        buffer.push(v.id as f32);
        buffer.push(v.x);
        buffer.push(v.y);
        buffer.push(v.angle);
        buffer.push(kind_to_id(&v.kind, v.coupled));
        buffer.push(v.tile_x as f32);
        buffer.push(v.tile_y as f32);
        buffer.push(v.parent.map_or(NO_PARENT, |p| p as f32));
        buffer.push(v.speed);
    }

    debug_assert_eq!(buffer.len(), buffer_size, "Buffer size mismatch");
    buffer
}

#[inline]
pub fn calculate_buffer_size(vehicle_count: usize) -> usize {
    HEADER_SIZE + vehicle_count * VEHICLE_STRIDE
}

/// Vehicle count from a flat buffer, `None` if the header is missing.
#[inline]
pub fn parse_vehicle_count(buffer: &[f32]) -> Option<usize> {
    if buffer.len() < HEADER_SIZE {
        return None;
    }
    Some(buffer[0] as usize)
}

#[inline]
pub const fn vehicle_offset(index: usize) -> usize {
    HEADER_SIZE + index * VEHICLE_STRIDE
}

// ============================================================================
// FIELD OFFSET CONSTANTS
// ============================================================================

pub const FIELD_ID: usize = 0;
pub const FIELD_X: usize = 1;
pub const FIELD_Y: usize = 2;
pub const FIELD_ANGLE: usize = 3;
pub const FIELD_KIND: usize = 4;
pub const FIELD_TILE_X: usize = 5;
pub const FIELD_TILE_Y: usize = 6;
pub const FIELD_PARENT: usize = 7;
pub const FIELD_SPEED: usize = 8;
