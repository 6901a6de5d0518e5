//! Serialization utilities for simulation state.

use crate::track::TrackSnapshot;
use crate::world::Snapshot;

/// Serialize a snapshot to JSON bytes.
pub fn snapshot_to_json(snapshot: &Snapshot) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(snapshot)
}

/// Serialize a snapshot to a JSON string.
pub fn snapshot_to_json_string(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(snapshot)
}

/// Deserialize a snapshot from JSON bytes.
pub fn snapshot_from_json(data: &[u8]) -> Result<Snapshot, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Deserialize a snapshot from a JSON string.
pub fn snapshot_from_json_string(data: &str) -> Result<Snapshot, serde_json::Error> {
    serde_json::from_str(data)
}

/// Serialize the track layers to a JSON string.
pub fn track_to_json_string(track: &TrackSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use crate::systems::rules::SessionState;
    use crate::world::{CouplingSnapshot, GoalSnapshot, VehicleSnapshot};

    #[test]
    fn test_snapshot_roundtrip() {
        let snapshot = Snapshot {
            tick: 42,
            elapsed_ms: 2100.0,
            moves: 3,
            state: SessionState::Running,
            label: "Yard 1".to_string(),
            vehicles: vec![VehicleSnapshot {
                id: 4,
                kind: "Wagon".to_string(),
                x: 96.0,
                y: 160.0,
                angle: 0.0,
                tile_x: 1,
                tile_y: 2,
                rel: 0.5,
                speed: 0.0,
                coupled: true,
                parent: Some(0),
            }],
            train: vec![4],
            couplings: vec![CouplingSnapshot { parent: 0, child: 4 }],
            goals: vec![GoalSnapshot { id: 4, x: 3, y: 0, reached: false }],
            last_fault: Some(Fault::IllegalTurnoutThrow { x: 1, y: 2 }),
        };

        let json = snapshot_to_json_string(&snapshot).unwrap();
        let restored = snapshot_from_json_string(&json).unwrap();
        assert_eq!(restored, snapshot);

        let bytes = snapshot_to_json(&snapshot).unwrap();
        assert_eq!(snapshot_from_json(&bytes).unwrap().tick, 42);
    }
}
