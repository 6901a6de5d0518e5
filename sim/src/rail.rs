//! Track geometry: mapping track positions to world poses and moving along
//! the track.
//!
//! Every tile is a segment running from `rel = 0` at its top edge to
//! `rel = 1` at its bottom edge. Straight pieces run down the tile centre.
//! Curves are an eighth of a circle with radius `1.5 * tile_size`, squeezed
//! so they start at the tile centre line and end at a tile corner column;
//! rotated (uppercase) pieces are the same curve turned by 180 degrees.

use crate::components::{Pose, TrackPos};
use crate::error::Fault;
use crate::systems::rules::RuleEngine;
use crate::track::{Shape, TrackCode, TrackGrid, TurnoutCode};
use std::f32::consts::{FRAC_PI_4, SQRT_2};

/// Radius of every curve piece.
pub fn turn_radius(tile_size: f32) -> f32 {
    1.5 * tile_size
}

/// Length of the quarter-turn arc a curve piece covers (45 degrees).
pub fn arc_length(tile_size: f32) -> f32 {
    turn_radius(tile_size) * FRAC_PI_4
}

/// Track and turnout code under a tile. Blank track is `NoTrack`.
fn codes_at(grid: &TrackGrid, x: i32, y: i32) -> Result<(TrackCode, Option<TurnoutCode>), Fault> {
    let track = grid.track_at(x, y).ok_or(Fault::NoTrack { x, y })?;
    Ok((track, grid.turnout_at(x, y)))
}

/// Shape and orientation a vehicle runs on: the turnout if present,
/// otherwise the fixed track.
pub fn effective_shape(grid: &TrackGrid, x: i32, y: i32) -> Result<(Shape, bool), Fault> {
    let (track, turnout) = codes_at(grid, x, y)?;
    Ok(match turnout {
        Some(t) => (t.shape(), t.rotated),
        None => (track.shape(), track.rotated),
    })
}

/// World pose of a track position. Pure function of the grid.
pub fn position_to_world(grid: &TrackGrid, pos: TrackPos) -> Result<Pose, Fault> {
    let (shape, rotated) = effective_shape(grid, pos.tile_x, pos.tile_y)?;
    let tile = grid.tile_size;
    let rel = pos.rel;

    let al = if rotated { rel } else { 1.0 - rel } * FRAC_PI_4;
    let r = turn_radius(tile);
    let cy = r * al.sin() * SQRT_2 / 1.5;
    let cx = r * (1.0 - al.cos()) * (1.5 / SQRT_2).powi(2) + tile / 2.0;
    let curve_y = if rotated { cy } else { tile - cy };

    let (mut lx, ly, angle) = match shape {
        Shape::Straight => (tile / 2.0, rel * tile, 0.0),
        Shape::CurveRight => (cx, curve_y, al),
        Shape::CurveLeft => (tile - cx, curve_y, -al),
    };
    if rotated {
        lx = tile - lx;
    }

    Ok(Pose::new(
        pos.tile_x as f32 * tile + lx,
        pos.tile_y as f32 * tile + ly,
        angle,
    ))
}

/// Column offset when leaving a tile of `shape`.
fn column_shift(shape: Shape, rot: i32) -> i32 {
    match shape {
        Shape::Straight => 0,
        Shape::CurveRight => rot,
        Shape::CurveLeft => -rot,
    }
}

/// Move a track position by `distance` world units (negative = backwards).
///
/// The distance is measured against the segment length of the starting
/// tile. Every tile boundary on the way is crossed in turn; when `rules` is
/// given, each crossing is submitted to the continuity check, and with `None`
/// the call is a side-effect free look-ahead.
pub fn advance(
    grid: &TrackGrid,
    pos: TrackPos,
    distance: f32,
    mut rules: Option<&mut RuleEngine>,
) -> Result<TrackPos, Fault> {
    let (track, turnout) = codes_at(grid, pos.tile_x, pos.tile_y)?;
    let on_curve = track.shape().is_curve() || turnout.is_some_and(|t| t.shape().is_curve());
    let segment = if on_curve { arc_length(grid.tile_size) } else { grid.tile_size };
    let mut rel = pos.rel + distance / segment;
    if !rel.is_finite() {
        return Ok(pos);
    }

    let mut pos = pos;
    while !(0.0..=1.0).contains(&rel) {
        let (track, turnout) = codes_at(grid, pos.tile_x, pos.tile_y)?;
        let fac: i32 = if rel > 1.0 { 1 } else { -1 };
        let rotated = track.rotated || turnout.is_some_and(|t| t.rotated);
        let rot: i32 = if rotated { -1 } else { 1 };

        // The turnout decides the route whenever there is one.
        let routed = turnout.map_or(track.shape(), TurnoutCode::shape);
        let mut dx = column_shift(routed, rot);
        // Leaving through the straight end of a curve keeps the column.
        if (fac > 0 && rot > 0) || (fac < 0 && rot < 0) {
            dx = 0;
        }

        let next = TrackPos::new(pos.tile_x + dx, pos.tile_y + fac, 0.0);
        if let Some(rules) = rules.as_deref_mut() {
            rules.check_rail_transition(grid, pos.tile(), next.tile(), fac);
        }
        rel -= fac as f32;
        pos = next;
    }
    Ok(TrackPos { rel, ..pos })
}
