//! Track grid - three stacked layers of tile codes.
//!
//! Levels describe tiles with single characters. Lowercase is the canonical
//! orientation and uppercase the same piece rotated by 180 degrees. The codes
//! are decoded once at load time into the tagged types below; characters only
//! reappear at the `get`/`set` API and in [`TrackSnapshot`].
//!
//! | Layer   | Codes                                                           |
//! |---------|-----------------------------------------------------------------|
//! | ground  | `t` siding (parking allowed), `g` open ground, ` ` nothing      |
//! | track   | `s` straight, `r` right curve, `l` left curve, `v`/`w` switch bed |
//! | turnout | `m`/`b` right turnout straight/diverging, `n`/`c` left turnout  |

use crate::error::{GridError, LevelError};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Grid layer index, in drawing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    Ground,
    Track,
    Turnout,
}

impl Layer {
    fn name(self) -> &'static str {
        match self {
            Layer::Ground => "ground",
            Layer::Track => "track",
            Layer::Turnout => "turnout",
        }
    }
}

/// Geometric family of the piece a vehicle actually runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Straight,
    CurveRight,
    CurveLeft,
}

impl Shape {
    pub fn is_curve(self) -> bool {
        !matches!(self, Shape::Straight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroundCode {
    /// Siding - wagons may be parked here.
    Siding,
    /// Open ground.
    Open,
}

impl GroundCode {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            't' => Some(Self::Siding),
            'g' => Some(Self::Open),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Self::Siding => 't',
            Self::Open => 'g',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Straight,
    CurveRight,
    CurveLeft,
    /// Bed of a right-hand turnout (`v`).
    SwitchRight,
    /// Bed of a left-hand turnout (`w`).
    SwitchLeft,
}

/// A fixed track piece on the track layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackCode {
    pub kind: TrackKind,
    pub rotated: bool,
}

impl TrackCode {
    pub fn from_char(c: char) -> Option<Self> {
        let kind = match c.to_ascii_lowercase() {
            's' => TrackKind::Straight,
            'r' => TrackKind::CurveRight,
            'l' => TrackKind::CurveLeft,
            'v' => TrackKind::SwitchRight,
            'w' => TrackKind::SwitchLeft,
            _ => return None,
        };
        Some(Self { kind, rotated: c.is_ascii_uppercase() })
    }

    pub fn to_char(self) -> char {
        let c = match self.kind {
            TrackKind::Straight => 's',
            TrackKind::CurveRight => 'r',
            TrackKind::CurveLeft => 'l',
            TrackKind::SwitchRight => 'v',
            TrackKind::SwitchLeft => 'w',
        };
        if self.rotated { c.to_ascii_uppercase() } else { c }
    }

    /// Switch beds run straight until a turnout says otherwise.
    pub fn shape(self) -> Shape {
        match self.kind {
            TrackKind::CurveRight => Shape::CurveRight,
            TrackKind::CurveLeft => Shape::CurveLeft,
            _ => Shape::Straight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnoutKind {
    /// `m`: right-hand turnout set straight.
    RightStraight,
    /// `n`: left-hand turnout set straight.
    LeftStraight,
    /// `b`: right-hand turnout set diverging.
    RightDiverging,
    /// `c`: left-hand turnout set diverging.
    LeftDiverging,
}

/// Current setting of a turnout on the turnout layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnoutCode {
    pub kind: TurnoutKind,
    pub rotated: bool,
}

impl TurnoutCode {
    pub fn from_char(c: char) -> Option<Self> {
        let kind = match c.to_ascii_lowercase() {
            'm' => TurnoutKind::RightStraight,
            'n' => TurnoutKind::LeftStraight,
            'b' => TurnoutKind::RightDiverging,
            'c' => TurnoutKind::LeftDiverging,
            _ => return None,
        };
        Some(Self { kind, rotated: c.is_ascii_uppercase() })
    }

    pub fn to_char(self) -> char {
        let c = match self.kind {
            TurnoutKind::RightStraight => 'm',
            TurnoutKind::LeftStraight => 'n',
            TurnoutKind::RightDiverging => 'b',
            TurnoutKind::LeftDiverging => 'c',
        };
        if self.rotated { c.to_ascii_uppercase() } else { c }
    }

    pub fn shape(self) -> Shape {
        match self.kind {
            TurnoutKind::RightDiverging => Shape::CurveRight,
            TurnoutKind::LeftDiverging => Shape::CurveLeft,
            _ => Shape::Straight,
        }
    }

    /// The other position of the same turnout (`m<->b`, `n<->c`).
    pub fn thrown(self) -> Self {
        let kind = match self.kind {
            TurnoutKind::RightStraight => TurnoutKind::RightDiverging,
            TurnoutKind::RightDiverging => TurnoutKind::RightStraight,
            TurnoutKind::LeftStraight => TurnoutKind::LeftDiverging,
            TurnoutKind::LeftDiverging => TurnoutKind::LeftStraight,
        };
        Self { kind, rotated: self.rotated }
    }

    /// Whether this turnout can sit on top of `track`.
    pub fn fits(self, track: TrackCode) -> bool {
        let hand_ok = match self.kind {
            TurnoutKind::RightStraight | TurnoutKind::RightDiverging => {
                track.kind == TrackKind::SwitchRight
            }
            TurnoutKind::LeftStraight | TurnoutKind::LeftDiverging => {
                track.kind == TrackKind::SwitchLeft
            }
        };
        hand_ok && self.rotated == track.rotated
    }
}

/// The track grid shared by every system.
#[derive(Resource, Debug, Clone)]
pub struct TrackGrid {
    pub cols: usize,
    pub rows: usize,
    /// World units per tile edge.
    pub tile_size: f32,
    ground: Vec<Option<GroundCode>>,
    track: Vec<Option<TrackCode>>,
    turnout: Vec<Option<TurnoutCode>>,
}

impl TrackGrid {
    /// Create a grid with every layer blank.
    pub fn new(cols: usize, rows: usize, tile_size: f32) -> Self {
        let n = cols * rows;
        Self {
            cols,
            rows,
            tile_size,
            ground: vec![None; n],
            track: vec![None; n],
            turnout: vec![None; n],
        }
    }

    /// Decode the three row-major layer strings of a level.
    pub fn parse(
        cols: usize,
        rows: usize,
        tile_size: f32,
        ground: &str,
        track: &str,
        turnout: &str,
    ) -> Result<Self, LevelError> {
        if cols == 0 || rows == 0 {
            return Err(LevelError::EmptyGrid);
        }
        if !(tile_size > 0.0) {
            return Err(LevelError::TileSize(tile_size));
        }
        // Tile coordinates are i32, so both sides must fit one.
        let cells = cols
            .checked_mul(rows)
            .filter(|_| i32::try_from(cols).is_ok() && i32::try_from(rows).is_ok())
            .ok_or(LevelError::Dimensions { cols, rows })?;
        // Track goes first so turnouts can be checked against their bed.
        let layers = [
            (Layer::Ground, ground),
            (Layer::Track, track),
            (Layer::Turnout, turnout),
        ];
        // Sizes are checked before anything is allocated.
        for (layer, codes) in layers {
            let actual = codes.chars().count();
            if actual != cells {
                return Err(LevelError::LayerSize { layer: layer.name(), expected: cells, actual });
            }
        }
        let mut grid = Self::new(cols, rows, tile_size);
        for (layer, codes) in layers {
            for (i, c) in codes.chars().enumerate() {
                let (x, y) = ((i % cols) as i32, (i / cols) as i32);
                grid.set(layer, x, y, c)?;
            }
        }
        // A switch bed without a turnout has no defined route.
        for (i, track) in grid.track.iter().enumerate() {
            if let Some(t) = track {
                let is_bed = matches!(t.kind, TrackKind::SwitchRight | TrackKind::SwitchLeft);
                if is_bed && grid.turnout[i].is_none() {
                    return Err(GridError::TurnoutMismatch {
                        x: i % cols,
                        y: i / cols,
                        track: t.to_char(),
                        turnout: ' ',
                    }
                    .into());
                }
            }
        }
        Ok(grid)
    }

    fn cell_index(&self, x: i32, y: i32) -> Option<usize> {
        if x >= 0 && y >= 0 && (x as usize) < self.cols && (y as usize) < self.rows {
            Some(y as usize * self.cols + x as usize)
        } else {
            None
        }
    }

    fn out_of_bounds(&self, x: i32, y: i32) -> GridError {
        GridError::OutOfBounds { x, y, cols: self.cols, rows: self.rows }
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.cell_index(x, y).is_some()
    }

    /// Raw code of a cell; `' '` for blank, `None` outside the grid.
    pub fn get(&self, layer: Layer, x: i32, y: i32) -> Option<char> {
        let i = self.cell_index(x, y)?;
        let c = match layer {
            Layer::Ground => self.ground[i].map(GroundCode::to_char),
            Layer::Track => self.track[i].map(TrackCode::to_char),
            Layer::Turnout => self.turnout[i].map(TurnoutCode::to_char),
        };
        Some(c.unwrap_or(' '))
    }

    /// Overwrite a cell with a raw code. `' '` clears it.
    pub fn set(&mut self, layer: Layer, x: i32, y: i32, code: char) -> Result<(), GridError> {
        let i = self.cell_index(x, y).ok_or_else(|| self.out_of_bounds(x, y))?;
        let cols = self.cols;
        let invalid = GridError::InvalidCode { layer: layer.name(), code };
        let mismatch = |track: Option<TrackCode>, turnout: TurnoutCode| GridError::TurnoutMismatch {
            x: i % cols,
            y: i / cols,
            track: track.map_or(' ', TrackCode::to_char),
            turnout: turnout.to_char(),
        };
        match (layer, code) {
            (Layer::Ground, ' ') => self.ground[i] = None,
            (Layer::Ground, c) => self.ground[i] = Some(GroundCode::from_char(c).ok_or(invalid)?),
            (Layer::Track, ' ') => {
                if let Some(turnout) = self.turnout[i] {
                    return Err(mismatch(None, turnout));
                }
                self.track[i] = None;
            }
            (Layer::Track, c) => {
                let track = TrackCode::from_char(c).ok_or(invalid)?;
                if let Some(turnout) = self.turnout[i] {
                    if !turnout.fits(track) {
                        return Err(mismatch(Some(track), turnout));
                    }
                }
                self.track[i] = Some(track);
            }
            (Layer::Turnout, ' ') => self.turnout[i] = None,
            (Layer::Turnout, c) => {
                let turnout = TurnoutCode::from_char(c).ok_or(invalid)?;
                match self.track[i] {
                    Some(track) if turnout.fits(track) => self.turnout[i] = Some(turnout),
                    track => return Err(mismatch(track, turnout)),
                }
            }
        }
        Ok(())
    }

    pub fn track_at(&self, x: i32, y: i32) -> Option<TrackCode> {
        self.cell_index(x, y).and_then(|i| self.track[i])
    }

    pub fn turnout_at(&self, x: i32, y: i32) -> Option<TurnoutCode> {
        self.cell_index(x, y).and_then(|i| self.turnout[i])
    }

    pub fn ground_at(&self, x: i32, y: i32) -> Option<GroundCode> {
        self.cell_index(x, y).and_then(|i| self.ground[i])
    }

    /// Whether a free wagon may rest on this tile.
    pub fn is_parking_valid(&self, x: i32, y: i32) -> bool {
        self.ground_at(x, y) == Some(GroundCode::Siding)
    }

    /// Throw the turnout at a tile, returning its new setting.
    ///
    /// Returns `None` if there is no turnout there. Occupancy is not checked
    /// here; callers go through the rule engine first.
    pub fn toggle_turnout(&mut self, x: i32, y: i32) -> Option<TurnoutCode> {
        let i = self.cell_index(x, y)?;
        let thrown = self.turnout[i]?.thrown();
        self.turnout[i] = Some(thrown);
        Some(thrown)
    }

    /// Tile containing a world-space point.
    pub fn tile_from_pixel(&self, x: f32, y: f32) -> Option<(i32, i32)> {
        let tx = (x / self.tile_size).floor() as i32;
        let ty = (y / self.tile_size).floor() as i32;
        self.in_bounds(tx, ty).then_some((tx, ty))
    }

    fn layer_string(&self, layer: Layer) -> String {
        let mut s = String::with_capacity(self.cols * self.rows);
        for y in 0..self.rows as i32 {
            for x in 0..self.cols as i32 {
                s.push(self.get(layer, x, y).unwrap_or(' '));
            }
        }
        s
    }
}

/// Snapshot of the track layers for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub cols: usize,
    pub rows: usize,
    pub tile_size: f32,
    pub ground: String,
    pub track: String,
    pub turnout: String,
}

impl TrackSnapshot {
    pub fn from_grid(grid: &TrackGrid) -> Self {
        Self {
            cols: grid.cols,
            rows: grid.rows,
            tile_size: grid.tile_size,
            ground: grid.layer_string(Layer::Ground),
            track: grid.layer_string(Layer::Track),
            turnout: grid.layer_string(Layer::Turnout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> TrackGrid {
        TrackGrid::parse(3, 2, 64.0, "tgtggt", " v sWs", " m  N ").unwrap()
    }

    #[test]
    fn test_parse_and_get() {
        let grid = small_grid();
        assert_eq!(grid.get(Layer::Track, 1, 0), Some('v'));
        assert_eq!(grid.get(Layer::Turnout, 1, 1), Some('N'));
        assert_eq!(grid.get(Layer::Turnout, 0, 1), Some(' '));
        assert_eq!(grid.get(Layer::Ground, 2, 1), Some('t'));
        assert_eq!(grid.get(Layer::Track, 3, 0), None);
        assert_eq!(grid.get(Layer::Track, -1, 0), None);
    }

    #[test]
    fn test_decode_case_is_rotation() {
        let code = TrackCode::from_char('R').unwrap();
        assert_eq!(code.kind, TrackKind::CurveRight);
        assert!(code.rotated);
        assert_eq!(code.to_char(), 'R');
        assert_eq!(TrackCode::from_char('x'), None);
    }

    #[test]
    fn test_turnout_pairs() {
        for (a, b) in [('m', 'b'), ('n', 'c'), ('M', 'B'), ('N', 'C')] {
            let code = TurnoutCode::from_char(a).unwrap();
            assert_eq!(code.thrown().to_char(), b);
            assert_eq!(code.thrown().thrown(), code);
        }
    }

    #[test]
    fn test_toggle_is_reversible() {
        let mut grid = small_grid();
        assert_eq!(grid.toggle_turnout(1, 0).map(TurnoutCode::to_char), Some('b'));
        assert_eq!(grid.toggle_turnout(1, 0).map(TurnoutCode::to_char), Some('m'));
        assert_eq!(grid.toggle_turnout(0, 1), None);
    }

    #[test]
    fn test_set_rejects_mismatched_turnout() {
        let mut grid = small_grid();
        assert!(matches!(
            grid.set(Layer::Turnout, 1, 0, 'n'),
            Err(GridError::TurnoutMismatch { .. })
        ));
        assert!(matches!(
            grid.set(Layer::Turnout, 1, 0, 'M'),
            Err(GridError::TurnoutMismatch { .. })
        ));
        assert!(matches!(
            grid.set(Layer::Track, 5, 5, 's'),
            Err(GridError::OutOfBounds { .. })
        ));
        assert!(matches!(
            grid.set(Layer::Ground, 0, 0, 's'),
            Err(GridError::InvalidCode { .. })
        ));
        assert_eq!(grid.get(Layer::Turnout, 1, 0), Some('m'));
    }

    #[test]
    fn test_switch_bed_needs_turnout() {
        let result = TrackGrid::parse(1, 1, 64.0, "t", "v", " ");
        assert!(matches!(result, Err(LevelError::Grid(GridError::TurnoutMismatch { .. }))));
    }

    #[test]
    fn test_layer_size_checked() {
        let result = TrackGrid::parse(2, 2, 64.0, "tttt", "sss", "    ");
        assert!(matches!(result, Err(LevelError::LayerSize { layer: "track", .. })));
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let result = TrackGrid::parse(usize::MAX, 2, 64.0, "tt", "ss", "  ");
        assert!(matches!(result, Err(LevelError::Dimensions { rows: 2, .. })));

        let wide = i32::MAX as usize + 1;
        let result = TrackGrid::parse(wide, 1, 64.0, "t", "s", " ");
        assert!(matches!(result, Err(LevelError::Dimensions { .. })));

        // Sane dimensions that do not match the layers never allocate the grid.
        let result = TrackGrid::parse(1 << 20, 1 << 10, 64.0, "t", "s", " ");
        assert!(matches!(result, Err(LevelError::LayerSize { layer: "ground", .. })));
    }

    #[test]
    fn test_tile_from_pixel() {
        let grid = small_grid();
        assert_eq!(grid.tile_from_pixel(70.0, 10.0), Some((1, 0)));
        assert_eq!(grid.tile_from_pixel(191.9, 127.9), Some((2, 1)));
        assert_eq!(grid.tile_from_pixel(200.0, 10.0), None);
        assert_eq!(grid.tile_from_pixel(-1.0, 10.0), None);
    }

    #[test]
    fn test_parking_valid() {
        let grid = small_grid();
        assert!(grid.is_parking_valid(0, 0));
        assert!(!grid.is_parking_valid(1, 0));
        assert!(!grid.is_parking_valid(9, 9));
    }

    #[test]
    fn test_snapshot_reencodes_layers() {
        let grid = small_grid();
        let snap = TrackSnapshot::from_grid(&grid);
        assert_eq!(snap.track, " v sWs");
        assert_eq!(snap.turnout, " m  N ");
        assert_eq!(snap.ground, "tgtggt");
    }
}
