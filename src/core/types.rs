//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use std::fmt;

/// Game turn counter (simulation time unit)
pub type Turn = u64;

/// Map coordinates per subtile
pub const COORD_PER_SUBTILE: i32 = 256;

/// Converts a subtile count into map coordinates
pub const fn subtile_coord(subtiles: i32, fraction: i32) -> i32 {
    subtiles * COORD_PER_SUBTILE + fraction
}

/// Stable index of a creature inside the world arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CreatureIdx(pub u32);

impl CreatureIdx {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CreatureIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index into the battle pool; slot 0 is the sentinel and never handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BattleId(pub u8);

impl BattleId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BattleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "battle {}", self.0)
    }
}

/// Index of a door or inert object that creatures can fight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructureIdx(pub u32);

/// Creature species identifier (index into the model table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(pub u16);

/// Owning player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

impl PlayerId {
    /// The heroes' faction
    pub const HEROES: PlayerId = PlayerId(4);
    /// Unowned creatures
    pub const NEUTRAL: PlayerId = PlayerId(5);

    pub fn is_neutral(self) -> bool {
        self == Self::NEUTRAL
    }

    pub fn is_heroes(self) -> bool {
        self == Self::HEROES
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PlayerId::HEROES => write!(f, "heroes"),
            PlayerId::NEUTRAL => write!(f, "neutral"),
            PlayerId(n) => write!(f, "player {}", n),
        }
    }
}

/// Position on the map in map coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y, z: 0 }
    }

    /// Position from subtile coordinates, centred in the subtile
    pub fn from_subtiles(stl_x: i32, stl_y: i32) -> Self {
        Self::new(
            subtile_coord(stl_x, COORD_PER_SUBTILE / 2),
            subtile_coord(stl_y, COORD_PER_SUBTILE / 2),
        )
    }

    /// Euclidean distance in the XY plane, rounded down
    pub fn distance_2d(&self, other: &Self) -> i32 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        isqrt((dx * dx + dy * dy) as u64) as i32
    }

    /// Chessboard (box) distance in the XY plane
    pub fn box_distance(&self, other: &Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, z: self.z }
    }

    pub fn subtile_x(&self) -> i32 {
        self.x.div_euclid(COORD_PER_SUBTILE)
    }

    pub fn subtile_y(&self) -> i32 {
        self.y.div_euclid(COORD_PER_SUBTILE)
    }
}

/// Integer square root, rounded down
pub fn isqrt(value: u64) -> u64 {
    if value < 2 {
        return value;
    }
    let mut x = (value as f64).sqrt() as u64;
    // Float estimate may be off by one for large inputs
    while x * x > value {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= value {
        x += 1;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distances() {
        let a = Coord::new(0, 0);
        let b = Coord::new(300, 400);
        assert_eq!(a.distance_2d(&b), 500);
        assert_eq!(a.box_distance(&b), 400);
    }

    #[test]
    fn test_isqrt() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(15), 3);
        assert_eq!(isqrt(16), 4);
        assert_eq!(isqrt(u32::MAX as u64), 65535);
    }

    #[test]
    fn test_subtile_conversion() {
        let pos = Coord::from_subtiles(3, 5);
        assert_eq!(pos.subtile_x(), 3);
        assert_eq!(pos.subtile_y(), 5);
        assert_eq!(subtile_coord(3, 0), 768);
    }

    #[test]
    fn test_player_roles() {
        assert!(PlayerId::NEUTRAL.is_neutral());
        assert!(PlayerId::HEROES.is_heroes());
        assert!(!PlayerId(0).is_heroes());
    }
}
