//! Map positions and directions

use serde::{Deserialize, Serialize};

/// A tile position in the world. The map is 16 layers deep; `z <= 7` is
/// above ground, `z >= 8` underground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

impl Position {
    pub const fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: (self.x as i32 + dx) as u16,
            y: (self.y as i32 + dy) as u16,
            z: self.z,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Walk and turn directions with their client byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
    SouthWest = 4,
    SouthEast = 5,
    NorthWest = 6,
    NorthEast = 7,
}

impl Direction {
    /// Decode a direction from an autowalk path step. Zero and out-of-range
    /// steps are skipped by the caller.
    pub fn from_path_step(step: u8) -> Option<Self> {
        match step {
            1 => Some(Self::East),
            2 => Some(Self::NorthEast),
            3 => Some(Self::North),
            4 => Some(Self::NorthWest),
            5 => Some(Self::West),
            6 => Some(Self::SouthWest),
            7 => Some(Self::South),
            8 => Some(Self::SouthEast),
            _ => None,
        }
    }

    pub fn client_byte(self) -> u8 {
        self as u8
    }
}
