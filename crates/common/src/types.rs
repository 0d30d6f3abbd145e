use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chunk::CHUNK_EDGE;

/// Process-unique identifier for a live entity (player or dropped item).
///
/// The wire format carries entity ids as signed 32-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// World clock value, in game ticks.
pub type Ticks = i64;

/// Item type identifier as carried by held items and pickups.
pub type ItemId = i16;

/// World dimension selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionId {
    Normal,
    Nether,
}

impl DimensionId {
    pub fn as_i8(self) -> i8 {
        match self {
            DimensionId::Normal => 0,
            DimensionId::Nether => -1,
        }
    }
}

/// Absolute position in world space, one unit per block.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AbsXyz(pub DVec3);

impl AbsXyz {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self(DVec3::new(x, y, z))
    }

    pub fn x(&self) -> f64 {
        self.0.x
    }

    pub fn y(&self) -> f64 {
        self.0.y
    }

    pub fn z(&self) -> f64 {
        self.0.z
    }

    /// The chunk column containing this position.
    pub fn to_chunk_xz(&self) -> ChunkXz {
        let edge = CHUNK_EDGE as f64;
        ChunkXz {
            x: (self.0.x / edge).floor() as i32,
            z: (self.0.z / edge).floor() as i32,
        }
    }
}

/// Facing direction in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
}

/// A chunk column coordinate on the horizontal grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkXz {
    pub x: i32,
    pub z: i32,
}

impl ChunkXz {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Whether `other` lies within `radius` chunks of `self` on both axes, inclusive.
    ///
    /// Distances are taken in `i64`, so coordinates at opposite ends of the
    /// `i32` range are far apart rather than wrapping. A negative radius
    /// contains nothing.
    pub fn within_radius(&self, other: ChunkXz, radius: i32) -> bool {
        let radius = i64::from(radius);
        (i64::from(other.x) - i64::from(self.x)).abs() <= radius
            && (i64::from(other.z) - i64::from(self.z)).abs() <= radius
    }
}

impl fmt::Display for ChunkXz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}
