//! Positions and the approximate position comparator

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Distance below which two positions are considered equal
pub const POSITION_TOLERANCE: f64 = 1.0;

/// A point in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Return a copy moved by the given deltas
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Block containing this point
    pub fn floored(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// Equal when strictly closer than `tolerance`
    pub fn approx_eq(&self, other: &Vec3, tolerance: f64) -> bool {
        self.distance_to(other) < tolerance
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        self.offset(rhs.x, rhs.y, rhs.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<BlockPos> for Vec3 {
    fn from(pos: BlockPos) -> Self {
        Vec3::new(pos.x as f64, pos.y as f64, pos.z as f64)
    }
}

/// Integer block coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Chunk column coordinates holding this block
    pub fn chunk(&self) -> (i32, i32) {
        (self.x.div_euclid(16), self.z.div_euclid(16))
    }
}

impl Add for BlockPos {
    type Output = BlockPos;

    fn add(self, rhs: BlockPos) -> BlockPos {
        self.offset(rhs.x, rhs.y, rhs.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Fail with an `AssertionMismatch` unless `actual` is within
/// [`POSITION_TOLERANCE`] of `expected`
pub fn assert_pos_eq(actual: impl Into<Vec3>, expected: impl Into<Vec3>) -> Result<()> {
    let actual = actual.into();
    let expected = expected.into();
    if actual.approx_eq(&expected, POSITION_TOLERANCE) {
        Ok(())
    } else {
        Err(HarnessError::AssertionMismatch {
            what: format!("position (distance {:.3})", actual.distance_to(&expected)),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
