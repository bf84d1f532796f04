//! Coordinate spaces and tile-grid math shared by the reader and resolver.
//!
//! Three integer coordinate spaces exist and are never interchangeable
//! without an explicit conversion: absolute block coordinates ([`WorldPos`]),
//! nether coordinates at 1/8 overworld scale ([`NetherPos`]), and tile-grid
//! coordinates within one logical map ([`TilePos`]).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Side length of one map tile in pixels.
pub const TILE_PIXELS: i32 = 128;

/// Centering offset applied to both axes before mapping onto the tile grid.
pub const TILE_OFFSET: i32 = TILE_PIXELS / 2;

/// Absolute block coordinates in a world dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: i32,
    pub z: i32,
}

/// Nether block coordinates; one nether block spans eight overworld blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetherPos {
    pub x: i32,
    pub z: i32,
}

impl NetherPos {
    pub fn to_world_pos(self) -> WorldPos {
        WorldPos {
            x: self.x * 8,
            z: self.z * 8,
        }
    }
}

/// Grid coordinates of one tile within a logical map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub z: i32,
}

impl TilePos {
    /// World position of this tile's north-west corner pixel.
    pub fn world_top_left(self, scale: i32) -> WorldPos {
        let span = tile_span(scale);
        WorldPos {
            x: self.x * span - TILE_OFFSET,
            z: self.z * span - TILE_OFFSET,
        }
    }

    /// World position of this tile's center, as stored in save records.
    pub fn world_center(self, scale: i32) -> WorldPos {
        let top_left = self.world_top_left(scale);
        let half = tile_span(scale) / 2;
        WorldPos {
            x: top_left.x + half,
            z: top_left.z + half,
        }
    }
}

/// A position in any of the three coordinate spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Position {
    World(WorldPos),
    Nether(NetherPos),
    Tile(TilePos),
}

impl Position {
    pub fn x(&self) -> i32 {
        match *self {
            Position::World(p) => p.x,
            Position::Nether(p) => p.x,
            Position::Tile(p) => p.x,
        }
    }

    pub fn z(&self) -> i32 {
        match *self {
            Position::World(p) => p.z,
            Position::Nether(p) => p.z,
            Position::Tile(p) => p.z,
        }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Position) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Position) -> Ordering {
        (self.x(), self.z()).cmp(&(other.x(), other.z()))
    }
}

/// Wrap raw record coordinates in the coordinate space of their dimension.
pub fn dimension_position(dimension: &str, x: i32, z: i32) -> Position {
    if dimension == "minecraft:the_nether" {
        Position::Nether(NetherPos { x, z })
    } else {
        Position::World(WorldPos { x, z })
    }
}

/// Blocks covered by one tile pixel at the given zoom scale.
pub fn scale_factor(scale: i32) -> i32 {
    1 << scale
}

/// Blocks covered by one full tile at the given zoom scale.
pub fn tile_span(scale: i32) -> i32 {
    TILE_PIXELS * scale_factor(scale)
}

/// Map a world or nether position to its tile-grid cell.
pub fn tile_pos(pos: Position, scale: i32) -> TilePos {
    let span = tile_span(scale);
    TilePos {
        x: grid_div(pos.x() + TILE_OFFSET, span),
        z: grid_div(pos.z() + TILE_OFFSET, span),
    }
}

// Truncating division double-counts the cell at the origin boundary for
// negative coordinates; shift negative inputs down one span (plus one) first.
fn grid_div(skewed: i32, span: i32) -> i32 {
    if skewed < 0 {
        (skewed - span - 1) / span
    } else {
        skewed / span
    }
}
