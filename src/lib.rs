//! mc-map-tiles: convert Minecraft map-item save data into web map tiles.
//!
//! The pipeline decodes `map_<id>.dat` NBT records, resolves one canonical
//! tile per grid cell of each configured logical map, encodes indexed-color
//! PNG tiles, and publishes versioned JSON metadata with atomic,
//! change-minimizing writes.

pub mod config;
pub mod convert;
pub mod coords;
pub mod metadata;
pub mod nbt;
pub mod palette;
pub mod publish;
pub mod render;
pub mod resolver;
