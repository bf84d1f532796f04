//! Canonical-tile resolution across duplicate save records.
//!
//! Several save files can describe the same grid cell of a logical map.
//! The resolver scans every id once and keeps, per cell, the most complete
//! record, breaking ties by source recency. Occupancy is seeded from the
//! previous run's metadata so an unchanged world resolves without decoding
//! anything.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Result;

use crate::config::WorldConf;
use crate::coords::TilePos;
use crate::metadata::{TileMetadata, Timestamp, WorldMetadata};
use crate::nbt::{map_src_file, read_idcounts, read_map};
use crate::publish::WorldFiles;

/// One resolved record: published tile metadata plus what the publisher
/// needs to know about it. `png_data` is only present when the image must
/// be (re-)written.
#[derive(Debug, Clone, PartialEq)]
pub struct ConverterTile {
    pub scale: i32,
    pub dimension: String,
    pub tile: TileMetadata,
    pub src_modified: Timestamp,
    pub png_data: Option<Vec<u8>>,
}

/// Per logical-map key, the canonical tile for each occupied grid cell.
pub type MapTiles = BTreeMap<String, BTreeMap<TilePos, ConverterTile>>;

/// First configured map whose (scale, dimension) matches the record.
pub fn find_map<'a>(conf: &'a WorldConf, tile: &ConverterTile) -> Option<&'a str> {
    conf.maps
        .iter()
        .find(|(_, map)| map.scale == tile.scale && map.dimension == tile.dimension)
        .map(|(key, _)| key.as_str())
}

/// Replacement policy for two records claiming the same grid cell.
///
/// An identical id always wins, so re-reading a save file supersedes the
/// prior snapshot of itself even when the new scan is less explored. This
/// re-scan stability is intentional; do not "fix" it by folding the id rule
/// into the quality comparison.
fn supersedes(candidate: &ConverterTile, occupant: &ConverterTile) -> bool {
    occupant.tile.id == candidate.tile.id
        || occupant.tile.hidden > candidate.tile.hidden
        || (occupant.tile.hidden == candidate.tile.hidden
            && occupant.src_modified < candidate.src_modified)
}

/// Resolve every configured logical map of one world.
pub fn read_tiles(
    conf: &WorldConf,
    src_data_path: &Path,
    paths: &WorldFiles,
    old_meta: Option<&WorldMetadata>,
) -> Result<MapTiles> {
    let count = read_idcounts(src_data_path)?;
    let mut tiles: MapTiles = conf
        .maps
        .iter()
        .map(|(key, _)| (key.clone(), BTreeMap::new()))
        .collect();

    // Seed occupancy and the id cache with the previous run's state.
    let mut id_cache: HashMap<i32, ConverterTile> = HashMap::new();
    for map in old_meta.iter().flat_map(|meta| meta.maps.values()) {
        let Some(cells) = tiles.get_mut(&map.map_id) else {
            continue;
        };
        for (&pos, tile) in &map.tiles {
            let carried = ConverterTile {
                scale: map.scale,
                dimension: map.dimension.clone(),
                tile: tile.clone(),
                src_modified: Timestamp::from_mtime(&map_src_file(src_data_path, tile.id)),
                png_data: None,
            };
            id_cache.insert(tile.id, carried.clone());
            cells.insert(pos, carried);
        }
    }

    for id in 0..=count {
        let Some(candidate) = read_map(src_data_path, id, paths, &id_cache)? else {
            continue;
        };
        let Some(map_key) = find_map(conf, &candidate) else {
            log::debug!(
                "map {id} (scale {}, {}) matches no configured map",
                candidate.scale,
                candidate.dimension
            );
            continue;
        };
        let cells = tiles
            .get_mut(map_key)
            .expect("every configured map key was seeded");
        if let Some(occupant) = cells.get(&candidate.tile.pos) {
            if !supersedes(&candidate, occupant) {
                log::debug!(
                    "map {id} loses cell ({}, {}) of {map_key} to map {}",
                    candidate.tile.pos.x,
                    candidate.tile.pos.z,
                    occupant.tile.id
                );
                continue;
            }
        }
        cells.insert(candidate.tile.pos, candidate);
    }

    Ok(tiles)
}
