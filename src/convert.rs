//! Per-world conversion and whole-run orchestration.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use crate::config::{AllWorldsConf, WorldConf};
use crate::coords::TilePos;
use crate::metadata::{
    MapMetadata, RootMetadata, RoutesMetadata, TileMetadata, Timestamp, WorldMetadata, WorldStub,
};
use crate::publish::{WorldFiles, read_old_meta, root_meta_file, write_atomic};
use crate::resolver::{MapTiles, read_tiles};

type ResolvedTiles = BTreeMap<String, BTreeMap<TilePos, TileMetadata>>;

/// Publish the images of every re-encoded tile, stamping each published
/// tile with its image's new modification time.
fn write_tile_pngs(paths: &WorldFiles, converter_tiles: MapTiles) -> Result<ResolvedTiles> {
    let mut tile_count = 0;
    let mut updated = 0;
    let mut resolved = ResolvedTiles::new();
    for (map_key, cells) in converter_tiles {
        let mut tiles = BTreeMap::new();
        for (pos, tile) in cells {
            tile_count += 1;
            let meta = match tile.png_data {
                None => tile.tile,
                Some(png) => {
                    updated += 1;
                    let png_file = paths.tile_png_file(tile.tile.id);
                    write_atomic(&png_file, &png)?;
                    TileMetadata {
                        modified: Timestamp::from_mtime(&png_file).truncate_to_seconds(),
                        ..tile.tile
                    }
                }
            };
            tiles.insert(pos, meta);
        }
        resolved.insert(map_key, tiles);
    }
    log::info!("wrote {updated}/{tile_count} tile images");
    Ok(resolved)
}

fn create_map_metadata(conf: &WorldConf, tiles: &ResolvedTiles) -> BTreeMap<String, MapMetadata> {
    let empty = BTreeMap::new();
    conf.maps
        .iter()
        .map(|(map_key, map_conf)| {
            let map_tiles = tiles.get(map_key).unwrap_or(&empty);
            let axis = |pick: fn(&TilePos) -> i32| {
                let low = map_tiles.keys().map(pick).min().unwrap_or(0);
                let high = map_tiles.keys().map(pick).max().unwrap_or(0);
                (low, high)
            };
            let (min_x, max_x) = axis(|pos| pos.x);
            let (min_z, max_z) = axis(|pos| pos.z);
            let meta = MapMetadata {
                map_id: map_key.clone(),
                label: map_conf.label.clone(),
                scale: map_conf.scale,
                dimension: map_conf.dimension.clone(),
                min_pos: TilePos { x: min_x, z: min_z },
                max_pos: TilePos { x: max_x, z: max_z },
                show_routes: map_conf.routes,
                tiles: map_tiles.clone(),
            };
            (map_key.clone(), meta)
        })
        .collect()
}

/// Convert one world and publish its tiles and metadata.
pub fn convert_world(
    conf: &WorldConf,
    paths: &WorldFiles,
    old_meta: Option<&WorldMetadata>,
) -> Result<WorldMetadata> {
    let src_data_path = conf.path.join("data");
    let converter_tiles = read_tiles(conf, &src_data_path, paths, old_meta)?;
    let world_tiles = write_tile_pngs(paths, converter_tiles)?;

    let new_meta = WorldMetadata::new(
        paths.world_id.clone(),
        conf.label.clone(),
        conf.default_map.clone(),
        create_map_metadata(conf, &world_tiles),
        RoutesMetadata {
            nodes: conf.nodes.clone(),
            paths: conf.route_paths.clone(),
        },
    )?;

    let meta_file = paths.world_meta_file();
    if old_meta == Some(&new_meta) {
        log::info!(
            "world metadata unchanged, not writing {}",
            meta_file.display()
        );
    } else {
        log::info!("writing updated world metadata to {}", meta_file.display());
        write_atomic(&meta_file, &serde_json::to_vec(&new_meta)?)?;
    }
    Ok(new_meta)
}

/// Convert every configured world into the output directory.
///
/// A failing world is logged and dropped from the root document; the
/// remaining worlds still convert.
pub fn convert_all_worlds(all_worlds: &AllWorldsConf, root_dir: &Path) -> Result<()> {
    let root_file = root_meta_file(root_dir);
    let old_root: Option<RootMetadata> = read_old_meta(&root_file, "root");

    let mut stubs = BTreeMap::new();
    for (key, conf) in &all_worlds.worlds {
        let paths = WorldFiles::new(root_dir, key);
        let meta_file = paths.world_meta_file();
        let old_meta: Option<WorldMetadata> = read_old_meta(&meta_file, "world");

        log::info!("converting world {key:?}");
        match convert_world(conf, &paths, old_meta.as_ref()) {
            Ok(world_meta) => {
                stubs.insert(
                    key.clone(),
                    WorldStub {
                        label: world_meta.label,
                        modified: Timestamp::from_mtime(&meta_file).truncate_to_seconds(),
                    },
                );
            }
            Err(err) => log::error!("world {key:?} conversion failed: {err:#}"),
        }
    }

    let default_world = all_worlds
        .default_world
        .clone()
        .filter(|key| stubs.contains_key(key));
    let new_root = RootMetadata::new(stubs, default_world)?;
    if old_root.as_ref() == Some(&new_root) {
        log::info!(
            "root metadata unchanged, not writing {}",
            root_file.display()
        );
    } else {
        log::info!("writing updated root metadata to {}", root_file.display());
        write_atomic(&root_file, &serde_json::to_vec(&new_root)?)?;
    }
    Ok(())
}
