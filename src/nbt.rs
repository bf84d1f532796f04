//! NBT decoding of map-item save records.
//!
//! A world's `data/` directory holds one `idcounts.dat` control file and one
//! `map_<id>.dat` per map item. Files may be gzip- or zlib-compressed, or
//! raw NBT. Malformed or unsupported records are dropped so a single bad
//! save file never aborts a conversion run; an unreadable `idcounts.dat` is
//! fatal because without it there is no id range to scan.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fastnbt::{ByteArray, Value};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::coords::{TILE_PIXELS, dimension_position, tile_pos};
use crate::metadata::{BannerColor, Icon, TileMetadata, Timestamp};
use crate::palette::UNEXPLORED;
use crate::publish::WorldFiles;
use crate::render::encode_tile_png;
use crate::resolver::ConverterTile;

pub fn map_src_file(dir: &Path, id: i32) -> PathBuf {
    dir.join(format!("map_{id}.dat"))
}

/// Read and decode an NBT file, sniffing the compression from its magic.
fn read_nbt_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let data = match bytes.as_slice() {
        [0x1f, 0x8b, ..] => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(bytes.as_slice())
                .read_to_end(&mut out)
                .with_context(|| format!("gunzipping {}", path.display()))?;
            out
        }
        [0x78, ..] => {
            let mut out = Vec::new();
            flate2::read::ZlibDecoder::new(bytes.as_slice())
                .read_to_end(&mut out)
                .with_context(|| format!("inflating {}", path.display()))?;
            out
        }
        _ => bytes,
    };
    fastnbt::from_bytes(&data).with_context(|| format!("decoding NBT in {}", path.display()))
}

#[derive(Debug, Deserialize)]
struct IdCounts {
    #[serde(rename = "DataVersion", default)]
    data_version: i32,
    map: Option<i32>,
    data: Option<IdCountsData>,
}

#[derive(Debug, Deserialize)]
struct IdCountsData {
    map: Option<i32>,
}

/// Highest map id present in the source directory, inclusive.
///
/// The counter moved under the `data` compound in data version 1926.
pub fn read_idcounts(dir: &Path) -> Result<i32> {
    let counts: IdCounts = read_nbt_file(&dir.join("idcounts.dat"))?;
    let count = if counts.data_version < 1926 {
        counts.map
    } else {
        counts.data.and_then(|data| data.map)
    };
    count.context("idcounts.dat has no map counter")
}

#[derive(Debug, Deserialize)]
struct MapDat {
    data: Option<MapData>,
}

#[derive(Debug, Deserialize)]
struct MapData {
    #[serde(rename = "xCenter")]
    x_center: Option<i32>,
    #[serde(rename = "zCenter")]
    z_center: Option<i32>,
    scale: Option<i32>,
    dimension: Option<Value>,
    colors: Option<ByteArray>,
    #[serde(rename = "unlimitedTracking")]
    unlimited_tracking: Option<i32>,
    frames: Option<Vec<Frame>>,
    banners: Option<Vec<Banner>>,
}

#[derive(Debug, Deserialize)]
struct IconPos {
    #[serde(rename = "X")]
    x: Option<i32>,
    #[serde(rename = "Z")]
    z: Option<i32>,
}

impl IconPos {
    fn get(pos: Option<&IconPos>) -> Option<(i32, i32)> {
        let pos = pos?;
        Some((pos.x?, pos.z?))
    }
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "Pos")]
    pos: Option<IconPos>,
    #[serde(rename = "Rotation")]
    rotation: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct Banner {
    #[serde(rename = "Pos")]
    pos: Option<IconPos>,
    #[serde(rename = "Color")]
    color: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
}

/// Legacy numeric dimension ids; newer records store the name directly.
fn dimension_name(tag: &Value) -> Option<String> {
    match tag {
        Value::String(name) => Some(name.clone()),
        other => match other.as_i64()? {
            0 => Some("minecraft:overworld".to_owned()),
            -1 => Some("minecraft:the_nether".to_owned()),
            1 => Some("minecraft:the_end".to_owned()),
            _ => None,
        },
    }
}

fn read_icons(data: &MapData, dimension: &str) -> Vec<Icon> {
    let mut icons = Vec::new();
    for frame in data.frames.iter().flatten() {
        let Some((x, z)) = IconPos::get(frame.pos.as_ref()) else {
            continue;
        };
        icons.push(Icon::Pointer {
            pos: dimension_position(dimension, x, z),
            rotation: frame.rotation.unwrap_or(0),
        });
    }
    for banner in data.banners.iter().flatten() {
        let Some((x, z)) = IconPos::get(banner.pos.as_ref()) else {
            continue;
        };
        let Some(color) = banner.color.as_deref().and_then(BannerColor::from_key) else {
            continue;
        };
        icons.push(Icon::Banner {
            pos: dimension_position(dimension, x, z),
            color,
            label: banner.name.clone().unwrap_or_default(),
        });
    }
    icons
}

/// Turn a decoded record into a [`ConverterTile`], or `None` for records the
/// converter does not handle: missing required fields, unlimited tracking,
/// unknown dimensions, out-of-range scales, or a pixel buffer that is not
/// one full tile.
fn decode_record(
    id: i32,
    data: &MapData,
    src_mod: Timestamp,
    png_mod: Timestamp,
) -> Result<Option<ConverterTile>> {
    if data.unlimited_tracking.unwrap_or(0) == 1 {
        return Ok(None);
    }
    let (Some(x_center), Some(z_center), Some(scale), Some(colors)) =
        (data.x_center, data.z_center, data.scale, &data.colors)
    else {
        return Ok(None);
    };
    let Some(dimension) = data.dimension.as_ref().and_then(dimension_name) else {
        return Ok(None);
    };
    // Vanilla scales are 0..=4; anything else is corrupt and would overflow
    // the span shift.
    if !(0..=4).contains(&scale) {
        return Ok(None);
    }
    if colors.len() != (TILE_PIXELS * TILE_PIXELS) as usize {
        return Ok(None);
    }

    let pixels: Vec<u8> = colors.iter().map(|&b| b as u8).collect();
    let hidden = pixels.iter().filter(|&&p| p == UNEXPLORED).count() as i32;
    let pos = tile_pos(dimension_position(&dimension, x_center, z_center), scale);
    let icons = read_icons(data, &dimension);

    // Re-encode only when the save record is newer than the published image.
    let png_data = if png_mod > src_mod {
        None
    } else {
        Some(encode_tile_png(&pixels)?)
    };

    Ok(Some(ConverterTile {
        scale,
        dimension,
        tile: TileMetadata {
            id,
            pos,
            hidden,
            modified: png_mod.truncate_to_seconds(),
            icons,
        },
        src_modified: src_mod,
        png_data,
    }))
}

/// Read one map save record, consulting the prior-run cache first.
///
/// When the save file is older than its published image and a cached tile
/// exists for the id, the cached snapshot is returned without touching the
/// record at all; an unchanged world decodes and encodes nothing.
pub fn read_map(
    dir: &Path,
    id: i32,
    paths: &WorldFiles,
    cache: &HashMap<i32, ConverterTile>,
) -> Result<Option<ConverterTile>> {
    let png_mod = Timestamp::from_mtime(&paths.tile_png_file(id));
    let src_file = map_src_file(dir, id);
    let src_mod = Timestamp::from_mtime(&src_file);
    if src_mod < png_mod {
        if let Some(cached) = cache.get(&id) {
            return Ok(Some(cached.clone()));
        }
    }

    let record: MapDat = match read_nbt_file(&src_file) {
        Ok(record) => record,
        Err(err) => {
            log::warn!("skipping map {id}: {err:#}");
            return Ok(None);
        }
    };
    let Some(data) = &record.data else {
        log::debug!("skipping map {id}: no data compound");
        return Ok(None);
    };
    let tile = decode_record(id, data, src_mod, png_mod)?;
    if tile.is_none() {
        log::debug!("skipping map {id}: unusable record");
    }
    Ok(tile)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::coords::TilePos;

    fn compound<const N: usize>(entries: [(&str, Value); N]) -> Value {
        Value::Compound(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value))
                .collect(),
        )
    }

    fn write_gzipped_nbt(path: &Path, root: &Value) {
        let bytes = fastnbt::to_bytes(root).unwrap();
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&bytes).unwrap();
        fs::write(path, encoder.finish().unwrap()).unwrap();
    }

    fn map_record(x_center: i32, z_center: i32, scale: i8, dimension: Value) -> Value {
        compound([(
            "data",
            compound([
                ("xCenter", Value::Int(x_center)),
                ("zCenter", Value::Int(z_center)),
                ("scale", Value::Byte(scale)),
                ("dimension", dimension),
                (
                    "colors",
                    Value::ByteArray(ByteArray::new(vec![0; 128 * 128])),
                ),
            ]),
        )])
    }

    fn set_mtime(path: &Path, secs: u64) {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn idcounts_legacy_and_modern_layouts() {
        let dir = tempfile::tempdir().unwrap();

        let legacy = compound([
            ("DataVersion", Value::Int(1343)),
            ("map", Value::Short(12)),
        ]);
        write_gzipped_nbt(&dir.path().join("idcounts.dat"), &legacy);
        assert_eq!(read_idcounts(dir.path()).unwrap(), 12);

        let modern = compound([
            ("DataVersion", Value::Int(3465)),
            ("data", compound([("map", Value::Int(34))])),
        ]);
        // The modern file also exercises the raw, uncompressed branch.
        fs::write(
            dir.path().join("idcounts.dat"),
            fastnbt::to_bytes(&modern).unwrap(),
        )
        .unwrap();
        assert_eq!(read_idcounts(dir.path()).unwrap(), 34);
    }

    #[test]
    fn idcounts_missing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_idcounts(dir.path()).is_err());
    }

    #[test]
    fn decodes_a_minimal_record() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorldFiles::new(dir.path(), "w");
        let record = map_record(0, 0, 0, Value::String("minecraft:overworld".to_owned()));
        write_gzipped_nbt(&map_src_file(dir.path(), 0), &record);

        let tile = read_map(dir.path(), 0, &paths, &HashMap::new())
            .unwrap()
            .expect("record should decode");
        assert_eq!(tile.scale, 0);
        assert_eq!(tile.dimension, "minecraft:overworld");
        assert_eq!(tile.tile.pos, TilePos { x: 0, z: 0 });
        assert_eq!(tile.tile.hidden, 128 * 128);
        assert!(tile.png_data.is_some(), "no published image yet");
    }

    #[test]
    fn drops_unsupported_records() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorldFiles::new(dir.path(), "w");
        let cache = HashMap::new();

        // Unlimited tracking is excluded from conversion.
        let mut record = map_record(0, 0, 0, Value::String("minecraft:overworld".to_owned()));
        if let Value::Compound(root) = &mut record {
            if let Some(Value::Compound(data)) = root.get_mut("data") {
                data.insert("unlimitedTracking".to_owned(), Value::Byte(1));
            }
        }
        write_gzipped_nbt(&map_src_file(dir.path(), 0), &record);
        assert!(read_map(dir.path(), 0, &paths, &cache).unwrap().is_none());

        // Unknown legacy dimension id.
        let record = map_record(0, 0, 0, Value::Int(7));
        write_gzipped_nbt(&map_src_file(dir.path(), 1), &record);
        assert!(read_map(dir.path(), 1, &paths, &cache).unwrap().is_none());

        // Corrupt scale bytes; a shift by these would overflow the span.
        let record = map_record(0, 0, 100, Value::String("minecraft:overworld".to_owned()));
        write_gzipped_nbt(&map_src_file(dir.path(), 4), &record);
        assert!(read_map(dir.path(), 4, &paths, &cache).unwrap().is_none());
        let record = map_record(0, 0, -1, Value::String("minecraft:overworld".to_owned()));
        write_gzipped_nbt(&map_src_file(dir.path(), 5), &record);
        assert!(read_map(dir.path(), 5, &paths, &cache).unwrap().is_none());

        // Undersized pixel buffer.
        let record = compound([(
            "data",
            compound([
                ("xCenter", Value::Int(0)),
                ("zCenter", Value::Int(0)),
                ("scale", Value::Byte(0)),
                (
                    "dimension",
                    Value::String("minecraft:overworld".to_owned()),
                ),
                ("colors", Value::ByteArray(ByteArray::new(vec![0; 16]))),
            ]),
        )]);
        write_gzipped_nbt(&map_src_file(dir.path(), 2), &record);
        assert!(read_map(dir.path(), 2, &paths, &cache).unwrap().is_none());

        // Missing file entirely.
        assert!(read_map(dir.path(), 3, &paths, &cache).unwrap().is_none());
    }

    #[test]
    fn legacy_dimension_ids_resolve() {
        assert_eq!(
            dimension_name(&Value::Int(-1)).as_deref(),
            Some("minecraft:the_nether")
        );
        assert_eq!(
            dimension_name(&Value::Byte(1)).as_deref(),
            Some("minecraft:the_end")
        );
        assert_eq!(dimension_name(&Value::Int(2)), None);
    }

    #[test]
    fn reads_pointer_and_banner_icons() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorldFiles::new(dir.path(), "w");
        let mut record = map_record(0, 0, 0, Value::String("minecraft:the_nether".to_owned()));
        if let Value::Compound(root) = &mut record {
            if let Some(Value::Compound(data)) = root.get_mut("data") {
                data.insert(
                    "frames".to_owned(),
                    Value::List(vec![
                        compound([
                            (
                                "Pos",
                                compound([
                                    ("X", Value::Int(8)),
                                    ("Y", Value::Int(64)),
                                    ("Z", Value::Int(-8)),
                                ]),
                            ),
                            ("Rotation", Value::Int(90)),
                        ]),
                        // Missing position, skipped.
                        compound([("Rotation", Value::Int(0))]),
                    ]),
                );
                data.insert(
                    "banners".to_owned(),
                    Value::List(vec![
                        compound([
                            (
                                "Pos",
                                compound([
                                    ("X", Value::Int(1)),
                                    ("Y", Value::Int(64)),
                                    ("Z", Value::Int(2)),
                                ]),
                            ),
                            ("Color", Value::String("red".to_owned())),
                            ("Name", Value::String("base".to_owned())),
                        ]),
                        // Unknown color, skipped.
                        compound([
                            (
                                "Pos",
                                compound([("X", Value::Int(0)), ("Z", Value::Int(0))]),
                            ),
                            ("Color", Value::String("ultraviolet".to_owned())),
                        ]),
                    ]),
                );
            }
        }
        write_gzipped_nbt(&map_src_file(dir.path(), 0), &record);

        let tile = read_map(dir.path(), 0, &paths, &HashMap::new())
            .unwrap()
            .unwrap();
        assert_eq!(tile.tile.icons.len(), 2);
        assert!(matches!(
            &tile.tile.icons[0],
            Icon::Pointer { rotation: 90, pos } if pos.x() == 8 && pos.z() == -8
        ));
        assert!(matches!(
            &tile.tile.icons[1],
            Icon::Banner { color: BannerColor::Red, label, .. } if label == "base"
        ));
    }

    #[test]
    fn cache_short_circuits_unchanged_records() {
        let dir = tempfile::tempdir().unwrap();
        let paths = WorldFiles::new(dir.path(), "w");
        let record = map_record(0, 0, 0, Value::String("minecraft:overworld".to_owned()));
        let src = map_src_file(dir.path(), 0);
        write_gzipped_nbt(&src, &record);

        let png = paths.tile_png_file(0);
        fs::create_dir_all(png.parent().unwrap()).unwrap();
        fs::write(&png, b"png").unwrap();
        set_mtime(&src, 1_000);
        set_mtime(&png, 2_000);

        // A sentinel the decoder could never produce proves no decode ran.
        let sentinel = ConverterTile {
            scale: 0,
            dimension: "minecraft:overworld".to_owned(),
            tile: TileMetadata {
                id: 0,
                pos: TilePos { x: 9, z: 9 },
                hidden: -1,
                modified: Timestamp(0),
                icons: Vec::new(),
            },
            src_modified: Timestamp(1_000_000),
            png_data: None,
        };
        let cache = HashMap::from([(0, sentinel.clone())]);
        let tile = read_map(dir.path(), 0, &paths, &cache).unwrap().unwrap();
        assert_eq!(tile, sentinel);

        // A source newer than the image bypasses the cache and re-decodes.
        set_mtime(&src, 3_000);
        let tile = read_map(dir.path(), 0, &paths, &cache).unwrap().unwrap();
        assert_eq!(tile.tile.hidden, 128 * 128);
    }
}
