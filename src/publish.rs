//! Output layout and crash-safe file publication.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::metadata::Validate;

/// Published paths for one world under the output root.
#[derive(Debug)]
pub struct WorldFiles {
    world_dir: PathBuf,
    pub world_id: String,
}

impl WorldFiles {
    pub fn new(base_dir: &Path, world_id: &str) -> WorldFiles {
        WorldFiles {
            world_dir: base_dir.join("worlds").join(world_id),
            world_id: world_id.to_owned(),
        }
    }

    pub fn tile_png_file(&self, id: i32) -> PathBuf {
        self.world_dir.join("tiles").join(format!("tile_{id}.png"))
    }

    pub fn world_meta_file(&self) -> PathBuf {
        self.world_dir.join("world.json")
    }
}

pub fn root_meta_file(root_dir: &Path) -> PathBuf {
    root_dir.join("metadata.json")
}

/// Write through a dot-prefixed sibling temp file and an atomic rename.
///
/// The destination is either fully replaced or left untouched; a failure
/// mid-write removes the temp file and propagates. Missing parent
/// directories are created.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    let name = path
        .file_name()
        .and_then(OsStr::to_str)
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let tmp = dir.join(format!(".tmp-{name}"));
    let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.with_context(|| format!("writing {}", path.display()))
}

/// Load a previously published document. Anything missing, unparseable, or
/// failing validation is a cold start, not an error.
pub fn read_old_meta<T>(path: &Path, label: &str) -> Option<T>
where
    T: DeserializeOwned + Validate,
{
    if !path.exists() {
        log::info!(
            "existing {label} metadata not found at {}",
            path.display()
        );
        return None;
    }
    let loaded = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|text| Ok(serde_json::from_str::<T>(&text)?))
        .and_then(|meta| {
            meta.validate()?;
            Ok(meta)
        });
    match loaded {
        Ok(meta) => Some(meta),
        Err(err) => {
            log::warn!(
                "ignoring stale {label} metadata at {}: {err:#}",
                path.display()
            );
            None
        }
    }
}
