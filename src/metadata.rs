//! Published metadata documents and their wire shapes.
//!
//! Every document is constructed fresh on each run, validated at
//! construction, and compared structurally against the previously published
//! copy to decide whether a rewrite is needed. Loaded documents that fail
//! validation are treated as absent.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::coords::{NetherPos, Position, TilePos, WorldPos};

/// Identity marker embedded in the root document for viewer sanity checks.
pub const ROOT_IDENTITY: &str = "mc-map-tiles root metadata";
pub const ROOT_META_VERSION: i32 = 4;
pub const WORLD_META_VERSION: i32 = 5;

/// A document type that enforces its schema invariants.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Epoch milliseconds. Values stored in metadata are truncated to whole
/// seconds so a reloaded document compares equal to a freshly built one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Modification time of a file; missing files stat as the epoch, which
    /// loses every mtime comparison.
    pub fn from_mtime(path: &Path) -> Timestamp {
        fs::metadata(path)
            .ok()
            .and_then(|meta| meta.modified().ok())
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| Timestamp(elapsed.as_millis() as i64))
            .unwrap_or(Timestamp(0))
    }

    pub fn truncate_to_seconds(self) -> Timestamp {
        Timestamp(self.0 - self.0.rem_euclid(1000))
    }
}

/// Banner colors, serialized by their in-game key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerColor {
    White,
    Orange,
    Magenta,
    LightBlue,
    Yellow,
    Lime,
    Pink,
    Gray,
    LightGray,
    Cyan,
    Purple,
    Blue,
    Brown,
    Green,
    Red,
    Black,
}

impl BannerColor {
    pub fn from_key(key: &str) -> Option<BannerColor> {
        Some(match key {
            "white" => BannerColor::White,
            "orange" => BannerColor::Orange,
            "magenta" => BannerColor::Magenta,
            "light_blue" => BannerColor::LightBlue,
            "yellow" => BannerColor::Yellow,
            "lime" => BannerColor::Lime,
            "pink" => BannerColor::Pink,
            "gray" => BannerColor::Gray,
            "light_gray" => BannerColor::LightGray,
            "cyan" => BannerColor::Cyan,
            "purple" => BannerColor::Purple,
            "blue" => BannerColor::Blue,
            "brown" => BannerColor::Brown,
            "green" => BannerColor::Green,
            "red" => BannerColor::Red,
            "black" => BannerColor::Black,
            _ => return None,
        })
    }
}

/// Markers a map displays on top of its tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Icon {
    Pointer {
        pos: Position,
        rotation: i32,
    },
    Banner {
        pos: Position,
        color: BannerColor,
        label: String,
    },
}

/// The published shape of one resolved tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMetadata {
    pub id: i32,
    pub pos: TilePos,
    pub hidden: i32,
    pub modified: Timestamp,
    pub icons: Vec<Icon>,
}

/// One logical map: a configured (scale, dimension) pair and its tile grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapMetadata {
    pub map_id: String,
    pub label: String,
    pub scale: i32,
    pub dimension: String,
    pub min_pos: TilePos,
    pub max_pos: TilePos,
    #[serde(default)]
    pub show_routes: bool,
    #[serde(with = "tile_list")]
    pub tiles: BTreeMap<TilePos, TileMetadata>,
}

/// Named waypoints referenced by route paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RouteNode {
    Stop {
        pos: NetherPos,
        label: String,
    },
    Gate {
        pos: NetherPos,
        label: String,
        #[serde(rename = "exitPos", default, skip_serializing_if = "Option::is_none")]
        exit_pos: Option<WorldPos>,
    },
    Poi {
        pos: NetherPos,
        label: String,
    },
}

impl RouteNode {
    pub fn pos(&self) -> NetherPos {
        match *self {
            RouteNode::Stop { pos, .. } => pos,
            RouteNode::Gate { pos, .. } => pos,
            RouteNode::Poi { pos, .. } => pos,
        }
    }
}

/// An ordered polyline connecting two named nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePath {
    pub first: String,
    pub last: String,
    pub path: Vec<NetherPos>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutesMetadata {
    pub nodes: BTreeMap<String, RouteNode>,
    pub paths: Vec<RoutePath>,
}

/// `worlds/<worldId>/world.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldMetadata {
    pub maps: BTreeMap<String, MapMetadata>,
    pub routes: RoutesMetadata,
    pub default_map: String,
    pub label: String,
    pub world_id: String,
    pub version: i32,
}

impl WorldMetadata {
    pub fn new(
        world_id: String,
        label: String,
        default_map: String,
        maps: BTreeMap<String, MapMetadata>,
        routes: RoutesMetadata,
    ) -> Result<WorldMetadata> {
        let meta = WorldMetadata {
            maps,
            routes,
            default_map,
            label,
            world_id,
            version: WORLD_META_VERSION,
        };
        meta.validate()?;
        Ok(meta)
    }
}

impl Validate for WorldMetadata {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.version == WORLD_META_VERSION,
            "world metadata version {} != {WORLD_META_VERSION}",
            self.version
        );
        ensure!(
            self.maps.contains_key(&self.default_map),
            "default map {:?} is not one of the world's maps",
            self.default_map
        );
        Ok(())
    }
}

/// `metadata.json`, the root document enumerating published worlds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootMetadata {
    pub worlds: BTreeMap<String, WorldStub>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_world: Option<String>,
    pub identity: String,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldStub {
    pub label: String,
    pub modified: Timestamp,
}

impl RootMetadata {
    pub fn new(
        worlds: BTreeMap<String, WorldStub>,
        default_world: Option<String>,
    ) -> Result<RootMetadata> {
        let meta = RootMetadata {
            worlds,
            default_world,
            identity: ROOT_IDENTITY.to_owned(),
            version: ROOT_META_VERSION,
        };
        meta.validate()?;
        Ok(meta)
    }
}

impl Validate for RootMetadata {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.identity == ROOT_IDENTITY,
            "root metadata identity {:?} is not {ROOT_IDENTITY:?}",
            self.identity
        );
        ensure!(
            self.version == ROOT_META_VERSION,
            "root metadata version {} != {ROOT_META_VERSION}",
            self.version
        );
        if let Some(world) = &self.default_world {
            ensure!(
                self.worlds.contains_key(world),
                "default world {world:?} is not a published world"
            );
        }
        Ok(())
    }
}

/// Tile tables serialize as a JSON list; positions are re-keyed on load.
mod tile_list {
    use std::collections::BTreeMap;

    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TileMetadata;
    use crate::coords::TilePos;

    pub fn serialize<S>(
        tiles: &BTreeMap<TilePos, TileMetadata>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(tiles.len()))?;
        for tile in tiles.values() {
            seq.serialize_element(tile)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<TilePos, TileMetadata>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tiles = Vec::<TileMetadata>::deserialize(deserializer)?;
        Ok(tiles.into_iter().map(|tile| (tile.pos, tile)).collect())
    }
}
