//! World and route configuration, consumed from JSON files.
//!
//! A root config names the worlds to convert; each world config names its
//! source path, its logical maps, and the route network drawn over nether
//! maps. Config errors are fatal for the world they belong to at load time,
//! before anything is written.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Deserializer};
use serde::de::{MapAccess, Visitor};

use crate::coords::NetherPos;
use crate::metadata::{RouteNode, RoutePath};

/// One logical map: a (scale, dimension) pair exposed as a tile grid.
#[derive(Debug, Clone, Deserialize)]
pub struct MapConf {
    pub scale: i32,
    pub dimension: String,
    pub label: String,
    #[serde(default)]
    pub routes: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorldConfFile {
    path: PathBuf,
    label: String,
    #[serde(deserialize_with = "ordered_map")]
    maps: Vec<(String, MapConf)>,
    default_map: String,
    #[serde(default)]
    nodes: BTreeMap<String, RouteNode>,
    #[serde(default)]
    routes: Vec<Vec<String>>,
}

/// A validated world configuration with routes already expanded.
#[derive(Debug)]
pub struct WorldConf {
    /// World save directory; map records live under `<path>/data`.
    pub path: PathBuf,
    pub label: String,
    /// Insertion-ordered: the first matching map claims a record.
    pub maps: Vec<(String, MapConf)>,
    pub default_map: String,
    pub nodes: BTreeMap<String, RouteNode>,
    pub route_paths: Vec<RoutePath>,
}

impl WorldConf {
    pub fn load(path: &Path) -> Result<WorldConf> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let file: WorldConfFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing world config {}", path.display()))?;
        ensure!(
            file.maps.iter().any(|(key, _)| *key == file.default_map),
            "default map {:?} is not a configured map",
            file.default_map
        );
        let route_paths = file
            .routes
            .iter()
            .map(|spec| expand_route(spec, &file.nodes))
            .collect::<Result<Vec<_>>>()?;
        let base = path.parent().unwrap_or(Path::new("."));
        Ok(WorldConf {
            path: ensure_absolute(&file.path, base),
            label: file.label,
            maps: file.maps,
            default_map: file.default_map,
            nodes: file.nodes,
            route_paths,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StubWorldsConf {
    worlds: BTreeMap<String, PathBuf>,
    default: String,
}

/// Every world to convert in one invocation.
#[derive(Debug)]
pub struct AllWorldsConf {
    pub worlds: Vec<(String, WorldConf)>,
    pub default_world: Option<String>,
}

/// Load the root config and every world config it references.
///
/// Relative paths resolve against the referencing config file's directory.
/// A world whose config fails to load or whose save path does not exist is
/// dropped with an error; the remaining worlds still convert.
pub fn read_worlds_conf(path: &Path) -> Result<AllWorldsConf> {
    log::info!("reading root config from {}", path.display());
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let stub: StubWorldsConf = serde_json::from_str(&text)
        .with_context(|| format!("parsing root config {}", path.display()))?;
    ensure!(
        stub.worlds.contains_key(&stub.default),
        "default world {:?} is not configured",
        stub.default
    );

    let base = path.parent().unwrap_or(Path::new("."));
    let mut worlds = Vec::new();
    for (key, world_path) in stub.worlds {
        let world_file = ensure_absolute(&world_path, base);
        log::info!("reading world {key:?} config from {}", world_file.display());
        let conf = match WorldConf::load(&world_file) {
            Ok(conf) => conf,
            Err(err) => {
                log::error!("skipping world {key:?}: {err:#}");
                continue;
            }
        };
        if !conf.path.exists() {
            log::warn!(
                "skipping world {key:?}: save path {} does not exist",
                conf.path.display()
            );
            continue;
        }
        worlds.push((key, conf));
    }

    let default_world = Some(stub.default).filter(|key| worlds.iter().any(|(k, _)| k == key));
    Ok(AllWorldsConf {
        worlds,
        default_world,
    })
}

fn ensure_absolute(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        base.join(path)
    }
}

/// Expand one route spec into a polyline.
///
/// Waypoints are node names, or axis snaps relative to the previous point:
/// `x=node` / `z=node` take one coordinate from a named node, `x=#N` /
/// `z=#N` set it to a literal. `y=` is accepted as an alias for `z=`. The
/// first and last waypoints must be plain node names.
fn expand_route(spec: &[String], nodes: &BTreeMap<String, RouteNode>) -> Result<RoutePath> {
    ensure!(spec.len() >= 2, "route {spec:?} needs at least two waypoints");
    let (first, last) = (&spec[0], &spec[spec.len() - 1]);
    for end in [first, last] {
        ensure!(
            nodes.contains_key(end),
            "route endpoint {end:?} is not a defined node"
        );
    }

    let mut points: Vec<NetherPos> = Vec::with_capacity(spec.len());
    for item in spec {
        let prev = |points: &Vec<NetherPos>| {
            points
                .last()
                .copied()
                .with_context(|| format!("waypoint {item:?} needs a preceding point"))
        };
        let point = if let Some(arg) = item.strip_prefix("x=") {
            NetherPos {
                x: axis_coord(arg, nodes)?.0,
                z: prev(&points)?.z,
            }
        } else if let Some(arg) = item
            .strip_prefix("z=")
            .or_else(|| item.strip_prefix("y="))
        {
            NetherPos {
                x: prev(&points)?.x,
                z: axis_coord(arg, nodes)?.1,
            }
        } else {
            node_pos(nodes, item)?
        };
        points.push(point);
    }

    Ok(RoutePath {
        first: first.clone(),
        last: last.clone(),
        path: points,
    })
}

/// `#N` is a literal coordinate on both axes; anything else names a node.
fn axis_coord(arg: &str, nodes: &BTreeMap<String, RouteNode>) -> Result<(i32, i32)> {
    if let Some(literal) = arg.strip_prefix('#') {
        let value: i32 = literal
            .parse()
            .with_context(|| format!("bad coordinate literal {arg:?}"))?;
        Ok((value, value))
    } else {
        node_pos(nodes, arg).map(|pos| (pos.x, pos.z))
    }
}

fn node_pos(nodes: &BTreeMap<String, RouteNode>, name: &str) -> Result<NetherPos> {
    nodes
        .get(name)
        .map(RouteNode::pos)
        .with_context(|| format!("route references undefined node {name:?}"))
}

/// Deserialize a JSON object into entries in document order, because map
/// matching is first-configured-wins.
fn ordered_map<'de, D>(deserializer: D) -> Result<Vec<(String, MapConf)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedMapVisitor;

    impl<'de> Visitor<'de> for OrderedMapVisitor {
        type Value = Vec<(String, MapConf)>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a map of logical map configurations")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::new();
            while let Some(entry) = access.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedMapVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(x: i32, z: i32) -> RouteNode {
        RouteNode::Stop {
            pos: NetherPos { x, z },
            label: String::new(),
        }
    }

    fn spec(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn expands_axis_waypoints() {
        let nodes = BTreeMap::from([
            ("a".to_owned(), stop(0, 0)),
            ("b".to_owned(), stop(100, 40)),
        ]);
        let route = expand_route(&spec(&["a", "x=#10", "z=b", "b"]), &nodes).unwrap();
        assert_eq!(route.first, "a");
        assert_eq!(route.last, "b");
        assert_eq!(
            route.path,
            vec![
                NetherPos { x: 0, z: 0 },
                NetherPos { x: 10, z: 0 },
                NetherPos { x: 10, z: 40 },
                NetherPos { x: 100, z: 40 },
            ]
        );
    }

    #[test]
    fn y_aliases_z() {
        let nodes = BTreeMap::from([
            ("a".to_owned(), stop(5, 5)),
            ("b".to_owned(), stop(5, 80)),
        ]);
        let route = expand_route(&spec(&["a", "y=#80", "b"]), &nodes).unwrap();
        assert_eq!(route.path[1], NetherPos { x: 5, z: 80 });
    }

    #[test]
    fn rejects_bad_routes() {
        let nodes = BTreeMap::from([("a".to_owned(), stop(0, 0))]);
        // Endpoint is not a node.
        assert!(expand_route(&spec(&["a", "x=#10"]), &nodes).is_err());
        // Axis waypoint with no preceding point.
        let nodes2 = BTreeMap::from([
            ("a".to_owned(), stop(0, 0)),
            ("b".to_owned(), stop(1, 1)),
        ]);
        assert!(expand_route(&spec(&["x=#10", "b"]), &nodes2).is_err());
        // Undefined intermediate node.
        assert!(expand_route(&spec(&["a", "ghost", "b"]), &nodes2).is_err());
    }

    #[test]
    fn world_config_preserves_map_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("save")).unwrap();
        let config = r#"{
            "path": "save",
            "label": "Main",
            "maps": {
                "zoomed": {"scale": 4, "dimension": "minecraft:overworld", "label": "Zoomed"},
                "close": {"scale": 0, "dimension": "minecraft:overworld", "label": "Close"}
            },
            "defaultMap": "close",
            "nodes": {},
            "routes": []
        }"#;
        let path = dir.path().join("world.json");
        fs::write(&path, config).unwrap();

        let conf = WorldConf::load(&path).unwrap();
        let keys: Vec<&str> = conf.maps.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["zoomed", "close"]);
        assert_eq!(conf.path, dir.path().join("save"));
    }

    #[test]
    fn world_config_requires_default_map() {
        let dir = tempfile::tempdir().unwrap();
        let config = r#"{
            "path": "save",
            "label": "Main",
            "maps": {"close": {"scale": 0, "dimension": "minecraft:overworld", "label": "Close"}},
            "defaultMap": "missing"
        }"#;
        let path = dir.path().join("world.json");
        fs::write(&path, config).unwrap();
        assert!(WorldConf::load(&path).is_err());
    }

    #[test]
    fn root_config_drops_missing_worlds() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("save")).unwrap();
        let world = r#"{
            "path": "save",
            "label": "Main",
            "maps": {"close": {"scale": 0, "dimension": "minecraft:overworld", "label": "Close"}},
            "defaultMap": "close"
        }"#;
        fs::write(dir.path().join("main.json"), world).unwrap();
        let ghost = world.replace("save", "nowhere");
        fs::write(dir.path().join("ghost.json"), ghost).unwrap();
        let root = r#"{
            "worlds": {"main": "main.json", "ghost": "ghost.json"},
            "default": "ghost"
        }"#;
        let path = dir.path().join("config.json");
        fs::write(&path, root).unwrap();

        let conf = read_worlds_conf(&path).unwrap();
        let keys: Vec<&str> = conf.worlds.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["main"]);
        // The default pointed at the dropped world.
        assert_eq!(conf.default_world, None);
    }
}
