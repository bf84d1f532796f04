//! mc-map-tiles: convert Minecraft map items into static web map tiles.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use mc_map_tiles::config::read_worlds_conf;
use mc_map_tiles::convert::convert_all_worlds;

#[derive(Parser)]
#[command(
    name = "mc-map-tiles",
    about = "Convert Minecraft map-item save data into web-publishable tiles and metadata"
)]
struct Args {
    /// Root worlds config (JSON)
    config: PathBuf,

    /// Output directory for tiles and metadata
    output: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(err) = run(&args) {
        log::error!("{err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    let conf = read_worlds_conf(&args.config)?;
    convert_all_worlds(&conf, &args.output)
}
