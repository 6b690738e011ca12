use anyhow::Result;

use crate::config::CliArgs;

mod animation;
mod asset;
mod camera;
mod config;
mod controls;
mod engine;
mod lights;
mod rendering;
mod scene_graph;
mod viewer;
mod window;

fn main() -> Result<()> {
    let mut logger = pretty_env_logger::formatted_builder();
    logger.parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));
    logger.init();

    let cli = CliArgs::parse(std::env::args())?;
    let config = cli.to_config();
    log::info!(
        "Preset {:?}, asset {}",
        config.preset,
        config.asset_path().display()
    );

    pollster::block_on(window::run(config, cli.window_size))?;

    Ok(())
}
