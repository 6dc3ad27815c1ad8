use std::path::Path;

use anyhow::Result;

mod camera_feed;
mod capture;
mod config;
mod formats;
mod import;
mod math;
mod pose;
mod rendering;
mod scene_graph;
mod view;
mod window;

fn main() -> Result<()> {
    pretty_env_logger::init();

    let config = config::ViewerConfig::load_or_default(Path::new("arview.json"));
    window::run(config)?;

    Ok(())
}
