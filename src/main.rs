use anyhow::{Context, Result};
use bevy::prelude::*;

use portal_view::{
    config::PortalConfig,
    plugins::{game::GamePlugin, portal::PortalContextRes},
};

/// Configuration used when no file is given on the command line.
const DEFAULT_CONFIG: &str = include_str!("../assets/portals.json");

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => PortalConfig::load(&path)
            .with_context(|| format!("Failed to load portal configuration from {path}"))?,
        None => PortalConfig::from_json_str(DEFAULT_CONFIG)
            .context("Failed to parse the built-in portal configuration")?,
    };
    let context = PortalContextRes::new(config).context("Invalid portal configuration")?;

    App::new()
        .insert_resource(context)
        .add_plugin(GamePlugin)
        .run();
    Ok(())
}
