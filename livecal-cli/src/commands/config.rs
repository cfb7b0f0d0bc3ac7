use std::path::Path;

use anyhow::Result;
use livecal_core::SyncConfig;
use owo_colors::OwoColorize;

pub fn run(config_path: &Path, config: &SyncConfig) -> Result<()> {
    println!("{}", "Paths".bold());
    println!("  Config:      {}", config_path.display());

    println!("\n{}", "Sync".bold());
    println!("  Collection:  {}", config.collection);
    println!("  Order by:    {}", config.order_by);
    println!("  Direction:   {:?}", config.direction);

    println!("\n{}", "Resolved TOML".bold());
    for line in config.to_toml()?.lines() {
        println!("  {}", line.dimmed());
    }

    Ok(())
}
