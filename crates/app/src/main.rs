//! LiDAR Capture - Main Entry Point

use std::path::PathBuf;

use app::{init_logging, run_demo, AppConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    init_logging(&config.log_level, config.log_json)?;

    info!("=== LiDAR Capture v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Writing depth maps to {}", config.session.output_dir.display());

    let summary = run_demo(config).await?;
    if !summary.outstanding.is_empty() {
        warn!("Captures never finished: {:?}", summary.outstanding);
    }
    for path in &summary.depth_maps {
        info!("{}", path.display());
    }

    Ok(())
}
