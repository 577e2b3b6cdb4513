//! Sweep Replay - Main Entry Point
//!
//! Usage: `sweep-replay [CAPTURE_FILE]` (stdin when omitted). Settings come
//! from `sweep-replay.toml` and `SWEEP_*` environment variables.

use anyhow::Context;
use sweep_replay::{init_logging, run, ReplayConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = ReplayConfig::load().context("loading replay configuration")?;
    if let Some(path) = std::env::args().nth(1) {
        config.input = Some(path.into());
    }

    init_logging(&config)?;
    info!("=== Sweep Replay v{} ===", env!("CARGO_PKG_VERSION"));

    let stats = run(&config).await?;
    info!(
        bytes = stats.bytes_fed,
        frames = stats.frames_decoded,
        rejected = stats.frames_rejected(),
        noise = stats.noise_bytes,
        discarded = stats.partial_frames_discarded,
        "Replay complete"
    );
    Ok(())
}
