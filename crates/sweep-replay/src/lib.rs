//! Sweep Replay
//!
//! Feeds a captured analyzer byte stream through the sweep decoder and
//! writes one JSON object per decoded frame.

use anyhow::Context;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use sweep_protocol::{DecoderConfig, DecoderStats, FrameDecoder, FrameReader, SweepRecord};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Shape of each output line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Whole-dBm storage record
    #[default]
    Record,
    /// Full frame with native codes and statistics
    Frame,
}

/// Replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Capture file; stdin when unset
    pub input: Option<PathBuf>,
    /// Output line format
    pub output: OutputFormat,
    /// Frames buffered between decoder and writer
    pub channel_depth: usize,
    /// Log level name (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON
    pub log_json: bool,
    /// Decoder settings
    pub decoder: DecoderConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: OutputFormat::Record,
            channel_depth: 64,
            log_level: "info".to_string(),
            log_json: false,
            decoder: DecoderConfig::default(),
        }
    }
}

impl ReplayConfig {
    /// Load from `sweep-replay.toml` (optional) and `SWEEP_*` variables
    ///
    /// Nested keys use a double underscore, e.g.
    /// `SWEEP_DECODER__STEP_COUNT=112`.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name("sweep-replay").required(false))
                .add_source(
                    Environment::with_prefix("SWEEP")
                        .prefix_separator("_")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }
}

/// Initialize logging to stderr, keeping stdout for frame output
pub fn init_logging(config: &ReplayConfig) -> anyhow::Result<()> {
    let level = parse_level(&config.log_level)?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if config.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("Failed to set tracing subscriber")
}

fn parse_level(name: &str) -> anyhow::Result<Level> {
    name.parse()
        .with_context(|| format!("Invalid log_level {name:?}"))
}

/// Replay the configured input to stdout
pub async fn run(config: &ReplayConfig) -> anyhow::Result<DecoderStats> {
    let out = tokio::io::stdout();
    match &config.input {
        Some(path) => {
            info!("Replaying capture {}", path.display());
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening capture {}", path.display()))?;
            replay(file, out, config).await
        }
        None => {
            info!("Replaying capture from stdin");
            replay(tokio::io::stdin(), out, config).await
        }
    }
}

/// Decode everything from `input`, writing JSON lines to `out`
pub async fn replay<R, W>(input: R, mut out: W, config: &ReplayConfig) -> anyhow::Result<DecoderStats>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let decoder = FrameDecoder::new(config.decoder.clone())?;
    let (tx, mut rx) = mpsc::channel(config.channel_depth.max(1));
    let pump = tokio::spawn(FrameReader::new(input, decoder).pump(tx));

    while let Some(frame) = rx.recv().await {
        let line = match config.output {
            OutputFormat::Record => serde_json::to_string(&SweepRecord::from(&frame))?,
            OutputFormat::Frame => serde_json::to_string(&frame)?,
        };
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
    }
    out.flush().await?;

    let stats = pump.await.context("frame pump task failed")??;
    debug!(?stats, "Decoder counters");
    Ok(stats)
}
