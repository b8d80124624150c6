//! Headless nightreel player
//!
//! Plays the configured sequence once with a logging narrator and the
//! software synthesizer, printing the footer status line every second.
//! An optional first argument names a config file to use in place of
//! `./nightreel.toml`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nightreel::{
    Host, LevelMeter, Orchestrator, ReelConfig, SequenceTable, SessionStatus, SoftwareAudio,
    TranscriptSpeech,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let (config, sources) =
        ReelConfig::load(config_path.as_deref()).context("loading configuration")?;

    let filter = EnvFilter::try_new(&config.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("nightreel {} starting", env!("CARGO_PKG_VERSION"));
    for file in &sources.files {
        info!("config: {}", file.display());
    }
    for var in &sources.env_overrides {
        info!("config override: ${}", var);
    }

    let table = match &config.engine.sequence_path {
        Some(path) => SequenceTable::load(path)
            .with_context(|| format!("loading sequence {}", path.display()))?,
        None => SequenceTable::builtin().context("loading built-in sequence")?,
    };
    info!(
        "sequence \"{}\": {} scenes, {} captions, {:.0}s",
        table.title(),
        table.scenes().len(),
        table.captions().len(),
        table.duration()
    );

    let meter = Arc::new(LevelMeter::new());
    let host = Host::new(
        Arc::new(TranscriptSpeech::new()),
        Arc::new(SoftwareAudio::with_sink(meter.clone())),
    );

    let mut orchestrator = Orchestrator::new(table, &config, host);
    if let Some(card) = orchestrator.frame().card {
        info!("{:?}", card);
    }
    orchestrator.begin();

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_caption: Option<String> = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted");
                break;
            }
        }

        let frame = orchestrator.frame();
        info!("{}", frame.status_line());
        if frame.caption != last_caption {
            if let Some(caption) = &frame.caption {
                info!("subtitle: {}", caption);
            }
            last_caption = frame.caption.clone();
        }
        if frame.status == SessionStatus::Finished {
            if let Some(card) = frame.card {
                info!("{:?}", card);
            }
            break;
        }
    }

    orchestrator.shutdown().await;
    info!(
        blocks = meter.blocks(),
        peak_rms = meter.peak_rms(),
        "ambience rendered"
    );
    Ok(())
}
