//! Lullaby Player (lullaby-player) - Main entry point
//!
//! Drives the playback control plane against the simulated engine with a
//! scripted listening session: start, skip, pause mid-crossfade, resume,
//! natural track end and stop. Every event is printed as one JSON line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lullaby_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use lullaby_common::{FadeCurve, PlayerEvent};
use lullaby_player::engine::SimulatedEngine;
use lullaby_player::playback::{InMemoryPlaylist, RecordingSession};
use lullaby_player::{PlaybackController, PlayerConfig};
use tokio::signal;
use tokio::time::sleep;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "lullaby_player=debug,lullaby_common=info";

/// Command-line arguments for lullaby-player
#[derive(Parser, Debug)]
#[command(name = "lullaby-player")]
#[command(about = "Dual-slot crossfading playback control plane")]
#[command(version)]
struct Args {
    /// Configuration file (falls back to LULLABY_CONFIG, then platform paths)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fade-in applied on start and fade-out applied on stop
    #[arg(long, default_value = "1000", env = "LULLABY_FADE_IN_MS")]
    fade_in_ms: u64,

    /// Crossfade duration override
    #[arg(long, env = "LULLABY_CROSSFADE_MS")]
    crossfade_ms: Option<u64>,

    /// Fade curve override (linear, exponential, logarithmic, cosine, equal_power)
    #[arg(long, env = "LULLABY_CURVE")]
    curve: Option<FadeCurve>,

    /// How long each scripted step lets playback run
    #[arg(long, default_value = "3000", env = "LULLABY_PLAY_MS")]
    play_ms: u64,

    /// Wrap around at the end of the playlist
    #[arg(long = "loop")]
    looping: bool,

    /// Track locators; any containing "corrupt" fail to load
    #[arg(required = true)]
    tracks: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing so its log level can seed the filter
    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, "lullaby");
    let mut config =
        PlayerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let fallback = match &config.logging.level {
        Some(level) => format!("lullaby_player={level},lullaby_common={level}"),
        None => DEFAULT_FILTER.to_string(),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    if let Some(ms) = args.crossfade_ms {
        config.crossfade.duration_ms = ms;
    }
    if let Some(curve) = args.curve {
        config.crossfade.curve = curve;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        "Starting Lullaby Player with {} track(s), crossfade {} ms ({:?})",
        args.tracks.len(),
        config.crossfade.duration_ms,
        config.crossfade.curve
    );

    let engine = SimulatedEngine::new();
    engine.fail_locator("corrupt");
    let playlist = InMemoryPlaylist::from_locators(args.tracks.clone()).looping(args.looping);
    let session = Arc::new(RecordingSession::new());
    let crossfade = config.crossfade.duration();

    let controller = PlaybackController::spawn(
        config,
        Arc::new(engine),
        Box::new(playlist),
        Arc::clone(&session) as _,
    )
    .context("Failed to start playback worker")?;

    let printer = tokio::spawn(print_events(controller.events()));

    tokio::select! {
        result = run_session(&controller, &args, crossfade) => result?,
        _ = shutdown_signal() => {
            info!("Shutdown requested, stopping playback");
            if let Err(e) = controller.stop(None).await {
                warn!("Stop during shutdown failed: {}", e);
            }
        }
    }

    controller.shutdown().await;
    printer.abort();

    info!(
        "Final state: {:?} (session activations {}, deactivations {})",
        controller.state().mode,
        session.activations(),
        session.deactivations()
    );
    Ok(())
}

/// Scripted listening session
async fn run_session(
    controller: &PlaybackController,
    args: &Args,
    crossfade: Duration,
) -> Result<()> {
    let fade = Duration::from_millis(args.fade_in_ms);
    let play = Duration::from_millis(args.play_ms);

    controller
        .start(Some(fade))
        .await
        .context("Failed to start playback")?;
    sleep(play).await;

    // Pause halfway through the skip crossfade, then resume it
    let skipping = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.skip_to_next().await })
    };
    sleep(crossfade / 2).await;
    controller.pause().await.context("Pause failed")?;
    match skipping.await.context("Skip task panicked")? {
        Ok(()) => info!("Skip settled"),
        Err(e) => warn!("Skip did not complete: {}", e),
    }
    sleep(play / 2).await;
    controller.resume().await.context("Resume failed")?;
    sleep(play).await;

    if let Err(e) = controller.track_ending().await {
        warn!("Track-ending transition failed: {}", e);
    }
    sleep(play).await;

    if let Err(e) = controller.skip_to_previous().await {
        warn!("Skip back failed: {}", e);
    }
    sleep(play).await;

    controller
        .stop(Some(fade))
        .await
        .context("Failed to stop playback")?;
    Ok(())
}

/// Print every event as a JSON line on stdout
async fn print_events(events: impl Stream<Item = PlayerEvent>) {
    tokio::pin!(events);
    while let Some(event) = events.next().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize {} event: {}", event.event_type(), e),
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
