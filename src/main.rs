use anyhow::{bail, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use stbplay::backend::simulated::{Scenario, SimulatedEngineProvider};
use stbplay::{
    BackendPreference, Config, DeviceProfile, EngineBackendFactory, PlatformInfo, PlaybackEngine,
    PlaybackEvent, PlaybackSupervisor, StopReason,
};

/// stbplay - play a stream on the simulated engine and watch the supervisor recover
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stream URL
    #[arg(value_name = "URL", default_value = "http://example.invalid/live/channel1.m3u8")]
    url: String,

    /// Channel title
    #[arg(short, long, default_value = "Demo channel")]
    title: String,

    /// Simulated behavior: healthy, codec-failure, stall, network-flap, av-offset
    #[arg(short, long, default_value = "healthy")]
    scenario: Scenario,

    /// Backend preference: auto, modern, legacy, alternate, native
    #[arg(short, long)]
    backend: Option<BackendPreference>,

    /// Config file to use instead of the system and user files
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Device OS API level
    #[arg(long)]
    api_level: Option<u32>,

    /// Device manufacturer
    #[arg(long)]
    manufacturer: Option<String>,

    /// Device model
    #[arg(long)]
    model: Option<String>,

    /// CPU cores available to decoders
    #[arg(long)]
    cores: Option<usize>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Print playback events as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize logging
    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting stbplay v{} ({} scenario)", env!("CARGO_PKG_VERSION"), args.scenario);

    if let Some(preference) = args.backend {
        config.playback.backend_preference = preference;
    }
    if args.api_level.is_some() {
        config.device.api_level = args.api_level;
    }
    if args.manufacturer.is_some() {
        config.device.manufacturer = args.manufacturer.clone();
    }
    if args.model.is_some() {
        config.device.model = args.model.clone();
    }
    if args.cores.is_some() {
        config.device.cpu_cores = args.cores;
    }
    if args.scenario == Scenario::AvOffset {
        // The resync path only runs on the native engine of an offset-prone box.
        config.device.manufacturer.get_or_insert_with(|| "ZTE".to_string());
        config.device.model.get_or_insert_with(|| "B760H".to_string());
        if args.backend.is_none() {
            config.playback.backend_preference = BackendPreference::Native;
        }
    }
    config.validate()?;

    let device = config.device.clone();
    let profile = DeviceProfile::init_with(move || PlatformInfo::detect().with_overrides(&device));

    let provider = Arc::new(SimulatedEngineProvider::for_scenario(args.scenario));
    let supervisor = PlaybackSupervisor::builder(Box::new(EngineBackendFactory::new(provider)))
        .with_profile(profile)
        .with_settings(config.playback.clone())
        .with_config(config.supervisor.clone())
        .build()?;
    let engine = PlaybackEngine::spawn(supervisor)?;

    let (stopped_tx, mut stopped_rx) = mpsc::unbounded_channel();
    let json = args.json;
    let _events = engine.subscribe(move |event| {
        print_event(event, json);
        if let PlaybackEvent::PlaybackStopped { reason } = event {
            let _ = stopped_tx.send(*reason);
        }
    });

    engine.play(args.title.clone(), args.url.clone())?;

    let reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            None
        }
        reason = stopped_rx.recv() => reason,
        _ = run_for(args.duration) => {
            info!("Duration elapsed");
            None
        }
    };

    let status = engine.status();
    info!(
        "Final status: {} on {:?}, {} restarts, position {}",
        status.state,
        status.variant,
        status.restarts,
        stbplay::utils::format_position(status.position_ms)
    );
    engine.shutdown()?;

    match reason {
        Some(StopReason::BackendsExhausted) => bail!("no backend could play {}", args.url),
        Some(StopReason::AccessDenied) => bail!("access denied"),
        _ => Ok(()),
    }
}

async fn run_for(secs: Option<u64>) {
    match secs {
        Some(secs) => tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await,
        None => std::future::pending::<()>().await,
    }
}

fn print_event(event: &PlaybackEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Could not encode event: {}", e),
        }
        return;
    }

    match event {
        PlaybackEvent::PlaybackStarted { title, url } => info!("Playing '{}' from {}", title, url),
        PlaybackEvent::PlaybackStopped { reason } => info!("Playback stopped: {:?}", reason),
        PlaybackEvent::StateChanged { from, to } => info!("State {} -> {}", from, to),
        PlaybackEvent::BackendSwitched { from, to } => {
            warn!("Switched backend: {} -> {}", from, to)
        }
        PlaybackEvent::BufferingIndicator { visible } => {
            info!("Buffering indicator {}", if *visible { "shown" } else { "hidden" })
        }
        PlaybackEvent::MuteChanged { muted } => {
            info!("Audio {}", if *muted { "muted" } else { "unmuted" })
        }
        PlaybackEvent::PlaybackFailed { message } => error!("{}", message),
    }
}
