use clap::Parser;
use noisewatch_app::driver::{ReadFailurePolicy, TickDriver};
use noisewatch_app::presenter::{spawn_console_presenter, BroadcastSink};
use noisewatch_audio::{CpalFrameSource, DeviceManager};
use noisewatch_foundation::clock::real_clock;
use noisewatch_foundation::{AppState, ShutdownHandler, StateManager};
use noisewatch_meter::{DisplayUpdate, MeterConfig, SampleLoop};
use noisewatch_telemetry::MeterMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Parser)]
#[command(name = "noisewatch")]
#[command(about = "Ambient noise monitor with interval averaging and threshold warnings")]
struct Cli {
    /// Audio input device name (host default when omitted)
    #[arg(short = 'D', long)]
    device: Option<String>,

    /// List available input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Stop the application on a failed audio read instead of retrying
    #[arg(long)]
    halt_on_read_failure: bool,
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "noisewatch.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

fn list_devices() {
    let manager = DeviceManager::new();
    println!("Input devices on host {:?}:", manager.host_id());
    let devices = manager.enumerate_devices();
    if devices.is_empty() {
        println!("  (none found)");
    }
    for device in devices {
        if device.is_default {
            println!("  - {} (default)", device.name);
        } else {
            println!("  - {}", device.name);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.list_devices {
        list_devices();
        return Ok(());
    }

    init_logging()?;
    tracing::info!("Starting noisewatch");

    let state_manager = StateManager::new();
    let shutdown = ShutdownHandler::new().install().await;

    let config = MeterConfig::default();
    let metrics = Arc::new(MeterMetrics::default());

    // --- 1. Audio source ---
    let source =
        CpalFrameSource::open(&config, cli.device.clone())?.with_metrics(Arc::clone(&metrics));
    let shape = source.shape();
    tracing::info!(
        sample_rate = shape.sample_rate,
        channels = shape.channels,
        "Audio source opened"
    );

    // --- 2. Display fanout ---
    let (display_tx, display_rx) = broadcast::channel::<DisplayUpdate>(256);
    let presenter = spawn_console_presenter(display_rx);

    // --- 3. Sampling loop on its own thread ---
    let policy = if cli.halt_on_read_failure {
        ReadFailurePolicy::Stop
    } else {
        ReadFailurePolicy::Continue
    };
    let sample_loop = SampleLoop::new(
        config.clone(),
        Box::new(source),
        Box::new(BroadcastSink::new(display_tx.clone())),
        real_clock(),
    )
    .with_metrics(Arc::clone(&metrics));
    let driver = TickDriver::new(sample_loop, real_clock(), config.tick_period())
        .with_policy(policy)
        .with_shutdown(shutdown.clone())
        .spawn()?;

    state_manager.transition(AppState::Running)?;
    tracing::info!("Application state: {:?}", state_manager.current());

    // --- Main application loop ---
    let mut stats_interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = stats_interval.tick() => {
                let snap = metrics.snapshot();
                tracing::info!(
                    frames = snap.frames_decoded,
                    read_failures = snap.read_failures,
                    discarded = snap.samples_discarded,
                    intervals = snap.intervals_completed,
                    violations = snap.violations_recorded,
                    current_db = snap.current_db,
                    interval_db = snap.last_interval_db,
                    tick_rate = snap.tick_rate,
                    "Sampling stats"
                );
            }
        }
    }

    // --- Graceful shutdown ---
    tracing::info!("Beginning graceful shutdown");
    state_manager.transition(AppState::Stopping)?;

    // Stopping the driver also closes the audio source.
    driver.stop();
    tracing::info!("Sampling thread stopped.");

    // Dropping the last sender ends the presenter task.
    drop(display_tx);
    let _ = presenter.await;

    state_manager.transition(AppState::Stopped)?;
    tracing::info!("Shutdown complete");

    Ok(())
}
