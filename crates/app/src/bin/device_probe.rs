use anyhow::Context;
use clap::{Parser, Subcommand};
use noisewatch_audio::{CpalFrameSource, DeviceManager};
use noisewatch_meter::{FrameDecoder, FrameSource, MeterConfig};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "device-probe")]
#[command(about = "Noisewatch live capture checks")]
#[command(long_about = "Lists input devices and runs short live captures to verify that \
a device delivers frames and to see what loudness readings it produces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Audio device name
    #[arg(short = 'D', long, global = true)]
    device: Option<String>,

    /// Capture duration in seconds
    #[arg(short = 'd', long, default_value = "10", global = true)]
    duration: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// List available input devices
    List,
    /// Capture from the device and print loudness statistics
    Capture,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            list_devices();
            Ok(())
        }
        Commands::Capture => run_capture(&cli),
    }
}

fn list_devices() {
    let manager = DeviceManager::new();
    println!("Input devices on host {:?}:", manager.host_id());
    println!();

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

fn run_capture(cli: &Cli) -> anyhow::Result<()> {
    let config = MeterConfig::default();
    let mut source = CpalFrameSource::open(&config, cli.device.clone())
        .context("failed to open the audio source")?;
    let shape = source.shape();
    println!(
        "Capturing for {}s at {} Hz, {} channel(s)...",
        cli.duration, shape.sample_rate, shape.channels
    );

    let decoder = FrameDecoder::new(config.calibration_offset_db);
    let deadline = Instant::now() + Duration::from_secs(cli.duration);
    let mut frames = 0u64;
    let mut errors = 0u64;
    let mut min_db = f64::INFINITY;
    let mut max_db = f64::NEG_INFINITY;
    let mut sum_db = 0.0;

    while Instant::now() < deadline {
        match source.read_frame() {
            Ok(frame) => {
                let db = decoder.decode(&frame.samples);
                frames += 1;
                sum_db += db;
                min_db = min_db.min(db);
                max_db = max_db.max(db);
            }
            Err(e) => {
                errors += 1;
                eprintln!("read error: {}", e);
            }
        }
        std::thread::sleep(config.tick_period());
    }
    source.close();

    println!();
    println!("Frames read:  {}", frames);
    println!("Read errors:  {}", errors);
    if frames > 0 {
        println!(
            "Loudness dB:  min {:.1} / mean {:.1} / max {:.1}",
            min_db,
            sum_db / frames as f64,
            max_db
        );
    }

    Ok(())
}
