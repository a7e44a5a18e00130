use std::error::Error;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::warn;

use qibla_rs::compass::{CompassPoints, heading_to_direction, shortest_delta};
use qibla_rs::compass_sensor::Lis3mdlMagnetometer;
use qibla_rs::config::DEFAULT_SAMPLE_INTERVAL_MS;
use qibla_rs::heading::normalize_heading;
use qibla_rs::logging;
use qibla_rs::sensor_stream::{SensorEvent, SensorStream};

/// Print raw magnetometer readings to find the calibration offset for a mounting.
#[derive(Parser, Debug)]
#[command(name = "calibrate")]
struct Args {
    /// Sampling interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_SAMPLE_INTERVAL_MS * 5)]
    interval_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init(args.verbose).map_err(|e| e as Box<dyn Error>)?;

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║     Compass Offset Calibration                       ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    println!("Instructions:");
    println!("1. Keep the device LEVEL in the orientation you will use it");
    println!("2. Point the device's top edge at magnetic north (use a reference compass)");
    println!("3. Read the suggested offset once the raw heading settles");
    println!("4. Pass it to qibla-rs with --calibration-offset");
    println!("5. Press Ctrl+C when done\n");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut stream = SensorStream::new(Lis3mdlMagnetometer::new());
    stream.start(Duration::from_millis(args.interval_ms), move |event| {
        let _ = tx.send(event);
    })?;

    println!(
        "{:^8} | {:^26} | {:^14} | {:^16}",
        "Sample", "Raw X / Y / Z", "Raw heading", "Suggested offset"
    );
    println!("{:-<8}-+-{:-<26}-+-{:-<14}-+-{:-<16}", "", "", "", "");

    let mut sample_count = 0;
    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c() => None,
        };

        match event {
            Some(SensorEvent::Sample(sample)) => {
                sample_count += 1;
                let raw = normalize_heading(&sample, 0.0);
                println!(
                    "{:^8} | {:>7.0} {:>7.0} {:>7.0}    | {:>6.1}° {:<5} | {:>+8.1}°",
                    sample_count,
                    sample.x,
                    sample.y,
                    sample.z,
                    raw,
                    heading_to_direction(raw, CompassPoints::Sixteen).abbreviation(),
                    shortest_delta(0.0, raw)
                );
            }
            Some(SensorEvent::Failed(e)) => {
                warn!(error = %e, "Magnetometer stopped delivering samples");
                break;
            }
            None => break,
        }
    }

    stream.release();
    println!("\nCollected {} samples.", sample_count);
    Ok(())
}
