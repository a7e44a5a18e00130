use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

use qibla_rs::compass::{CompassPoints, shortest_delta};
use qibla_rs::compass_sensor::Lis3mdlMagnetometer;
use qibla_rs::config::{
    DEFAULT_CALIBRATION_OFFSET_DEGREES, DEFAULT_GPS_DEVICE, DEFAULT_LOCATION_TIMEOUT_SECS,
    DEFAULT_SAMPLE_INTERVAL_MS, DEFAULT_STATUS_INTERVAL_SECS,
};
use qibla_rs::location::{
    DevicePermission, FixedLocation, LocationProvider, NmeaLocationProvider, PermissionProvider,
    PermissionStatus, StaticPermission,
};
use qibla_rs::logging;
use qibla_rs::sensor_stream::MagneticFieldProvider;
use qibla_rs::session::CompassReading;
use qibla_rs::{CompassConfig, CompassSession, CompassSessionState, CompassSnapshot, GeoCoordinate};

/// Live qibla compass for a Raspberry Pi with a GPS receiver and a LIS3MDL magnetometer.
#[derive(Parser, Debug)]
#[command(name = "qibla-rs", version)]
struct Args {
    /// Use this latitude instead of waiting for a GPS fix
    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    latitude: Option<f64>,

    /// Use this longitude instead of waiting for a GPS fix
    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    longitude: Option<f64>,

    /// Serial device of the NMEA GPS receiver
    #[arg(long, default_value = DEFAULT_GPS_DEVICE)]
    gps_device: PathBuf,

    /// Degrees subtracted from the raw sensor angle (see the `calibrate` tool)
    #[arg(long, default_value_t = DEFAULT_CALIBRATION_OFFSET_DEGREES, allow_hyphen_values = true)]
    calibration_offset: f64,

    /// Magnetometer sampling interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_SAMPLE_INTERVAL_MS)]
    interval_ms: u64,

    /// Heading smoothing factor in (0, 1]; lower is smoother
    #[arg(long)]
    smoothing: Option<f64>,

    /// Compass points used for direction labels (4, 8 or 16)
    #[arg(long, default_value = "16", value_parser = parse_points)]
    points: CompassPoints,

    /// Seconds to wait for a GPS fix
    #[arg(long, default_value_t = DEFAULT_LOCATION_TIMEOUT_SECS)]
    location_timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_points(value: &str) -> Result<CompassPoints, String> {
    let count: u8 = value.parse().map_err(|e| format!("{e}"))?;
    CompassPoints::try_from(count)
}

enum Step {
    Update(Option<CompassReading>),
    Status,
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init(args.verbose).map_err(|e| e as Box<dyn Error>)?;

    let config = CompassConfig::default()
        .with_calibration_offset(args.calibration_offset)
        .with_sample_interval(Duration::from_millis(args.interval_ms))
        .with_smoothing(args.smoothing)
        .with_location_timeout(Duration::from_secs(args.location_timeout));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    println!("Starting qibla compass...");
    let magnetometer = Lis3mdlMagnetometer::new();

    match (args.latitude, args.longitude) {
        (Some(latitude), Some(longitude)) => {
            let origin = GeoCoordinate::checked(latitude, longitude)?;
            let session = CompassSession::new(
                config,
                StaticPermission(PermissionStatus::Granted),
                FixedLocation(origin),
                magnetometer,
            )?;
            run(session, shutdown, args.points).await
        }
        _ => {
            let session = CompassSession::new(
                config,
                DevicePermission::new(&args.gps_device),
                NmeaLocationProvider::new(&args.gps_device),
                magnetometer,
            )?;
            run(session, shutdown, args.points).await
        }
    }
}

async fn run<P, L, M>(
    mut session: CompassSession<P, L, M>,
    shutdown: CancellationToken,
    points: CompassPoints,
) -> Result<(), Box<dyn Error>>
where
    P: PermissionProvider,
    L: LocationProvider,
    M: MagneticFieldProvider,
{
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let mut state = tokio::select! {
        state = session.start() => state,
        _ = shutdown.cancelled() => CompassSessionState::Idle,
    };

    // Permission and location failures wait for the user before retrying.
    while state.can_retry() {
        if let Some(cause) = session.error() {
            println!("✗ {}", cause);
        }
        println!("Press Enter to retry, Ctrl+C to exit.");

        let retry = tokio::select! {
            line = stdin.next_line() => matches!(line, Ok(Some(_))),
            _ = shutdown.cancelled() => false,
        };
        if !retry {
            break;
        }

        state = tokio::select! {
            state = session.retry() => state,
            _ = shutdown.cancelled() => CompassSessionState::Idle,
        };
    }

    if state == CompassSessionState::Ready {
        let snapshot = session.snapshot();
        if let (Some(origin), Some(bearing)) = (snapshot.origin, snapshot.bearing) {
            println!("\n✓ Location acquired: {}", origin);
            println!("  Qibla bearing: {:.1}°", bearing);
        }
        println!("\nCompass running. Press Ctrl+C to exit.\n");
        follow(&mut session, &shutdown, points).await;
    }

    let failure = session.error().map(|e| e.to_string());
    session.stop();
    info!("Compass session stopped");

    match failure {
        Some(cause) => Err(cause.into()),
        None => Ok(()),
    }
}

async fn follow<P, L, M>(
    session: &mut CompassSession<P, L, M>,
    shutdown: &CancellationToken,
    points: CompassPoints,
) where
    P: PermissionProvider,
    L: LocationProvider,
    M: MagneticFieldProvider,
{
    let mut status = tokio::time::interval(Duration::from_secs(DEFAULT_STATUS_INTERVAL_SECS));

    loop {
        let step = tokio::select! {
            update = session.next_update() => Step::Update(update),
            _ = status.tick() => Step::Status,
            _ = shutdown.cancelled() => Step::Shutdown,
        };

        match step {
            Step::Update(Some(_)) => {}
            Step::Update(None) | Step::Shutdown => break,
            Step::Status => print_status(&session.snapshot(), points),
        }
    }
}

fn print_status(snapshot: &CompassSnapshot, points: CompassPoints) {
    let (Some(heading), Some(bearing), Some(rotation)) =
        (snapshot.heading, snapshot.bearing, snapshot.rotation)
    else {
        println!("  Waiting for magnetometer...");
        return;
    };

    let turn = shortest_delta(heading, bearing);
    let hint = if turn.abs() < 2.0 {
        "facing the qibla".to_string()
    } else if turn > 0.0 {
        format!("turn {:.0}° right", turn)
    } else {
        format!("turn {:.0}° left", -turn)
    };

    println!(
        "Heading: {:>5.1}° ({:<3}) | Qibla: {:>5.1}° ({:<3}) | dial {:>6.1}° pointer {:>5.1}° | {}",
        heading,
        snapshot.heading_direction(points).map(|d| d.abbreviation()).unwrap_or("-"),
        bearing,
        snapshot.bearing_direction(points).map(|d| d.abbreviation()).unwrap_or("-"),
        rotation.dial_rotation_degrees,
        rotation.pointer_rotation_degrees,
        hint
    );

    if let Some(km) = snapshot.distance_to_target_km() {
        println!("  Distance to the Kaaba: {:.0} km", km);
    }
}
